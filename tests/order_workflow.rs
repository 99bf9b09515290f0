mod common;

use agriconnect_marketplace::{
    domain::{Category, NewProduct, OrderStatus, Price, PriceUnit},
    engine::{OrderError, OrderListQuery, RateOrderInput},
    store::{CatalogStore, StoreError},
};
use common::{Fixture, cart};
use futures::future::join_all;
use rust_decimal::Decimal;

#[tokio::test]
async fn tomatoes_checkout_prices_server_side_and_reserves_stock() {
    let fx = Fixture::new();
    let farmer = fx.producer("farmer@example.com").await;
    let buyer = fx.consumer("buyer@example.com").await;
    let tomatoes = fx.product(farmer, "Tomatoes", 40, 10).await;

    let placement = fx
        .engine
        .place_order(buyer, cart(&[(tomatoes, 3)]))
        .await
        .unwrap();

    assert!(placement.failures.is_empty());
    assert_eq!(placement.orders.len(), 1);
    let order = &placement.orders[0].order;
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.totals.subtotal, Decimal::new(12000, 2));
    assert_eq!(order.totals.delivery_charge, Decimal::new(5000, 2));
    assert_eq!(order.totals.tax, Decimal::new(600, 2));
    assert_eq!(order.totals.total, Decimal::new(17600, 2));
    assert_eq!(order.items[0].unit_price, Decimal::new(4000, 2));
    assert_eq!(order.timeline.len(), 1);
    assert!(order.order_number.starts_with("ORD"));
    assert_eq!(fx.available(tomatoes).await, 7);
}

#[tokio::test]
async fn two_concurrent_orders_cannot_oversell() {
    let fx = Fixture::new();
    let farmer = fx.producer("farmer@example.com").await;
    let first = fx.consumer("first@example.com").await;
    let second = fx.consumer("second@example.com").await;
    let tomatoes = fx.product(farmer, "Tomatoes", 40, 10).await;

    let (a, b) = tokio::join!(
        fx.engine.place_order(first, cart(&[(tomatoes, 6)])),
        fx.engine.place_order(second, cart(&[(tomatoes, 6)])),
    );

    let results = [a, b];
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    let failure = results.into_iter().find_map(Result::err).unwrap();
    assert!(matches!(
        failure,
        OrderError::InsufficientInventory { available: 4, .. }
    ));
    assert_eq!(fx.available(tomatoes).await, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_reservations_never_go_negative() {
    let fx = Fixture::new();
    let farmer = fx.producer("farmer@example.com").await;
    let rice = fx.product(farmer, "Rice", 60, 50).await;

    let mut buyers = Vec::new();
    for i in 0..20 {
        buyers.push(fx.consumer(&format!("buyer{i}@example.com")).await);
    }

    let tasks = buyers.into_iter().map(|buyer| {
        let engine = fx.engine.clone();
        tokio::spawn(async move { engine.place_order(buyer, cart(&[(rice, 3)])).await })
    });
    let results = join_all(tasks).await;

    let placed: u32 = results
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(|r| r.is_ok())
        .count() as u32;

    // 50 / 3 leaves room for 16 orders.
    assert_eq!(placed, 16);
    assert_eq!(fx.available(rice).await, 50 - placed * 3);
}

#[tokio::test]
async fn over_quantity_fails_without_touching_inventory() {
    let fx = Fixture::new();
    let farmer = fx.producer("farmer@example.com").await;
    let buyer = fx.consumer("buyer@example.com").await;
    let tomatoes = fx.product(farmer, "Tomatoes", 40, 10).await;
    let onions = fx.product(farmer, "Onions", 30, 2).await;

    let err = fx
        .engine
        .place_order(buyer, cart(&[(tomatoes, 3), (onions, 5)]))
        .await
        .unwrap_err();

    match err {
        OrderError::InsufficientInventory {
            product_id,
            available,
            ..
        } => {
            assert_eq!(product_id, onions);
            assert_eq!(available, 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(fx.available(tomatoes).await, 10);
    assert_eq!(fx.available(onions).await, 2);
}

#[tokio::test]
async fn duplicate_lines_are_merged_before_reserving() {
    let fx = Fixture::new();
    let farmer = fx.producer("farmer@example.com").await;
    let buyer = fx.consumer("buyer@example.com").await;
    let tomatoes = fx.product(farmer, "Tomatoes", 40, 10).await;

    let placement = fx
        .engine
        .place_order(buyer, cart(&[(tomatoes, 2), (tomatoes, 4)]))
        .await
        .unwrap();

    let order = &placement.orders[0].order;
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.items[0].quantity, 6);
    assert_eq!(fx.available(tomatoes).await, 4);
}

#[tokio::test]
async fn buyer_cancel_restores_inventory_exactly_once() {
    let fx = Fixture::new();
    let farmer = fx.producer("farmer@example.com").await;
    let buyer = fx.consumer("buyer@example.com").await;
    let tomatoes = fx.product(farmer, "Tomatoes", 40, 10).await;

    let placement = fx
        .engine
        .place_order(buyer, cart(&[(tomatoes, 3)]))
        .await
        .unwrap();
    let order_id = placement.orders[0].order.id;
    assert_eq!(fx.available(tomatoes).await, 7);

    let cancelled = fx.engine.cancel_order(order_id, buyer, None).await.unwrap();
    assert_eq!(cancelled.order.status, OrderStatus::Cancelled);
    assert_eq!(
        cancelled.order.timeline.last().unwrap().note.as_deref(),
        Some("Order cancelled by buyer")
    );
    assert_eq!(fx.available(tomatoes).await, 10);

    let again = fx.engine.cancel_order(order_id, buyer, None).await.unwrap_err();
    assert!(matches!(
        again,
        OrderError::AlreadyTerminal(OrderStatus::Cancelled)
    ));
    assert_eq!(fx.available(tomatoes).await, 10);
}

#[tokio::test]
async fn seller_cancel_also_restores_inventory() {
    let fx = Fixture::new();
    let farmer = fx.producer("farmer@example.com").await;
    let buyer = fx.consumer("buyer@example.com").await;
    let tomatoes = fx.product(farmer, "Tomatoes", 40, 10).await;

    let placement = fx
        .engine
        .place_order(buyer, cart(&[(tomatoes, 4)]))
        .await
        .unwrap();
    let order_id = placement.orders[0].order.id;
    fx.engine
        .update_status(order_id, farmer, OrderStatus::Confirmed, None)
        .await
        .unwrap();

    let cancelled = fx
        .engine
        .cancel_order(order_id, farmer, Some("Crop failure".into()))
        .await
        .unwrap();
    assert_eq!(
        cancelled.order.timeline.last().unwrap().note.as_deref(),
        Some("Crop failure")
    );
    assert_eq!(fx.available(tomatoes).await, 10);
}

#[tokio::test]
async fn status_machine_moves_forward_only() {
    let fx = Fixture::new();
    let farmer = fx.producer("farmer@example.com").await;
    let buyer = fx.consumer("buyer@example.com").await;
    let tomatoes = fx.product(farmer, "Tomatoes", 40, 10).await;

    let placement = fx
        .engine
        .place_order(buyer, cart(&[(tomatoes, 1)]))
        .await
        .unwrap();
    let order_id = placement.orders[0].order.id;

    let skip = fx
        .engine
        .update_status(order_id, farmer, OrderStatus::Delivered, None)
        .await
        .unwrap_err();
    assert!(matches!(
        skip,
        OrderError::InvalidTransition {
            from: OrderStatus::Pending,
            to: OrderStatus::Delivered
        }
    ));

    let by_buyer = fx
        .engine
        .update_status(order_id, buyer, OrderStatus::Confirmed, None)
        .await
        .unwrap_err();
    assert!(matches!(by_buyer, OrderError::Forbidden(_)));

    for next in [
        OrderStatus::Confirmed,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
    ] {
        let view = fx
            .engine
            .update_status(order_id, farmer, next, None)
            .await
            .unwrap();
        assert_eq!(view.order.status, next);
    }

    let order = fx.engine.get_order(order_id, buyer).await.unwrap().order;
    let statuses: Vec<_> = order.timeline.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Shipped,
            OrderStatus::Delivered
        ]
    );

    let late_cancel = fx.engine.cancel_order(order_id, buyer, None).await.unwrap_err();
    assert!(matches!(
        late_cancel,
        OrderError::AlreadyTerminal(OrderStatus::Delivered)
    ));
    assert_eq!(fx.available(tomatoes).await, 9);
}

#[tokio::test]
async fn only_delivered_orders_are_rated_once() {
    let fx = Fixture::new();
    let farmer = fx.producer("farmer@example.com").await;
    let buyer = fx.consumer("buyer@example.com").await;
    let tomatoes = fx.product(farmer, "Tomatoes", 40, 10).await;

    let placement = fx
        .engine
        .place_order(buyer, cart(&[(tomatoes, 1)]))
        .await
        .unwrap();
    let order_id = placement.orders[0].order.id;
    let rating = || RateOrderInput {
        rating: 5,
        review: Some("Very fresh".into()),
    };

    let early = fx.engine.rate_order(order_id, buyer, rating()).await.unwrap_err();
    assert!(matches!(early, OrderError::NotDelivered));

    for next in [
        OrderStatus::Confirmed,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
    ] {
        fx.engine
            .update_status(order_id, farmer, next, None)
            .await
            .unwrap();
    }

    let by_seller = fx.engine.rate_order(order_id, farmer, rating()).await.unwrap_err();
    assert!(matches!(by_seller, OrderError::Forbidden(_)));

    let out_of_range = fx
        .engine
        .rate_order(
            order_id,
            buyer,
            RateOrderInput {
                rating: 6,
                review: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(out_of_range, OrderError::ValidationFailed(_)));

    let rated = fx.engine.rate_order(order_id, buyer, rating()).await.unwrap();
    assert_eq!(rated.order.rating.as_ref().unwrap().rating, 5);

    let twice = fx.engine.rate_order(order_id, buyer, rating()).await.unwrap_err();
    assert!(matches!(twice, OrderError::AlreadyRated));
}

#[tokio::test]
async fn multi_producer_cart_splits_into_one_order_per_producer() {
    let fx = Fixture::new();
    let first_farm = fx.producer("first@farm.com").await;
    let second_farm = fx.producer("second@farm.com").await;
    let buyer = fx.consumer("buyer@example.com").await;
    let tomatoes = fx.product(first_farm, "Tomatoes", 40, 10).await;
    let okra = fx.product(first_farm, "Okra", 20, 10).await;
    let mangoes = fx.product(second_farm, "Mangoes", 100, 5).await;

    let placement = fx
        .engine
        .place_order(buyer, cart(&[(tomatoes, 1), (mangoes, 2), (okra, 2)]))
        .await
        .unwrap();

    assert!(placement.failures.is_empty());
    assert_eq!(placement.orders.len(), 2);
    let first = &placement.orders[0];
    let second = &placement.orders[1];
    assert_eq!(first.order.seller_id, first_farm);
    assert_eq!(first.order.items.len(), 2);
    assert_eq!(first.seller.farm_name.as_deref(), Some("Green Acres"));
    assert_eq!(second.order.seller_id, second_farm);
    // 200 + 50 delivery + 10 tax
    assert_eq!(second.order.totals.total, Decimal::new(26000, 2));
    assert_ne!(first.order.order_number, second.order.order_number);

    let page = fx
        .engine
        .list_orders(buyer, OrderListQuery::default())
        .await
        .unwrap();
    assert_eq!(page.pagination.total_items, 2);

    let seller_page = fx
        .engine
        .list_orders(second_farm, OrderListQuery::default())
        .await
        .unwrap();
    assert_eq!(seller_page.orders.len(), 1);
    assert_eq!(seller_page.orders[0].buyer.id, buyer);
}

#[tokio::test]
async fn only_parties_can_see_or_cancel_an_order() {
    let fx = Fixture::new();
    let farmer = fx.producer("farmer@example.com").await;
    let buyer = fx.consumer("buyer@example.com").await;
    let stranger = fx.consumer("stranger@example.com").await;
    let tomatoes = fx.product(farmer, "Tomatoes", 40, 10).await;

    let placement = fx
        .engine
        .place_order(buyer, cart(&[(tomatoes, 2)]))
        .await
        .unwrap();
    let order_id = placement.orders[0].order.id;

    assert!(matches!(
        fx.engine.get_order(order_id, stranger).await,
        Err(OrderError::Forbidden(_))
    ));
    assert!(matches!(
        fx.engine.cancel_order(order_id, stranger, None).await,
        Err(OrderError::Forbidden(_))
    ));
    assert_eq!(fx.available(tomatoes).await, 8);
}

#[tokio::test]
async fn producers_cannot_buy_and_deleted_products_cannot_be_ordered() {
    let fx = Fixture::new();
    let farmer = fx.producer("farmer@example.com").await;
    let buyer = fx.consumer("buyer@example.com").await;
    let tomatoes = fx.product(farmer, "Tomatoes", 40, 10).await;

    assert!(matches!(
        fx.engine.place_order(farmer, cart(&[(tomatoes, 1)])).await,
        Err(OrderError::Forbidden(_))
    ));

    fx.store.soft_delete_product(tomatoes).await.unwrap();
    assert!(matches!(
        fx.engine.place_order(buyer, cart(&[(tomatoes, 1)])).await,
        Err(OrderError::NotFound(_))
    ));
}

#[tokio::test]
async fn a_failed_producer_group_keeps_the_groups_already_placed() {
    let fx = Fixture::new();
    let first_farm = fx.producer("first@farm.com").await;
    let second_farm = fx.producer("second@farm.com").await;
    let buyer = fx.consumer("buyer@example.com").await;
    let tomatoes = fx.product(first_farm, "Tomatoes", 40, 10).await;
    let mangoes = fx.product(second_farm, "Mangoes", 100, 5).await;
    fx.sell_out(second_farm);

    let placement = fx
        .engine
        .place_order(buyer, cart(&[(tomatoes, 3), (mangoes, 2)]))
        .await
        .unwrap();

    assert_eq!(placement.orders.len(), 1);
    assert_eq!(placement.orders[0].order.seller_id, first_farm);
    assert_eq!(placement.failures.len(), 1);
    assert_eq!(placement.failures[0].seller_id, second_farm);
    assert_eq!(placement.failures[0].product_ids, vec![mangoes]);
    assert!(placement.failures[0].reason.contains("Mangoes"));
    assert_eq!(fx.available(tomatoes).await, 7);
    assert_eq!(fx.available(mangoes).await, 5);

    // Nothing placed at all surfaces the error itself.
    let err = fx
        .engine
        .place_order(buyer, cart(&[(mangoes, 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::InsufficientInventory { .. }));
}

#[tokio::test]
async fn prices_too_large_to_total_are_rejected_without_reserving() {
    let fx = Fixture::new();
    let farmer = fx.producer("farmer@example.com").await;
    let buyer = fx.consumer("buyer@example.com").await;
    let saffron = fx
        .store
        .create_product(NewProduct {
            producer_id: farmer,
            name: "Saffron".into(),
            description: "Hand picked".into(),
            category: Category::Other,
            price: Price {
                amount: Decimal::from_str_exact("10000000000000000000000000000").unwrap(),
                unit: PriceUnit::G,
                currency: "INR".into(),
            },
            location: "Pampore".into(),
            images: vec![],
            available: 100,
            is_organic: false,
            harvest_date: None,
            expiry_date: None,
            tags: vec![],
        })
        .await
        .unwrap()
        .id;

    let err = fx
        .engine
        .place_order(buyer, cart(&[(saffron, 9)]))
        .await
        .unwrap_err();
    let OrderError::ValidationFailed(errors) = err else {
        panic!("unexpected error: {err:?}");
    };
    assert!(errors.contains("items"));
    assert_eq!(fx.available(saffron).await, 100);
}

#[tokio::test]
async fn catalog_stock_adjustments_never_go_negative() {
    let fx = Fixture::new();
    let farmer = fx.producer("farmer@example.com").await;
    let okra = fx.product(farmer, "Okra", 20, 5).await;

    assert_eq!(fx.store.decrement_available(okra, 3).await.unwrap(), 2);
    let err = fx.store.decrement_available(okra, 3).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::InsufficientInventory { available: 2, .. }
    ));
    assert_eq!(fx.store.increment_available(okra, 4).await.unwrap(), 6);
    assert_eq!(fx.available(okra).await, 6);
}

#[tokio::test]
async fn page_numbers_past_the_end_return_an_empty_page() {
    let fx = Fixture::new();
    let farmer = fx.producer("farmer@example.com").await;
    let buyer = fx.consumer("buyer@example.com").await;
    let tomatoes = fx.product(farmer, "Tomatoes", 40, 10).await;
    fx.engine
        .place_order(buyer, cart(&[(tomatoes, 1)]))
        .await
        .unwrap();

    let page = fx
        .engine
        .list_orders(
            buyer,
            OrderListQuery {
                page: Some(u64::MAX),
                page_size: Some(100),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(page.orders.is_empty());
    assert_eq!(page.pagination.total_items, 1);
    assert!(page.pagination.has_prev);
    assert!(!page.pagination.has_next);
}
