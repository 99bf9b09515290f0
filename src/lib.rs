pub mod common;
pub mod domain;
pub mod engine;
pub mod messaging;
pub mod models;
pub mod routes;
pub mod schema;
pub mod store;
pub mod validation;
