use utoipa::openapi::{
    OpenApi,
    security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

pub const SWAGGER_PATH: &str = "/swagger-ui";
pub const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

/// Registers the `bearerAuth` scheme referenced by protected routes and mounts the UI.
pub fn create_swagger_ui(mut openapi: OpenApi) -> SwaggerUi {
    let components = openapi.components.get_or_insert_with(Default::default);
    components.add_security_scheme(
        "bearerAuth",
        SecurityScheme::Http(
            HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("JWT")
                .build(),
        ),
    );
    SwaggerUi::new(SWAGGER_PATH).url(OPENAPI_JSON_PATH, openapi)
}
