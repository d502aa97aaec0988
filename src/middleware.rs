// CORS middleware for the gateway surface

use axum::http::Method;
use tower_http::cors::{Any, CorsLayer};

/// Permissive CORS so browser dashboards can call the gateway directly
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}
