use axum::response::IntoResponse;

// Intentionally outside the OpenAPI document; it only names the service.
pub async fn root() -> impl IntoResponse {
    concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"))
}
