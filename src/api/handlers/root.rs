use axum::{http::StatusCode, response::IntoResponse};

/// Root handler: nothing to see here, point humans at the docs.
pub async fn root() -> impl IntoResponse {
    (
        StatusCode::OK,
        concat!(
            env!("CARGO_PKG_NAME"),
            " ",
            env!("CARGO_PKG_VERSION"),
            " - see /v1/openapi.json"
        ),
    )
}
