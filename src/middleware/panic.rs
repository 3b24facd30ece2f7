use std::any::Any;

use axum::response::{IntoResponse, Response};
use tower_http::catch_panic::CatchPanicLayer;

use crate::error::AppError;

type PanicHandler = fn(Box<dyn Any + Send + 'static>) -> Response;

/// Turns a handler panic into the usual JSON 500 instead of a dropped connection.
pub fn catch_panic_layer() -> CatchPanicLayer<PanicHandler> {
    CatchPanicLayer::custom(panic_response as PanicHandler)
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let details = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = details, "handler panicked");

    // Panic text may carry request data; only debug builds echo it.
    if cfg!(debug_assertions) {
        AppError::internal(format!("internal server error: {details}")).into_response()
    } else {
        AppError::internal("internal server error").into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, StatusCode},
        routing::get,
    };
    use tower::ServiceExt;

    use super::catch_panic_layer;

    async fn boom() -> &'static str {
        panic!("enclosure gate left open")
    }

    #[tokio::test]
    async fn panic_becomes_json_500() {
        let app = Router::new()
            .route("/boom", get(boom))
            .layer(catch_panic_layer());

        let response = app
            .oneshot(Request::get("/boom").body(Body::empty()).expect("request"))
            .await
            .expect("request should complete");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        let json: serde_json::Value = serde_json::from_slice(&bytes).expect("body should be json");
        assert_eq!(json["status"], 500);
        assert!(json["data"].is_null());
    }
}
