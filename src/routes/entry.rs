use std::sync::Arc;

use axum::{Router, middleware};
use tower_http::trace::TraceLayer;

use crate::{
    middleware::{catch_panic_layer, json_error_middleware},
    state::AppState,
};

use super::{auth, protected, public};

pub const API_PREFIX: &str = "/api/v1";
pub const AUTH_PREFIX: &str = "/auth";

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest(AUTH_PREFIX, auth::router(state.clone()))
        .nest(
            API_PREFIX,
            Router::new()
                .merge(public::router())
                .merge(protected::router(state)),
        )
}

/// The router with the error, panic and tracing layers the server runs with.
pub fn app(state: Arc<AppState>) -> Router {
    router(state)
        .layer(middleware::from_fn(json_error_middleware))
        .layer(catch_panic_layer())
        .layer(TraceLayer::new_for_http())
}
