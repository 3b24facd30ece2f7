use std::sync::Arc;

use axum::{Router, extract::State, routing::get};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::AuthGuard,
    response::{ApiResult, JsonApiResponse},
    services::ServiceContext,
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new().route("/me", get(me)).with_state(state)
}

async fn me(State(state): State<Arc<AppState>>, claims: AuthGuard) -> ApiResult<MeResponse> {
    let id = claims
        .user_id()
        .ok_or_else(|| AppError::unauthorized("Invalid access token"))?;
    let user = ServiceContext::from_state(state.as_ref())
        .user()
        .find_by_id(&id)
        .await?
        .ok_or_else(|| AppError::unauthorized("Unknown user"))?;

    JsonApiResponse::ok(MeResponse {
        id: user.id,
        email: user.email,
        iat: claims.iat,
        exp: claims.exp,
    })
}
