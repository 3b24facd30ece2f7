use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{self, SET_COOKIE},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};

use crate::{
    config::CookieConfig,
    error::AppError,
    response::{JsonApiResponse, log_app_error},
    services::ServiceContext,
    session::{
        IssuedSession,
        cookies::{
            CSRF_COOKIE, CSRF_HEADER, REFRESH_COOKIE, cleared_cookies, csrf_cookie, read_cookie,
            read_header, refresh_cookie,
        },
    },
    state::AppState,
};

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

/// The refresh token is never part of the body; it only travels as a cookie.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .layer(middleware::map_response(no_store))
        .with_state(state)
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CredentialsRequest>,
) -> Result<Response, AppError> {
    let services = ServiceContext::from_state(state.as_ref());
    let session = services
        .auth(&state.sessions)
        .register(&body.email, &body.password)
        .await?;
    session_response(&state.config.session.cookie, session)
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CredentialsRequest>,
) -> Result<Response, AppError> {
    let services = ServiceContext::from_state(state.as_ref());
    let session = services
        .auth(&state.sessions)
        .login(&body.email, &body.password)
        .await?;
    session_response(&state.config.session.cookie, session)
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let refresh_token = read_cookie(&headers, REFRESH_COOKIE)
        .ok_or_else(|| AppError::unauthorized("Refresh token not recognized"))?;
    let csrf_cookie_value = read_cookie(&headers, CSRF_COOKIE);

    let services = ServiceContext::from_state(state.as_ref());
    let session = services
        .auth(&state.sessions)
        .refresh(
            &refresh_token,
            read_header(&headers, CSRF_HEADER),
            csrf_cookie_value.as_deref(),
        )
        .await?;
    session_response(&state.config.session.cookie, session)
}

async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    if let Some(refresh_token) = read_cookie(&headers, REFRESH_COOKIE) {
        let services = ServiceContext::from_state(state.as_ref());
        match services.auth(&state.sessions).logout(&refresh_token).await {
            Ok(()) | Err(AppError::Unauthorized(_)) => {}
            Err(err) => log_app_error(&err, StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    // Cookies are cleared even when nothing matched the presented token.
    let mut response_headers = HeaderMap::new();
    match cleared_cookies(&state.config.session.cookie) {
        Ok(cookies) => {
            for cookie in cookies {
                response_headers.append(SET_COOKIE, cookie);
            }
        }
        Err(err) => tracing::error!(error = %err, "failed to build cleared session cookies"),
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

fn session_response(cfg: &CookieConfig, session: IssuedSession) -> Result<Response, AppError> {
    let mut headers = HeaderMap::new();
    headers.append(
        SET_COOKIE,
        refresh_cookie(cfg, &session.refresh_token, session.refresh_max_age)
            .map_err(|err| AppError::internal(format!("invalid refresh cookie: {err}")))?,
    );
    headers.append(
        SET_COOKIE,
        csrf_cookie(cfg, &session.csrf_token, session.refresh_max_age)
            .map_err(|err| AppError::internal(format!("invalid csrf cookie: {err}")))?,
    );

    let body = JsonApiResponse::ok(TokenResponse {
        access_token: session.access_token,
        token_type: session.token_type,
        expires_in: session.expires_in,
    })?;
    Ok((headers, body).into_response())
}

/// Token responses, and rejections of them, must never be cached.
async fn no_store(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}
