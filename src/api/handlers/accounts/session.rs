//! Sign-in, sign-out, and session introspection.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{InvalidHeaderValue, SET_COOKIE},
    },
    response::IntoResponse,
};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::api::events::AccountEvent;

use super::credential::verify_password;
use super::policy::{destination_for, redirect_after_signin, session_expiry};
use super::principal::{SESSION_COOKIE_NAME, extract_session_token, optional_auth};
use super::state::{AccountsConfig, AccountsState};
use super::storage::{LoginRecord, insert_session, lookup_session};
use super::types::{
    DisabledAccountResponse, SessionResponse, SigninRequest, SigninResponse, SignoutResponse,
};
use super::utils::hash_session_token;

/// Disabled accounts are pointed at a dedicated view, not a generic error.
const DISABLED_TEMPLATE: &str = "/accounts/{username}/disabled";

/// Authenticate with username or email plus password and establish a session.
#[utoipa::path(
    post,
    path = "/v1/auth/signin",
    request_body = SigninRequest,
    responses(
        (status = 200, description = "Signed in; session cookie set", body = SigninResponse),
        (status = 400, description = "Missing payload or identification", body = String),
        (status = 401, description = "Unknown identification or wrong password", body = String),
        (status = 403, description = "Valid credentials but disabled account", body = DisabledAccountResponse)
    ),
    tag = "auth"
)]
pub async fn signin(
    pool: Extension<PgPool>,
    accounts_state: Extension<Arc<AccountsState>>,
    payload: Option<Json<SigninRequest>>,
) -> impl IntoResponse {
    let request: SigninRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let identification = request.identification.trim();
    if identification.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "Missing identification".to_string(),
        )
            .into_response();
    }

    let record = match super::storage::lookup_login(&pool, identification).await {
        Ok(record) => record,
        Err(err) => {
            error!("Failed to lookup login record: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Signin failed".to_string())
                .into_response();
        }
    };

    // Unknown identification and wrong password produce the same message,
    // so callers cannot probe which accounts exist.
    let Some(LoginRecord {
        user_id,
        username,
        password_hash,
        active,
    }) = record
    else {
        return (
            StatusCode::UNAUTHORIZED,
            "Invalid identification or password".to_string(),
        )
            .into_response();
    };

    if !verify_password(request.password.expose_secret(), &password_hash) {
        return (
            StatusCode::UNAUTHORIZED,
            "Invalid identification or password".to_string(),
        )
            .into_response();
    }

    if !active {
        let response = DisabledAccountResponse {
            error: "Account disabled".to_string(),
            redirect_to: destination_for(DISABLED_TEMPLATE, &username),
        };
        return (StatusCode::FORBIDDEN, Json(response)).into_response();
    }

    let config = accounts_state.config();
    let expiry = session_expiry(request.remember_me, config);
    let token = match insert_session(&pool, user_id, server_ttl_seconds(expiry, config)).await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to insert session: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Signin failed".to_string())
                .into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    match session_cookie(&token, expiry) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Signin failed".to_string())
                .into_response();
        }
    }

    accounts_state.events().publish(AccountEvent::SignedIn {
        username: username.clone(),
    });

    let redirect_to = redirect_after_signin(
        accounts_state.next_url_guard(),
        request.next.as_deref(),
        &username,
        config,
    );

    (
        StatusCode::OK,
        response_headers,
        Json(SigninResponse {
            username,
            redirect_to,
        }),
    )
        .into_response()
}

/// Sign the current actor out and clear the cookie.
#[utoipa::path(
    post,
    path = "/v1/auth/signout",
    responses(
        (status = 200, description = "Session cleared; cookie removed", body = SignoutResponse)
    ),
    tag = "auth"
)]
pub async fn signout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    accounts_state: Extension<Arc<AccountsState>>,
) -> impl IntoResponse {
    match optional_auth(&headers, &pool).await {
        Ok(Some(principal)) => {
            // The event fires before the session is invalidated.
            accounts_state.events().publish(AccountEvent::SignedOut {
                username: principal.username,
            });
        }
        Ok(None) => {}
        Err(status) => return status.into_response(),
    }

    if let Some(token) = extract_session_token(&headers) {
        let token_hash = hash_session_token(&token);
        if let Err(err) = super::storage::delete_session(&pool, &token_hash).await {
            error!("Failed to delete session: {err}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie() {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::OK,
        response_headers,
        Json(SignoutResponse {
            redirect_to: accounts_state.config().signout_redirect().to_string(),
        }),
    )
        .into_response()
}

/// Report the current session's principal.
#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(headers: HeaderMap, pool: Extension<PgPool>) -> impl IntoResponse {
    // Missing cookies are treated as "no session" to avoid leaking auth state.
    let Some(token) = extract_session_token(&headers) else {
        return StatusCode::NO_CONTENT.into_response();
    };
    let token_hash = hash_session_token(&token);
    match lookup_session(&pool, &token_hash).await {
        Ok(Some(record)) => {
            let response = SessionResponse {
                user_id: record.user_id.to_string(),
                username: record.username,
                email: record.email,
                is_staff: record.is_staff,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to lookup session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Server-side row TTL: remember-me sessions live for their full window;
/// browser-session sign-ins get the configured fallback bound.
pub(super) fn server_ttl_seconds(expiry: Duration, config: &AccountsConfig) -> i64 {
    if expiry.is_zero() {
        config.session_ttl_seconds()
    } else {
        i64::try_from(expiry.as_secs()).unwrap_or(i64::MAX)
    }
}

/// Build the `HttpOnly` session cookie. A zero expiry means browser-session
/// lifetime, signaled by omitting `Max-Age`.
pub(super) fn session_cookie(
    token: &str,
    expiry: Duration,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax");
    if !expiry.is_zero() {
        let max_age = expiry.as_secs();
        cookie.push_str(&format!("; Max-Age={max_age}"));
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie() -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
    ))
}
