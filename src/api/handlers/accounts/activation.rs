//! Activation endpoints: consume a token, or reissue an expired one.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::api::events::AccountEvent;

use super::policy::destination_for;
use super::session::{server_ttl_seconds, session_cookie};
use super::state::AccountsState;
use super::storage::{
    ActivationOutcome, ReissueOutcome, consume_activation_token, insert_session,
    reissue_activation_token,
};
use super::types::{ActivateRequest, ActivateResponse, ActivationExpiredResponse, MessageResponse};
use super::utils::{hash_account_token, valid_token};

/// Activate an account with a single-use token and sign the user in.
///
/// A consumed token and a token that never existed both return 404; the
/// two cases are indistinguishable on purpose, so a replayed token can
/// never report success twice. With retry enabled, an expired token
/// returns 410 and the record is left in place for the retry endpoint;
/// with retry disabled the token is honored regardless of age.
#[utoipa::path(
    post,
    path = "/v1/accounts/activate",
    request_body = ActivateRequest,
    responses(
        (status = 200, description = "Account activated; session cookie set", body = ActivateResponse),
        (status = 400, description = "Missing token", body = String),
        (status = 404, description = "Unknown or already consumed token", body = String),
        (status = 410, description = "Expired token; retry possible", body = ActivationExpiredResponse)
    ),
    tag = "accounts"
)]
pub async fn activate(
    pool: Extension<PgPool>,
    accounts_state: Extension<Arc<AccountsState>>,
    payload: Option<Json<ActivateRequest>>,
) -> impl IntoResponse {
    let request: ActivateRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let token = request.token.trim();
    if token.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing token".to_string()).into_response();
    }
    if !valid_token(token) {
        // A malformed token cannot name any record.
        return (StatusCode::NOT_FOUND, "Invalid token".to_string()).into_response();
    }

    let config = accounts_state.config();
    let token_hash = hash_account_token(token);
    let outcome = consume_activation_token(
        &pool,
        &token_hash,
        config.activation_window_seconds(),
        config.activation_retry(),
    )
    .await;

    match outcome {
        Ok(ActivationOutcome::Activated(user)) => {
            accounts_state.events().publish(AccountEvent::Activated {
                username: user.username.clone(),
                email: user.email.clone(),
            });

            // Activation doubles as a sign-in, with browser-session lifetime.
            let mut response_headers = HeaderMap::new();
            let ttl = server_ttl_seconds(Duration::ZERO, config);
            match insert_session(&pool, user.user_id, ttl).await {
                Ok(session_token) => {
                    if let Ok(cookie) = session_cookie(&session_token, Duration::ZERO) {
                        response_headers.insert(SET_COOKIE, cookie);
                    }
                    accounts_state.events().publish(AccountEvent::SignedIn {
                        username: user.username.clone(),
                    });
                }
                Err(err) => {
                    // The account is active either way.
                    error!("Failed to establish post-activation session: {err}");
                }
            }

            let redirect_to = destination_for(config.default_redirect(), &user.username);
            (
                StatusCode::OK,
                response_headers,
                Json(ActivateResponse {
                    username: user.username,
                    redirect_to,
                }),
            )
                .into_response()
        }
        Ok(ActivationOutcome::Expired) => {
            let response = ActivationExpiredResponse {
                error: "Activation token expired".to_string(),
                retry_allowed: true,
            };
            (StatusCode::GONE, Json(response)).into_response()
        }
        Ok(ActivationOutcome::NotFound) => {
            (StatusCode::NOT_FOUND, "Invalid token".to_string()).into_response()
        }
        Err(err) => {
            error!("Failed to activate account: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Activation failed".to_string(),
            )
                .into_response()
        }
    }
}

/// Reissue an expired activation token.
///
/// Fails closed with the same 404 as `activate` whenever retry is
/// disabled, the token is unknown, or the token has not expired yet, so
/// callers fall back to a single error path.
#[utoipa::path(
    post,
    path = "/v1/accounts/activate/retry",
    request_body = ActivateRequest,
    responses(
        (status = 202, description = "New activation token issued and dispatched", body = MessageResponse),
        (status = 400, description = "Missing token", body = String),
        (status = 404, description = "Unknown, unexpired, or retry-disabled token", body = String)
    ),
    tag = "accounts"
)]
pub async fn activate_retry(
    pool: Extension<PgPool>,
    accounts_state: Extension<Arc<AccountsState>>,
    payload: Option<Json<ActivateRequest>>,
) -> impl IntoResponse {
    let request: ActivateRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let token = request.token.trim();
    if token.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing token".to_string()).into_response();
    }

    let config = accounts_state.config();
    if !config.activation_retry() || !valid_token(token) {
        return (StatusCode::NOT_FOUND, "Invalid token".to_string()).into_response();
    }

    let token_hash = hash_account_token(token);
    let outcome =
        reissue_activation_token(&pool, &token_hash, config.activation_window_seconds()).await;

    match outcome {
        Ok(ReissueOutcome::Reissued { user, token }) => {
            // The raw token travels on the event so a mailer sink can
            // deliver the fresh link; it is never part of the response.
            accounts_state
                .events()
                .publish(AccountEvent::ActivationReissued {
                    username: user.username,
                    email: user.email,
                    activation_token: token,
                });
            let response = MessageResponse {
                message: "A new activation link has been issued".to_string(),
            };
            (StatusCode::ACCEPTED, Json(response)).into_response()
        }
        Ok(ReissueOutcome::NotExpired | ReissueOutcome::NotFound) => {
            (StatusCode::NOT_FOUND, "Invalid token".to_string()).into_response()
        }
        Err(err) => {
            error!("Failed to reissue activation token: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Activation retry failed".to_string(),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::events::EventBus;
    use crate::api::handlers::accounts::policy::SameOriginGuard;
    use crate::api::handlers::accounts::state::AccountsConfig;
    use sqlx::postgres::PgPoolOptions;

    fn accounts_state(config: AccountsConfig) -> Arc<AccountsState> {
        let (bus, _rx) = EventBus::new();
        Arc::new(AccountsState::new(config, Arc::new(SameOriginGuard), bus))
    }

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/postgres")
            .expect("lazy pool")
    }

    #[tokio::test]
    async fn activate_missing_payload() {
        let response = activate(
            Extension(lazy_pool()),
            Extension(accounts_state(AccountsConfig::new())),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn activate_empty_token() {
        let request = ActivateRequest {
            token: "  ".to_string(),
        };
        let response = activate(
            Extension(lazy_pool()),
            Extension(accounts_state(AccountsConfig::new())),
            Some(Json(request)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn activate_malformed_token_is_not_found() {
        let request = ActivateRequest {
            token: "not-a-token".to_string(),
        };
        let response = activate(
            Extension(lazy_pool()),
            Extension(accounts_state(AccountsConfig::new())),
            Some(Json(request)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn retry_fails_closed_when_disabled() {
        // Retry is off by default; a well-formed token still gets 404
        // without touching the database.
        let request = ActivateRequest {
            token: "0123456789abcdef0123456789abcdef01234567".to_string(),
        };
        let response = activate_retry(
            Extension(lazy_pool()),
            Extension(accounts_state(AccountsConfig::new())),
            Some(Json(request)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn retry_malformed_token_is_not_found() {
        let config = AccountsConfig::new().with_activation_retry(true);
        let request = ActivateRequest {
            token: "XYZ".to_string(),
        };
        let response = activate_retry(
            Extension(lazy_pool()),
            Extension(accounts_state(config)),
            Some(Json(request)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
