//! Email change: an authorized request records a pending address, a
//! confirmation token applies it.

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::events::AccountEvent;

use super::gate::{AccountOperation, allow};
use super::policy::destination_for;
use super::principal::require_auth;
use super::state::AccountsState;
use super::storage::{
    EmailChangeOutcome, consume_email_change_token, fetch_profile, upsert_email_change,
};
use super::types::{ConfirmEmailRequest, ConfirmEmailResponse, EmailChangeRequest, MessageResponse};
use super::utils::{hash_account_token, normalize_email, valid_email, valid_token};

const EMAIL_CONFIRMED_TEMPLATE: &str = "/accounts/{username}/email/confirmed";

/// Request an email change for an account.
///
/// The current address stays authoritative until the confirmation token
/// is consumed. A second request supersedes the first: its token becomes
/// permanently invalid because the underlying record is replaced.
#[utoipa::path(
    put,
    path = "/v1/accounts/{username}/email",
    params(("username" = String, Path, description = "Target account")),
    request_body = EmailChangeRequest,
    responses(
        (status = 202, description = "Pending change recorded; confirmation dispatched", body = MessageResponse),
        (status = 400, description = "Invalid email", body = String),
        (status = 401, description = "Not signed in"),
        (status = 403, description = "Actor is neither the account nor staff", body = String),
        (status = 404, description = "Unknown account", body = String)
    ),
    tag = "accounts"
)]
pub async fn request_email_change(
    Path(username): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    accounts_state: Extension<Arc<AccountsState>>,
    payload: Option<Json<EmailChangeRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    if !allow(&principal, AccountOperation::ChangeEmail, &username) {
        return (StatusCode::FORBIDDEN, "Access denied".to_string()).into_response();
    }

    let request: EmailChangeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let new_email = normalize_email(&request.new_email);
    if !valid_email(&new_email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    // Resolve the target account; staff may act on accounts other than
    // their own, so the principal is not enough.
    let target = match fetch_profile(&pool, &username).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            return (StatusCode::NOT_FOUND, "Unknown account".to_string()).into_response();
        }
        Err(err) => {
            error!("Failed to resolve email change target: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Email change failed".to_string(),
            )
                .into_response();
        }
    };

    if target.email.eq_ignore_ascii_case(&new_email) {
        return (
            StatusCode::BAD_REQUEST,
            "Already using this email".to_string(),
        )
            .into_response();
    }

    let token = match upsert_email_change(&pool, target.user_id, &new_email).await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to record email change: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Email change failed".to_string(),
            )
                .into_response();
        }
    };

    accounts_state
        .events()
        .publish(AccountEvent::EmailChangeRequested {
            username: target.username,
            new_email,
            confirmation_token: token,
        });

    let response = MessageResponse {
        message: "Confirmation required to apply the new email address".to_string(),
    };
    (StatusCode::ACCEPTED, Json(response)).into_response()
}

/// Confirm a pending email change.
///
/// Consumed, superseded, and unknown tokens all return the same 404, so a
/// replayed confirmation can never re-apply a change.
#[utoipa::path(
    post,
    path = "/v1/accounts/confirm-email",
    request_body = ConfirmEmailRequest,
    responses(
        (status = 200, description = "New address applied", body = ConfirmEmailResponse),
        (status = 400, description = "Missing token", body = String),
        (status = 404, description = "Unknown, consumed, or superseded token", body = String),
        (status = 409, description = "Address taken since the request was made", body = String)
    ),
    tag = "accounts"
)]
pub async fn confirm_email_change(
    pool: Extension<PgPool>,
    accounts_state: Extension<Arc<AccountsState>>,
    payload: Option<Json<ConfirmEmailRequest>>,
) -> impl IntoResponse {
    let request: ConfirmEmailRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let token = request.token.trim();
    if token.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing token".to_string()).into_response();
    }
    if !valid_token(token) {
        return (StatusCode::NOT_FOUND, "Invalid token".to_string()).into_response();
    }

    let token_hash = hash_account_token(token);
    match consume_email_change_token(&pool, &token_hash).await {
        Ok(EmailChangeOutcome::Confirmed { user, prev_email }) => {
            accounts_state.events().publish(AccountEvent::EmailChanged {
                username: user.username.clone(),
                prev_email,
                new_email: user.email.clone(),
            });
            let redirect_to = destination_for(EMAIL_CONFIRMED_TEMPLATE, &user.username);
            (
                StatusCode::OK,
                Json(ConfirmEmailResponse {
                    username: user.username,
                    email: user.email,
                    redirect_to,
                }),
            )
                .into_response()
        }
        Ok(EmailChangeOutcome::EmailInUse) => (
            StatusCode::CONFLICT,
            "Email address already taken".to_string(),
        )
            .into_response(),
        Ok(EmailChangeOutcome::NotFound) => {
            (StatusCode::NOT_FOUND, "Invalid token".to_string()).into_response()
        }
        Err(err) => {
            error!("Failed to confirm email change: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Email confirmation failed".to_string(),
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

    fn accounts_state() -> Arc<AccountsState> {
        let (bus, _rx) = EventBus::new();
        Arc::new(AccountsState::new(
            AccountsConfig::new(),
            Arc::new(SameOriginGuard),
            bus,
        ))
    }

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/postgres")
            .expect("lazy pool")
    }

    #[tokio::test]
    async fn request_requires_auth() {
        let response = request_email_change(
            Path("alice".to_string()),
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(accounts_state()),
            Some(Json(EmailChangeRequest {
                new_email: "new@example.com".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn confirm_missing_payload() {
        let response =
            confirm_email_change(Extension(lazy_pool()), Extension(accounts_state()), None)
                .await
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn confirm_empty_token() {
        let response = confirm_email_change(
            Extension(lazy_pool()),
            Extension(accounts_state()),
            Some(Json(ConfirmEmailRequest {
                token: " ".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn confirm_malformed_token_is_not_found() {
        let response = confirm_email_change(
            Extension(lazy_pool()),
            Extension(accounts_state()),
            Some(Json(ConfirmEmailRequest {
                token: "nope".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
