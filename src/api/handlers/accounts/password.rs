//! Password change for an account, gated on self-or-staff.

use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::events::AccountEvent;

use super::credential::hash_password;
use super::gate::{AccountOperation, allow};
use super::principal::require_auth;
use super::state::AccountsState;
use super::storage::update_password;
use super::types::PasswordChangeRequest;

#[utoipa::path(
    put,
    path = "/v1/accounts/{username}/password",
    params(("username" = String, Path, description = "Target account")),
    request_body = PasswordChangeRequest,
    responses(
        (status = 204, description = "Password replaced"),
        (status = 400, description = "Missing password", body = String),
        (status = 401, description = "Not signed in"),
        (status = 403, description = "Actor is neither the account nor staff", body = String),
        (status = 404, description = "Unknown account", body = String)
    ),
    tag = "accounts"
)]
pub async fn change_password(
    Path(username): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    accounts_state: Extension<Arc<AccountsState>>,
    payload: Option<Json<PasswordChangeRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    if !allow(&principal, AccountOperation::ChangePassword, &username) {
        return (StatusCode::FORBIDDEN, "Access denied".to_string()).into_response();
    }

    let request: PasswordChangeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if request.new_password.expose_secret().is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing password".to_string()).into_response();
    }

    let password_hash = match hash_password(request.new_password.expose_secret()) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Password change failed".to_string(),
            )
                .into_response();
        }
    };

    match update_password(&pool, &username, &password_hash).await {
        Ok(Some(user)) => {
            accounts_state
                .events()
                .publish(AccountEvent::PasswordChanged {
                    username: user.username,
                });
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(None) => (StatusCode::NOT_FOUND, "Unknown account".to_string()).into_response(),
        Err(err) => {
            error!("Failed to change password: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Password change failed".to_string(),
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

    #[tokio::test]
    async fn change_password_requires_auth() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/postgres")
            .expect("lazy pool");
        let response = change_password(
            Path("alice".to_string()),
            HeaderMap::new(),
            Extension(pool),
            Extension(accounts_state()),
            Some(Json(PasswordChangeRequest {
                new_password: "new-password".to_string().into(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
