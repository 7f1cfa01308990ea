//! Signup endpoint: create the user, its profile, and the activation token.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::api::events::AccountEvent;

use super::credential::hash_password;
use super::policy::destination_for;
use super::session::{server_ttl_seconds, session_cookie};
use super::state::AccountsState;
use super::storage::{SignupOutcome, insert_account, insert_session};
use super::types::{SignupRequest, SignupResponse};
use super::utils::{generated_username, normalize_email, valid_email, valid_username};

const SIGNUP_COMPLETE_TEMPLATE: &str = "/accounts/{username}/complete";

/// Create a new account.
///
/// The new account is `unverified` and receives an activation token unless
/// activation is disabled by configuration, in which case it is created
/// `active` and, when `--signin-after-signup true` is also set, signed in
/// immediately. The configuration is read once per call.
#[utoipa::path(
    post,
    path = "/v1/accounts",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = SignupResponse),
        (status = 400, description = "Invalid username, email, or password", body = String),
        (status = 409, description = "Username or email already taken", body = String)
    ),
    tag = "accounts"
)]
pub async fn signup(
    pool: Extension<PgPool>,
    accounts_state: Extension<Arc<AccountsState>>,
    payload: Option<Json<SignupRequest>>,
) -> impl IntoResponse {
    let request: SignupRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    if request.password.expose_secret().is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing password".to_string()).into_response();
    }

    let config = accounts_state.config();
    let username = if config.without_usernames() {
        match generated_username() {
            Ok(username) => username,
            Err(err) => {
                error!("Failed to generate username: {err}");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Signup failed".to_string())
                    .into_response();
            }
        }
    } else {
        let Some(username) = request.username.as_deref().map(str::trim) else {
            return (StatusCode::BAD_REQUEST, "Missing username".to_string()).into_response();
        };
        if !valid_username(username) {
            return (StatusCode::BAD_REQUEST, "Invalid username".to_string()).into_response();
        }
        username.to_string()
    };

    let password_hash = match hash_password(request.password.expose_secret()) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Signup failed".to_string())
                .into_response();
        }
    };

    let outcome = insert_account(
        &pool,
        &username,
        &email,
        &password_hash,
        config.activation_required(),
    )
    .await;

    let (user, activation_token) = match outcome {
        Ok(SignupOutcome::Created {
            user,
            activation_token,
        }) => (user, activation_token),
        Ok(SignupOutcome::Conflict) => {
            return (
                StatusCode::CONFLICT,
                "Username or email already taken".to_string(),
            )
                .into_response();
        }
        Err(err) => {
            error!("Failed to create account: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Signup failed".to_string())
                .into_response();
        }
    };

    accounts_state
        .events()
        .publish(AccountEvent::SignupComplete {
            username: user.username.clone(),
            email: user.email.clone(),
            activation_token,
        });

    // Optional immediate sign-in: only when activation is not required.
    if !config.activation_required() && config.signin_after_signup() {
        let ttl = server_ttl_seconds(Duration::ZERO, config);
        match insert_session(&pool, user.user_id, ttl).await {
            Ok(token) => {
                let mut response_headers = HeaderMap::new();
                if let Ok(cookie) = session_cookie(&token, Duration::ZERO) {
                    response_headers.insert(SET_COOKIE, cookie);
                }
                accounts_state.events().publish(AccountEvent::SignedIn {
                    username: user.username.clone(),
                });
                let redirect_to = destination_for(config.default_redirect(), &user.username);
                return (
                    StatusCode::CREATED,
                    response_headers,
                    Json(SignupResponse {
                        username: user.username,
                        redirect_to,
                    }),
                )
                    .into_response();
            }
            Err(err) => {
                // The account exists; a failed session is not a failed signup.
                error!("Failed to establish post-signup session: {err}");
            }
        }
    }

    let redirect_to = destination_for(SIGNUP_COMPLETE_TEMPLATE, &user.username);
    (
        StatusCode::CREATED,
        Json(SignupResponse {
            username: user.username,
            redirect_to,
        }),
    )
        .into_response()
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
    async fn signup_missing_payload() {
        let response = signup(Extension(lazy_pool()), Extension(accounts_state()), None)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signup_invalid_email() {
        let request = SignupRequest {
            username: Some("alice".to_string()),
            email: "not-an-email".to_string(),
            password: "hunter2!".to_string().into(),
        };
        let response = signup(
            Extension(lazy_pool()),
            Extension(accounts_state()),
            Some(Json(request)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signup_missing_username_when_required() {
        let request = SignupRequest {
            username: None,
            email: "alice@example.com".to_string(),
            password: "hunter2!".to_string().into(),
        };
        let response = signup(
            Extension(lazy_pool()),
            Extension(accounts_state()),
            Some(Json(request)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signup_rejects_bad_username() {
        let request = SignupRequest {
            username: Some("has spaces".to_string()),
            email: "alice@example.com".to_string(),
            password: "hunter2!".to_string().into(),
        };
        let response = signup(
            Extension(lazy_pool()),
            Extension(accounts_state()),
            Some(Json(request)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signup_empty_password() {
        let request = SignupRequest {
            username: Some("alice".to_string()),
            email: "alice@example.com".to_string(),
            password: String::new().into(),
        };
        let response = signup(
            Extension(lazy_pool()),
            Extension(accounts_state()),
            Some(Json(request)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
