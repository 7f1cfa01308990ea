//! Request/response types for account endpoints.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize, Debug)]
pub struct SignupRequest {
    /// Required unless the service runs with `--without-usernames true`.
    pub username: Option<String>,
    pub email: String,
    #[schema(value_type = String)]
    pub password: SecretString,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupResponse {
    pub username: String,
    pub redirect_to: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ActivateRequest {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ActivateResponse {
    pub username: String,
    pub redirect_to: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ActivationExpiredResponse {
    pub error: String,
    /// Whether `POST /v1/accounts/activate/retry` can reissue this token.
    pub retry_allowed: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct EmailChangeRequest {
    pub new_email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ConfirmEmailRequest {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ConfirmEmailResponse {
    pub username: String,
    pub email: String,
    pub redirect_to: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct PasswordChangeRequest {
    #[schema(value_type = String)]
    pub new_password: SecretString,
}

#[derive(ToSchema, Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdateRequest {
    pub display_name: Option<String>,
    pub location: Option<String>,
    pub about: Option<String>,
    /// `public` or `private`.
    pub privacy: Option<String>,
    /// Optional destination for the caller after a successful edit; must
    /// pass the next-URL guard or the default destination is used.
    pub success_url: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ProfileResponse {
    pub username: String,
    pub display_name: Option<String>,
    pub location: Option<String>,
    pub about: Option<String>,
    pub privacy: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ProfileEditResponse {
    pub profile: ProfileResponse,
    pub redirect_to: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ProfileListResponse {
    pub profiles: Vec<ProfileResponse>,
    pub page: u32,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct SigninRequest {
    /// Username or email address.
    pub identification: String,
    #[schema(value_type = String)]
    pub password: SecretString,
    #[serde(default)]
    pub remember_me: bool,
    /// Requested post-signin destination; subject to the next-URL guard.
    pub next: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SigninResponse {
    pub username: String,
    pub redirect_to: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DisabledAccountResponse {
    pub error: String,
    /// Where the caller should send the user instead of a session.
    pub redirect_to: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignoutResponse {
    pub redirect_to: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub is_staff: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use secrecy::ExposeSecret;

    #[test]
    fn signup_request_deserializes_secret_password() -> Result<()> {
        let request: SignupRequest = serde_json::from_value(serde_json::json!({
            "username": "alice",
            "email": "alice@example.com",
            "password": "hunter2!",
        }))?;
        assert_eq!(request.username.as_deref(), Some("alice"));
        assert_eq!(request.password.expose_secret(), "hunter2!");
        // Debug output must not leak the password.
        assert!(!format!("{request:?}").contains("hunter2!"));
        Ok(())
    }

    #[test]
    fn signin_request_defaults_remember_me() -> Result<()> {
        let request: SigninRequest = serde_json::from_value(serde_json::json!({
            "identification": "alice",
            "password": "hunter2!",
        }))?;
        assert!(!request.remember_me);
        assert_eq!(request.next, None);
        Ok(())
    }

    #[test]
    fn profile_update_rejects_unknown_fields() {
        let result: Result<ProfileUpdateRequest, _> = serde_json::from_value(serde_json::json!({
            "display_name": "Alice",
            "email": "smuggled@example.com",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn activate_response_round_trips() -> Result<()> {
        let response = ActivateResponse {
            username: "alice".to_string(),
            redirect_to: "/profiles/alice".to_string(),
        };
        let value = serde_json::to_value(&response)?;
        let decoded: ActivateResponse = serde_json::from_value(value)?;
        assert_eq!(decoded.username, "alice");
        assert_eq!(decoded.redirect_to, "/profiles/alice");
        Ok(())
    }
}
