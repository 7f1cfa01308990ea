//! Profile endpoints: view, edit, and the public list.

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use utoipa::IntoParams;

use crate::api::events::AccountEvent;

use super::gate::{AccountOperation, allow};
use super::policy::destination_for;
use super::principal::{Principal, optional_auth, require_auth};
use super::state::AccountsState;
use super::storage::{ProfileRecord, fetch_profile, list_profiles, update_profile};
use super::types::{
    ProfileEditResponse, ProfileListResponse, ProfileResponse, ProfileUpdateRequest,
};

const PROFILES_PAGE_SIZE: i64 = 50;

fn profile_response(record: ProfileRecord) -> ProfileResponse {
    ProfileResponse {
        username: record.username,
        display_name: record.display_name,
        location: record.location,
        about: record.about,
        privacy: record.privacy,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

fn viewer_of(principal: Option<&Principal>) -> Option<(uuid::Uuid, bool)> {
    principal.map(|principal| (principal.user_id, principal.is_staff))
}

/// View a profile, subject to its visibility policy.
#[utoipa::path(
    get,
    path = "/v1/profiles/{username}",
    params(("username" = String, Path, description = "Profile owner")),
    responses(
        (status = 200, description = "Profile visible to the viewer", body = ProfileResponse),
        (status = 403, description = "Private profile", body = String),
        (status = 404, description = "Unknown account", body = String)
    ),
    tag = "profiles"
)]
pub async fn get_profile(
    Path(username): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> impl IntoResponse {
    let principal = match optional_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    match fetch_profile(&pool, &username).await {
        Ok(Some(record)) => {
            if !record.can_view(viewer_of(principal.as_ref())) {
                return (StatusCode::FORBIDDEN, "Access denied".to_string()).into_response();
            }
            (StatusCode::OK, Json(profile_response(record))).into_response()
        }
        Ok(None) => (StatusCode::NOT_FOUND, "Unknown account".to_string()).into_response(),
        Err(err) => {
            error!("Failed to fetch profile: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Edit a profile with allow-listed fields, gated on self-or-staff.
#[utoipa::path(
    put,
    path = "/v1/profiles/{username}",
    params(("username" = String, Path, description = "Profile owner")),
    request_body = ProfileUpdateRequest,
    responses(
        (status = 200, description = "Profile updated", body = ProfileEditResponse),
        (status = 400, description = "No updates or invalid privacy value", body = String),
        (status = 401, description = "Not signed in"),
        (status = 403, description = "Actor is neither the owner nor staff", body = String),
        (status = 404, description = "Unknown account", body = String)
    ),
    tag = "profiles"
)]
pub async fn edit_profile(
    Path(username): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    accounts_state: Extension<Arc<AccountsState>>,
    payload: Option<Json<ProfileUpdateRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    if !allow(&principal, AccountOperation::EditProfile, &username) {
        return (StatusCode::FORBIDDEN, "Access denied".to_string()).into_response();
    }

    let request: ProfileUpdateRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let display_name = normalize_optional(request.display_name);
    let location = normalize_optional(request.location);
    let about = normalize_optional(request.about);
    let privacy = normalize_optional(request.privacy);

    if display_name.is_none() && location.is_none() && about.is_none() && privacy.is_none() {
        return (StatusCode::BAD_REQUEST, "No updates provided".to_string()).into_response();
    }

    if let Some(privacy) = privacy.as_deref() {
        if privacy != "public" && privacy != "private" {
            return (StatusCode::BAD_REQUEST, "Invalid privacy value".to_string()).into_response();
        }
    }

    match update_profile(&pool, &username, display_name, location, about, privacy).await {
        Ok(Some(record)) => {
            // Fires on every successful edit, whether or not the caller
            // supplied a custom destination.
            accounts_state.events().publish(AccountEvent::ProfileChanged {
                username: record.username.clone(),
            });

            let config = accounts_state.config();
            let redirect_to = request
                .success_url
                .as_deref()
                .map(str::trim)
                .filter(|next| {
                    !next.is_empty() && accounts_state.next_url_guard().is_safe(next)
                })
                .map_or_else(
                    || destination_for(config.default_redirect(), &record.username),
                    str::to_string,
                );

            (
                StatusCode::OK,
                Json(ProfileEditResponse {
                    profile: profile_response(record),
                    redirect_to,
                }),
            )
                .into_response()
        }
        Ok(None) => (StatusCode::NOT_FOUND, "Unknown account".to_string()).into_response(),
        Err(err) => {
            error!("Failed to update profile: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Profile update failed".to_string(),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ProfileListQuery {
    /// 1-based page number.
    pub page: Option<u32>,
}

/// List profiles visible to the viewer, 50 per page.
///
/// When the deployment disables the public list, non-staff viewers get a
/// 404 rather than a 403, matching the view simply not existing for them.
#[utoipa::path(
    get,
    path = "/v1/profiles",
    params(ProfileListQuery),
    responses(
        (status = 200, description = "Visible profiles", body = ProfileListResponse),
        (status = 404, description = "Profile list disabled", body = String)
    ),
    tag = "profiles"
)]
pub async fn profile_list(
    Query(query): Query<ProfileListQuery>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    accounts_state: Extension<Arc<AccountsState>>,
) -> impl IntoResponse {
    let principal = match optional_auth(&headers, &pool).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    let is_staff = principal.as_ref().is_some_and(|p| p.is_staff);
    if accounts_state.config().disable_profile_list() && !is_staff {
        return (StatusCode::NOT_FOUND, "Not found".to_string()).into_response();
    }

    let page = query.page.unwrap_or(1).max(1);
    let offset = i64::from(page - 1) * PROFILES_PAGE_SIZE;

    match list_profiles(
        &pool,
        viewer_of(principal.as_ref()),
        PROFILES_PAGE_SIZE,
        offset,
    )
    .await
    {
        Ok(records) => {
            let profiles = records.into_iter().map(profile_response).collect();
            (StatusCode::OK, Json(ProfileListResponse { profiles, page })).into_response()
        }
        Err(err) => {
            error!("Failed to list profiles: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
