//! Database helpers for the account lifecycle.
//!
//! Domain decisions are returned as outcome enums; only infrastructure
//! failures (connectivity, unexpected SQL errors) surface as `Err`, which
//! handlers log and map to 500. Read-check-write sequences (activation,
//! email confirmation, reissue) run in a single transaction with a row
//! lock on the token row, so a concurrent duplicate request observes
//! "already consumed" instead of double-applying.

use anyhow::{Context, Result, anyhow};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::utils::{
    generate_account_token, generate_session_token, hash_account_token, hash_session_token,
    is_token_expired, is_unique_violation,
};

/// Identity fields carried through lifecycle operations and events.
#[derive(Clone, Debug)]
pub(super) struct UserRecord {
    pub(super) user_id: Uuid,
    pub(super) username: String,
    pub(super) email: String,
}

/// Outcome when attempting to create a new account.
#[derive(Debug)]
pub(super) enum SignupOutcome {
    Created {
        user: UserRecord,
        /// Raw activation token for out-of-band delivery; `None` when
        /// activation was skipped by configuration.
        activation_token: Option<String>,
    },
    /// Username or email already taken (case-insensitively).
    Conflict,
}

/// Outcome of consuming an activation token.
///
/// `NotFound` covers "never existed" and "already consumed" alike: a
/// consumed token row is deleted, so the two cases are the same absent row.
#[derive(Debug)]
pub(super) enum ActivationOutcome {
    Activated(UserRecord),
    /// Token exists but is older than the window; the row is left
    /// untouched so a reissue can act on it. Only reported when retry is
    /// enabled — with retry disabled the token is honored regardless of age.
    Expired,
    NotFound,
}

/// Outcome of reissuing an expired activation token.
#[derive(Debug)]
pub(super) enum ReissueOutcome {
    Reissued {
        user: UserRecord,
        /// Fresh raw token for out-of-band delivery.
        token: String,
    },
    /// The token has not expired yet; the caller falls back to Activate.
    NotExpired,
    NotFound,
}

/// Outcome of consuming an email-confirmation token. Superseded and
/// consumed tokens are absent rows, hence `NotFound` for both.
#[derive(Debug)]
pub(super) enum EmailChangeOutcome {
    Confirmed {
        user: UserRecord,
        prev_email: String,
    },
    /// The proposed address was taken by another account after the
    /// change was requested.
    EmailInUse,
    NotFound,
}

/// Minimal fields needed to verify a sign-in.
pub(super) struct LoginRecord {
    pub(super) user_id: Uuid,
    pub(super) username: String,
    pub(super) password_hash: String,
    pub(super) active: bool,
}

/// Minimal data returned for a valid session token.
pub(crate) struct SessionRecord {
    pub(crate) user_id: Uuid,
    pub(crate) username: String,
    pub(crate) email: String,
    pub(crate) is_staff: bool,
}

/// Profile row joined with its owner, as served to viewers and editors.
#[derive(Debug)]
pub(super) struct ProfileRecord {
    pub(super) user_id: Uuid,
    pub(super) username: String,
    /// Internal only: responses never include the email address.
    pub(super) email: String,
    pub(super) display_name: Option<String>,
    pub(super) location: Option<String>,
    pub(super) about: Option<String>,
    pub(super) privacy: String,
    pub(super) created_at: String,
    pub(super) updated_at: String,
}

impl ProfileRecord {
    /// Read-path visibility: the owner and staff always see the profile,
    /// everyone else only when it is public.
    pub(super) fn can_view(&self, viewer: Option<(Uuid, bool)>) -> bool {
        if self.privacy == "public" {
            return true;
        }
        match viewer {
            Some((viewer_id, is_staff)) => is_staff || viewer_id == self.user_id,
            None => false,
        }
    }
}

const PROFILE_COLUMNS: &str = r#"
    users.id AS user_id,
    users.username,
    users.email,
    profiles.display_name,
    profiles.location,
    profiles.about,
    profiles.privacy::text AS privacy,
    to_char(profiles.created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
    to_char(profiles.updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at
"#;

fn profile_from_row(row: &sqlx::postgres::PgRow) -> ProfileRecord {
    ProfileRecord {
        user_id: row.get("user_id"),
        username: row.get("username"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        location: row.get("location"),
        about: row.get("about"),
        privacy: row.get("privacy"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Create the user, its profile, and (unless skipped) the activation
/// token in one transaction, so a conflict leaves nothing behind.
pub(super) async fn insert_account(
    pool: &PgPool,
    username: &str,
    email: &str,
    password_hash: &str,
    activation_required: bool,
) -> Result<SignupOutcome> {
    let mut tx = pool.begin().await.context("begin signup transaction")?;

    let status = if activation_required {
        "unverified"
    } else {
        "active"
    };
    let query = r"
        INSERT INTO users (username, email, password_hash, status)
        VALUES ($1, $2, $3, $4::account_status)
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(status)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let user_id: Uuid = match row {
        Ok(row) => row.get("id"),
        Err(err) => {
            if is_unique_violation(&err) {
                let _ = tx.rollback().await;
                return Ok(SignupOutcome::Conflict);
            }
            return Err(err).context("failed to insert user");
        }
    };

    let query = "INSERT INTO profiles (user_id) VALUES ($1)";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert profile")?;

    let activation_token = if activation_required {
        Some(insert_activation_token(&mut tx, user_id).await?)
    } else {
        None
    };

    tx.commit().await.context("commit signup transaction")?;

    Ok(SignupOutcome::Created {
        user: UserRecord {
            user_id,
            username: username.to_string(),
            email: email.to_string(),
        },
        activation_token,
    })
}

async fn insert_activation_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
) -> Result<String> {
    // Generate a raw token for the activation link and store only its hash.
    let token = generate_account_token()?;
    let token_hash = hash_account_token(&token);

    let query = r"
        INSERT INTO activation_tokens (user_id, token_hash, issued_at)
        VALUES ($1, $2, NOW())
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert activation token")?;

    Ok(token)
}

/// Lock the activation row for a token hash, returning the owning user and
/// the database-clock timestamps used for the expiry decision.
async fn lock_activation_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    token_hash: &[u8],
) -> Result<Option<(UserRecord, i64, i64)>> {
    let query = r"
        SELECT
            activation_tokens.user_id,
            users.username,
            users.email,
            EXTRACT(EPOCH FROM activation_tokens.issued_at)::bigint AS issued_at_unix,
            EXTRACT(EPOCH FROM NOW())::bigint AS now_unix
        FROM activation_tokens
        JOIN users ON users.id = activation_tokens.user_id
        WHERE activation_tokens.token_hash = $1
        FOR UPDATE OF activation_tokens
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to lock activation token")?;

    Ok(row.map(|row| {
        (
            UserRecord {
                user_id: row.get("user_id"),
                username: row.get("username"),
                email: row.get("email"),
            },
            row.get("issued_at_unix"),
            row.get("now_unix"),
        )
    }))
}

/// Consume an activation token: activate the user and delete the token
/// row in one transaction. Expiry is only enforced when retry is enabled;
/// an expired row is left untouched so the reissue path can act on it.
pub(super) async fn consume_activation_token(
    pool: &PgPool,
    token_hash: &[u8],
    window_seconds: i64,
    retry_enabled: bool,
) -> Result<ActivationOutcome> {
    let mut tx = pool.begin().await.context("begin activation transaction")?;

    let Some((user, issued_at_unix, now_unix)) = lock_activation_row(&mut tx, token_hash).await?
    else {
        let _ = tx.rollback().await;
        return Ok(ActivationOutcome::NotFound);
    };

    if retry_enabled && is_token_expired(issued_at_unix, window_seconds, now_unix) {
        let _ = tx.rollback().await;
        return Ok(ActivationOutcome::Expired);
    }

    let query = r"
        UPDATE users
        SET status = 'active',
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user.user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to activate user")?;

    let query = "DELETE FROM activation_tokens WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user.user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to clear activation token")?;

    tx.commit().await.context("commit activation transaction")?;

    Ok(ActivationOutcome::Activated(user))
}

/// Replace an expired activation token in place (same row identity, same
/// user), returning the fresh raw token for out-of-band delivery.
pub(super) async fn reissue_activation_token(
    pool: &PgPool,
    old_token_hash: &[u8],
    window_seconds: i64,
) -> Result<ReissueOutcome> {
    let mut tx = pool.begin().await.context("begin reissue transaction")?;

    let Some((user, issued_at_unix, now_unix)) =
        lock_activation_row(&mut tx, old_token_hash).await?
    else {
        let _ = tx.rollback().await;
        return Ok(ReissueOutcome::NotFound);
    };

    if !is_token_expired(issued_at_unix, window_seconds, now_unix) {
        let _ = tx.rollback().await;
        return Ok(ReissueOutcome::NotExpired);
    }

    let token = generate_account_token()?;
    let token_hash = hash_account_token(&token);

    let query = r"
        UPDATE activation_tokens
        SET token_hash = $2,
            issued_at = NOW()
        WHERE user_id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user.user_id)
        .bind(token_hash)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to replace activation token")?;

    tx.commit().await.context("commit reissue transaction")?;

    Ok(ReissueOutcome::Reissued { user, token })
}

/// Record a pending email change, superseding any prior request for the
/// same user: the previous token's row is overwritten, which permanently
/// invalidates it.
pub(super) async fn upsert_email_change(
    pool: &PgPool,
    user_id: Uuid,
    new_email: &str,
) -> Result<String> {
    let token = generate_account_token()?;
    let token_hash = hash_account_token(&token);

    let query = r"
        INSERT INTO email_change_tokens (user_id, token_hash, new_email, issued_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (user_id) DO UPDATE
        SET token_hash = EXCLUDED.token_hash,
            new_email = EXCLUDED.new_email,
            issued_at = EXCLUDED.issued_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .bind(new_email)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to upsert email change token")?;

    Ok(token)
}

/// Consume an email-confirmation token: apply the new address and delete
/// the pending row in one transaction.
pub(super) async fn consume_email_change_token(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<EmailChangeOutcome> {
    let mut tx = pool
        .begin()
        .await
        .context("begin email confirmation transaction")?;

    let query = r"
        SELECT
            email_change_tokens.user_id,
            email_change_tokens.new_email,
            users.username,
            users.email AS prev_email
        FROM email_change_tokens
        JOIN users ON users.id = email_change_tokens.user_id
        WHERE email_change_tokens.token_hash = $1
        FOR UPDATE OF email_change_tokens
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lock email change token")?;

    let Some(row) = row else {
        let _ = tx.rollback().await;
        return Ok(EmailChangeOutcome::NotFound);
    };

    let user_id: Uuid = row.get("user_id");
    let new_email: String = row.get("new_email");
    let username: String = row.get("username");
    let prev_email: String = row.get("prev_email");

    let query = r"
        UPDATE users
        SET email = $2,
            updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    if let Err(err) = sqlx::query(query)
        .bind(user_id)
        .bind(&new_email)
        .execute(&mut *tx)
        .instrument(span)
        .await
    {
        let _ = tx.rollback().await;
        if is_unique_violation(&err) {
            return Ok(EmailChangeOutcome::EmailInUse);
        }
        return Err(err).context("failed to apply email change");
    }

    let query = "DELETE FROM email_change_tokens WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to clear email change token")?;

    tx.commit()
        .await
        .context("commit email confirmation transaction")?;

    Ok(EmailChangeOutcome::Confirmed {
        user: UserRecord {
            user_id,
            username,
            email: new_email,
        },
        prev_email,
    })
}

/// Look up sign-in data by username or email (both case-insensitive).
pub(super) async fn lookup_login(
    pool: &PgPool,
    identification: &str,
) -> Result<Option<LoginRecord>> {
    let query = r"
        SELECT id, username, password_hash, (status = 'active') AS active
        FROM users
        WHERE LOWER(username) = LOWER($1)
           OR LOWER(email) = LOWER($1)
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(identification)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup login record")?;

    Ok(row.map(|row| LoginRecord {
        user_id: row.get("id"),
        username: row.get("username"),
        password_hash: row.get("password_hash"),
        active: row.get("active"),
    }))
}

/// Replace a user's credential hash. Returns the user when the username
/// resolved, `None` otherwise.
pub(super) async fn update_password(
    pool: &PgPool,
    username: &str,
    password_hash: &str,
) -> Result<Option<UserRecord>> {
    let query = r"
        UPDATE users
        SET password_hash = $2,
            updated_at = NOW()
        WHERE LOWER(username) = LOWER($1)
        RETURNING id, username, email
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .bind(password_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to update password")?;

    Ok(row.map(|row| UserRecord {
        user_id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
    }))
}

pub(super) async fn fetch_profile(
    pool: &PgPool,
    username: &str,
) -> Result<Option<ProfileRecord>> {
    let query = format!(
        r"
        SELECT {PROFILE_COLUMNS}
        FROM profiles
        JOIN users ON users.id = profiles.user_id
        WHERE LOWER(users.username) = LOWER($1)
        LIMIT 1
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(username)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch profile")?;
    Ok(row.as_ref().map(profile_from_row))
}

/// Apply allow-listed profile updates; absent fields keep their values.
pub(super) async fn update_profile(
    pool: &PgPool,
    username: &str,
    display_name: Option<String>,
    location: Option<String>,
    about: Option<String>,
    privacy: Option<String>,
) -> Result<Option<ProfileRecord>> {
    let query = format!(
        r"
        UPDATE profiles
        SET display_name = COALESCE($2, profiles.display_name),
            location = COALESCE($3, profiles.location),
            about = COALESCE($4, profiles.about),
            privacy = COALESCE($5::profile_privacy, profiles.privacy),
            updated_at = NOW()
        FROM users
        WHERE users.id = profiles.user_id
          AND LOWER(users.username) = LOWER($1)
        RETURNING {PROFILE_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = %query
    );
    let row = sqlx::query(&query)
        .bind(username)
        .bind(display_name)
        .bind(location)
        .bind(about)
        .bind(privacy)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to update profile")?;
    Ok(row.as_ref().map(profile_from_row))
}

/// List profiles visible to the viewer: public ones, plus the viewer's
/// own, plus everything for staff.
pub(super) async fn list_profiles(
    pool: &PgPool,
    viewer: Option<(Uuid, bool)>,
    limit: i64,
    offset: i64,
) -> Result<Vec<ProfileRecord>> {
    let (viewer_id, is_staff) = match viewer {
        Some((id, staff)) => (Some(id), staff),
        None => (None, false),
    };
    let query = format!(
        r"
        SELECT {PROFILE_COLUMNS}
        FROM profiles
        JOIN users ON users.id = profiles.user_id
        WHERE $1
           OR profiles.privacy = 'public'
           OR profiles.user_id = $2
        ORDER BY LOWER(users.username) ASC
        LIMIT $3 OFFSET $4
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = %query
    );
    let rows = sqlx::query(&query)
        .bind(is_staff)
        .bind(viewer_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list profiles")?;
    Ok(rows.iter().map(profile_from_row).collect())
}

/// Create a session row and return the raw token for the cookie.
pub(super) async fn insert_session(
    pool: &PgPool,
    user_id: Uuid,
    ttl_seconds: i64,
) -> Result<String> {
    // Generate a random token, store only its hash, and return the raw
    // value so the caller can set the session cookie.
    let query = r"
        INSERT INTO user_sessions (user_id, session_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_session_token()?;
        let token_hash = hash_session_token(&token);
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(token_hash)
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

/// Resolve a session hash to its user. Only active users and unexpired
/// sessions resolve.
pub(crate) async fn lookup_session(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    let query = r"
        SELECT users.id, users.username, users.email, users.is_staff
        FROM user_sessions
        JOIN users ON users.id = user_sessions.user_id
        WHERE user_sessions.session_hash = $1
          AND user_sessions.expires_at > NOW()
          AND users.status = 'active'
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    if row.is_none() {
        return Ok(None);
    }

    // Record activity for audit/visibility without extending the session TTL.
    let query = r"
        UPDATE user_sessions
        SET last_seen_at = NOW()
        WHERE session_hash = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update session last_seen_at")?;

    Ok(row.map(|row| SessionRecord {
        user_id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        is_staff: row.get("is_staff"),
    }))
}

pub(super) async fn delete_session(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    // Sign-out is idempotent; it's fine if no rows are deleted.
    let query = "DELETE FROM user_sessions WHERE session_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}
