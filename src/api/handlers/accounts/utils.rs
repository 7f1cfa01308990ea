//! Token issuing and small validation helpers for the account handlers.

use anyhow::{Context, Result};
use rand::{RngCore, rngs::OsRng};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Canonical length of activation and confirmation tokens: 40 lowercase hex
/// characters, 160 bits of entropy.
pub(crate) const ACCOUNT_TOKEN_LEN: usize = 40;

/// Normalize an email for lookup/uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Usernames: letters, digits, and `.@+-_`, at most 30 characters.
pub(super) fn valid_username(username: &str) -> bool {
    Regex::new(r"^[\w.@+-]{1,30}$").is_ok_and(|regex| regex.is_match(username))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().fold(
        String::with_capacity(bytes.len() * 2),
        |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        },
    )
}

/// Issue a fresh activation/confirmation token.
///
/// The raw token only travels out-of-band to the user; the database stores
/// its hash. Collisions are left to the 160 bits of entropy, there is no
/// uniqueness scan.
pub(super) fn generate_account_token() -> Result<String> {
    let mut bytes = [0u8; ACCOUNT_TOKEN_LEN / 2];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate account token")?;
    Ok(hex_encode(&bytes))
}

/// Token format check before any lookup: 40 lowercase hex characters.
pub(super) fn valid_token(token: &str) -> bool {
    token.len() == ACCOUNT_TOKEN_LEN
        && token
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

/// Hash an activation/confirmation token; the hash is the lookup key.
pub(super) fn hash_account_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Create a new session token for the auth cookie.
/// The raw value is only returned to set the cookie; the database stores a hash.
pub(crate) fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(hex_encode(&bytes))
}

/// Hash a session token so raw values never touch the database.
pub(crate) fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Placeholder username for email-only signups.
pub(super) fn generated_username() -> Result<String> {
    let mut bytes = [0u8; 5];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate username")?;
    Ok(format!("user_{}", hex_encode(&bytes)))
}

/// Pure expiry check: a token is expired once its age exceeds the window.
/// Both the clock and the window are inputs; there is no stored deadline.
pub(super) const fn is_token_expired(
    issued_at_unix: i64,
    window_seconds: i64,
    now_unix: i64,
) -> bool {
    now_unix - issued_at_unix > window_seconds
}

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn valid_username_accepts_word_chars() {
        assert!(valid_username("alice"));
        assert!(valid_username("alice.smith"));
        assert!(valid_username("alice+test@web"));
        assert!(valid_username("a"));
    }

    #[test]
    fn valid_username_rejects_spaces_and_overlong() {
        assert!(!valid_username(""));
        assert!(!valid_username("alice smith"));
        assert!(!valid_username("a".repeat(31).as_str()));
        assert!(!valid_username("alice/../admin"));
    }

    #[test]
    fn generate_account_token_is_40_lowercase_hex() {
        let token = generate_account_token().expect("token generation");
        assert_eq!(token.len(), ACCOUNT_TOKEN_LEN);
        assert!(valid_token(&token));
    }

    #[test]
    fn valid_token_rejects_wrong_shape() {
        assert!(!valid_token(""));
        assert!(!valid_token("abc"));
        assert!(!valid_token(&"g".repeat(40)));
        assert!(!valid_token(&"A".repeat(40)));
        assert!(valid_token("0123456789abcdef0123456789abcdef01234567"));
    }

    #[test]
    fn hash_account_token_stable() {
        let first = hash_account_token("token");
        let second = hash_account_token("token");
        let different = hash_account_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn generate_session_token_is_hex() {
        let token = generate_session_token().expect("session token generation");
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generated_username_has_prefix_and_entropy() {
        let first = generated_username().expect("username generation");
        let second = generated_username().expect("username generation");
        assert!(first.starts_with("user_"));
        assert_eq!(first.len(), 15);
        assert!(valid_username(&first));
        assert_ne!(first, second);
    }

    #[test]
    fn token_expiry_is_strict_age_check() {
        // Exactly at the window boundary the token is still honored.
        assert!(!is_token_expired(0, 3600, 3600));
        assert!(is_token_expired(0, 3600, 3601));
        assert!(!is_token_expired(100, 3600, 50));
    }

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn is_unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("99999"),
        }));
        assert!(!is_unique_violation(&err));

        let err = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&err));
    }
}
