//! # Vestibule (Account Lifecycle Service)
//!
//! `vestibule` manages user accounts from signup through activation,
//! email-address change with confirmation, password change, and
//! sign-in/sign-out.
//!
//! ## Account States
//!
//! An account is `unverified`, `active`, or `disabled`. Signup creates an
//! unverified account together with a single-use activation token; the
//! activation link moves it to `active`. Disabled accounts keep their rows
//! but cannot sign in or be mutated through the public surface.
//!
//! ## Tokens
//!
//! Activation and email-confirmation tokens are 40-character lowercase hex
//! strings (160 bits of entropy). Raw tokens only travel out-of-band (the
//! mailer listens on the event bus); the database stores a SHA-256 hash,
//! which is also the lookup key. Expiry is computed from the issue
//! timestamp and the configured window at check time, so a consumed token
//! and a token that never existed are indistinguishable by design.
//!
//! ## Authorization
//!
//! Mutating operations on an account (email change, password change,
//! profile edit) are allowed to the account owner and to staff actors.
//! Profile *visibility* is a separate read-path policy on the profile row.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
