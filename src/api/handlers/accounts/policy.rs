//! Session expiry and post-signin redirect policy.

use std::time::Duration;

use super::state::AccountsConfig;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Decides whether a caller-supplied `next` destination may be redirected
/// to. Deployments that allow additional hosts plug in their own guard at
/// construction time.
pub trait NextUrlGuard: Send + Sync {
    fn is_safe(&self, next: &str) -> bool;
}

/// Default guard: same-origin relative paths only.
#[derive(Clone, Debug)]
pub struct SameOriginGuard;

impl NextUrlGuard for SameOriginGuard {
    fn is_safe(&self, next: &str) -> bool {
        // Anything that parses as an absolute URL points off-origin.
        if url::Url::parse(next).is_ok() {
            return false;
        }
        // "//host" and "/\host" are treated as scheme-relative by browsers.
        next.starts_with('/') && !next.starts_with("//") && !next.starts_with("/\\")
    }
}

/// Session lifetime for a sign-in. Zero means browser-session lifetime:
/// the cookie carries no `Max-Age` and the store applies its fallback TTL.
pub(super) fn session_expiry(remember_me: bool, config: &AccountsConfig) -> Duration {
    if remember_me {
        let days = u64::try_from(config.remember_me_max_days()).unwrap_or(0);
        Duration::from_secs(days * SECONDS_PER_DAY)
    } else {
        Duration::ZERO
    }
}

/// Post-signin destination: the requested `next` when the guard approves
/// it, otherwise the configured default with `{username}` substituted.
pub(super) fn redirect_after_signin(
    guard: &dyn NextUrlGuard,
    requested_next: Option<&str>,
    username: &str,
    config: &AccountsConfig,
) -> String {
    if let Some(next) = requested_next {
        let next = next.trim();
        if !next.is_empty() && guard.is_safe(next) {
            return next.to_string();
        }
    }
    destination_for(config.default_redirect(), username)
}

/// Substitute the username into a destination template.
pub(super) fn destination_for(template: &str, username: &str) -> String {
    template.replace("{username}", username)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_origin_guard_accepts_relative_paths() {
        let guard = SameOriginGuard;
        assert!(guard.is_safe("/profiles/alice"));
        assert!(guard.is_safe("/settings?tab=email"));
    }

    #[test]
    fn same_origin_guard_rejects_external_destinations() {
        let guard = SameOriginGuard;
        assert!(!guard.is_safe("https://evil.example/phish"));
        assert!(!guard.is_safe("//evil.example/phish"));
        assert!(!guard.is_safe("/\\evil.example"));
        assert!(!guard.is_safe("profiles/alice"));
        assert!(!guard.is_safe(""));
    }

    #[test]
    fn remember_me_uses_configured_maximum() {
        let config = AccountsConfig::new().with_remember_me_days(14, 30);
        assert_eq!(
            session_expiry(true, &config),
            Duration::from_secs(30 * SECONDS_PER_DAY)
        );
    }

    #[test]
    fn browser_session_expiry_is_zero() {
        let config = AccountsConfig::new();
        assert_eq!(session_expiry(false, &config), Duration::ZERO);
    }

    #[test]
    fn redirect_prefers_safe_next() {
        let config = AccountsConfig::new();
        let destination =
            redirect_after_signin(&SameOriginGuard, Some("/dashboard"), "alice", &config);
        assert_eq!(destination, "/dashboard");
    }

    #[test]
    fn redirect_falls_back_on_unsafe_next() {
        let config = AccountsConfig::new();
        let destination = redirect_after_signin(
            &SameOriginGuard,
            Some("https://evil.example"),
            "alice",
            &config,
        );
        assert_eq!(destination, "/profiles/alice");
    }

    #[test]
    fn redirect_falls_back_on_missing_next() {
        let config = AccountsConfig::new().with_default_redirect("/u/{username}".to_string());
        let destination = redirect_after_signin(&SameOriginGuard, None, "bob", &config);
        assert_eq!(destination, "/u/bob");
    }
}
