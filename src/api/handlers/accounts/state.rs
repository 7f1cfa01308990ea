//! Account configuration and shared handler state.

use std::sync::Arc;

use crate::api::events::EventBus;

use super::policy::NextUrlGuard;

const DEFAULT_ACTIVATION_WINDOW_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_REMEMBER_ME_DEFAULT_DAYS: i64 = 14;
const DEFAULT_REMEMBER_ME_MAX_DAYS: i64 = 30;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;
const DEFAULT_REDIRECT_TEMPLATE: &str = "/profiles/{username}";
const DEFAULT_SIGNOUT_REDIRECT: &str = "/";

#[derive(Clone, Debug)]
pub struct AccountsConfig {
    activation_required: bool,
    activation_retry: bool,
    activation_window_seconds: i64,
    signin_after_signup: bool,
    without_usernames: bool,
    remember_me_default_days: i64,
    remember_me_max_days: i64,
    session_ttl_seconds: i64,
    disable_profile_list: bool,
    default_redirect: String,
    signout_redirect: String,
}

impl AccountsConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            activation_required: true,
            activation_retry: false,
            activation_window_seconds: DEFAULT_ACTIVATION_WINDOW_SECONDS,
            signin_after_signup: false,
            without_usernames: false,
            remember_me_default_days: DEFAULT_REMEMBER_ME_DEFAULT_DAYS,
            remember_me_max_days: DEFAULT_REMEMBER_ME_MAX_DAYS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            disable_profile_list: false,
            default_redirect: DEFAULT_REDIRECT_TEMPLATE.to_string(),
            signout_redirect: DEFAULT_SIGNOUT_REDIRECT.to_string(),
        }
    }

    #[must_use]
    pub fn with_activation_required(mut self, required: bool) -> Self {
        self.activation_required = required;
        self
    }

    #[must_use]
    pub fn with_activation_retry(mut self, retry: bool) -> Self {
        self.activation_retry = retry;
        self
    }

    #[must_use]
    pub fn with_activation_window_seconds(mut self, seconds: i64) -> Self {
        self.activation_window_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_signin_after_signup(mut self, signin: bool) -> Self {
        self.signin_after_signup = signin;
        self
    }

    #[must_use]
    pub fn with_without_usernames(mut self, without: bool) -> Self {
        self.without_usernames = without;
        self
    }

    #[must_use]
    pub fn with_remember_me_days(mut self, default_days: i64, max_days: i64) -> Self {
        self.remember_me_default_days = default_days;
        self.remember_me_max_days = max_days.max(default_days);
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_disable_profile_list(mut self, disable: bool) -> Self {
        self.disable_profile_list = disable;
        self
    }

    #[must_use]
    pub fn with_default_redirect(mut self, template: String) -> Self {
        self.default_redirect = template;
        self
    }

    #[must_use]
    pub fn with_signout_redirect(mut self, destination: String) -> Self {
        self.signout_redirect = destination;
        self
    }

    #[must_use]
    pub fn activation_required(&self) -> bool {
        self.activation_required
    }

    #[must_use]
    pub fn activation_retry(&self) -> bool {
        self.activation_retry
    }

    #[must_use]
    pub fn activation_window_seconds(&self) -> i64 {
        self.activation_window_seconds
    }

    #[must_use]
    pub fn signin_after_signup(&self) -> bool {
        self.signin_after_signup
    }

    #[must_use]
    pub fn without_usernames(&self) -> bool {
        self.without_usernames
    }

    #[must_use]
    pub fn remember_me_default_days(&self) -> i64 {
        self.remember_me_default_days
    }

    #[must_use]
    pub fn remember_me_max_days(&self) -> i64 {
        self.remember_me_max_days
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn disable_profile_list(&self) -> bool {
        self.disable_profile_list
    }

    #[must_use]
    pub fn default_redirect(&self) -> &str {
        &self.default_redirect
    }

    #[must_use]
    pub fn signout_redirect(&self) -> &str {
        &self.signout_redirect
    }
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AccountsState {
    config: AccountsConfig,
    next_url_guard: Arc<dyn NextUrlGuard>,
    events: EventBus,
}

impl AccountsState {
    #[must_use]
    pub fn new(
        config: AccountsConfig,
        next_url_guard: Arc<dyn NextUrlGuard>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            next_url_guard,
            events,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AccountsConfig {
        &self.config
    }

    pub(crate) fn next_url_guard(&self) -> &dyn NextUrlGuard {
        self.next_url_guard.as_ref()
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::super::policy::SameOriginGuard;
    use super::{AccountsConfig, AccountsState};
    use crate::api::events::EventBus;
    use std::sync::Arc;

    #[test]
    fn config_defaults_and_overrides() {
        let config = AccountsConfig::new();

        assert!(config.activation_required());
        assert!(!config.activation_retry());
        assert_eq!(
            config.activation_window_seconds(),
            super::DEFAULT_ACTIVATION_WINDOW_SECONDS
        );
        assert!(!config.signin_after_signup());
        assert!(!config.without_usernames());
        assert_eq!(
            config.remember_me_max_days(),
            super::DEFAULT_REMEMBER_ME_MAX_DAYS
        );
        assert_eq!(config.default_redirect(), "/profiles/{username}");

        let config = config
            .with_activation_required(false)
            .with_activation_retry(true)
            .with_activation_window_seconds(3600)
            .with_signin_after_signup(true)
            .with_remember_me_days(7, 21)
            .with_session_ttl_seconds(600)
            .with_default_redirect("/u/{username}".to_string());

        assert!(!config.activation_required());
        assert!(config.activation_retry());
        assert_eq!(config.activation_window_seconds(), 3600);
        assert!(config.signin_after_signup());
        assert_eq!(config.remember_me_default_days(), 7);
        assert_eq!(config.remember_me_max_days(), 21);
        assert_eq!(config.session_ttl_seconds(), 600);
        assert_eq!(config.default_redirect(), "/u/{username}");
    }

    #[test]
    fn remember_me_max_never_below_default() {
        let config = AccountsConfig::new().with_remember_me_days(30, 7);
        assert_eq!(config.remember_me_default_days(), 30);
        assert_eq!(config.remember_me_max_days(), 30);
    }

    #[test]
    fn state_exposes_config() {
        let (bus, _rx) = EventBus::new();
        let state = AccountsState::new(AccountsConfig::new(), Arc::new(SameOriginGuard), bus);
        assert!(state.config().activation_required());
    }
}
