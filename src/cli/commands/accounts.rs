//! Account-lifecycle flags: activation, remember-me windows, profile list,
//! and redirect destinations.

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command, value_parser};

pub const ARG_ACTIVATION_REQUIRED: &str = "activation-required";
pub const ARG_ACTIVATION_RETRY: &str = "activation-retry";
pub const ARG_ACTIVATION_WINDOW_SECONDS: &str = "activation-window-seconds";
pub const ARG_SIGNIN_AFTER_SIGNUP: &str = "signin-after-signup";
pub const ARG_WITHOUT_USERNAMES: &str = "without-usernames";
pub const ARG_REMEMBER_ME_DEFAULT_DAYS: &str = "remember-me-default-days";
pub const ARG_REMEMBER_ME_MAX_DAYS: &str = "remember-me-max-days";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_DISABLE_PROFILE_LIST: &str = "disable-profile-list";
pub const ARG_DEFAULT_REDIRECT: &str = "default-redirect";
pub const ARG_SIGNOUT_REDIRECT: &str = "signout-redirect";

#[derive(Debug)]
pub struct Options {
    pub activation_required: bool,
    pub activation_retry: bool,
    pub activation_window_seconds: i64,
    pub signin_after_signup: bool,
    pub without_usernames: bool,
    pub remember_me_default_days: i64,
    pub remember_me_max_days: i64,
    pub session_ttl_seconds: i64,
    pub disable_profile_list: bool,
    pub default_redirect: String,
    pub signout_redirect: String,
}

impl Options {
    /// Extract account options from parsed matches.
    ///
    /// # Errors
    /// Returns an error if a defaulted argument is somehow missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let flag = |name: &str| -> Result<bool> {
            matches
                .get_one::<bool>(name)
                .copied()
                .with_context(|| format!("missing argument: --{name}"))
        };
        let seconds = |name: &str| -> Result<i64> {
            matches
                .get_one::<i64>(name)
                .copied()
                .with_context(|| format!("missing argument: --{name}"))
        };

        Ok(Self {
            activation_required: flag(ARG_ACTIVATION_REQUIRED)?,
            activation_retry: flag(ARG_ACTIVATION_RETRY)?,
            activation_window_seconds: seconds(ARG_ACTIVATION_WINDOW_SECONDS)?,
            signin_after_signup: flag(ARG_SIGNIN_AFTER_SIGNUP)?,
            without_usernames: flag(ARG_WITHOUT_USERNAMES)?,
            remember_me_default_days: seconds(ARG_REMEMBER_ME_DEFAULT_DAYS)?,
            remember_me_max_days: seconds(ARG_REMEMBER_ME_MAX_DAYS)?,
            session_ttl_seconds: seconds(ARG_SESSION_TTL_SECONDS)?,
            disable_profile_list: flag(ARG_DISABLE_PROFILE_LIST)?,
            default_redirect: matches
                .get_one::<String>(ARG_DEFAULT_REDIRECT)
                .cloned()
                .context("missing argument: --default-redirect")?,
            signout_redirect: matches
                .get_one::<String>(ARG_SIGNOUT_REDIRECT)
                .cloned()
                .context("missing argument: --signout-redirect")?,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACTIVATION_REQUIRED)
                .long(ARG_ACTIVATION_REQUIRED)
                .help("Require email activation before an account can sign in")
                .env("VESTIBULE_ACTIVATION_REQUIRED")
                .num_args(1)
                .value_parser(value_parser!(bool))
                .default_value("true"),
        )
        .arg(
            Arg::new(ARG_ACTIVATION_RETRY)
                .long(ARG_ACTIVATION_RETRY)
                .help("Allow expired activation tokens to be reissued")
                .env("VESTIBULE_ACTIVATION_RETRY")
                .num_args(1)
                .value_parser(value_parser!(bool))
                .default_value("false"),
        )
        .arg(
            Arg::new(ARG_ACTIVATION_WINDOW_SECONDS)
                .long(ARG_ACTIVATION_WINDOW_SECONDS)
                .help("Seconds before an activation token is considered expired")
                .env("VESTIBULE_ACTIVATION_WINDOW_SECONDS")
                .value_parser(value_parser!(i64))
                .default_value("604800"),
        )
        .arg(
            Arg::new(ARG_SIGNIN_AFTER_SIGNUP)
                .long(ARG_SIGNIN_AFTER_SIGNUP)
                .help("Establish a session right after signup (only when activation is not required)")
                .env("VESTIBULE_SIGNIN_AFTER_SIGNUP")
                .num_args(1)
                .value_parser(value_parser!(bool))
                .default_value("false"),
        )
        .arg(
            Arg::new(ARG_WITHOUT_USERNAMES)
                .long(ARG_WITHOUT_USERNAMES)
                .help("Signup with email only; usernames are generated server-side")
                .env("VESTIBULE_WITHOUT_USERNAMES")
                .num_args(1)
                .value_parser(value_parser!(bool))
                .default_value("false"),
        )
        .arg(
            Arg::new(ARG_REMEMBER_ME_DEFAULT_DAYS)
                .long(ARG_REMEMBER_ME_DEFAULT_DAYS)
                .help("Default remember-me window in days")
                .env("VESTIBULE_REMEMBER_ME_DEFAULT_DAYS")
                .value_parser(value_parser!(i64))
                .default_value("14"),
        )
        .arg(
            Arg::new(ARG_REMEMBER_ME_MAX_DAYS)
                .long(ARG_REMEMBER_ME_MAX_DAYS)
                .help("Maximum remember-me window in days (used for remember-me sessions)")
                .env("VESTIBULE_REMEMBER_ME_MAX_DAYS")
                .value_parser(value_parser!(i64))
                .default_value("30"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Server-side TTL for browser-session sign-ins")
                .env("VESTIBULE_SESSION_TTL_SECONDS")
                .value_parser(value_parser!(i64))
                .default_value("43200"),
        )
        .arg(
            Arg::new(ARG_DISABLE_PROFILE_LIST)
                .long(ARG_DISABLE_PROFILE_LIST)
                .help("Hide the public profile list from non-staff viewers")
                .env("VESTIBULE_DISABLE_PROFILE_LIST")
                .num_args(1)
                .value_parser(value_parser!(bool))
                .default_value("false"),
        )
        .arg(
            Arg::new(ARG_DEFAULT_REDIRECT)
                .long(ARG_DEFAULT_REDIRECT)
                .help("Post-signin destination template; {username} is substituted")
                .env("VESTIBULE_DEFAULT_REDIRECT")
                .default_value("/profiles/{username}"),
        )
        .arg(
            Arg::new(ARG_SIGNOUT_REDIRECT)
                .long(ARG_SIGNOUT_REDIRECT)
                .help("Destination after sign-out")
                .env("VESTIBULE_SIGNOUT_REDIRECT")
                .default_value("/"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(argv: &[&str]) -> ArgMatches {
        let command = with_args(Command::new("vestibule"));
        command.get_matches_from(argv)
    }

    #[test]
    fn defaults() {
        let options = Options::parse(&matches(&["vestibule"])).unwrap();
        assert!(options.activation_required);
        assert!(!options.activation_retry);
        assert_eq!(options.activation_window_seconds, 604_800);
        assert!(!options.signin_after_signup);
        assert!(!options.without_usernames);
        assert_eq!(options.remember_me_default_days, 14);
        assert_eq!(options.remember_me_max_days, 30);
        assert_eq!(options.session_ttl_seconds, 43_200);
        assert!(!options.disable_profile_list);
        assert_eq!(options.default_redirect, "/profiles/{username}");
        assert_eq!(options.signout_redirect, "/");
    }

    #[test]
    fn overrides_from_flags() {
        let options = Options::parse(&matches(&[
            "vestibule",
            "--activation-required",
            "false",
            "--activation-retry",
            "true",
            "--activation-window-seconds",
            "3600",
            "--remember-me-max-days",
            "90",
        ]))
        .unwrap();
        assert!(!options.activation_required);
        assert!(options.activation_retry);
        assert_eq!(options.activation_window_seconds, 3600);
        assert_eq!(options.remember_me_max_days, 90);
    }

    #[test]
    fn overrides_from_env() {
        temp_env::with_vars(
            [
                ("VESTIBULE_ACTIVATION_RETRY", Some("true")),
                ("VESTIBULE_DEFAULT_REDIRECT", Some("/u/{username}")),
            ],
            || {
                let options = Options::parse(&matches(&["vestibule"])).unwrap();
                assert!(options.activation_retry);
                assert_eq!(options.default_redirect, "/u/{username}");
            },
        );
    }
}
