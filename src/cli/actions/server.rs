use crate::{api, cli::commands::accounts};
use anyhow::Result;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub accounts: accounts::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database pool cannot be created or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let config = api::handlers::accounts::AccountsConfig::new()
        .with_activation_required(args.accounts.activation_required)
        .with_activation_retry(args.accounts.activation_retry)
        .with_activation_window_seconds(args.accounts.activation_window_seconds)
        .with_signin_after_signup(args.accounts.signin_after_signup)
        .with_without_usernames(args.accounts.without_usernames)
        .with_remember_me_days(
            args.accounts.remember_me_default_days,
            args.accounts.remember_me_max_days,
        )
        .with_session_ttl_seconds(args.accounts.session_ttl_seconds)
        .with_disable_profile_list(args.accounts.disable_profile_list)
        .with_default_redirect(args.accounts.default_redirect)
        .with_signout_redirect(args.accounts.signout_redirect);

    api::new(args.port, args.dsn, config).await
}
