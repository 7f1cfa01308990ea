//! Authorization gate for mutating account operations.
//!
//! One capability check shared by email change, password change, and
//! profile edit: the actor must be the target account or a staff actor.
//! A denial maps to 403 at the transport layer and is never downgraded
//! to a redirect. Profile *visibility* is a separate read-path policy,
//! see `profile.rs`.

use tracing::debug;

use super::principal::Principal;

#[derive(Clone, Copy, Debug)]
pub(super) enum AccountOperation {
    ChangeEmail,
    ChangePassword,
    EditProfile,
}

impl AccountOperation {
    pub(super) const fn as_str(self) -> &'static str {
        match self {
            Self::ChangeEmail => "change_email",
            Self::ChangePassword => "change_password",
            Self::EditProfile => "edit_profile",
        }
    }
}

/// Self-or-staff check. Username comparison is case-insensitive, matching
/// the store's uniqueness rule.
pub(super) fn allow(
    principal: &Principal,
    operation: AccountOperation,
    target_username: &str,
) -> bool {
    if principal.username.eq_ignore_ascii_case(target_username) {
        return true;
    }
    if principal.is_staff {
        debug!(
            operation = operation.as_str(),
            actor = %principal.username,
            target = target_username,
            "staff actor allowed on foreign account"
        );
        return true;
    }
    false
}
