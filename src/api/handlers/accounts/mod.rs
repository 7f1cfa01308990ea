//! Account lifecycle handlers and supporting modules.
//!
//! This module coordinates signup, activation (with reissue of expired
//! tokens), email change with confirmation, password change, profiles,
//! and sign-in/out.
//!
//! ## Token Handling
//!
//! Activation and confirmation tokens are single-use 40-character hex
//! strings. Consuming a token and mutating the user happen in one
//! transaction behind a row lock, so concurrent replays observe a
//! consistent "already consumed" state. Consumed and unknown tokens are
//! deliberately indistinguishable (both 404).
//!
//! ## Authorization
//!
//! `gate` implements the single self-or-staff capability check shared by
//! every mutating operation; `principal` resolves the session cookie or
//! bearer token into the acting user. Profile visibility is evaluated
//! separately on the read path.

pub(crate) mod activation;
mod credential;
pub(crate) mod email_change;
mod gate;
pub(crate) mod password;
mod policy;
pub(crate) mod principal;
pub(crate) mod profile;
pub(crate) mod session;
pub(crate) mod signup;
mod state;
mod storage;
pub(crate) mod types;
mod utils;

pub use policy::{NextUrlGuard, SameOriginGuard};
pub use principal::Principal;
pub use state::{AccountsConfig, AccountsState};
