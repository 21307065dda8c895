//! Auth handlers and supporting modules.
//!
//! This module coordinates the registration state machine, password and
//! Apple login, token issuance, and refresh rotation.
//!
//! ## Token Hygiene
//!
//! Raw refresh, verification, and reset tokens are surfaced exactly once;
//! the database only stores SHA-256 hashes. Redeeming a refresh token
//! revokes it before the replacement is inserted, so a replayed token
//! cannot win a race.
//!
//! ## Anti-Enumeration
//!
//! Login returns the same 401 for unknown emails, password-less accounts,
//! and wrong passwords. Password-reset requests always return 202.

pub(crate) mod apple;
mod error;
pub(crate) mod principal;
pub(crate) mod registration;
pub(crate) mod session;
mod state;
pub(crate) mod storage;
pub(crate) mod types;
mod utils;

#[cfg(test)]
mod tests;

pub use error::AuthError;
pub use state::{AuthConfig, AuthState};
