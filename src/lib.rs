//! # Tandem (Paired-Account Authentication)
//!
//! `tandem` authenticates paired accounts: two people register together, both
//! must verify ownership of their email address, and only then does the pair
//! become usable. After activation the service issues short-lived `HS256`
//! access tokens and rotating single-use refresh tokens.
//!
//! ## Registration State Machine
//!
//! A pair starts as `pending` with two members (`first` and `second`). Each
//! member receives a hashed, expiring verification token by email. Once both
//! members have verified, completing registration sets credentials for both
//! and flips the pair to `active`.
//!
//! - **Email Normalization:** Emails are trimmed and lowercased before any
//!   lookup or uniqueness check.
//! - **Soft Deletes:** Deleting an account does not reserve its email, role
//!   slot, or Apple subject; partial unique indexes scope uniqueness to live
//!   rows. Accounts are restorable for 30 days.
//!
//! ## Credentials
//!
//! Passwords are stored as Argon2id PHC strings. Refresh, verification, and
//! reset tokens are random URL-safe secrets whose raw value is surfaced
//! exactly once; the database only ever stores a SHA-256 hash.
//!
//! ## Anti-Enumeration
//!
//! Login failures are indistinguishable for unknown emails, password-less
//! accounts, and wrong passwords. Password-reset requests always return the
//! same accepted response whether or not the account exists.

pub mod api;
pub mod apple;
pub mod cli;
pub mod password;
pub mod token;

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
