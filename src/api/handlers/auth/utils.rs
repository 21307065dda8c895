//! Small helpers for auth validation and email links.

use regex::Regex;

/// Minimum password length accepted at registration and reset.
pub(super) const MIN_PASSWORD_LENGTH: usize = 8;

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Password policy check.
pub(super) fn valid_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LENGTH
}

/// Shape check for an optional anniversary date (`YYYY-MM-DD`).
pub(super) fn valid_anniversary_date(date: &str) -> bool {
    let Ok(regex) = Regex::new(r"^\d{4}-(\d{2})-(\d{2})$") else {
        return false;
    };
    let Some(captures) = regex.captures(date) else {
        return false;
    };
    let month: u8 = captures[1].parse().unwrap_or(0);
    let day: u8 = captures[2].parse().unwrap_or(0);
    (1..=12).contains(&month) && (1..=31).contains(&day)
}

/// Build the frontend verification link included in outbound emails.
pub(super) fn build_verify_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/verify-email#token={token}")
}

/// Build the frontend password-reset link included in outbound emails.
pub(super) fn build_reset_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/reset-password#token={token}")
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
    fn valid_password_enforces_minimum_length() {
        assert!(!valid_password(""));
        assert!(!valid_password("seven77"));
        assert!(valid_password("eight888"));
        // Length counts characters, not bytes.
        assert!(valid_password("pässwörd"));
    }

    #[test]
    fn valid_anniversary_date_checks_shape_and_ranges() {
        assert!(valid_anniversary_date("2021-06-15"));
        assert!(valid_anniversary_date("1999-12-31"));

        assert!(!valid_anniversary_date(""));
        assert!(!valid_anniversary_date("15-06-2021"));
        assert!(!valid_anniversary_date("2021/06/15"));
        assert!(!valid_anniversary_date("2021-13-01"));
        assert!(!valid_anniversary_date("2021-00-10"));
        assert!(!valid_anniversary_date("2021-06-32"));
    }

    #[test]
    fn build_verify_url_trims_trailing_slash() {
        let url = build_verify_url("https://tandem.dev/", "token");
        assert_eq!(url, "https://tandem.dev/verify-email#token=token");
    }

    #[test]
    fn build_reset_url_trims_trailing_slash() {
        let url = build_reset_url("https://tandem.dev/", "token");
        assert_eq!(url, "https://tandem.dev/reset-password#token=token");
    }

    #[derive(Debug)]
    struct FakeDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "fake database error")
        }
    }

    impl StdError for FakeDbError {}

    impl DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            "fake database error"
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
        let err = sqlx::Error::Database(Box::new(FakeDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(FakeDbError {
            code: Some("99999"),
        }));
        assert!(!is_unique_violation(&err));

        let err = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&err));
    }
}
