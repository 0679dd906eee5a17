pub mod health;
pub use self::health::health;

pub mod auth;
pub use self::auth::{access_token, login, logout, session};

pub mod admin;
pub use self::admin::{create_user, list_users, update_user};

// common functions for the handlers
use regex::Regex;

pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(valid_email("alice@example.com"));
        assert!(!valid_email("alice@example"));
        assert!(!valid_email("alice example@example.com"));
        assert!(!valid_email(""));
    }
}
