//! # Trakgate (FastTrak sign-in and session gate)
//!
//! `trakgate` signs users in against the FastTrak identity provider, keeps the
//! provider's access and refresh tokens encrypted inside a sealed, client-held
//! session token, refreshes the access token transparently as it nears expiry,
//! and gates admin routes by role.
//!
//! ## Token lifecycle
//!
//! Every request that carries a session cookie runs the callback chain:
//!
//! - **Fresh:** the access token expires more than the refresh buffer from now;
//!   the token is reused without any network call.
//! - **Expiring:** the token is inside the buffer, already expired, or missing;
//!   a refresh exchange runs against FastTrak.
//! - **Errored:** a previous refresh failed. No further refresh is attempted;
//!   identity and roles stay visible but no access token is handed out until
//!   the user signs in again.
//!
//! Nothing is shared between requests. Two concurrent requests may both
//! refresh the same token; each returns a consistent session to its caller.

pub mod cipher;
pub mod cli;
pub mod directory;
pub mod error;
pub mod fasttrak;
pub mod gate;
pub mod guard;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Current wall-clock time as Unix epoch milliseconds.
#[must_use]
pub fn unix_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |elapsed| {
            i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
        })
}

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
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_unix_millis_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(unix_millis() > 1_577_836_800_000);
    }
}
