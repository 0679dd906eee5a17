use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::session::{DEFAULT_MAX_SESSION_AGE_SECONDS, DEFAULT_REFRESH_BUFFER_MS};

pub const ARG_ENCRYPTION_KEY: &str = "encryption-key";
pub const ARG_SESSION_SECRET: &str = "session-secret";
pub const ARG_REFRESH_BUFFER_MS: &str = "refresh-buffer-ms";
pub const ARG_MAX_SESSION_AGE: &str = "max-session-age";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";

#[derive(Debug, Clone)]
pub struct Options {
    pub encryption_key: SecretString,
    pub session_secret: SecretString,
    pub refresh_buffer_ms: i64,
    pub max_session_age_seconds: i64,
    pub frontend_base_url: Option<String>,
}

impl Options {
    /// # Errors
    /// Returns an error if a required secret is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let encryption_key = matches
            .get_one::<String>(ARG_ENCRYPTION_KEY)
            .cloned()
            .map(SecretString::from)
            .context("missing required argument: --encryption-key")?;
        let session_secret = matches
            .get_one::<String>(ARG_SESSION_SECRET)
            .cloned()
            .map(SecretString::from)
            .context("missing required argument: --session-secret")?;

        Ok(Self {
            encryption_key,
            session_secret,
            refresh_buffer_ms: matches
                .get_one::<i64>(ARG_REFRESH_BUFFER_MS)
                .copied()
                .unwrap_or(DEFAULT_REFRESH_BUFFER_MS),
            max_session_age_seconds: matches
                .get_one::<i64>(ARG_MAX_SESSION_AGE)
                .copied()
                .unwrap_or(DEFAULT_MAX_SESSION_AGE_SECONDS),
            frontend_base_url: matches.get_one::<String>(ARG_FRONTEND_BASE_URL).cloned(),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ENCRYPTION_KEY)
                .long(ARG_ENCRYPTION_KEY)
                .help("Base64 encoded 32-byte key used to encrypt FastTrak tokens")
                .env("TRAKGATE_ENCRYPTION_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_SESSION_SECRET)
                .long(ARG_SESSION_SECRET)
                .help("Base64 encoded 32-byte key used to seal the session cookie")
                .env("TRAKGATE_SESSION_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_REFRESH_BUFFER_MS)
                .long(ARG_REFRESH_BUFFER_MS)
                .help("Refresh the access token this many milliseconds before it expires")
                .env("TRAKGATE_REFRESH_BUFFER_MS")
                .default_value("10000")
                .value_parser(clap::value_parser!(i64).range(0..)),
        )
        .arg(
            Arg::new(ARG_MAX_SESSION_AGE)
                .long(ARG_MAX_SESSION_AGE)
                .help("Maximum session age in seconds")
                .env("TRAKGATE_MAX_SESSION_AGE")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL allowed to call the API with credentials")
                .env("TRAKGATE_FRONTEND_BASE_URL"),
        )
}
