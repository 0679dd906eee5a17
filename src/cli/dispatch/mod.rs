//! Map validated CLI arguments to the action to run.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{fasttrak, session};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches.get_one::<String>("dsn").cloned();

    let fasttrak_opts = fasttrak::Options::parse(matches)?;
    let session_opts = session::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        fasttrak_url: fasttrak_opts.url,
        encryption_key: session_opts.encryption_key,
        session_secret: session_opts.session_secret,
        refresh_buffer_ms: session_opts.refresh_buffer_ms,
        max_session_age_seconds: session_opts.max_session_age_seconds,
        frontend_base_url: session_opts.frontend_base_url,
    }))
}
