use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

pub const ARG_FASTTRAK_URL: &str = "fasttrak-url";

#[derive(Debug, Clone)]
pub struct Options {
    pub url: String,
}

impl Options {
    /// # Errors
    /// Returns an error if the FastTrak base URL is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let url = matches
            .get_one::<String>(ARG_FASTTRAK_URL)
            .cloned()
            .context("missing required argument: --fasttrak-url")?;
        Ok(Self { url })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_FASTTRAK_URL)
            .long(ARG_FASTTRAK_URL)
            .help("FastTrak identity provider base URL, example: https://fasttrak.tld/api")
            .env("TRAKGATE_FASTTRAK_URL")
            .required(true),
    )
}
