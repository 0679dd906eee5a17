use crate::{
    cipher::Cipher,
    directory::{MemoryUserDirectory, PgUserDirectory, UserDirectory},
    fasttrak::FastTrakClient,
    gate::{self, AppState},
    session::{SessionCallbacks, SessionCodec, TokenLifecycleManager},
};
use anyhow::{anyhow, Context, Result};
use axum::http::HeaderValue;
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub fasttrak_url: String,
    pub encryption_key: SecretString,
    pub session_secret: SecretString,
    pub refresh_buffer_ms: i64,
    pub max_session_age_seconds: i64,
    pub frontend_base_url: Option<String>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if a key is invalid, the database is unreachable, or the
/// server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    // Fail before binding anything if either key is unusable.
    let token_cipher =
        Cipher::from_base64_key(&args.encryption_key).context("Invalid encryption key")?;
    let session_cipher =
        Cipher::from_base64_key(&args.session_secret).context("Invalid session secret")?;

    let provider = Arc::new(FastTrakClient::new(&args.fasttrak_url)?);

    let directory: Arc<dyn UserDirectory> = match &args.dsn {
        Some(dsn) => {
            let pool = PgPoolOptions::new()
                .min_connections(1)
                .max_connections(5)
                .max_lifetime(Duration::from_secs(60 * 2))
                .test_before_acquire(true)
                .connect(dsn)
                .await
                .context("Failed to connect to database")?;
            Arc::new(PgUserDirectory::new(pool))
        }
        None => {
            warn!("No database configured, users are kept in memory");
            Arc::new(MemoryUserDirectory::new())
        }
    };

    let (allowed_origin, secure_cookie) = match &args.frontend_base_url {
        Some(url) => {
            let (origin, secure) = frontend_origin(url)?;
            (Some(origin), secure)
        }
        None => (None, true),
    };

    let manager = TokenLifecycleManager::new(token_cipher, provider)
        .with_refresh_buffer_ms(args.refresh_buffer_ms);
    let callbacks = SessionCallbacks::new(manager, directory)
        .with_max_session_age_seconds(args.max_session_age_seconds);
    let codec = SessionCodec::new(session_cipher, args.max_session_age_seconds)
        .with_secure_cookie(secure_cookie);

    debug!(
        refresh_buffer_ms = args.refresh_buffer_ms,
        max_session_age_seconds = args.max_session_age_seconds,
        secure_cookie,
        "session settings"
    );
    info!("Using FastTrak at {}", args.fasttrak_url);

    gate::new(
        args.port,
        Arc::new(AppState::new(callbacks, codec)),
        allowed_origin,
    )
    .await
}

/// CORS origin for the frontend and whether its cookies must be `Secure`.
fn frontend_origin(url: &str) -> Result<(HeaderValue, bool)> {
    let url = Url::parse(url).context("Invalid frontend base URL")?;
    let secure = match url.scheme() {
        "https" => true,
        "http" => false,
        other => return Err(anyhow!("Unsupported frontend URL scheme: {other}")),
    };
    let origin = HeaderValue::from_str(&url.origin().ascii_serialization())?;
    Ok((origin, secure))
}
