use async_trait::async_trait;
use reqwest::{
    header::{CACHE_CONTROL, PRAGMA},
    Client, RequestBuilder, StatusCode,
};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, error, instrument};
use url::Url;

use super::{
    types::{
        parse_body, AuthenticateRequest, AuthenticateResponse, RefreshRequest, RefreshResponse,
        RegisterRequest, RegisterResponse,
    },
    AuthenticatedIdentity, FastTrakError, IdentityProvider, RefreshedTokens, Registration,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the FastTrak API.
#[derive(Debug, Clone)]
pub struct FastTrakClient {
    client: Client,
    base_url: String,
}

impl FastTrakClient {
    /// Build a client for the given base URL.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let url = Url::parse(base_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow::anyhow!(
                "Error parsing URL: unsupported scheme {}",
                url.scheme()
            ));
        }

        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    // Always hit the provider, never a cache.
    fn live(request: RequestBuilder) -> RequestBuilder {
        request
            .header(CACHE_CONTROL, "no-cache, no-store")
            .header(PRAGMA, "no-cache")
    }

    async fn send(request: RequestBuilder) -> Result<(StatusCode, String), FastTrakError> {
        let response = Self::live(request).send().await.map_err(|e| {
            error!("Error calling identity provider: {e}");
            FastTrakError::Unreachable(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FastTrakError::Protocol(e.to_string()))?;

        Ok((status, body))
    }
}

#[async_trait]
impl IdentityProvider for FastTrakClient {
    #[instrument(skip(self, password))]
    async fn authenticate(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<AuthenticatedIdentity, FastTrakError> {
        let request = self
            .client
            .post(self.endpoint("/authenticate"))
            .json(&AuthenticateRequest {
                username,
                password: password.expose_secret(),
            });

        let (status, body) = Self::send(request).await?;
        if !status.is_success() {
            debug!("authenticate rejected: {status}");
            return Err(FastTrakError::Authentication {
                status: status.as_u16(),
            });
        }

        let response: AuthenticateResponse = parse_body(&body)?;

        Ok(AuthenticatedIdentity {
            external_id: response.id,
            access_token: SecretString::from(response.access_token),
            refresh_token: SecretString::from(response.refresh_token),
            access_token_ttl_seconds: response.access_token_expiration_seconds,
            refresh_token_ttl_seconds: response.refresh_token_expiration_seconds,
            roles: response.roles,
        })
    }

    #[instrument(skip(self, refresh_token))]
    async fn refresh(
        &self,
        external_id: &str,
        refresh_token: &SecretString,
    ) -> Result<RefreshedTokens, FastTrakError> {
        let request = self
            .client
            .post(self.endpoint("/refresh"))
            .bearer_auth(refresh_token.expose_secret())
            .json(&RefreshRequest {
                fasttrak_id: external_id,
            });

        let (status, body) = Self::send(request).await?;
        if !status.is_success() {
            error!("Token refresh rejected: {status}");
            return Err(FastTrakError::Rejected {
                status: status.as_u16(),
            });
        }

        let response: RefreshResponse = parse_body(&body)?;

        Ok(RefreshedTokens {
            access_token: SecretString::from(response.access_token),
            refresh_token: response.refresh_token.map(SecretString::from),
            access_token_ttl_seconds: response.access_token_expiration_seconds,
            refresh_token_ttl_seconds: response.refresh_token_expiration_seconds,
        })
    }

    #[instrument(skip(self, registration), fields(username = %registration.username))]
    async fn register(&self, registration: &Registration) -> Result<String, FastTrakError> {
        let request = self
            .client
            .post(self.endpoint("/register"))
            .json(&RegisterRequest {
                username: &registration.username,
                password: registration.password.expose_secret(),
                email: &registration.email,
                display_name: &registration.display_name,
            });

        let (status, body) = Self::send(request).await?;
        if !status.is_success() {
            error!("Registration rejected: {status}");
            return Err(FastTrakError::Rejected {
                status: status.as_u16(),
            });
        }

        let response: RegisterResponse = parse_body(&body)?;

        Ok(response.id)
    }
}
