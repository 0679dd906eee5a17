//! Wire formats for the FastTrak HTTP API.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::FastTrakError;

#[derive(Serialize, Debug)]
pub(super) struct AuthenticateRequest<'a> {
    pub(super) username: &'a str,
    pub(super) password: &'a str,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(super) struct AuthenticateResponse {
    pub(super) id: String,
    pub(super) access_token: String,
    pub(super) refresh_token: String,
    pub(super) access_token_expiration_seconds: i64,
    // The provider misspells this field on /authenticate.
    #[serde(
        rename = "refreshTokenExpiratinSeconds",
        alias = "refreshTokenExpirationSeconds"
    )]
    pub(super) refresh_token_expiration_seconds: i64,
    #[serde(default)]
    pub(super) roles: Vec<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(super) struct RefreshRequest<'a> {
    pub(super) fasttrak_id: &'a str,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(super) struct RefreshResponse {
    pub(super) access_token: String,
    #[serde(default)]
    pub(super) refresh_token: Option<String>,
    pub(super) access_token_expiration_seconds: i64,
    #[serde(alias = "refreshTokenExpiratinSeconds")]
    pub(super) refresh_token_expiration_seconds: i64,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(super) struct RegisterRequest<'a> {
    pub(super) username: &'a str,
    pub(super) password: &'a str,
    pub(super) email: &'a str,
    pub(super) display_name: &'a str,
}

#[derive(Deserialize, Debug)]
pub(super) struct RegisterResponse {
    pub(super) id: String,
}

/// Drop the `//` comment lines FastTrak may emit ahead of the JSON payload.
#[must_use]
pub fn strip_comment_lines(body: &str) -> &str {
    let mut rest = body;
    loop {
        let trimmed = rest.trim_start();
        if !trimmed.starts_with("//") {
            return trimmed;
        }
        rest = match trimmed.find('\n') {
            Some(end) => &trimmed[end + 1..],
            None => "",
        };
    }
}

pub(super) fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, FastTrakError> {
    serde_json::from_str(strip_comment_lines(body))
        .map_err(|e| FastTrakError::Protocol(e.to_string()))
}
