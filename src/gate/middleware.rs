//! Per-request session resolution.
//!
//! Opens the sealed token, runs the freshness check, and hands the handler a
//! materialized [`Session`]. A bearer value that does not open falls through
//! to the session cookie. When the token changed (refreshed or errored) the
//! new one is resealed into the cookie; the cookie is cleared only when the
//! cookie value itself cannot be opened. A `Set-Cookie` written by the handler
//! itself always wins.

use axum::{
    extract::{Extension, Request},
    http::{header::SET_COOKIE, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, error};

use super::state::AppState;
use crate::session::{sealed_token_candidates, Session, SessionToken, TokenSource};
use crate::unix_millis;

/// The session resolved for the current request, if any.
#[derive(Clone, Debug, Default)]
pub struct CurrentSession(pub Option<Session>);

pub async fn resolve_session(
    Extension(state): Extension<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let now = unix_millis();
    let candidates = sealed_token_candidates(request.headers());
    let (session, cookie) = if candidates.is_empty() {
        (None, None)
    } else {
        resolve(&state, &candidates, now).await
    };

    request.extensions_mut().insert(CurrentSession(session));

    let mut response = next.run(request).await;
    if let Some(cookie) = cookie {
        if !response.headers().contains_key(SET_COOKIE) {
            response.headers_mut().insert(SET_COOKIE, cookie);
        }
    }
    response
}

fn open_first(
    state: &AppState,
    candidates: &[(TokenSource, String)],
    now: i64,
) -> (Option<SessionToken>, bool) {
    let mut stale_cookie = false;
    for (source, sealed) in candidates {
        match state.codec().open(sealed, now) {
            Ok(token) => return (Some(token), false),
            Err(e) => {
                debug!(?source, "Discarding session token: {e}");
                stale_cookie |= *source == TokenSource::Cookie;
            }
        }
    }
    (None, stale_cookie)
}

async fn resolve(
    state: &AppState,
    candidates: &[(TokenSource, String)],
    now: i64,
) -> (Option<Session>, Option<HeaderValue>) {
    let codec = state.codec();
    let previous = match open_first(state, candidates, now) {
        (Some(token), _) => token,
        (None, true) => return (None, codec.clear_cookie().ok()),
        (None, false) => return (None, None),
    };

    let Some(token) = state
        .callbacks()
        .on_token(Some(previous.clone()), None, now)
        .await
    else {
        return (None, None);
    };

    let cookie = if token == previous {
        None
    } else {
        match codec
            .seal(&token)
            .map(|resealed| codec.cookie(&resealed, &token, now))
        {
            Ok(Ok(cookie)) => Some(cookie),
            Ok(Err(e)) => {
                error!("Failed to build session cookie: {e}");
                None
            }
            Err(e) => {
                error!("Failed to reseal session token: {e}");
                None
            }
        }
    };

    (Some(state.callbacks().on_session(&token)), cookie)
}
