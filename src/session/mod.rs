//! Session token state machine: sign-in, freshness checks, refresh, sealing.

mod callbacks;
mod codec;
mod lifecycle;
mod token;

#[cfg(test)]
pub(crate) mod test_support;

pub use callbacks::{SessionCallbacks, DEFAULT_MAX_SESSION_AGE_SECONDS};
pub use codec::{
    sealed_token_candidates, SessionCodec, SessionCodecError, TokenSource, SESSION_COOKIE_NAME,
};
pub use lifecycle::{
    CredentialPair, Principal, TokenLifecycleManager, TokenState, DEFAULT_REFRESH_BUFFER_MS,
};
pub use token::{SealedCredentials, Session, SessionToken, TokenError};
