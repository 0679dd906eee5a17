use std::sync::Arc;

use crate::directory::UserDirectory;
use crate::fasttrak::IdentityProvider;
use crate::session::{SessionCallbacks, SessionCodec};

/// Shared, read-only after startup.
#[derive(Clone, Debug)]
pub struct AppState {
    callbacks: SessionCallbacks,
    codec: SessionCodec,
}

impl AppState {
    #[must_use]
    pub fn new(callbacks: SessionCallbacks, codec: SessionCodec) -> Self {
        Self { callbacks, codec }
    }

    #[must_use]
    pub fn callbacks(&self) -> &SessionCallbacks {
        &self.callbacks
    }

    #[must_use]
    pub fn codec(&self) -> &SessionCodec {
        &self.codec
    }

    #[must_use]
    pub fn directory(&self) -> &Arc<dyn UserDirectory> {
        self.callbacks.directory()
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        self.callbacks.manager().provider()
    }
}
