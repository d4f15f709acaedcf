//! Request-scoped control state threaded through every engine call.

mod client_identity;

pub use client_identity::ClientIdentity;
pub use tokio_util::sync::CancellationToken;

/// Runtime context for a single chat request.
///
/// Everything that would otherwise be process-wide state (the sampling seed, the
/// "prefer backup" switch) lives here, so concurrent requests never observe each
/// other's overrides.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Cancels normalization, dispatch and any streaming worker spawned for the request.
    pub cancellation: CancellationToken,

    /// Skip the main backend and dispatch straight to the backup.
    pub prefer_backup: bool,

    /// Sampling seed forwarded to backends that accept one.
    pub seed: Option<u64>,

    /// Whether models marked as restricted may be served.
    pub allow_restricted: bool,

    /// Caller identity, used for logging and tracing only.
    pub client_identity: Option<ClientIdentity>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing cancellation token, typically owned by the caller's deadline.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn prefer_backup(mut self, prefer_backup: bool) -> Self {
        self.prefer_backup = prefer_backup;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn allow_restricted(mut self, allow: bool) -> Self {
        self.allow_restricted = allow;
        self
    }

    pub fn with_client_identity(mut self, identity: ClientIdentity) -> Self {
        self.client_identity = Some(identity);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
