use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Advisory cancellation handle for one in-flight asynchronous operation.
///
/// Cancellation cannot stop externally-owned work, only suppress its effect:
/// the driver checks the token after every await and discards the
/// continuation when it fires.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// Tracks every outstanding asynchronous operation of the in-flight
/// transition so a superseding navigation can invalidate all of them at
/// once. Owned by the orchestrator's inner state; no interior locking.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    tokens: Vec<CancellationToken>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a token tied to the current transition generation.
    pub fn register(&mut self) -> CancellationToken {
        let token = CancellationToken::default();
        self.tokens.push(token.clone());
        token
    }

    /// Invalidate every outstanding token and clear the registry. Settled
    /// operations whose token fired must not mutate shared state.
    pub fn cancel_all(&mut self) {
        for token in self.tokens.drain(..) {
            token.cancel();
        }
    }

    /// Called at the start of every new transition request, before new
    /// operations are issued.
    pub fn reset(&mut self) {
        self.cancel_all();
    }
}
