use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

pub const READYZ_ENDPOINT: &str = "/readyz";

/// Process-wide liveness flag.
///
/// Starts `false` and is flipped once, after the controller handled its first event.
/// Clones share the same flag.
#[derive(Clone, Default, Debug)]
pub struct Readiness {
    ready: Arc<AtomicBool>,
}

impl Readiness {
    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}
