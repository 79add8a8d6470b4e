use tokio::sync::OwnedMutexGuard;

use crate::registry::KeyLocks;

/// Serialises posting attempts against the same platform key, across every
/// session sharing the gate.
#[derive(Debug, Default)]
pub struct PlatformGate {
    locks: KeyLocks,
}

impl PlatformGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enter(&self, platform_key: &str) -> OwnedMutexGuard<()> {
        self.locks.handle(platform_key).lock_owned().await
    }
}
