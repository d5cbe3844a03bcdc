// SPDX-License-Identifier: GPL-3.0-only

//! Extra execution time for in-flight writes
//!
//! A recording must finish writing even if the host app is sent to the
//! background. The host grants that through [`BackgroundTaskProvider`]; a
//! [`BackgroundTaskLease`] holds one grant and gives it back exactly once,
//! either explicitly or on drop.

use std::sync::Arc;
use tracing::debug;

/// Identifier of a granted background task
pub type BackgroundTaskId = u64;

pub trait BackgroundTaskProvider: Send + Sync {
    /// Whether the device runs apps in the background at all
    fn is_multitasking_supported(&self) -> bool;

    /// Request background execution; `None` when the request was refused
    fn begin_background_task(&self) -> Option<BackgroundTaskId>;

    fn end_background_task(&self, id: BackgroundTaskId);
}

/// Scoped background execution grant
pub struct BackgroundTaskLease {
    provider: Arc<dyn BackgroundTaskProvider>,
    id: Option<BackgroundTaskId>,
}

impl BackgroundTaskLease {
    /// Request a grant when the device supports multitasking
    pub fn acquire(provider: Arc<dyn BackgroundTaskProvider>) -> Self {
        let id = if provider.is_multitasking_supported() {
            provider.begin_background_task()
        } else {
            None
        };
        debug!(task = ?id, "Background task lease acquired");
        Self { provider, id }
    }

    pub fn is_held(&self) -> bool {
        self.id.is_some()
    }

    /// Give the grant back; later calls do nothing
    pub fn release(&mut self) {
        if let Some(id) = self.id.take() {
            debug!(task = id, "Background task lease released");
            self.provider.end_background_task(id);
        }
    }
}

impl Drop for BackgroundTaskLease {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for BackgroundTaskLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTaskLease")
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingProvider {
        multitasking: bool,
        ended: Mutex<Vec<BackgroundTaskId>>,
    }

    impl BackgroundTaskProvider for CountingProvider {
        fn is_multitasking_supported(&self) -> bool {
            self.multitasking
        }

        fn begin_background_task(&self) -> Option<BackgroundTaskId> {
            Some(7)
        }

        fn end_background_task(&self, id: BackgroundTaskId) {
            self.ended.lock().unwrap().push(id);
        }
    }

    #[test]
    fn test_release_happens_once() {
        let provider = Arc::new(CountingProvider {
            multitasking: true,
            ..Default::default()
        });
        let mut lease = BackgroundTaskLease::acquire(provider.clone());
        assert!(lease.is_held());

        lease.release();
        lease.release();
        drop(lease);

        assert_eq!(*provider.ended.lock().unwrap(), vec![7]);
    }

    #[test]
    fn test_drop_releases() {
        let provider = Arc::new(CountingProvider {
            multitasking: true,
            ..Default::default()
        });
        drop(BackgroundTaskLease::acquire(provider.clone()));
        assert_eq!(provider.ended.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_no_grant_without_multitasking() {
        let provider = Arc::new(CountingProvider::default());
        let lease = BackgroundTaskLease::acquire(provider.clone());
        assert!(!lease.is_held());
        drop(lease);
        assert!(provider.ended.lock().unwrap().is_empty());
    }
}
