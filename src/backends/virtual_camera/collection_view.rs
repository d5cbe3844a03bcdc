// SPDX-License-Identifier: GPL-3.0-only

//! Headless collection view that logs every mutation

use crate::grid::batch::{CollectionView, GridMutation};
use std::sync::Mutex;
use tracing::debug;

/// A mutation as seen by the view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewCall {
    ReloadData,
    BatchUpdates(Vec<GridMutation>),
}

type BatchCompletion = Box<dyn FnOnce(bool) + Send>;

/// Records reloads and batches
///
/// Batches complete immediately unless deferred, in which case they stay
/// open until [`complete_pending`](Self::complete_pending) is called.
#[derive(Default)]
pub struct VirtualCollectionView {
    log: Mutex<Vec<ViewCall>>,
    deferred: Mutex<bool>,
    pending: Mutex<Vec<BatchCompletion>>,
}

impl VirtualCollectionView {
    pub fn new() -> Self {
        Self::default()
    }

    /// A view whose batch animations wait for [`complete_pending`](Self::complete_pending)
    pub fn deferred() -> Self {
        let view = Self::default();
        *view.deferred.lock().unwrap() = true;
        view
    }

    pub fn calls(&self) -> Vec<ViewCall> {
        self.log.lock().unwrap().clone()
    }

    pub fn pending_batches(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Finish every open batch animation
    pub fn complete_pending(&self, finished: bool) -> usize {
        let pending: Vec<BatchCompletion> = self.pending.lock().unwrap().drain(..).collect();
        let count = pending.len();
        for completion in pending {
            completion(finished);
        }
        count
    }
}

impl CollectionView for VirtualCollectionView {
    fn reload_data(&self) {
        debug!("Reloading collection view");
        self.log.lock().unwrap().push(ViewCall::ReloadData);
    }

    fn perform_batch_updates(&self, updates: Vec<GridMutation>, completion: BatchCompletion) {
        debug!(mutations = updates.len(), "Collection view batch update");
        self.log.lock().unwrap().push(ViewCall::BatchUpdates(updates));
        if *self.deferred.lock().unwrap() {
            self.pending.lock().unwrap().push(completion);
        } else {
            completion(true);
        }
    }
}
