// SPDX-License-Identifier: GPL-3.0-only

//! Animated batch update of one grid section
//!
//! Index paths are only valid in a fixed order: deletions (old indexes), then
//! insertions and reloads (new indexes), then moves. The animation resolves
//! once the view reports that its batch finished.

use super::changes::ChangeDetails;
use super::geometry::IndexPath;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// One structural mutation of the grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridMutation {
    DeleteItems(Vec<IndexPath>),
    InsertItems(Vec<IndexPath>),
    ReloadItems(Vec<IndexPath>),
    MoveItem { from: IndexPath, to: IndexPath },
}

/// The grid view the coordinator mutates
pub trait CollectionView: Send + Sync {
    /// Throw away every cell and reload from the data source
    fn reload_data(&self);

    /// Apply `updates` as one animated batch; `completion` receives whether
    /// the animation ran to the end
    fn perform_batch_updates(
        &self,
        updates: Vec<GridMutation>,
        completion: Box<dyn FnOnce(bool) + Send>,
    );
}

pub struct CollectionViewBatchAnimation {
    view: Arc<dyn CollectionView>,
    section: usize,
    changes: ChangeDetails,
}

impl CollectionViewBatchAnimation {
    pub fn new(view: Arc<dyn CollectionView>, section: usize, changes: ChangeDetails) -> Self {
        Self {
            view,
            section,
            changes,
        }
    }

    fn index_paths(&self, indexes: &[usize]) -> Vec<IndexPath> {
        indexes
            .iter()
            .map(|&item| IndexPath::new(item, self.section))
            .collect()
    }

    /// The mutations of this batch in application order
    pub fn updates(&self) -> Vec<GridMutation> {
        let mut updates = Vec::new();
        if !self.changes.removed_indexes.is_empty() {
            updates.push(GridMutation::DeleteItems(
                self.index_paths(&self.changes.removed_indexes),
            ));
        }
        if !self.changes.inserted_indexes.is_empty() {
            updates.push(GridMutation::InsertItems(
                self.index_paths(&self.changes.inserted_indexes),
            ));
        }
        if !self.changes.changed_indexes.is_empty() {
            updates.push(GridMutation::ReloadItems(
                self.index_paths(&self.changes.changed_indexes),
            ));
        }
        for &(from, to) in &self.changes.moves {
            updates.push(GridMutation::MoveItem {
                from: IndexPath::new(from, self.section),
                to: IndexPath::new(to, self.section),
            });
        }
        updates
    }

    /// Run the batch and wait for the view's completion
    pub async fn run(self) -> bool {
        let updates = self.updates();
        debug!(section = self.section, mutations = updates.len(), "Starting batch animation");

        let (tx, rx) = oneshot::channel();
        self.view.perform_batch_updates(
            updates,
            Box::new(move |finished| {
                let _ = tx.send(finished);
            }),
        );

        match rx.await {
            Ok(finished) => {
                debug!(section = self.section, finished, "Batch animation completed");
                finished
            }
            Err(_) => {
                warn!(section = self.section, "Batch completion dropped without being called");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::AssetFetchResult;

    struct NullView;

    impl CollectionView for NullView {
        fn reload_data(&self) {}

        fn perform_batch_updates(
            &self,
            _updates: Vec<GridMutation>,
            completion: Box<dyn FnOnce(bool) + Send>,
        ) {
            completion(true);
        }
    }

    #[test]
    fn test_updates_follow_fixed_order() {
        let changes = ChangeDetails::incremental(
            AssetFetchResult::default(),
            AssetFetchResult::default(),
            vec![3],
            vec![0],
            vec![1],
            vec![(4, 2)],
        );
        let batch = CollectionViewBatchAnimation::new(Arc::new(NullView), 2, changes);

        assert_eq!(
            batch.updates(),
            vec![
                GridMutation::DeleteItems(vec![IndexPath::new(3, 2)]),
                GridMutation::InsertItems(vec![IndexPath::new(0, 2)]),
                GridMutation::ReloadItems(vec![IndexPath::new(1, 2)]),
                GridMutation::MoveItem {
                    from: IndexPath::new(4, 2),
                    to: IndexPath::new(2, 2)
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_run_reports_view_completion() {
        let changes = ChangeDetails::incremental(
            AssetFetchResult::default(),
            AssetFetchResult::default(),
            vec![],
            vec![0],
            vec![],
            vec![],
        );
        let batch = CollectionViewBatchAnimation::new(Arc::new(NullView), 0, changes);
        assert!(batch.run().await);
    }
}
