// SPDX-License-Identifier: GPL-3.0-only

//! Serializes structural grid mutations
//!
//! Data source updates, batch animations and full reloads all go through one
//! tokio task that runs them strictly one after another. A batch occupies the
//! queue until the view reports the animation finished, so a reload or the
//! next batch can never start on top of it.

use super::batch::{CollectionView, CollectionViewBatchAnimation};
use super::changes::ChangeDetails;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

type UiJob = BoxFuture<'static, ()>;

pub struct CollectionViewUpdatesCoordinator {
    view: Arc<dyn CollectionView>,
    sender: mpsc::UnboundedSender<UiJob>,
}

impl CollectionViewUpdatesCoordinator {
    /// Spawn the update task on the current tokio runtime
    pub fn new(view: Arc<dyn CollectionView>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<UiJob>();

        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                job.await;
            }
            debug!("Collection view update queue closed");
        });

        Self { view, sender }
    }

    fn enqueue(&self, job: UiJob) {
        if self.sender.send(job).is_err() {
            warn!("Collection view update queue is gone, dropping update");
        }
    }

    /// Run a data source mutation in queue order
    pub fn perform_data_source_update<F>(&self, update: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(async move { update() }.boxed());
    }

    /// Show `changes` in `section`, animated when they are incremental
    pub fn perform_changes(&self, changes: ChangeDetails, section: usize) {
        let view = Arc::clone(&self.view);
        if changes.has_incremental_changes {
            let animation = CollectionViewBatchAnimation::new(view, section, changes);
            self.enqueue(
                async move {
                    animation.run().await;
                }
                .boxed(),
            );
        } else {
            debug!(section, "Changes are not incremental, reloading");
            self.enqueue(async move { view.reload_data() }.boxed());
        }
    }

    /// Wait until everything enqueued so far has finished
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.enqueue(
            async move {
                let _ = tx.send(());
            }
            .boxed(),
        );
        let _ = rx.await;
    }
}

impl std::fmt::Debug for CollectionViewUpdatesCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionViewUpdatesCoordinator")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::batch::GridMutation;
    use crate::library::AssetFetchResult;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingView {
        log: Mutex<Vec<String>>,
    }

    impl CollectionView for RecordingView {
        fn reload_data(&self) {
            self.log.lock().unwrap().push("reload".into());
        }

        fn perform_batch_updates(
            &self,
            updates: Vec<GridMutation>,
            completion: Box<dyn FnOnce(bool) + Send>,
        ) {
            self.log.lock().unwrap().push(format!("batch:{}", updates.len()));
            completion(true);
        }
    }

    #[tokio::test]
    async fn test_updates_run_in_enqueue_order() {
        let view = Arc::new(RecordingView::default());
        let coordinator = CollectionViewUpdatesCoordinator::new(view.clone());

        let v = view.clone();
        coordinator.perform_data_source_update(move || v.log.lock().unwrap().push("data".into()));
        coordinator.perform_changes(
            ChangeDetails::incremental(
                AssetFetchResult::default(),
                AssetFetchResult::default(),
                vec![0],
                vec![1],
                vec![],
                vec![],
            ),
            2,
        );
        coordinator.perform_changes(
            ChangeDetails::full_reload(AssetFetchResult::default(), AssetFetchResult::default()),
            2,
        );
        coordinator.flush().await;

        assert_eq!(*view.log.lock().unwrap(), vec!["data", "batch:2", "reload"]);
    }
}
