//! # Sentinel Observer
//!
//! Bridges a visibility signal (an intersection observer in the UI layer, a
//! terminal scroll position, anything) to `IncrementalLoader::load_more`.
//!
//! The observer holds only a weak reference to its loader and stops when it
//! is detached or dropped, which is what the UI does when the sentinel
//! element unmounts. A loader that has been dropped is never invoked.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::loaders::incremental::IncrementalLoader;

pub struct SentinelObserver {
    visible_tx: watch::Sender<bool>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SentinelObserver {
    /// Starts observing on behalf of `loader`. The sentinel starts hidden.
    pub fn attach<T: Send + 'static>(loader: &Arc<IncrementalLoader<T>>) -> Self {
        let weak = Arc::downgrade(loader);
        let (visible_tx, mut visible_rx) = watch::channel(false);
        let token = CancellationToken::new();
        let stop = token.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => {
                        log::trace!("Sentinel detached");
                        break;
                    }
                    changed = visible_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if !*visible_rx.borrow_and_update() {
                            continue;
                        }
                        let Some(loader) = weak.upgrade() else {
                            log::debug!("Sentinel outlived its loader");
                            break;
                        };
                        let outcome = loader.on_visible().await;
                        log::trace!("Sentinel visible: {:?}", outcome);
                    }
                }
            }
        });

        Self {
            visible_tx,
            token,
            task: Some(task),
        }
    }

    /// Reports the sentinel's visibility. Only a hidden-to-visible
    /// transition triggers a load.
    pub fn set_visible(&self, visible: bool) {
        self.visible_tx.send_if_modified(|current| {
            if *current == visible {
                false
            } else {
                *current = visible;
                true
            }
        });
    }

    pub fn is_attached(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Stops observing and waits for the observer task to finish.
    ///
    /// A load already running is not interrupted; the loader's own liveness
    /// flag guards what happens when it lands.
    pub async fn detach(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SentinelObserver {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
