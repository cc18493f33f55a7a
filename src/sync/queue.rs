//! Push task queue and the bounded worker pool that drains it.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::push::PushExecutor;
use crate::db::hooks::PushTask;

/// Cheap-to-clone handle for submitting push tasks. Enqueueing never blocks.
#[derive(Debug, Clone)]
pub struct PushQueue {
    tx: mpsc::UnboundedSender<PushTask>,
}

impl PushQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PushTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns `false` if the worker pool has shut down and the task was dropped.
    pub fn enqueue(&self, task: PushTask) -> bool {
        debug!(%task, "Queueing push task.");
        match self.tx.send(task) {
            Ok(()) => true,
            Err(mpsc::error::SendError(task)) => {
                warn!(%task, "Push workers are gone; dropping task.");
                false
            }
        }
    }
}

pub struct PushWorkerPool;

impl PushWorkerPool {
    /// Drains the queue with at most `workers` tasks in flight.
    ///
    /// On cancellation the queue is closed to new tasks; tasks already queued still run,
    /// then the pool waits for every running task to finish.
    pub fn spawn(
        executor: Arc<PushExecutor>,
        mut rx: mpsc::UnboundedReceiver<PushTask>,
        workers: usize,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let workers = workers.max(1);
        let permits = Arc::new(Semaphore::new(workers));
        tokio::spawn(async move {
            info!(workers, "Push worker pool started.");
            let mut closing = false;
            loop {
                let next = if closing {
                    rx.recv().await
                } else {
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            rx.close();
                            closing = true;
                            info!("Push queue closed; finishing queued tasks.");
                            continue;
                        }
                        task = rx.recv() => task,
                    }
                };
                let Some(task) = next else { break };
                let permit = match Arc::clone(&permits).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let executor = Arc::clone(&executor);
                tokio::spawn(async move {
                    let _permit = permit;
                    executor.execute(task).await;
                });
            }

            // Wait for in-flight tasks by taking every permit back.
            if let Err(e) = permits.acquire_many(workers as u32).await {
                error!(error = %e, "Failed to drain push workers.");
            }
            info!("Push worker pool stopped.");
        })
    }
}
