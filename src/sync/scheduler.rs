use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::engine::ReconciliationEngine;
use super::error::SyncError;

/// Process-wide timer that triggers a reconciliation run every `period`.
///
/// The run is awaited inside the loop, so ticks that fall due during a run are skipped
/// rather than queued, and cancellation takes effect only between runs.
pub struct Scheduler {
    engine: Arc<ReconciliationEngine>,
    period: Duration,
}

impl Scheduler {
    pub fn new(engine: Arc<ReconciliationEngine>, period: Duration) -> Self {
        Self { engine, period }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = self.period.as_secs(), "Reconciliation scheduler started.");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.engine.run().await {
                Ok(report) => debug!(writes = report.writes(), "Scheduled reconciliation finished."),
                Err(SyncError::AlreadyRunning) => {
                    debug!("Reconciliation already in progress; skipping tick.");
                }
                // The engine has already logged the failing pass.
                Err(e) => warn!(error = %e, "Scheduled reconciliation failed."),
            }
        }
        info!("Reconciliation scheduler stopped.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::EntityStore;
    use crate::db::hooks::NoopHook;
    use crate::db::test_support::create_test_db;
    use crate::notifications::TrafficNotifier;
    use crate::router::RouterClient;
    use crate::sync::queue::PushQueue;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_scheduler_runs_until_cancelled() {
        let server = MockServer::start().await;
        for resource in ["user", "profile", "user-profile", "session"] {
            Mock::given(method("GET"))
                .and(path(format!("/rest/user-manager/{resource}")))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
                .mount(&server)
                .await;
        }

        let (db, _dir) = create_test_db().await;
        let (queue, _rx) = PushQueue::new();
        let store = EntityStore::new(db, Arc::new(NoopHook), queue);
        let router = RouterClient::new(&server.uri(), "admin", "pw", Duration::from_secs(2)).unwrap();
        let engine = Arc::new(ReconciliationEngine::new(router, store, TrafficNotifier::new(8)));

        let shutdown = CancellationToken::new();
        let handle = Scheduler::new(Arc::clone(&engine), Duration::from_millis(50)).spawn(shutdown.clone());
        tokio::time::sleep(Duration::from_millis(180)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler stops after cancellation")
            .unwrap();

        let user_lists = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/rest/user-manager/user")
            .count();
        assert!(user_lists >= 2, "expected repeated runs, saw {user_lists}");
        assert!(!engine.is_running());
    }
}
