//! Pull-sync: mirrors the router's users, plans, assignments and sessions locally.
//!
//! A run is four passes in a fixed order, each in its own transaction. Records are
//! applied one by one inside savepoints so that a bad record is rolled back and skipped
//! without losing the rest of the pass. A pass-level failure aborts the run.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseTransaction, DbErr, TransactionTrait};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::db::EntityStore;
use crate::db::entities::session;
use crate::db::hooks::{CommitEvent, EntityKind};
use crate::db::services::{
    UpsertOutcome, assignment_service, plan_service, session_service, user_service,
};
use crate::notifications::TrafficNotifier;
use crate::router::{Assignments, Plans, RouterClient, Sessions, Users};
use crate::sync::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pass {
    Users,
    Plans,
    Assignments,
    Sessions,
}

impl Pass {
    pub const ORDER: [Pass; 4] = [Pass::Users, Pass::Plans, Pass::Assignments, Pass::Sessions];
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Pass::Users => "users",
            Pass::Plans => "plans",
            Pass::Assignments => "assignments",
            Pass::Sessions => "sessions",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub pass: Pass,
    pub fetched: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Records whose user or plan could not be resolved locally, or repeated plan names.
    pub skipped: usize,
    /// Records rolled back because applying them failed.
    pub failed: usize,
}

impl PassSummary {
    fn new(pass: Pass, fetched: usize) -> Self {
        Self {
            pass,
            fetched,
            created: 0,
            updated: 0,
            unchanged: 0,
            skipped: 0,
            failed: 0,
        }
    }

    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn writes(&self) -> usize {
        self.created + self.updated
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub passes: Vec<PassSummary>,
}

impl RunReport {
    pub fn writes(&self) -> usize {
        self.passes.iter().map(PassSummary::writes).sum()
    }

    pub fn pass(&self, pass: Pass) -> Option<&PassSummary> {
        self.passes.iter().find(|p| p.pass == pass)
    }
}

/// Commits or rolls back a per-record savepoint, handing the record's own result back.
async fn settle<T>(savepoint: DatabaseTransaction, result: Result<T, DbErr>) -> Result<Result<T, DbErr>, DbErr> {
    match result {
        Ok(value) => {
            savepoint.commit().await?;
            Ok(Ok(value))
        }
        Err(e) => {
            savepoint.rollback().await?;
            Ok(Err(e))
        }
    }
}

pub struct ReconciliationEngine {
    router: RouterClient,
    store: EntityStore,
    notifier: TrafficNotifier,
    running: Mutex<()>,
}

impl ReconciliationEngine {
    pub fn new(router: RouterClient, store: EntityStore, notifier: TrafficNotifier) -> Self {
        Self {
            router,
            store,
            notifier,
            running: Mutex::new(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Runs the four passes in order. Only one run at a time; a concurrent call returns
    /// [`SyncError::AlreadyRunning`] immediately.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<RunReport, SyncError> {
        let _guard = self.running.try_lock().map_err(|_| SyncError::AlreadyRunning)?;
        let started_at = Utc::now();
        info!("Starting reconciliation run.");

        let mut passes = Vec::with_capacity(Pass::ORDER.len());
        for pass in Pass::ORDER {
            let result = match pass {
                Pass::Users => self.sync_users().await,
                Pass::Plans => self.sync_plans().await,
                Pass::Assignments => self.sync_assignments().await,
                Pass::Sessions => self.sync_sessions().await,
            };
            match result {
                Ok(summary) => {
                    info!(
                        %pass,
                        fetched = summary.fetched,
                        created = summary.created,
                        updated = summary.updated,
                        skipped = summary.skipped,
                        failed = summary.failed,
                        "Reconciliation pass finished."
                    );
                    passes.push(summary);
                }
                Err(e) => {
                    error!(%pass, error = %e, "Reconciliation pass failed; aborting remaining passes.");
                    return Err(e);
                }
            }
        }

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            passes,
        };
        info!(writes = report.writes(), "Reconciliation run completed.");
        Ok(report)
    }

    fn announce(&self, events: Vec<CommitEvent>) {
        for event in events {
            self.store.notify(event);
        }
    }

    #[instrument(skip(self))]
    async fn sync_users(&self) -> Result<PassSummary, SyncError> {
        let remote = self.router.list::<Users>().await?;
        let mut summary = PassSummary::new(Pass::Users, remote.len());
        let mut events = Vec::new();

        let txn = self.store.db().begin().await?;
        for record in &remote {
            let savepoint = txn.begin().await?;
            let result = user_service::upsert_from_router(&savepoint, record).await;
            match settle(savepoint, result).await? {
                Ok((model, outcome)) => {
                    summary.record(outcome);
                    if outcome.wrote() {
                        info!(user = %model.username, ?outcome, "Reconciled router user.");
                        events.push(CommitEvent::from_router(EntityKind::User, model.id, model.external_id));
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(user = %record.name, external_id = %record.id, error = %e, "Failed to reconcile router user; skipping.");
                }
            }
        }
        txn.commit().await?;

        self.announce(events);
        Ok(summary)
    }

    #[instrument(skip(self))]
    async fn sync_plans(&self) -> Result<PassSummary, SyncError> {
        let remote = self.router.list::<Plans>().await?;
        let mut summary = PassSummary::new(Pass::Plans, remote.len());
        let mut events = Vec::new();

        let txn = self.store.db().begin().await?;
        // One router profile per name; repeats would otherwise relink the row on every run.
        let mut claimed: HashMap<String, String> =
            plan_service::linked_ids_for_repeated_names(&txn, &remote).await?;
        for record in &remote {
            match claimed.get(&record.name) {
                Some(owner) if owner != &record.id => {
                    summary.skipped += 1;
                    warn!(plan = %record.name, external_id = %record.id, linked = %owner, "Router lists another profile with this name; skipping.");
                    continue;
                }
                Some(_) => {}
                None => {
                    claimed.insert(record.name.clone(), record.id.clone());
                }
            }

            let savepoint = txn.begin().await?;
            let result = plan_service::upsert_from_router(&savepoint, record).await;
            match settle(savepoint, result).await? {
                Ok((model, outcome)) => {
                    summary.record(outcome);
                    if outcome.wrote() {
                        info!(plan = %model.name, ?outcome, "Reconciled router profile.");
                        events.push(CommitEvent::from_router(EntityKind::Plan, model.id, model.external_id));
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(plan = %record.name, external_id = %record.id, error = %e, "Failed to reconcile router profile; skipping.");
                }
            }
        }
        txn.commit().await?;

        self.announce(events);
        Ok(summary)
    }

    #[instrument(skip(self))]
    async fn sync_assignments(&self) -> Result<PassSummary, SyncError> {
        let remote = self.router.list::<Assignments>().await?;
        let mut summary = PassSummary::new(Pass::Assignments, remote.len());
        let mut events = Vec::new();

        let txn = self.store.db().begin().await?;
        for record in &remote {
            let Some(user) = user_service::find_by_username(&txn, &record.user).await? else {
                summary.skipped += 1;
                warn!(user = %record.user, external_id = %record.id, "User not found locally; skipping assignment.");
                continue;
            };
            let Some(plan) = plan_service::find_by_name(&txn, &record.profile).await? else {
                summary.skipped += 1;
                warn!(plan = %record.profile, external_id = %record.id, "Plan not found locally; skipping assignment.");
                continue;
            };

            let savepoint = txn.begin().await?;
            let result = assignment_service::upsert_from_router(&savepoint, user.id, plan.id, record).await;
            match settle(savepoint, result).await? {
                Ok((model, outcome)) => {
                    summary.record(outcome);
                    if outcome.wrote() {
                        info!(user = %record.user, plan = %record.profile, state = %model.derived_state(), ?outcome, "Reconciled router user-profile.");
                        events.push(CommitEvent::from_router(
                            EntityKind::PlanAssignment,
                            model.id,
                            model.external_id,
                        ));
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(external_id = %record.id, error = %e, "Failed to reconcile router user-profile; skipping.");
                }
            }
        }
        txn.commit().await?;

        self.announce(events);
        Ok(summary)
    }

    #[instrument(skip(self))]
    async fn sync_sessions(&self) -> Result<PassSummary, SyncError> {
        let remote = self.router.list::<Sessions>().await?;
        let mut summary = PassSummary::new(Pass::Sessions, remote.len());
        let mut persisted: Vec<session::Model> = Vec::with_capacity(remote.len());

        let txn = self.store.db().begin().await?;
        for record in &remote {
            let Some(user) = user_service::find_by_username(&txn, &record.user).await? else {
                summary.skipped += 1;
                warn!(user = %record.user, session_id = %record.session_id, "User not found locally; skipping session.");
                continue;
            };

            let savepoint = txn.begin().await?;
            let result = session_service::upsert_from_router(&savepoint, user.id, record).await;
            match settle(savepoint, result).await? {
                Ok((model, outcome)) => {
                    summary.record(outcome);
                    if outcome.wrote() {
                        debug!(session_id = %model.session_id, status = %model.classify(), ?outcome, "Reconciled router session.");
                    }
                    persisted.push(model);
                }
                Err(e) => {
                    summary.failed += 1;
                    warn!(session_id = %record.session_id, error = %e, "Failed to reconcile router session; skipping.");
                }
            }
        }
        txn.commit().await?;

        // Observers only ever see committed counters.
        for model in &persisted {
            self.notifier.publish(model);
        }
        Ok(summary)
    }
}
