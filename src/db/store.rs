//! The local store: the only writer of persisted rows.
//!
//! Local mutations run in their own transaction; once it commits, the configured
//! [`CommitHook`] is consulted synchronously and any task it returns is queued.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, TransactionTrait};
use tracing::{debug, instrument};

use crate::db::entities::{payment, plan, plan_assignment, user};
use crate::db::hooks::{CommitEvent, CommitHook, EntityKind, PushTask};
use crate::db::services::assignment_service;
use crate::db::services::payment_service;
use crate::db::services::plan_service::{self, NewPlan, PlanChanges};
use crate::db::services::user_service::{self, NewUser, UserChanges};
use crate::sync::error::SyncError;
use crate::sync::queue::PushQueue;

#[derive(Clone)]
pub struct EntityStore {
    db: DatabaseConnection,
    hook: Arc<dyn CommitHook>,
    queue: PushQueue,
}

impl EntityStore {
    pub fn new(db: DatabaseConnection, hook: Arc<dyn CommitHook>, queue: PushQueue) -> Self {
        Self { db, hook, queue }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Runs the commit hook for a committed row and queues the resulting task.
    /// Returns whether a task was queued.
    pub fn notify(&self, event: CommitEvent) -> bool {
        match self.hook.on_commit(&event) {
            Some(task) => self.queue.enqueue(task),
            None => {
                debug!(kind = %event.kind, id = event.local_id, "Commit produced no push task.");
                false
            }
        }
    }

    /// Queues a task directly, bypassing the hook.
    pub fn enqueue(&self, task: PushTask) -> bool {
        self.queue.enqueue(task)
    }

    // --- Lookups ---

    pub async fn find_user(&self, id: i32) -> Result<Option<user::Model>, SyncError> {
        Ok(user_service::find_by_id(&self.db, id).await?)
    }

    pub async fn find_plan(&self, id: i32) -> Result<Option<plan::Model>, SyncError> {
        Ok(plan_service::find_by_id(&self.db, id).await?)
    }

    pub async fn find_assignment(&self, id: i32) -> Result<Option<plan_assignment::Model>, SyncError> {
        Ok(assignment_service::find_by_id(&self.db, id).await?)
    }

    pub async fn find_payment(&self, id: i32) -> Result<Option<payment::Model>, SyncError> {
        Ok(payment_service::find_by_id(&self.db, id).await?)
    }

    // --- Local mutations ---

    #[instrument(skip(self, new_user), fields(username = %new_user.username))]
    pub async fn create_user(&self, new_user: NewUser) -> Result<user::Model, SyncError> {
        let txn = self.db.begin().await?;
        let model = user_service::insert_local(&txn, new_user).await?;
        txn.commit().await?;
        self.notify(CommitEvent::local(EntityKind::User, model.id, model.external_id.clone()));
        Ok(model)
    }

    #[instrument(skip(self, changes))]
    pub async fn update_user(&self, id: i32, changes: UserChanges) -> Result<user::Model, SyncError> {
        let txn = self.db.begin().await?;
        let model = user_service::update_local(&txn, id, changes)
            .await?
            .ok_or(SyncError::NotFound {
                kind: EntityKind::User,
                id,
            })?;
        txn.commit().await?;
        self.notify(CommitEvent::local(EntityKind::User, model.id, model.external_id.clone()));
        Ok(model)
    }

    #[instrument(skip(self, new_plan), fields(plan = %new_plan.name))]
    pub async fn create_plan(&self, new_plan: NewPlan) -> Result<plan::Model, SyncError> {
        let txn = self.db.begin().await?;
        let model = plan_service::insert_local(&txn, new_plan).await?;
        txn.commit().await?;
        self.notify(CommitEvent::local(EntityKind::Plan, model.id, model.external_id.clone()));
        Ok(model)
    }

    #[instrument(skip(self, changes))]
    pub async fn update_plan(&self, id: i32, changes: PlanChanges) -> Result<plan::Model, SyncError> {
        let txn = self.db.begin().await?;
        let model = plan_service::update_local(&txn, id, changes)
            .await?
            .ok_or(SyncError::NotFound {
                kind: EntityKind::Plan,
                id,
            })?;
        txn.commit().await?;
        self.notify(CommitEvent::local(EntityKind::Plan, model.id, model.external_id.clone()));
        Ok(model)
    }

    #[instrument(skip(self))]
    pub async fn create_assignment(
        &self,
        user_id: i32,
        plan_id: i32,
        state: Option<String>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<plan_assignment::Model, SyncError> {
        let txn = self.db.begin().await?;
        if user_service::find_by_id(&txn, user_id).await?.is_none() {
            return Err(SyncError::Reference(format!("user #{user_id} does not exist")));
        }
        if plan_service::find_by_id(&txn, plan_id).await?.is_none() {
            return Err(SyncError::Reference(format!("plan #{plan_id} does not exist")));
        }
        let model = assignment_service::insert_local(&txn, user_id, plan_id, state, end_time).await?;
        txn.commit().await?;
        self.notify(CommitEvent::local(
            EntityKind::PlanAssignment,
            model.id,
            model.external_id.clone(),
        ));
        Ok(model)
    }

    #[instrument(skip(self))]
    pub async fn update_assignment(
        &self,
        id: i32,
        state: Option<String>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<plan_assignment::Model, SyncError> {
        let txn = self.db.begin().await?;
        let model = assignment_service::update_local(&txn, id, state, end_time)
            .await?
            .ok_or(SyncError::NotFound {
                kind: EntityKind::PlanAssignment,
                id,
            })?;
        txn.commit().await?;
        self.notify(CommitEvent::local(
            EntityKind::PlanAssignment,
            model.id,
            model.external_id.clone(),
        ));
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::hooks::{ChangeOrigin, NoopHook, PushOp};
    use crate::db::test_support::create_test_db;
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    /// Records every event and asks for a create on each.
    #[derive(Default)]
    struct RecordingHook {
        events: Mutex<Vec<CommitEvent>>,
    }

    impl CommitHook for RecordingHook {
        fn on_commit(&self, event: &CommitEvent) -> Option<PushTask> {
            self.events.lock().unwrap().push(event.clone());
            Some(PushTask::create(event.kind, event.local_id))
        }
    }

    #[tokio::test]
    async fn test_local_mutation_fires_hook_after_commit() {
        let (db, _dir) = create_test_db().await;
        let hook = Arc::new(RecordingHook::default());
        let (queue, mut rx) = PushQueue::new();
        let store = EntityStore::new(db, hook.clone(), queue);

        let plan = store
            .create_plan(NewPlan::new("daily", Decimal::new(500, 2), "1d"))
            .await
            .unwrap();

        let events = hook.events.lock().unwrap().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EntityKind::Plan);
        assert_eq!(events[0].local_id, plan.id);
        assert_eq!(events[0].origin, ChangeOrigin::Local);

        let task = rx.try_recv().unwrap();
        assert_eq!(task.op, PushOp::Create);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let (db, _dir) = create_test_db().await;
        let (queue, _rx) = PushQueue::new();
        let store = EntityStore::new(db, Arc::new(NoopHook), queue);

        let err = store.update_user(42, UserChanges::default()).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound { kind: EntityKind::User, id: 42 }));
    }

    #[tokio::test]
    async fn test_assignment_requires_existing_user_and_plan() {
        let (db, _dir) = create_test_db().await;
        let (queue, mut rx) = PushQueue::new();
        let store = EntityStore::new(db, Arc::new(RecordingHook::default()), queue);

        let err = store.create_assignment(1, 1, None, None).await.unwrap_err();
        assert!(matches!(err, SyncError::Reference(_)));
        assert!(rx.try_recv().is_err(), "failed writes queue nothing");
    }
}
