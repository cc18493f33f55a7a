//! Push-sync: writes local rows to the router and records the ids it hands back.

use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::db::entities::{payment, plan, plan_assignment, user};
use crate::db::hooks::{EntityKind, PushOp, PushTask};
use crate::db::services::{
    self, ExternallyKeyed, assignment_service, payment_service, plan_service, user_service,
};
use crate::router::models::{AssignmentPayload, PaymentPayload, PlanPayload, UserPayload};
use crate::router::wire::format_timestamp;
use crate::router::{Assignments, Payments, Plans, RouterClient, RouterResource, Users};
use crate::sync::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum PushOutcome {
    Created { external_id: String },
    Updated { external_id: String },
    Deleted { external_id: String },
    /// Nothing was sent; the reason is logged and reported.
    Skipped { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Succeeded,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushFailure {
    pub id: i32,
    pub reason: String,
}

/// Per-item result of a bulk push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub succeeded: Vec<i32>,
    pub skipped: Vec<i32>,
    pub failed: Vec<PushFailure>,
}

impl SyncSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

fn flag(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

fn user_payload(model: &user::Model) -> UserPayload {
    UserPayload {
        name: Some(model.username.clone()),
        group: Some(model.group_name.clone()),
        shared_users: Some(model.shared_users.max(1).to_string()),
        disabled: Some(flag(model.disabled)),
        attributes: Some(model.attributes.clone()),
        password: Some(model.password.clone()),
    }
}

fn plan_payload(model: &plan::Model) -> PlanPayload {
    PlanPayload {
        name: Some(model.name.clone()),
        name_for_users: Some(model.display_name.clone()),
        price: Some(format!("{:.2}", model.price)),
        starts_when: Some(model.starts_when.clone()),
        validity: Some(model.validity.clone()),
        override_shared_users: Some(model.override_shared_users.clone()),
    }
}

pub struct PushExecutor {
    router: RouterClient,
    db: DatabaseConnection,
}

impl PushExecutor {
    pub fn new(router: RouterClient, db: DatabaseConnection) -> Self {
        Self { router, db }
    }

    /// Runs one task to completion. Failures stop here: they are logged and reported as
    /// [`TaskStatus::Failed`], never propagated to whoever queued the task.
    #[instrument(skip(self), fields(task = %task))]
    pub async fn execute(&self, task: PushTask) -> TaskStatus {
        match self.run(&task).await {
            Ok(PushOutcome::Skipped { reason }) => {
                warn!(reason = %reason, "Push task skipped.");
                TaskStatus::Skipped
            }
            Ok(outcome) => {
                info!(?outcome, "Push task completed.");
                TaskStatus::Succeeded
            }
            Err(e @ SyncError::NotFound { .. }) => {
                warn!(error = %e, "Push task target no longer exists.");
                TaskStatus::Failed
            }
            Err(e) => {
                error!(error = %e, retryable = e.is_retryable(), "Push task failed.");
                TaskStatus::Failed
            }
        }
    }

    pub async fn push_create(&self, kind: EntityKind, local_id: i32) -> Result<PushOutcome, SyncError> {
        self.run(&PushTask::create(kind, local_id)).await
    }

    pub async fn push_update(&self, kind: EntityKind, local_id: i32) -> Result<PushOutcome, SyncError> {
        self.run(&PushTask::update(kind, local_id)).await
    }

    pub async fn push_delete(
        &self,
        kind: EntityKind,
        local_id: i32,
        external_id: &str,
    ) -> Result<PushOutcome, SyncError> {
        self.run(&PushTask::delete(kind, local_id, external_id)).await
    }

    /// Pushes many rows of one kind, one at a time, and reports each item.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn push_all(&self, kind: EntityKind, ids: &[i32], op: PushOp) -> SyncSummary {
        let mut summary = SyncSummary::default();
        for &id in ids {
            let task = PushTask {
                kind,
                local_id: id,
                op: op.clone(),
            };
            match self.run(&task).await {
                Ok(PushOutcome::Skipped { .. }) => summary.skipped.push(id),
                Ok(_) => summary.succeeded.push(id),
                Err(e) => {
                    warn!(id, error = %e, "Bulk push item failed.");
                    summary.failed.push(PushFailure {
                        id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        info!(
            succeeded = summary.succeeded.len(),
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "Bulk push finished."
        );
        summary
    }

    async fn run(&self, task: &PushTask) -> Result<PushOutcome, SyncError> {
        let id = task.local_id;
        let wants_create = match &task.op {
            PushOp::Create => true,
            PushOp::Update => false,
            PushOp::Delete { external_id } => return self.delete(task.kind, id, external_id).await,
        };

        match task.kind {
            EntityKind::User => {
                let model = user_service::find_by_id(&self.db, id)
                    .await?
                    .ok_or(SyncError::NotFound { kind: task.kind, id })?;
                self.push_record::<Users, user::Entity, _>(
                    id,
                    wants_create,
                    model.external_id.as_deref(),
                    &user_payload(&model),
                )
                .await
            }
            EntityKind::Plan => {
                let model = plan_service::find_by_id(&self.db, id)
                    .await?
                    .ok_or(SyncError::NotFound { kind: task.kind, id })?;
                self.push_record::<Plans, plan::Entity, _>(
                    id,
                    wants_create,
                    model.external_id.as_deref(),
                    &plan_payload(&model),
                )
                .await
            }
            EntityKind::PlanAssignment => {
                let model = assignment_service::find_by_id(&self.db, id)
                    .await?
                    .ok_or(SyncError::NotFound { kind: task.kind, id })?;
                let payload = self.assignment_payload(&model).await?;
                self.push_record::<Assignments, plan_assignment::Entity, _>(
                    id,
                    wants_create,
                    model.external_id.as_deref(),
                    &payload,
                )
                .await
            }
            EntityKind::Payment => {
                let model = payment_service::find_by_id(&self.db, id)
                    .await?
                    .ok_or(SyncError::NotFound { kind: task.kind, id })?;
                let payload = self.payment_payload(&model).await?;
                self.push_record::<Payments, payment::Entity, _>(
                    id,
                    wants_create,
                    model.external_id.as_deref(),
                    &payload,
                )
                .await
            }
        }
    }

    async fn push_record<R, E, P>(
        &self,
        local_id: i32,
        wants_create: bool,
        external_id: Option<&str>,
        payload: &P,
    ) -> Result<PushOutcome, SyncError>
    where
        R: RouterResource<Create = P, Update = P>,
        E: ExternallyKeyed,
        P: Serialize + Sync,
    {
        match (wants_create, external_id) {
            (true, None) => {
                let external_id = self.router.create::<R>(payload).await?;
                let txn = self.db.begin().await?;
                let recorded = services::set_external_id::<E, _>(&txn, local_id, &external_id).await?;
                txn.commit().await?;
                if !recorded {
                    return Err(SyncError::Conflict(format!(
                        "{} #{local_id} gained an external id while {external_id} was being created",
                        R::NAME
                    )));
                }
                Ok(PushOutcome::Created { external_id })
            }
            (true, Some(existing)) => {
                info!(resource = R::NAME, local_id, external_id = existing, "Already on the router; updating instead.");
                self.router.update::<R>(existing, payload).await?;
                Ok(PushOutcome::Updated {
                    external_id: existing.to_string(),
                })
            }
            (false, Some(existing)) => {
                self.router.update::<R>(existing, payload).await?;
                Ok(PushOutcome::Updated {
                    external_id: existing.to_string(),
                })
            }
            (false, None) => Ok(PushOutcome::Skipped {
                reason: format!("{} #{local_id} has no external id to update", R::NAME),
            }),
        }
    }

    async fn delete(&self, kind: EntityKind, local_id: i32, external_id: &str) -> Result<PushOutcome, SyncError> {
        if external_id.trim().is_empty() {
            return Err(SyncError::Invalid(format!("cannot delete {kind} #{local_id} without an external id")));
        }
        let cleared = match kind {
            EntityKind::User => self.delete_remote::<Users, user::Entity>(local_id, external_id).await?,
            EntityKind::Plan => self.delete_remote::<Plans, plan::Entity>(local_id, external_id).await?,
            EntityKind::PlanAssignment => {
                self.delete_remote::<Assignments, plan_assignment::Entity>(local_id, external_id)
                    .await?
            }
            EntityKind::Payment => self.delete_remote::<Payments, payment::Entity>(local_id, external_id).await?,
        };
        if !cleared {
            info!(%kind, local_id, external_id, "Remote record deleted; no local row to unlink.");
        }
        Ok(PushOutcome::Deleted {
            external_id: external_id.to_string(),
        })
    }

    async fn delete_remote<R: RouterResource, E: ExternallyKeyed>(
        &self,
        local_id: i32,
        external_id: &str,
    ) -> Result<bool, SyncError> {
        if services::linked_elsewhere::<E, _>(&self.db, local_id, external_id).await? {
            return Err(SyncError::Conflict(format!(
                "{} {external_id} belongs to another local record",
                R::NAME
            )));
        }
        self.router.delete::<R>(external_id).await?;
        let txn = self.db.begin().await?;
        let cleared = services::clear_external_id::<E, _>(&txn, local_id, external_id).await?;
        txn.commit().await?;
        Ok(cleared)
    }

    async fn assignment_payload(&self, model: &plan_assignment::Model) -> Result<AssignmentPayload, SyncError> {
        let user = user_service::find_by_id(&self.db, model.user_id)
            .await?
            .ok_or_else(|| SyncError::Reference(format!("assignment #{} has no user", model.id)))?;
        let plan = plan_service::find_by_id(&self.db, model.plan_id)
            .await?
            .ok_or_else(|| SyncError::Reference(format!("assignment #{} has no plan", model.id)))?;
        Ok(AssignmentPayload {
            user: Some(user.username),
            profile: Some(plan.name),
            state: model.state.clone(),
            end_time: model.end_time.as_ref().map(format_timestamp),
        })
    }

    async fn payment_payload(&self, model: &payment::Model) -> Result<PaymentPayload, SyncError> {
        let user = user_service::find_by_id(&self.db, model.user_id)
            .await?
            .ok_or_else(|| SyncError::Reference(format!("payment #{} has no user", model.id)))?;
        let plan_id = match model.plan_id {
            Some(plan_id) => Some(plan_id),
            None => assignment_service::find_by_id(&self.db, model.assignment_id)
                .await?
                .map(|a| a.plan_id),
        };
        let plan_name = match plan_id {
            Some(plan_id) => plan_service::find_by_id(&self.db, plan_id).await?.map(|p| p.name),
            None => None,
        };
        Ok(PaymentPayload {
            user: Some(user.username),
            profile: plan_name,
            method: Some(model.method.router_value().to_string()),
            copy_from: model.copy_from.clone(),
            trans_start: model.started_at.as_ref().map(format_timestamp),
            trans_end: model.ended_at.as_ref().map(format_timestamp),
            trans_status: Some(model.status.router_value().to_string()),
            user_message: model.user_message.clone(),
            currency: Some(model.currency.clone()),
            price: Some(format!("{:.2}", model.amount)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::services::plan_service::NewPlan;
    use crate::db::services::user_service::NewUser;
    use crate::db::test_support::create_test_db;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn executor_for(server: &MockServer) -> (PushExecutor, tempfile::TempDir) {
        let (db, dir) = create_test_db().await;
        let router = RouterClient::new(&server.uri(), "admin", "pw", Duration::from_secs(2)).unwrap();
        (PushExecutor::new(router, db), dir)
    }

    #[tokio::test]
    async fn test_plan_create_writes_back_then_updates() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/rest/user-manager/profile"))
            .and(body_partial_json(json!({ "name": "weekly", "price": "25.00" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ ".id": "*P1" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/user-manager/profile/*P1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let (executor, _dir) = executor_for(&server).await;
        let plan = plan_service::insert_local(&executor.db, NewPlan::new("weekly", Decimal::new(2500, 2), "7d"))
            .await
            .unwrap();

        let outcome = executor.push_create(EntityKind::Plan, plan.id).await.unwrap();
        assert_eq!(outcome, PushOutcome::Created { external_id: "*P1".into() });
        let stored = plan_service::find_by_id(&executor.db, plan.id).await.unwrap().unwrap();
        assert_eq!(stored.external_id.as_deref(), Some("*P1"));

        let outcome = executor.push_update(EntityKind::Plan, plan.id).await.unwrap();
        assert_eq!(outcome, PushOutcome::Updated { external_id: "*P1".into() });
    }

    #[tokio::test]
    async fn test_create_with_known_external_id_becomes_update() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ ".id": "*dup" })))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/user-manager/user/*U1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let (executor, _dir) = executor_for(&server).await;
        let user = user_service::insert_local(&executor.db, NewUser::named("alice")).await.unwrap();
        services::set_external_id::<user::Entity, _>(&executor.db, user.id, "*U1").await.unwrap();

        let status = executor.execute(PushTask::create(EntityKind::User, user.id)).await;
        assert_eq!(status, TaskStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_update_without_external_id_is_skipped() {
        let server = MockServer::start().await;
        let (executor, _dir) = executor_for(&server).await;
        let user = user_service::insert_local(&executor.db, NewUser::named("bob")).await.unwrap();

        let status = executor.execute(PushTask::update(EntityKind::User, user.id)).await;
        assert_eq!(status, TaskStatus::Skipped);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_row_and_router_failure_mark_task_failed() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/rest/user-manager/user"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let (executor, _dir) = executor_for(&server).await;
        assert_eq!(
            executor.execute(PushTask::create(EntityKind::Plan, 999)).await,
            TaskStatus::Failed
        );

        let user = user_service::insert_local(&executor.db, NewUser::named("carol")).await.unwrap();
        assert_eq!(
            executor.execute(PushTask::create(EntityKind::User, user.id)).await,
            TaskStatus::Failed
        );
        let stored = user_service::find_by_id(&executor.db, user.id).await.unwrap().unwrap();
        assert!(stored.external_id.is_none());
    }

    #[tokio::test]
    async fn test_push_all_reports_each_item() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/rest/user-manager/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ ".id": "*N" })))
            .expect(1)
            .mount(&server)
            .await;

        let (executor, _dir) = executor_for(&server).await;
        let user = user_service::insert_local(&executor.db, NewUser::named("dave")).await.unwrap();

        let summary = executor.push_all(EntityKind::User, &[user.id, 404], PushOp::Create).await;
        assert_eq!(summary.succeeded, vec![user.id]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].id, 404);
        assert!(!summary.is_clean());
    }

    #[tokio::test]
    async fn test_delete_unlinks_local_row() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/user-manager/user/*D1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let (executor, _dir) = executor_for(&server).await;
        let user = user_service::insert_local(&executor.db, NewUser::named("erin")).await.unwrap();
        services::set_external_id::<user::Entity, _>(&executor.db, user.id, "*D1").await.unwrap();

        let outcome = executor.push_delete(EntityKind::User, user.id, "*D1").await.unwrap();
        assert_eq!(outcome, PushOutcome::Deleted { external_id: "*D1".into() });
        let stored = user_service::find_by_id(&executor.db, user.id).await.unwrap().unwrap();
        assert!(stored.external_id.is_none());
    }

    #[tokio::test]
    async fn test_delete_rejects_external_id_of_another_row() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let (executor, _dir) = executor_for(&server).await;
        let alice = user_service::insert_local(&executor.db, NewUser::named("alice")).await.unwrap();
        let bob = user_service::insert_local(&executor.db, NewUser::named("bob")).await.unwrap();
        services::set_external_id::<user::Entity, _>(&executor.db, alice.id, "*A").await.unwrap();
        services::set_external_id::<user::Entity, _>(&executor.db, bob.id, "*B").await.unwrap();

        let err = executor.push_delete(EntityKind::User, alice.id, "*B").await.unwrap_err();
        assert!(matches!(err, SyncError::Conflict(_)));

        let alice = user_service::find_by_id(&executor.db, alice.id).await.unwrap().unwrap();
        let bob = user_service::find_by_id(&executor.db, bob.id).await.unwrap().unwrap();
        assert_eq!(alice.external_id.as_deref(), Some("*A"));
        assert_eq!(bob.external_id.as_deref(), Some("*B"));
    }
}
