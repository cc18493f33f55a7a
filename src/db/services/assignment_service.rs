use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, IntoActiveModel, QueryFilter,
    QuerySelect, Set, Select, TransactionTrait,
};

use super::{UpsertOutcome, is_unique_violation};
use crate::db::entities::plan_assignment;
use crate::router::models::RemoteAssignment;

pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: i32) -> Result<Option<plan_assignment::Model>, DbErr> {
    plan_assignment::Entity::find_by_id(id).one(db).await
}

/// Filters on the natural key (user, plan, state, expiry); `None` matches SQL NULL.
fn natural_key(
    user_id: i32,
    plan_id: i32,
    state: Option<&str>,
    end_time: Option<DateTime<Utc>>,
) -> Select<plan_assignment::Entity> {
    let query = plan_assignment::Entity::find()
        .filter(plan_assignment::Column::UserId.eq(user_id))
        .filter(plan_assignment::Column::PlanId.eq(plan_id));
    let query = match state {
        Some(state) => query.filter(plan_assignment::Column::State.eq(state)),
        None => query.filter(plan_assignment::Column::State.is_null()),
    };
    match end_time {
        Some(end_time) => query.filter(plan_assignment::Column::EndTime.eq(end_time)),
        None => query.filter(plan_assignment::Column::EndTime.is_null()),
    }
}

pub async fn find_by_natural_key<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    plan_id: i32,
    state: Option<&str>,
    end_time: Option<DateTime<Utc>>,
) -> Result<Option<plan_assignment::Model>, DbErr> {
    natural_key(user_id, plan_id, state, end_time).one(db).await
}

pub async fn insert_local<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    plan_id: i32,
    state: Option<String>,
    end_time: Option<DateTime<Utc>>,
) -> Result<plan_assignment::Model, DbErr> {
    let now = Utc::now();
    plan_assignment::ActiveModel {
        user_id: Set(user_id),
        plan_id: Set(plan_id),
        state: Set(state),
        end_time: Set(end_time),
        external_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
}

fn unlinked_pending(user_id: i32, plan_id: i32) -> Select<plan_assignment::Entity> {
    natural_key(user_id, plan_id, None, None).filter(plan_assignment::Column::ExternalId.is_null())
}

/// Returns the pending assignment of `plan_id` to `user_id` that has not reached the router
/// yet, creating it if absent. The flag is `true` when a row was inserted.
///
/// A pending row that already has an external id belongs to an earlier purchase and is
/// never reused. A concurrent insert of the same pair loses on the pending index and
/// re-reads the winner's row.
pub async fn find_or_create_pending<C>(
    db: &C,
    user_id: i32,
    plan_id: i32,
) -> Result<(plan_assignment::Model, bool), DbErr>
where
    C: ConnectionTrait + TransactionTrait,
{
    if let Some(model) = unlinked_pending(user_id, plan_id).lock_exclusive().one(db).await? {
        return Ok((model, false));
    }

    let savepoint = db.begin().await?;
    match insert_local(&savepoint, user_id, plan_id, None, None).await {
        Ok(created) => {
            savepoint.commit().await?;
            Ok((created, true))
        }
        Err(e) if is_unique_violation(&e) => {
            savepoint.rollback().await?;
            let winner = unlinked_pending(user_id, plan_id).one(db).await?.ok_or(e)?;
            Ok((winner, false))
        }
        Err(e) => Err(e),
    }
}

pub async fn update_local<C: ConnectionTrait>(
    db: &C,
    id: i32,
    state: Option<String>,
    end_time: Option<DateTime<Utc>>,
) -> Result<Option<plan_assignment::Model>, DbErr> {
    let Some(model) = plan_assignment::Entity::find_by_id(id).lock_exclusive().one(db).await? else {
        return Ok(None);
    };
    let mut active = model.into_active_model();
    active.state = Set(state);
    active.end_time = Set(end_time);
    active.updated_at = Set(Utc::now());
    active.update(db).await.map(Some)
}

/// Reconciles a router user-profile whose user and plan are already resolved locally.
///
/// Matching is by external id. A row without an external id that has the same natural
/// key is adopted instead of duplicated. Only state and expiry are refreshed on a match.
pub async fn upsert_from_router<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    plan_id: i32,
    remote: &RemoteAssignment,
) -> Result<(plan_assignment::Model, UpsertOutcome), DbErr> {
    let state = remote.state.clone().filter(|s| !s.trim().is_empty());
    let now = Utc::now();

    let by_external_id = plan_assignment::Entity::find()
        .filter(plan_assignment::Column::ExternalId.eq(remote.id.as_str()))
        .lock_exclusive()
        .one(db)
        .await?;
    if let Some(model) = by_external_id {
        if model.state == state && model.end_time == remote.end_time {
            return Ok((model, UpsertOutcome::Unchanged));
        }
        let mut active = model.into_active_model();
        active.state = Set(state);
        active.end_time = Set(remote.end_time);
        active.updated_at = Set(now);
        return Ok((active.update(db).await?, UpsertOutcome::Updated));
    }

    let adoptable = natural_key(user_id, plan_id, state.as_deref(), remote.end_time)
        .filter(plan_assignment::Column::ExternalId.is_null())
        .lock_exclusive()
        .one(db)
        .await?;
    if let Some(model) = adoptable {
        let mut active = model.into_active_model();
        active.external_id = Set(Some(remote.id.clone()));
        active.updated_at = Set(now);
        return Ok((active.update(db).await?, UpsertOutcome::Updated));
    }

    let inserted = plan_assignment::ActiveModel {
        user_id: Set(user_id),
        plan_id: Set(plan_id),
        state: Set(state),
        end_time: Set(remote.end_time),
        external_id: Set(Some(remote.id.clone())),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok((inserted, UpsertOutcome::Created))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::AssignmentState;
    use crate::db::services::plan_service::{self, NewPlan};
    use crate::db::services::user_service::{self, NewUser};
    use crate::db::test_support::create_test_db;
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use sea_orm::{DatabaseConnection, PaginatorTrait};

    async fn seed(db: &DatabaseConnection) -> (i32, i32) {
        let user = user_service::insert_local(db, NewUser::named("alice")).await.unwrap();
        let plan = plan_service::insert_local(db, NewPlan::new("daily", Decimal::new(500, 2), "1d"))
            .await
            .unwrap();
        (user.id, plan.id)
    }

    fn remote(id: &str, state: Option<&str>) -> RemoteAssignment {
        RemoteAssignment {
            id: id.into(),
            user: "alice".into(),
            profile: "daily".into(),
            state: state.map(str::to_string),
            end_time: Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()),
        }
    }

    #[tokio::test]
    async fn test_upsert_updates_state_only_when_changed() {
        let (db, _dir) = create_test_db().await;
        let (user_id, plan_id) = seed(&db).await;

        let (created, outcome) = upsert_from_router(&db, user_id, plan_id, &remote("*5", Some("running-active")))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);
        assert_eq!(created.derived_state(), AssignmentState::Active);

        let (_, outcome) = upsert_from_router(&db, user_id, plan_id, &remote("*5", Some("running-active")))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);

        let (updated, outcome) = upsert_from_router(&db, user_id, plan_id, &remote("*5", Some("used")))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.derived_state(), AssignmentState::TimeElapsed);
        assert_eq!(plan_assignment::Entity::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_or_create_pending_is_stable() {
        let (db, _dir) = create_test_db().await;
        let (user_id, plan_id) = seed(&db).await;

        let (first, created) = find_or_create_pending(&db, user_id, plan_id).await.unwrap();
        assert!(created);
        let (second, created) = find_or_create_pending(&db, user_id, plan_id).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_linked_pending_row_is_not_reused() {
        let (db, _dir) = create_test_db().await;
        let (user_id, plan_id) = seed(&db).await;

        let (first, _) = find_or_create_pending(&db, user_id, plan_id).await.unwrap();
        assert!(crate::db::services::set_external_id::<plan_assignment::Entity, _>(&db, first.id, "*UP1")
            .await
            .unwrap());

        let (second, created) = find_or_create_pending(&db, user_id, plan_id).await.unwrap();
        assert!(created);
        assert_ne!(second.id, first.id);
        assert!(second.external_id.is_none());
    }

    #[tokio::test]
    async fn test_router_record_adopts_unsynced_local_row() {
        let (db, _dir) = create_test_db().await;
        let (user_id, plan_id) = seed(&db).await;
        let (pending, _) = find_or_create_pending(&db, user_id, plan_id).await.unwrap();

        let mut record = remote("*8", None);
        record.end_time = None;
        let (adopted, outcome) = upsert_from_router(&db, user_id, plan_id, &record).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(adopted.id, pending.id);
        assert_eq!(adopted.external_id.as_deref(), Some("*8"));
    }
}
