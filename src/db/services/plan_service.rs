use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, IntoActiveModel, QueryFilter,
    QuerySelect, Set,
};

use super::UpsertOutcome;
use crate::db::entities::plan;
use crate::router::models::RemotePlan;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlan {
    pub name: String,
    pub display_name: String,
    pub price: Decimal,
    pub starts_when: String,
    pub validity: String,
    pub override_shared_users: String,
}

impl NewPlan {
    pub fn new(name: impl Into<String>, price: Decimal, validity: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            price,
            starts_when: "assigned".to_string(),
            validity: validity.into(),
            override_shared_users: "off".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanChanges {
    pub display_name: Option<String>,
    pub price: Option<Decimal>,
    pub starts_when: Option<String>,
    pub validity: Option<String>,
    pub override_shared_users: Option<String>,
}

pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: i32) -> Result<Option<plan::Model>, DbErr> {
    plan::Entity::find_by_id(id).one(db).await
}

pub async fn find_by_name<C: ConnectionTrait>(db: &C, name: &str) -> Result<Option<plan::Model>, DbErr> {
    plan::Entity::find().filter(plan::Column::Name.eq(name)).one(db).await
}

pub async fn insert_local<C: ConnectionTrait>(db: &C, new_plan: NewPlan) -> Result<plan::Model, DbErr> {
    if new_plan.price.is_sign_negative() && !new_plan.price.is_zero() {
        return Err(DbErr::Custom(format!("plan price must be non-negative, got {}", new_plan.price)));
    }
    let now = Utc::now();
    plan::ActiveModel {
        name: Set(new_plan.name),
        display_name: Set(new_plan.display_name),
        price: Set(new_plan.price),
        starts_when: Set(new_plan.starts_when),
        validity: Set(new_plan.validity),
        override_shared_users: Set(new_plan.override_shared_users),
        external_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
}

pub async fn update_local<C: ConnectionTrait>(
    db: &C,
    id: i32,
    changes: PlanChanges,
) -> Result<Option<plan::Model>, DbErr> {
    let Some(model) = plan::Entity::find_by_id(id).lock_exclusive().one(db).await? else {
        return Ok(None);
    };
    let mut active = model.into_active_model();
    if let Some(display_name) = changes.display_name {
        active.display_name = Set(display_name);
    }
    if let Some(price) = changes.price {
        if price.is_sign_negative() && !price.is_zero() {
            return Err(DbErr::Custom(format!("plan price must be non-negative, got {price}")));
        }
        active.price = Set(price);
    }
    if let Some(starts_when) = changes.starts_when {
        active.starts_when = Set(starts_when);
    }
    if let Some(validity) = changes.validity {
        active.validity = Set(validity);
    }
    if let Some(policy) = changes.override_shared_users {
        active.override_shared_users = Set(policy);
    }
    active.updated_at = Set(Utc::now());
    active.update(db).await.map(Some)
}

/// For each name the router lists more than once, the external id the local row already
/// carries, provided it is still one of the listed ids for that name.
pub async fn linked_ids_for_repeated_names<C: ConnectionTrait>(
    db: &C,
    remote: &[RemotePlan],
) -> Result<HashMap<String, String>, DbErr> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in remote {
        *counts.entry(record.name.as_str()).or_default() += 1;
    }

    let mut linked = HashMap::new();
    for (name, _) in counts.into_iter().filter(|(_, count)| *count > 1) {
        let Some(external_id) = find_by_name(db, name).await?.and_then(|model| model.external_id) else {
            continue;
        };
        if remote.iter().any(|r| r.name == name && r.id == external_id) {
            linked.insert(name.to_string(), external_id);
        }
    }
    Ok(linked)
}

/// Reconciles a router profile into the local store, matched by plan name.
pub async fn upsert_from_router<C: ConnectionTrait>(
    db: &C,
    remote: &RemotePlan,
) -> Result<(plan::Model, UpsertOutcome), DbErr> {
    let existing = plan::Entity::find()
        .filter(plan::Column::Name.eq(remote.name.as_str()))
        .lock_exclusive()
        .one(db)
        .await?;
    let display_name = if remote.name_for_users.is_empty() {
        remote.name.clone()
    } else {
        remote.name_for_users.clone()
    };

    let now = Utc::now();
    match existing {
        Some(model) => {
            // Decimals compare by value, so 25 == 25.00 after a round trip through the database.
            let unchanged = model.display_name == display_name
                && model.price == remote.price
                && model.starts_when == remote.starts_when
                && model.validity == remote.validity
                && model.override_shared_users == remote.override_shared_users
                && model.external_id.as_deref() == Some(remote.id.as_str());
            if unchanged {
                return Ok((model, UpsertOutcome::Unchanged));
            }

            let mut active = model.into_active_model();
            active.display_name = Set(display_name);
            active.price = Set(remote.price);
            active.starts_when = Set(remote.starts_when.clone());
            active.validity = Set(remote.validity.clone());
            active.override_shared_users = Set(remote.override_shared_users.clone());
            active.external_id = Set(Some(remote.id.clone()));
            active.updated_at = Set(now);
            Ok((active.update(db).await?, UpsertOutcome::Updated))
        }
        None => {
            let inserted = plan::ActiveModel {
                name: Set(remote.name.clone()),
                display_name: Set(display_name),
                price: Set(remote.price),
                starts_when: Set(remote.starts_when.clone()),
                validity: Set(remote.validity.clone()),
                override_shared_users: Set(remote.override_shared_users.clone()),
                external_id: Set(Some(remote.id.clone())),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(db)
            .await?;
            Ok((inserted, UpsertOutcome::Created))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::create_test_db;
    use sea_orm::PaginatorTrait;

    fn remote_plan(id: &str, name: &str, price: Decimal) -> RemotePlan {
        RemotePlan {
            id: id.into(),
            name: name.into(),
            name_for_users: String::new(),
            price,
            starts_when: "assigned".into(),
            validity: "1d 00:00:00".into(),
            override_shared_users: "off".into(),
        }
    }

    #[tokio::test]
    async fn test_same_name_updates_existing_row() {
        let (db, _dir) = create_test_db().await;

        let (first, outcome) = upsert_from_router(&db, &remote_plan("*A", "daily", Decimal::new(500, 2)))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);
        assert_eq!(first.display_name, "daily");

        let (second, outcome) = upsert_from_router(&db, &remote_plan("*A", "daily", Decimal::new(750, 2)))
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(second.id, first.id);
        assert_eq!(second.price, Decimal::new(750, 2));
        assert_eq!(plan::Entity::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_plan_is_not_rewritten() {
        let (db, _dir) = create_test_db().await;
        let remote = remote_plan("*B", "weekly", Decimal::new(2500, 2));
        let (created, _) = upsert_from_router(&db, &remote).await.unwrap();

        let (again, outcome) = upsert_from_router(&db, &remote).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);
        assert_eq!(again.updated_at, created.updated_at);
    }

    #[tokio::test]
    async fn test_negative_price_rejected() {
        let (db, _dir) = create_test_db().await;
        let result = insert_local(&db, NewPlan::new("bad", Decimal::new(-1, 0), "1d")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_repeated_names_keep_the_linked_id() {
        let (db, _dir) = create_test_db().await;
        upsert_from_router(&db, &remote_plan("*B", "daily", Decimal::new(500, 2))).await.unwrap();

        let listed = vec![
            remote_plan("*A", "daily", Decimal::new(500, 2)),
            remote_plan("*B", "daily", Decimal::new(500, 2)),
            remote_plan("*C", "weekly", Decimal::new(2500, 2)),
        ];
        let linked = linked_ids_for_repeated_names(&db, &listed).await.unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked.get("daily").map(String::as_str), Some("*B"));
    }
}
