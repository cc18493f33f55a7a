use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, IntoActiveModel, QueryFilter,
    QuerySelect, Set,
};

use super::UpsertOutcome;
use crate::db::entities::user;
use crate::router::models::RemoteUser;

// --- User Service Functions ---

/// Fields for a user created locally (sign-up or admin).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub group_name: String,
    pub disabled: bool,
    pub shared_users: i32,
    pub attributes: String,
    pub password: String,
}

impl NewUser {
    pub fn named(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            group_name: String::new(),
            disabled: false,
            shared_users: 1,
            attributes: String::new(),
            password: String::new(),
        }
    }
}

/// Partial edit; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    pub group_name: Option<String>,
    pub disabled: Option<bool>,
    pub shared_users: Option<i32>,
    pub attributes: Option<String>,
    pub password: Option<String>,
}

pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: i32) -> Result<Option<user::Model>, DbErr> {
    user::Entity::find_by_id(id).one(db).await
}

pub async fn find_by_username<C: ConnectionTrait>(db: &C, username: &str) -> Result<Option<user::Model>, DbErr> {
    user::Entity::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await
}

pub async fn insert_local<C: ConnectionTrait>(db: &C, new_user: NewUser) -> Result<user::Model, DbErr> {
    let now = Utc::now();
    let active = user::ActiveModel {
        username: Set(new_user.username),
        group_name: Set(new_user.group_name),
        disabled: Set(new_user.disabled),
        shared_users: Set(new_user.shared_users.max(1)),
        attributes: Set(new_user.attributes),
        password: Set(new_user.password),
        otp_secret: Set(String::new()),
        external_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    active.insert(db).await
}

/// Applies a partial edit. Returns `None` if the user does not exist.
pub async fn update_local<C: ConnectionTrait>(
    db: &C,
    id: i32,
    changes: UserChanges,
) -> Result<Option<user::Model>, DbErr> {
    let Some(model) = user::Entity::find_by_id(id).lock_exclusive().one(db).await? else {
        return Ok(None);
    };
    let mut active = model.into_active_model();
    if let Some(group_name) = changes.group_name {
        active.group_name = Set(group_name);
    }
    if let Some(disabled) = changes.disabled {
        active.disabled = Set(disabled);
    }
    if let Some(shared_users) = changes.shared_users {
        active.shared_users = Set(shared_users.max(1));
    }
    if let Some(attributes) = changes.attributes {
        active.attributes = Set(attributes);
    }
    if let Some(password) = changes.password {
        active.password = Set(password);
    }
    active.updated_at = Set(Utc::now());
    active.update(db).await.map(Some)
}

/// Reconciles a router user into the local store, matched by login name.
pub async fn upsert_from_router<C: ConnectionTrait>(
    db: &C,
    remote: &RemoteUser,
) -> Result<(user::Model, UpsertOutcome), DbErr> {
    let existing = user::Entity::find()
        .filter(user::Column::Username.eq(remote.name.as_str()))
        .lock_exclusive()
        .one(db)
        .await?;

    let now = Utc::now();
    match existing {
        Some(model) => {
            let unchanged = model.group_name == remote.group
                && model.disabled == remote.disabled
                && model.shared_users == remote.shared_users
                && model.password == remote.password
                && model.otp_secret == remote.otp_secret
                && model.attributes == remote.attributes
                && model.external_id.as_deref() == Some(remote.id.as_str());
            if unchanged {
                return Ok((model, UpsertOutcome::Unchanged));
            }

            let mut active = model.into_active_model();
            active.group_name = Set(remote.group.clone());
            active.disabled = Set(remote.disabled);
            active.shared_users = Set(remote.shared_users);
            active.password = Set(remote.password.clone());
            active.otp_secret = Set(remote.otp_secret.clone());
            active.attributes = Set(remote.attributes.clone());
            active.external_id = Set(Some(remote.id.clone()));
            active.updated_at = Set(now);
            let updated = active.update(db).await?;
            Ok((updated, UpsertOutcome::Updated))
        }
        None => {
            let active = user::ActiveModel {
                username: Set(remote.name.clone()),
                group_name: Set(remote.group.clone()),
                disabled: Set(remote.disabled),
                shared_users: Set(remote.shared_users),
                attributes: Set(remote.attributes.clone()),
                password: Set(remote.password.clone()),
                otp_secret: Set(remote.otp_secret.clone()),
                external_id: Set(Some(remote.id.clone())),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            let inserted = active.insert(db).await?;
            Ok((inserted, UpsertOutcome::Created))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::create_test_db;
    use sea_orm::PaginatorTrait;

    fn remote_alice() -> RemoteUser {
        RemoteUser {
            id: "*1".into(),
            name: "alice".into(),
            group: "g1".into(),
            disabled: false,
            shared_users: 2,
            password: String::new(),
            otp_secret: String::new(),
            attributes: String::new(),
        }
    }

    #[tokio::test]
    async fn test_upsert_creates_then_is_unchanged() {
        let (db, _dir) = create_test_db().await;

        let (created, outcome) = upsert_from_router(&db, &remote_alice()).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);
        assert_eq!(created.username, "alice");
        assert_eq!(created.group_name, "g1");
        assert!(!created.disabled);
        assert_eq!(created.shared_users, 2);
        assert_eq!(created.external_id.as_deref(), Some("*1"));

        let (_, outcome) = upsert_from_router(&db, &remote_alice()).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);
        assert_eq!(user::Entity::find().count(&db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_adopts_local_user_and_applies_changes() {
        let (db, _dir) = create_test_db().await;
        let local = insert_local(&db, NewUser::named("alice")).await.unwrap();
        assert!(local.external_id.is_none());

        let mut remote = remote_alice();
        remote.disabled = true;
        let (updated, outcome) = upsert_from_router(&db, &remote).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(updated.id, local.id);
        assert!(updated.disabled);
        assert_eq!(updated.external_id.as_deref(), Some("*1"));
    }

    #[tokio::test]
    async fn test_update_local_partial() {
        let (db, _dir) = create_test_db().await;
        let local = insert_local(&db, NewUser::named("bob")).await.unwrap();

        let changes = UserChanges {
            group_name: Some("vip".into()),
            shared_users: Some(0),
            ..Default::default()
        };
        let updated = update_local(&db, local.id, changes).await.unwrap().unwrap();
        assert_eq!(updated.group_name, "vip");
        assert_eq!(updated.shared_users, 1, "seat count never drops below one");
        assert!(update_local(&db, 999, UserChanges::default()).await.unwrap().is_none());
    }
}
