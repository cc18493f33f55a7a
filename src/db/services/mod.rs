//! Free functions over any `ConnectionTrait`, so callers choose between the pool and an
//! open transaction.

pub mod assignment_service;
pub mod payment_service;
pub mod plan_service;
pub mod session_service;
pub mod user_service;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, SqlErr};

use crate::db::entities::{payment, plan, plan_assignment, session, user};

/// Result of reconciling one remote record into the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

impl UpsertOutcome {
    pub fn wrote(&self) -> bool {
        !matches!(self, UpsertOutcome::Unchanged)
    }
}

/// Tables carrying an `external_id` correlation column.
pub trait ExternallyKeyed: EntityTrait {
    fn id_column() -> Self::Column;
    fn external_id_column() -> Self::Column;
    fn updated_at_column() -> Self::Column;
}

macro_rules! externally_keyed {
    ($($module:ident),+) => {
        $(
            impl ExternallyKeyed for $module::Entity {
                fn id_column() -> Self::Column {
                    $module::Column::Id
                }
                fn external_id_column() -> Self::Column {
                    $module::Column::ExternalId
                }
                fn updated_at_column() -> Self::Column {
                    $module::Column::UpdatedAt
                }
            }
        )+
    };
}

externally_keyed!(user, plan, plan_assignment, payment, session);

pub async fn find_by_external_id<E, C>(db: &C, external_id: &str) -> Result<Option<E::Model>, DbErr>
where
    E: ExternallyKeyed,
    C: ConnectionTrait,
{
    E::find()
        .filter(E::external_id_column().eq(external_id))
        .one(db)
        .await
}

/// Records the router id on a row that does not have one yet.
///
/// Compare-and-set: returns `false` when the row is gone or another writer already
/// recorded an id, in which case nothing is changed.
pub async fn set_external_id<E, C>(db: &C, id: i32, external_id: &str) -> Result<bool, DbErr>
where
    E: ExternallyKeyed,
    C: ConnectionTrait,
{
    let result = E::update_many()
        .col_expr(E::external_id_column(), Expr::value(external_id))
        .col_expr(E::updated_at_column(), Expr::value(Utc::now()))
        .filter(E::id_column().eq(id))
        .filter(E::external_id_column().is_null())
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

/// Whether `external_id` is recorded on some row other than `id`.
pub async fn linked_elsewhere<E, C>(db: &C, id: i32, external_id: &str) -> Result<bool, DbErr>
where
    E: ExternallyKeyed,
    C: ConnectionTrait,
{
    let other = E::find()
        .filter(E::external_id_column().eq(external_id))
        .filter(E::id_column().ne(id))
        .one(db)
        .await?;
    Ok(other.is_some())
}

/// Forgets the router id of row `id`, but only while it still holds `external_id`.
pub async fn clear_external_id<E, C>(db: &C, id: i32, external_id: &str) -> Result<bool, DbErr>
where
    E: ExternallyKeyed,
    C: ConnectionTrait,
{
    let result = E::update_many()
        .col_expr(E::external_id_column(), Expr::value(Option::<String>::None))
        .col_expr(E::updated_at_column(), Expr::value(Utc::now()))
        .filter(E::id_column().eq(id))
        .filter(E::external_id_column().eq(external_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected == 1)
}

pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::services::user_service::{self, NewUser};
    use crate::db::test_support::create_test_db;

    #[tokio::test]
    async fn test_set_external_id_is_compare_and_set() {
        let (db, _dir) = create_test_db().await;
        let alice = user_service::insert_local(&db, NewUser::named("alice")).await.unwrap();

        assert!(set_external_id::<user::Entity, _>(&db, alice.id, "*1").await.unwrap());
        assert!(!set_external_id::<user::Entity, _>(&db, alice.id, "*2").await.unwrap());

        let stored = find_by_external_id::<user::Entity, _>(&db, "*1").await.unwrap().unwrap();
        assert_eq!(stored.id, alice.id);
        assert!(find_by_external_id::<user::Entity, _>(&db, "*2").await.unwrap().is_none());

        assert!(!clear_external_id::<user::Entity, _>(&db, alice.id, "*9").await.unwrap());
        assert!(clear_external_id::<user::Entity, _>(&db, alice.id, "*1").await.unwrap());
        assert!(set_external_id::<user::Entity, _>(&db, alice.id, "*2").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_external_id_is_unique_violation() {
        let (db, _dir) = create_test_db().await;
        let alice = user_service::insert_local(&db, NewUser::named("alice")).await.unwrap();
        let bob = user_service::insert_local(&db, NewUser::named("bob")).await.unwrap();

        set_external_id::<user::Entity, _>(&db, alice.id, "*1").await.unwrap();
        let err = set_external_id::<user::Entity, _>(&db, bob.id, "*1").await.unwrap_err();
        assert!(is_unique_violation(&err));
    }
}
