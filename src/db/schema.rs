//! Schema bootstrap. Tables are derived from the entities so the two never drift.

use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Schema};
use tracing::info;

use crate::db::entities::{payment, plan, plan_assignment, session, user};

pub const ASSIGNMENT_NATURAL_KEY_INDEX: &str = "idx_plan_assignments_natural_key";
pub const ASSIGNMENT_PENDING_INDEX: &str = "idx_plan_assignments_pending";

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    db.execute(backend.build(&stmt)).await?;
    Ok(())
}

/// Creates every table (parents first) and the assignment natural-key index. Idempotent.
pub async fn create_tables(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    create_table(db, &schema, user::Entity).await?;
    create_table(db, &schema, plan::Entity).await?;
    create_table(db, &schema, plan_assignment::Entity).await?;
    create_table(db, &schema, payment::Entity).await?;
    create_table(db, &schema, session::Entity).await?;

    let index = Index::create()
        .name(ASSIGNMENT_NATURAL_KEY_INDEX)
        .table(plan_assignment::Entity)
        .col(plan_assignment::Column::UserId)
        .col(plan_assignment::Column::PlanId)
        .col(plan_assignment::Column::State)
        .col(plan_assignment::Column::EndTime)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(backend.build(&index)).await?;

    // NULLs are distinct in the natural-key index, so unlinked pending rows need their own.
    db.execute_unprepared(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {ASSIGNMENT_PENDING_INDEX} ON plan_assignments (user_id, plan_id) \
         WHERE state IS NULL AND end_time IS NULL AND external_id IS NULL"
    ))
    .await?;

    info!("Database schema is ready.");
    Ok(())
}
