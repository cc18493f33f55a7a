use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plans")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)] // Matched against the router profile name
    pub name: String,
    pub display_name: String,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub price: Decimal,
    pub starts_when: String,
    pub validity: String,
    pub override_shared_users: String,
    #[sea_orm(unique, nullable)]
    pub external_id: Option<String>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::plan_assignment::Entity")]
    PlanAssignments,
}

impl Related<super::plan_assignment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PlanAssignments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
