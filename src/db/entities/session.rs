use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::enums::SessionStatus;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Accounting session id reported by the NAS.
    #[sea_orm(unique)]
    pub session_id: String,
    pub user_id: i32,
    pub nas_ip_address: Option<String>,
    pub nas_port_id: Option<String>,
    pub nas_port_type: Option<String>,
    pub calling_station_id: Option<String>,
    pub download: i64,
    pub upload: i64,
    pub uptime: Option<String>,
    pub status: String,
    pub started: Option<ChronoDateTimeUtc>,
    pub ended: Option<ChronoDateTimeUtc>,
    pub last_accounting_packet: Option<ChronoDateTimeUtc>,
    pub terminate_cause: Option<String>,
    pub user_address: Option<String>,
    #[sea_orm(unique, nullable)]
    pub external_id: Option<String>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

impl Model {
    pub fn classify(&self) -> SessionStatus {
        SessionStatus::classify(&self.status)
    }

    pub fn total_traffic(&self) -> i64 {
        self.download.saturating_add(self.upload)
    }

    /// Termination cause as shown to subscribers.
    pub fn display_terminate_cause(&self) -> Option<&str> {
        match self.terminate_cause.as_deref() {
            Some("Admin Reset") => Some("data finished"),
            other => other,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade",
        on_update = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
