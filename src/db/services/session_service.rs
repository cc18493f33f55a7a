use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

use super::UpsertOutcome;
use crate::db::entities::session;
use crate::router::models::RemoteSession;

pub async fn find_by_session_id<C: ConnectionTrait>(
    db: &C,
    session_id: &str,
) -> Result<Option<session::Model>, DbErr> {
    session::Entity::find()
        .filter(session::Column::SessionId.eq(session_id))
        .one(db)
        .await
}

/// Sessions of one user, newest first.
pub async fn list_for_user<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<Vec<session::Model>, DbErr> {
    session::Entity::find()
        .filter(session::Column::UserId.eq(user_id))
        .order_by_desc(session::Column::Started)
        .all(db)
        .await
}

fn differs(model: &session::Model, user_id: i32, remote: &RemoteSession) -> bool {
    model.user_id != user_id
        || model.download != remote.download
        || model.upload != remote.upload
        || model.uptime != remote.uptime
        || model.status != remote.status
        || model.started != remote.started
        || model.ended != remote.ended
        || model.last_accounting_packet != remote.last_accounting_packet
        || model.terminate_cause != remote.terminate_cause
        || model.user_address != remote.user_address
        || model.nas_ip_address != remote.nas_ip_address
        || model.nas_port_id != remote.nas_port_id
        || model.nas_port_type != remote.nas_port_type
        || model.calling_station_id != remote.calling_station_id
        || model.external_id.as_deref() != Some(remote.id.as_str())
}

fn apply(active: &mut session::ActiveModel, user_id: i32, remote: &RemoteSession) {
    active.user_id = Set(user_id);
    active.nas_ip_address = Set(remote.nas_ip_address.clone());
    active.nas_port_id = Set(remote.nas_port_id.clone());
    active.nas_port_type = Set(remote.nas_port_type.clone());
    active.calling_station_id = Set(remote.calling_station_id.clone());
    active.download = Set(remote.download);
    active.upload = Set(remote.upload);
    active.uptime = Set(remote.uptime.clone());
    active.status = Set(remote.status.clone());
    active.started = Set(remote.started);
    active.ended = Set(remote.ended);
    active.last_accounting_packet = Set(remote.last_accounting_packet);
    active.terminate_cause = Set(remote.terminate_cause.clone());
    active.user_address = Set(remote.user_address.clone());
    active.external_id = Set(Some(remote.id.clone()));
}

/// Reconciles a router session, matched by accounting session id.
pub async fn upsert_from_router<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    remote: &RemoteSession,
) -> Result<(session::Model, UpsertOutcome), DbErr> {
    let existing = session::Entity::find()
        .filter(session::Column::SessionId.eq(remote.session_id.as_str()))
        .lock_exclusive()
        .one(db)
        .await?;
    let now = Utc::now();

    match existing {
        Some(model) if !differs(&model, user_id, remote) => Ok((model, UpsertOutcome::Unchanged)),
        Some(model) => {
            let mut active = model.into_active_model();
            apply(&mut active, user_id, remote);
            active.updated_at = Set(now);
            Ok((active.update(db).await?, UpsertOutcome::Updated))
        }
        None => {
            let mut active = session::ActiveModel {
                session_id: Set(remote.session_id.clone()),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            apply(&mut active, user_id, remote);
            Ok((active.insert(db).await?, UpsertOutcome::Created))
        }
    }
}
