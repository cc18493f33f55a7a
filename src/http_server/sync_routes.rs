use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use serde::Deserialize;
use tracing::info;

use super::{AppError, AppState};
use crate::db::hooks::{EntityKind, PushOp};
use crate::sync::{PushOutcome, RunReport, SyncSummary};

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PushAction {
    Create,
    Update,
}

impl PushAction {
    fn op(self) -> PushOp {
        match self {
            PushAction::Create => PushOp::Create,
            PushAction::Update => PushOp::Update,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct BulkPushRequest {
    pub ids: Vec<i32>,
    pub action: PushAction,
}

#[derive(Deserialize, Debug)]
pub struct DeleteRequest {
    pub external_id: String,
}

fn parse_kind(kind: &str) -> Result<EntityKind, AppError> {
    kind.parse::<EntityKind>().map_err(AppError::InvalidInput)
}

async fn run_sync_handler(State(app_state): State<Arc<AppState>>) -> Result<Json<RunReport>, AppError> {
    info!("Reconciliation requested over HTTP.");
    let report = app_state.engine.run().await?;
    Ok(Json(report))
}

async fn push_one_handler(
    State(app_state): State<Arc<AppState>>,
    Path((kind, id, action)): Path<(String, i32, PushAction)>,
) -> Result<Json<PushOutcome>, AppError> {
    let kind = parse_kind(&kind)?;
    let outcome = match action {
        PushAction::Create => app_state.executor.push_create(kind, id).await?,
        PushAction::Update => app_state.executor.push_update(kind, id).await?,
    };
    Ok(Json(outcome))
}

async fn push_delete_handler(
    State(app_state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, i32)>,
    Json(payload): Json<DeleteRequest>,
) -> Result<Json<PushOutcome>, AppError> {
    let kind = parse_kind(&kind)?;
    let outcome = app_state
        .executor
        .push_delete(kind, id, &payload.external_id)
        .await?;
    Ok(Json(outcome))
}

async fn push_bulk_handler(
    State(app_state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Json(payload): Json<BulkPushRequest>,
) -> Result<Json<SyncSummary>, AppError> {
    let kind = parse_kind(&kind)?;
    if payload.ids.is_empty() {
        return Err(AppError::InvalidInput("ids must not be empty".to_string()));
    }
    let summary = app_state
        .executor
        .push_all(kind, &payload.ids, payload.action.op())
        .await;
    Ok(Json(summary))
}

pub fn create_sync_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sync/run", post(run_sync_handler))
        .route("/push/{kind}", post(push_bulk_handler))
        .route("/push/{kind}/{id}/delete", post(push_delete_handler))
        .route("/push/{kind}/{id}/{action}", post(push_one_handler))
}
