use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{AppError, AppState};
use crate::payments::gateway::new_reference;
use crate::payments::{ConfirmedPayment, PaymentConfirmation, PaystackClient, confirm_payment};

#[derive(Deserialize, Debug)]
pub struct InitializePaymentRequest {
    pub email: String,
    pub user_id: i32,
    pub plan_id: i32,
    pub callback_url: String,
}

#[derive(Serialize, Debug)]
pub struct InitializePaymentResponse {
    pub authorization_url: String,
    pub reference: String,
}

#[derive(Deserialize, Debug)]
pub struct VerifyParams {
    pub reference: String,
    pub user_id: i32,
    pub plan_id: i32,
}

fn gateway(app_state: &AppState) -> Result<&PaystackClient, AppError> {
    app_state
        .gateway
        .as_ref()
        .ok_or_else(|| AppError::ServiceUnavailable("online payments are not configured".to_string()))
}

/// Appends the purchase identifiers to the callback so verification knows what was bought.
fn callback_with_purchase(callback_url: &str, user_id: i32, plan_id: i32) -> String {
    let separator = if callback_url.contains('?') { '&' } else { '?' };
    format!("{callback_url}{separator}user_id={user_id}&plan_id={plan_id}")
}

async fn initialize_payment_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<InitializePaymentRequest>,
) -> Result<Json<InitializePaymentResponse>, AppError> {
    let gateway = gateway(&app_state)?;
    if payload.email.trim().is_empty() {
        return Err(AppError::InvalidInput("email is required".to_string()));
    }
    if app_state.store.find_user(payload.user_id).await?.is_none() {
        return Err(AppError::InvalidInput("the paying user could not be found".to_string()));
    }
    let Some(plan) = app_state.store.find_plan(payload.plan_id).await? else {
        return Err(AppError::InvalidInput("the purchased plan could not be found".to_string()));
    };

    let reference = new_reference();
    let callback_url = callback_with_purchase(&payload.callback_url, payload.user_id, payload.plan_id);
    let authorization_url = gateway
        .initialize_transaction(&payload.email, plan.price, &reference, &callback_url)
        .await?;
    info!(%reference, plan = %plan.name, "Payment initialized.");
    Ok(Json(InitializePaymentResponse {
        authorization_url,
        reference,
    }))
}

async fn verify_payment_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<VerifyParams>,
) -> Result<Json<ConfirmedPayment>, AppError> {
    let gateway = gateway(&app_state)?;
    let transaction = gateway.verify_transaction(&params.reference).await?;
    if !transaction.success {
        warn!(reference = %params.reference, "Gateway reports the payment as not completed.");
        return Err(AppError::PaymentRequired("the payment was not completed".to_string()));
    }

    let confirmation = PaymentConfirmation {
        user_id: params.user_id,
        plan_id: params.plan_id,
        amount: transaction.amount,
        reference: transaction.reference,
        currency: transaction.currency,
    };
    let confirmed = confirm_payment(&app_state.store, confirmation, &app_state.currency).await?;
    Ok(Json(confirmed))
}

async fn confirm_payment_handler(
    State(app_state): State<Arc<AppState>>,
    Json(confirmation): Json<PaymentConfirmation>,
) -> Result<Json<ConfirmedPayment>, AppError> {
    let confirmed = confirm_payment(&app_state.store, confirmation, &app_state.currency).await?;
    Ok(Json(confirmed))
}

pub fn create_payment_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/payments/initialize", post(initialize_payment_handler))
        .route("/payments/verify", get(verify_payment_handler))
        .route("/payments/confirm", post(confirm_payment_handler))
}
