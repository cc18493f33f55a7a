use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::TransactionTrait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::db::EntityStore;
use crate::db::entities::{payment, plan_assignment};
use crate::db::enums::{PaymentMethod, PaymentStatus};
use crate::db::hooks::{EntityKind, PushTask};
use crate::db::services::payment_service::{self, NewPayment};
use crate::db::services::{assignment_service, plan_service, user_service};
use crate::sync::error::SyncError;

/// A payment the gateway has confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentConfirmation {
    pub user_id: i32,
    pub plan_id: i32,
    pub amount: Decimal,
    pub reference: String,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmedPayment {
    pub payment: payment::Model,
    pub assignment: plan_assignment::Model,
    pub assignment_created: bool,
    pub push_queued: bool,
}

/// Records a confirmed payment and activates the plan it paid for.
///
/// A pending assignment of the plan to the user that has not reached the router yet is
/// reused, otherwise a new one is created. A completed online payment is stored against
/// it, and exactly one create-in-router task is queued for the assignment. Nothing is written if the user or plan cannot be resolved.
#[instrument(skip(store, confirmation), fields(reference = %confirmation.reference))]
pub async fn confirm_payment(
    store: &EntityStore,
    confirmation: PaymentConfirmation,
    default_currency: &str,
) -> Result<ConfirmedPayment, SyncError> {
    if confirmation.reference.trim().is_empty() {
        return Err(SyncError::Invalid("payment reference is required".to_string()));
    }
    if confirmation.amount.is_sign_negative() && !confirmation.amount.is_zero() {
        return Err(SyncError::Invalid("payment amount must not be negative".to_string()));
    }

    let txn = store.db().begin().await?;
    let Some(user) = user_service::find_by_id(&txn, confirmation.user_id).await? else {
        warn!(user_id = confirmation.user_id, "Payment confirmation for unknown user.");
        return Err(SyncError::Reference("the paying user could not be found".to_string()));
    };
    let Some(plan) = plan_service::find_by_id(&txn, confirmation.plan_id).await? else {
        warn!(plan_id = confirmation.plan_id, "Payment confirmation for unknown plan.");
        return Err(SyncError::Reference("the purchased plan could not be found".to_string()));
    };
    if payment_service::find_by_reference(&txn, &confirmation.reference).await?.is_some() {
        warn!("Payment reference already recorded.");
        return Err(SyncError::Conflict("this payment has already been recorded".to_string()));
    }

    let (assignment, assignment_created) =
        assignment_service::find_or_create_pending(&txn, user.id, plan.id).await?;
    let now = Utc::now();
    let payment = payment_service::insert(
        &txn,
        NewPayment {
            user_id: user.id,
            assignment_id: assignment.id,
            plan_id: Some(plan.id),
            method: PaymentMethod::Online,
            status: PaymentStatus::Completed,
            copy_from: None,
            started_at: Some(now),
            ended_at: Some(now),
            currency: confirmation
                .currency
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| default_currency.to_string()),
            amount: confirmation.amount,
            gateway_reference: Some(confirmation.reference),
            user_message: None,
        },
    )
    .await?;
    txn.commit().await?;

    let push_queued = store.enqueue(PushTask::create(EntityKind::PlanAssignment, assignment.id));
    info!(
        user = %user.username,
        plan = %plan.name,
        amount = %payment.amount,
        assignment_created,
        "Payment confirmed."
    );
    Ok(ConfirmedPayment {
        payment,
        assignment,
        assignment_created,
        push_queued,
    })
}
