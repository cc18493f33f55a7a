use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};

use crate::db::entities::payment;
use crate::db::enums::{PaymentMethod, PaymentStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub user_id: i32,
    pub assignment_id: i32,
    pub plan_id: Option<i32>,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub copy_from: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub currency: String,
    pub amount: Decimal,
    pub gateway_reference: Option<String>,
    pub user_message: Option<String>,
}

pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: i32) -> Result<Option<payment::Model>, DbErr> {
    payment::Entity::find_by_id(id).one(db).await
}

pub async fn find_by_reference<C: ConnectionTrait>(
    db: &C,
    reference: &str,
) -> Result<Option<payment::Model>, DbErr> {
    payment::Entity::find()
        .filter(payment::Column::GatewayReference.eq(reference))
        .one(db)
        .await
}

pub async fn insert<C: ConnectionTrait>(db: &C, new_payment: NewPayment) -> Result<payment::Model, DbErr> {
    if new_payment.amount.is_sign_negative() && !new_payment.amount.is_zero() {
        return Err(DbErr::Custom(format!(
            "payment amount must be non-negative, got {}",
            new_payment.amount
        )));
    }
    let now = Utc::now();
    payment::ActiveModel {
        user_id: Set(new_payment.user_id),
        assignment_id: Set(new_payment.assignment_id),
        plan_id: Set(new_payment.plan_id),
        method: Set(new_payment.method),
        status: Set(new_payment.status),
        copy_from: Set(new_payment.copy_from),
        started_at: Set(new_payment.started_at),
        ended_at: Set(new_payment.ended_at),
        currency: Set(new_payment.currency),
        amount: Set(new_payment.amount),
        gateway_reference: Set(new_payment.gateway_reference),
        user_message: Set(new_payment.user_message),
        external_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
}
