//! Client for a Paystack-style payment gateway.
//!
//! Only two calls matter here: starting a checkout and verifying its outcome. Amounts
//! cross the wire in minor units (pesewas, kobo, cents).

use std::time::Duration;

use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::server::config::ServerConfig;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Gateway rejected the request with {status}: {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("Unexpected gateway response: {0}")]
    Decode(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedTransaction {
    pub success: bool,
    pub amount: Decimal,
    pub reference: String,
    pub currency: Option<String>,
}

#[derive(Serialize)]
struct InitializeRequest<'a> {
    email: &'a str,
    amount: i64,
    reference: &'a str,
    currency: &'a str,
    callback_url: &'a str,
}

#[derive(Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Deserialize)]
struct InitializeData {
    authorization_url: String,
}

#[derive(Deserialize)]
struct VerifyData {
    status: String,
    amount: i64,
    reference: String,
    #[serde(default)]
    currency: Option<String>,
}

pub fn new_reference() -> String {
    Uuid::new_v4().to_string()
}

fn to_minor_units(amount: Decimal) -> Result<i64, GatewayError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(GatewayError::InvalidAmount(format!("{amount} is negative")));
    }
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| GatewayError::InvalidAmount(format!("{amount} is out of range")))
}

#[derive(Debug, Clone)]
pub struct PaystackClient {
    client: Client,
    base_url: String,
    secret_key: String,
    currency: String,
}

impl PaystackClient {
    pub fn new(base_url: &str, secret_key: &str, currency: &str) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
            currency: currency.to_string(),
        })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, GatewayError> {
        Self::new(&config.gateway_url, &config.gateway_secret_key, &config.currency)
    }

    async fn decode<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, GatewayError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(%status, body = %body, "Payment gateway rejected request.");
            return Err(GatewayError::Rejected { status, body });
        }
        let envelope: Envelope<T> =
            serde_json::from_str(&body).map_err(|e| GatewayError::Decode(e.to_string()))?;
        if !envelope.status {
            return Err(GatewayError::Decode(format!("gateway reported failure: {}", envelope.message)));
        }
        envelope
            .data
            .ok_or_else(|| GatewayError::Decode("response has no data".to_string()))
    }

    /// Starts a checkout and returns the URL the payer should be sent to.
    pub async fn initialize_transaction(
        &self,
        email: &str,
        amount: Decimal,
        reference: &str,
        callback_url: &str,
    ) -> Result<String, GatewayError> {
        let request = InitializeRequest {
            email,
            amount: to_minor_units(amount)?,
            reference,
            currency: &self.currency,
            callback_url,
        };
        debug!(reference, "Initializing gateway transaction.");
        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&request)
            .send()
            .await?;
        let data: InitializeData = Self::decode(response).await?;
        Ok(data.authorization_url)
    }

    pub async fn verify_transaction(&self, reference: &str) -> Result<VerifiedTransaction, GatewayError> {
        let response = self
            .client
            .get(format!("{}/transaction/verify/{}", self.base_url, reference))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        let data: VerifyData = Self::decode(response).await?;
        Ok(VerifiedTransaction {
            success: data.status == "success",
            amount: Decimal::new(data.amount, 2),
            reference: data.reference,
            currency: data.currency,
        })
    }
}
