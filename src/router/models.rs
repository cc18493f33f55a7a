//! Typed views of the router's user-manager resources.
//!
//! Every resource is described by a marker type implementing [`RouterResource`], which
//! ties its REST path to the record it decodes into and the payloads it accepts.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::wire;

pub trait RouterResource {
    /// Path segment under `rest/user-manager/`.
    const PATH: &'static str;
    /// Human readable name used in logs and errors.
    const NAME: &'static str;

    type Record: DeserializeOwned + Send + 'static;
    type Create: Serialize + Sync;
    type Update: Serialize + Sync;
}

pub struct Users;
pub struct Plans;
pub struct Assignments;
pub struct Sessions;
pub struct Payments;

impl RouterResource for Users {
    const PATH: &'static str = "user";
    const NAME: &'static str = "user";
    type Record = RemoteUser;
    type Create = UserPayload;
    type Update = UserPayload;
}

impl RouterResource for Plans {
    const PATH: &'static str = "profile";
    const NAME: &'static str = "profile";
    type Record = RemotePlan;
    type Create = PlanPayload;
    type Update = PlanPayload;
}

impl RouterResource for Assignments {
    const PATH: &'static str = "user-profile";
    const NAME: &'static str = "user-profile";
    type Record = RemoteAssignment;
    type Create = AssignmentPayload;
    type Update = AssignmentPayload;
}

impl RouterResource for Sessions {
    const PATH: &'static str = "session";
    const NAME: &'static str = "session";
    type Record = RemoteSession;
    type Create = SessionPayload;
    type Update = SessionPayload;
}

impl RouterResource for Payments {
    const PATH: &'static str = "payment";
    const NAME: &'static str = "payment";
    type Record = RemotePayment;
    type Create = PaymentPayload;
    type Update = PaymentPayload;
}

// --- Records ---

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteUser {
    #[serde(rename = ".id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub group: String,
    #[serde(default, deserialize_with = "wire::bool_flag")]
    pub disabled: bool,
    #[serde(
        rename = "shared-users",
        default = "wire::default_shared_users",
        deserialize_with = "wire::shared_users"
    )]
    pub shared_users: i32,
    #[serde(default)]
    pub password: String,
    #[serde(rename = "otp-secret", default)]
    pub otp_secret: String,
    #[serde(default)]
    pub attributes: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemotePlan {
    #[serde(rename = ".id")]
    pub id: String,
    pub name: String,
    #[serde(rename = "name-for-users", default)]
    pub name_for_users: String,
    #[serde(default = "wire::default_price", deserialize_with = "wire::decimal")]
    pub price: Decimal,
    #[serde(rename = "starts-when", default = "default_starts_when")]
    pub starts_when: String,
    #[serde(default = "default_validity")]
    pub validity: String,
    #[serde(rename = "override-shared-users", default = "default_override_shared_users")]
    pub override_shared_users: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteAssignment {
    #[serde(rename = ".id")]
    pub id: String,
    /// Login name of the assigned user.
    pub user: String,
    /// Name of the assigned profile.
    pub profile: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(rename = "end-time", default, deserialize_with = "wire::timestamp")]
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteSession {
    #[serde(rename = ".id")]
    pub id: String,
    #[serde(rename = "acct-session-id")]
    pub session_id: String,
    pub user: String,
    #[serde(rename = "nas-ip-address", default)]
    pub nas_ip_address: Option<String>,
    #[serde(rename = "nas-port-id", default)]
    pub nas_port_id: Option<String>,
    #[serde(rename = "nas-port-type", default)]
    pub nas_port_type: Option<String>,
    #[serde(rename = "calling-station-id", default)]
    pub calling_station_id: Option<String>,
    #[serde(default, deserialize_with = "wire::counter")]
    pub download: i64,
    #[serde(default, deserialize_with = "wire::counter")]
    pub upload: i64,
    #[serde(default)]
    pub uptime: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "wire::timestamp")]
    pub started: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "wire::timestamp")]
    pub ended: Option<DateTime<Utc>>,
    #[serde(rename = "terminate-cause", default)]
    pub terminate_cause: Option<String>,
    #[serde(rename = "user-address", default)]
    pub user_address: Option<String>,
    #[serde(rename = "last-accounting-packet", default, deserialize_with = "wire::timestamp")]
    pub last_accounting_packet: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemotePayment {
    #[serde(rename = ".id")]
    pub id: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(rename = "trans-status", default)]
    pub trans_status: Option<String>,
    #[serde(default = "wire::default_price", deserialize_with = "wire::decimal")]
    pub price: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Body of a successful create (`PUT`) response; only the assigned id matters.
#[derive(Debug, Deserialize)]
pub(crate) struct CreatedRef {
    #[serde(rename = ".id")]
    pub id: String,
}

fn default_starts_when() -> String {
    "assigned".to_string()
}

fn default_validity() -> String {
    "30d 00:00:00".to_string()
}

fn default_override_shared_users() -> String {
    "off".to_string()
}

// --- Payloads ---
//
// All values travel as strings. Fields left `None` or empty are stripped by the client
// before the request is sent.

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserPayload {
    pub name: Option<String>,
    pub group: Option<String>,
    #[serde(rename = "shared-users")]
    pub shared_users: Option<String>,
    pub disabled: Option<String>,
    pub attributes: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanPayload {
    pub name: Option<String>,
    #[serde(rename = "name-for-users")]
    pub name_for_users: Option<String>,
    pub price: Option<String>,
    #[serde(rename = "starts-when")]
    pub starts_when: Option<String>,
    pub validity: Option<String>,
    #[serde(rename = "override-shared-users")]
    pub override_shared_users: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssignmentPayload {
    pub user: Option<String>,
    pub profile: Option<String>,
    pub state: Option<String>,
    #[serde(rename = "end-time")]
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionPayload {
    pub user: Option<String>,
    #[serde(rename = "acct-session-id")]
    pub session_id: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "terminate-cause")]
    pub terminate_cause: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentPayload {
    pub user: Option<String>,
    pub profile: Option<String>,
    pub method: Option<String>,
    #[serde(rename = "copy-from")]
    pub copy_from: Option<String>,
    #[serde(rename = "trans-start")]
    pub trans_start: Option<String>,
    #[serde(rename = "trans-end")]
    pub trans_end: Option<String>,
    #[serde(rename = "trans-status")]
    pub trans_status: Option<String>,
    #[serde(rename = "user-message")]
    pub user_message: Option<String>,
    pub currency: Option<String>,
    pub price: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remote_user_from_router_json() {
        let user: RemoteUser = serde_json::from_value(json!({
            ".id": "*1",
            "name": "alice",
            "group": "g1",
            "disabled": "false",
            "shared-users": "2",
            "password": "s3cret"
        }))
        .unwrap();

        assert_eq!(user.id, "*1");
        assert_eq!(user.name, "alice");
        assert_eq!(user.group, "g1");
        assert!(!user.disabled);
        assert_eq!(user.shared_users, 2);
        assert_eq!(user.otp_secret, "");
    }

    #[test]
    fn test_remote_plan_defaults() {
        let plan: RemotePlan = serde_json::from_value(json!({ ".id": "*A", "name": "daily" })).unwrap();
        assert_eq!(plan.price, Decimal::ZERO);
        assert_eq!(plan.starts_when, "assigned");
        assert_eq!(plan.validity, "30d 00:00:00");
        assert_eq!(plan.override_shared_users, "off");
    }

    #[test]
    fn test_remote_session_counters() {
        let session: RemoteSession = serde_json::from_value(json!({
            ".id": "*9",
            "acct-session-id": "81a00001",
            "user": "alice",
            "download": "2048",
            "upload": "1024",
            "uptime": "1h2m3s",
            "status": "start,interim",
            "started": "2024-05-01 09:00:00"
        }))
        .unwrap();

        assert_eq!(session.session_id, "81a00001");
        assert_eq!(session.download, 2048);
        assert_eq!(session.upload, 1024);
        assert!(session.ended.is_none());
        assert!(session.started.is_some());
    }

    #[test]
    fn test_record_without_id_is_rejected() {
        let result = serde_json::from_value::<RemoteUser>(json!({ "name": "bob" }));
        assert!(result.is_err());
    }
}
