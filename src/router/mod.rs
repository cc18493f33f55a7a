//! HTTP client for the router's user-manager REST API.
//!
//! The client is a plain transport: it never touches the local database and never
//! retries. Callers decide what a failure means for them.

pub mod error;
pub mod models;
pub mod wire;

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

pub use error::RouterError;
pub use models::{Assignments, Payments, Plans, RouterResource, Sessions, Users};

use crate::server::config::ServerConfig;
use models::CreatedRef;

const API_PREFIX: &str = "rest/user-manager";

#[derive(Clone, Debug)]
pub struct RouterClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
}

impl RouterClient {
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, RouterError> {
        if base_url.trim().is_empty() {
            return Err(RouterError::Config("router base URL is empty".to_string()));
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RouterError::Config(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, RouterError> {
        Self::new(
            &config.router_url,
            &config.router_username,
            &config.router_password,
            Duration::from_secs(config.router_timeout_secs),
        )
    }

    fn endpoint<R: RouterResource>(&self, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{}/{}/{}/{}", self.base_url, API_PREFIX, R::PATH, id),
            None => format!("{}/{}/{}", self.base_url, API_PREFIX, R::PATH),
        }
    }

    /// Sends one request and returns the raw body of a 2xx response.
    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> Result<(StatusCode, Vec<u8>), RouterError> {
        let mut request = self
            .http
            .request(method.clone(), endpoint)
            .basic_auth(&self.username, Some(&self.password));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let transport = |source| RouterError::Transport {
            endpoint: endpoint.to_string(),
            source,
        };
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(transport)?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            warn!(%method, endpoint, %status, body = %body, "Router rejected request.");
            return Err(RouterError::Protocol {
                endpoint: endpoint.to_string(),
                status,
                body,
            });
        }
        debug!(%method, endpoint, %status, "Router request completed.");
        Ok((status, bytes.to_vec()))
    }

    /// Lists every record of a resource. Records that fail validation are logged with
    /// their raw content and left out; the rest of the list is still returned.
    pub async fn list<R: RouterResource>(&self) -> Result<Vec<R::Record>, RouterError> {
        let endpoint = self.endpoint::<R>(None);
        let (_, body) = self.send(Method::GET, &endpoint, None).await?;
        if body.is_empty() {
            return Ok(Vec::new());
        }

        let raw: Value = serde_json::from_slice(&body).map_err(|e| RouterError::Decode {
            resource: R::NAME,
            message: e.to_string(),
        })?;
        let items = match raw {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => {
                return Err(RouterError::Decode {
                    resource: R::NAME,
                    message: format!("expected a list, got {other}"),
                });
            }
        };

        let mut records = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<R::Record>(item.clone()) {
                Ok(record) => records.push(record),
                Err(e) => warn!(resource = R::NAME, record = %item, error = %e, "Skipping malformed router record."),
            }
        }
        Ok(records)
    }

    pub async fn get<R: RouterResource>(&self, id: &str) -> Result<R::Record, RouterError> {
        let endpoint = self.endpoint::<R>(Some(id));
        let not_found = || RouterError::NotFound {
            resource: R::NAME,
            id: id.to_string(),
        };
        let body = match self.send(Method::GET, &endpoint, None).await {
            Ok((_, body)) => body,
            Err(RouterError::Protocol { status, .. }) if status == StatusCode::NOT_FOUND => {
                return Err(not_found());
            }
            Err(e) => return Err(e),
        };
        if body.is_empty() {
            return Err(not_found());
        }

        let raw: Value = serde_json::from_slice(&body).map_err(|e| RouterError::Decode {
            resource: R::NAME,
            message: e.to_string(),
        })?;
        // Lookups by id sometimes come back as a one-element (or empty) list.
        let raw = match raw {
            Value::Null => return Err(not_found()),
            Value::Array(mut items) => match items.len() {
                0 => return Err(not_found()),
                _ => items.swap_remove(0),
            },
            other => other,
        };
        serde_json::from_value(raw).map_err(|e| RouterError::Decode {
            resource: R::NAME,
            message: e.to_string(),
        })
    }

    /// Creates a record and returns the id the router assigned to it.
    pub async fn create<R: RouterResource>(&self, payload: &R::Create) -> Result<String, RouterError> {
        let endpoint = self.endpoint::<R>(None);
        let body = compact_payload(payload, R::NAME)?;
        let (_, response) = self.send(Method::PUT, &endpoint, Some(body)).await?;
        let created: CreatedRef = serde_json::from_slice(&response).map_err(|e| RouterError::Decode {
            resource: R::NAME,
            message: format!("create response without an id: {e}"),
        })?;
        Ok(created.id)
    }

    pub async fn update<R: RouterResource>(&self, id: &str, payload: &R::Update) -> Result<(), RouterError> {
        let endpoint = self.endpoint::<R>(Some(id));
        let body = compact_payload(payload, R::NAME)?;
        self.send(Method::PATCH, &endpoint, Some(body)).await?;
        Ok(())
    }

    pub async fn delete<R: RouterResource>(&self, id: &str) -> Result<(), RouterError> {
        let endpoint = self.endpoint::<R>(Some(id));
        self.send(Method::DELETE, &endpoint, None).await?;
        Ok(())
    }
}

/// Serializes a payload and drops every field that is null or an empty string.
/// The router handles empty strings inconsistently, so absent is always safer.
pub(crate) fn compact_payload<T: Serialize>(payload: &T, resource: &'static str) -> Result<Value, RouterError> {
    let value = serde_json::to_value(payload).map_err(|e| RouterError::Decode {
        resource,
        message: format!("failed to encode payload: {e}"),
    })?;
    match value {
        Value::Object(fields) => Ok(Value::Object(
            fields
                .into_iter()
                .filter(|(_, v)| match v {
                    Value::Null => false,
                    Value::String(s) => !s.trim().is_empty(),
                    _ => true,
                })
                .collect(),
        )),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::{PlanPayload, UserPayload};
    use serde_json::json;
    use wiremock::matchers::{basic_auth, body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> RouterClient {
        RouterClient::new(&server.uri(), "admin", "pw", Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_compact_payload_drops_empty_fields() {
        let payload = UserPayload {
            name: Some("alice".into()),
            group: Some(String::new()),
            shared_users: Some("1".into()),
            disabled: Some("false".into()),
            attributes: None,
            password: Some("  ".into()),
        };
        let body = compact_payload(&payload, "user").unwrap();
        assert_eq!(body, json!({ "name": "alice", "shared-users": "1", "disabled": "false" }));
    }

    #[tokio::test]
    async fn test_list_users_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/user-manager/user"))
            .and(basic_auth("admin", "pw"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { ".id": "*1", "name": "alice", "group": "g1", "disabled": "false", "shared-users": "2" },
                { "name": "no-id" }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let users = client_for(&server).list::<Users>().await.unwrap();
        assert_eq!(users.len(), 1, "malformed records are skipped");
        assert_eq!(users[0].name, "alice");
        assert_eq!(users[0].shared_users, 2);
    }

    #[tokio::test]
    async fn test_create_plan_returns_router_id() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/rest/user-manager/profile"))
            .and(body_json(json!({ "name": "weekly", "price": "25.00", "validity": "7d" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ ".id": "*7", "name": "weekly" })))
            .expect(1)
            .mount(&server)
            .await;

        let payload = PlanPayload {
            name: Some("weekly".into()),
            price: Some("25.00".into()),
            validity: Some("7d".into()),
            ..Default::default()
        };
        let id = client_for(&server).create::<Plans>(&payload).await.unwrap();
        assert_eq!(id, "*7");
    }

    #[tokio::test]
    async fn test_non_success_status_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/user-manager/user/*1"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad field"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .update::<Users>("*1", &UserPayload::default())
            .await
            .unwrap_err();
        match &err {
            RouterError::Protocol { status, body, .. } => {
                assert_eq!(*status, StatusCode::BAD_REQUEST);
                assert_eq!(body, "bad field");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/user-manager/session"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).list::<Sessions>().await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_get_missing_record_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/user-manager/user-profile/*404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/user-manager/user-profile/*0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(matches!(
            client.get::<Assignments>("*404").await,
            Err(RouterError::NotFound { .. })
        ));
        assert!(matches!(
            client.get::<Assignments>("*0").await,
            Err(RouterError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/user-manager/payment/*3"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = RouterClient::new(&server.uri(), "admin", "pw", Duration::from_millis(50)).unwrap();
        let err = client.delete::<Payments>("*3").await.unwrap_err();
        assert!(matches!(err, RouterError::Transport { .. }));
        assert!(err.is_retryable());
    }
}
