use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use serde_json::Value;
use tracing::{debug, warn};

use super::AppState;
use crate::notifications::{TopicSubscription, TrafficNotifier};

#[derive(Debug, PartialEq, Eq)]
enum ClientCommand {
    Join(String),
    Leave(String),
}

fn id_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `{"session_id": "..."}` joins a session's traffic topic, `{"unsubscribe": "..."}` leaves it.
fn parse_client_command(text: &str) -> Option<ClientCommand> {
    let value: Value = serde_json::from_str(text).ok()?;
    if let Some(id) = id_field(&value, "session_id") {
        return Some(ClientCommand::Join(id));
    }
    id_field(&value, "unsubscribe").map(ClientCommand::Leave)
}

fn apply_command(subscription: &mut TopicSubscription, text: &str) {
    match parse_client_command(text) {
        Some(ClientCommand::Join(id)) => {
            debug!(session_id = %id, "WebSocket client joined session topic.");
            subscription.join(&id);
        }
        Some(ClientCommand::Leave(id)) => {
            debug!(session_id = %id, "WebSocket client left session topic.");
            subscription.leave(&id);
        }
        None => warn!(message = %text, "Ignoring unrecognized WebSocket message."),
    }
}

pub async fn traffic_ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let notifier = app_state.notifier.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, notifier))
}

async fn handle_socket(mut socket: WebSocket, notifier: TrafficNotifier) {
    let mut subscription = notifier.subscribe();
    debug!("WebSocket client connected for traffic updates.");

    loop {
        tokio::select! {
            update = subscription.recv() => {
                let Some(update) = update else { break };
                let json = match serde_json::to_string(&update.payload) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode traffic update.");
                        continue;
                    }
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => apply_command(&mut subscription, text.as_str()),
                Some(Ok(Message::Ping(payload))) => {
                    if socket.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "WebSocket receive error.");
                    break;
                }
            }
        }
    }
    debug!("WebSocket client disconnected.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_client_command() {
        assert_eq!(
            parse_client_command(r#"{"session_id": "81a00001"}"#),
            Some(ClientCommand::Join("81a00001".to_string()))
        );
        assert_eq!(
            parse_client_command(r#"{"session_id": 42}"#),
            Some(ClientCommand::Join("42".to_string()))
        );
        assert_eq!(
            parse_client_command(r#"{"unsubscribe": "81a00001"}"#),
            Some(ClientCommand::Leave("81a00001".to_string()))
        );
        assert_eq!(parse_client_command(r#"{"session_id": ""}"#), None);
        assert_eq!(parse_client_command("not json"), None);
    }

    #[test]
    fn test_apply_command_updates_subscription() {
        let notifier = TrafficNotifier::new(4);
        let mut subscription = notifier.subscribe();
        apply_command(&mut subscription, r#"{"session_id": "s1"}"#);
        assert!(subscription.is_joined("s1"));
        apply_command(&mut subscription, r#"{"unsubscribe": "s1"}"#);
        assert!(!subscription.is_joined("s1"));
    }
}
