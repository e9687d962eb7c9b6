//! Session table and publish/subscribe fan-out
//!
//! All session and subscription state sits behind one async mutex, so
//! subscribe, unsubscribe, disconnect and publish are applied one at a time
//! and fan-out never iterates a map that is being changed. Sends use
//! `try_send` on bounded per-session channels, so the lock is never held
//! across transport I/O.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use super::messages::parse_client_message;
use super::messages::ClientMessage;
use super::messages::ProgressSink;
use super::messages::RunUpdate;
use super::messages::ServerMessage;
use super::registry::ClientId;
use super::registry::SubscriptionRegistry;
use super::registry::SubscriptionScope;
use crate::config::AppConfig;
use crate::errors::RagRunError;
use crate::errors::Result;

/// The receiving half of a live session
///
/// Whoever owns the transport drains `receiver` and writes each frame out.
/// Dropping the receiver closes the session; the hub notices on its next
/// send and cleans up.
#[derive(Debug)]
pub struct SessionHandle {
    pub client_id: ClientId,
    pub receiver: mpsc::Receiver<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub sessions: usize,
    pub global_subscribers: usize,
    pub tracked_runs: usize,
}

#[derive(Debug, Default)]
struct HubState {
    sessions: HashMap<ClientId, mpsc::Sender<String>>,
    registry: SubscriptionRegistry,
}

enum Delivery {
    Sent,
    Dropped,
    Closed,
}

impl HubState {
    fn deliver(&self, client: ClientId, payload: String) -> Delivery {
        let Some(sender) = self.sessions.get(&client) else {
            return Delivery::Closed;
        };
        match sender.try_send(payload) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => {
                warn!("Session {} is not keeping up; dropped one message", client);
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    fn remove_session(&mut self, client: ClientId) -> bool {
        self.registry.remove_client(client);
        self.sessions.remove(&client).is_some()
    }
}

pub struct NotificationHub {
    state: Mutex<HubState>,
    session_buffer: usize,
}

impl NotificationHub {
    #[must_use]
    pub fn new(session_buffer: usize) -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            session_buffer: session_buffer.max(1),
        }
    }

    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(config.notifications.session_buffer)
    }

    /// Register a session and queue its `connected` acknowledgment
    pub async fn connect(&self) -> SessionHandle {
        let client_id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(self.session_buffer);

        let mut state = self.state.lock().await;
        state.sessions.insert(client_id, sender);
        Self::send_locked(&mut state, client_id, &ServerMessage::connected(client_id));
        drop(state);

        info!("🔌 Client {} connected", client_id);
        SessionHandle {
            client_id,
            receiver,
        }
    }

    /// Join a run's subscribers, or the global set for a wildcard
    pub async fn subscribe(&self, client: ClientId, run_id: Option<&str>) -> Result<SubscriptionScope> {
        let scope = SubscriptionScope::resolve(run_id);
        let mut state = self.state.lock().await;
        Self::ensure_session(&state, client)?;

        if state.registry.subscribe(client, &scope) {
            debug!("Client {} subscribed to {}", client, scope.run_id());
        }
        Self::send_locked(&mut state, client, &ServerMessage::subscribed(&scope));
        Ok(scope)
    }

    pub async fn unsubscribe(&self, client: ClientId, run_id: Option<&str>) -> Result<SubscriptionScope> {
        let scope = SubscriptionScope::resolve(run_id);
        let mut state = self.state.lock().await;
        Self::ensure_session(&state, client)?;

        if state.registry.unsubscribe(client, &scope) {
            debug!("Client {} unsubscribed from {}", client, scope.run_id());
        }
        Self::send_locked(&mut state, client, &ServerMessage::unsubscribed(&scope));
        Ok(scope)
    }

    /// Forget a session and all of its subscriptions; repeat calls are no-ops
    pub async fn disconnect(&self, client: ClientId) -> bool {
        let removed = self.state.lock().await.remove_session(client);
        if removed {
            info!("👋 Client {} disconnected", client);
        }
        removed
    }

    /// Drop every session, e.g. on shutdown; transports see their channel end
    pub async fn close_all(&self) -> usize {
        let mut state = self.state.lock().await;
        let closed = state.sessions.len();
        *state = HubState::default();
        closed
    }

    /// Fan a run update out to the run's subscribers and every global subscriber
    ///
    /// The message is serialized once. Sessions whose channel has closed are
    /// removed before this returns. Returns how many sessions accepted it.
    pub async fn publish(&self, run_id: &str, update: RunUpdate) -> usize {
        let message = ServerMessage::run_update(run_id, update);
        let payload = match serde_json::to_string(&message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize update for run {}: {}", run_id, e);
                return 0;
            }
        };

        let mut state = self.state.lock().await;
        let recipients = state.registry.recipients(run_id);
        if recipients.is_empty() {
            debug!("No subscribers for run {}", run_id);
            return 0;
        }

        let mut delivered = 0;
        let mut closed = Vec::new();
        for client in recipients {
            match state.deliver(client, payload.clone()) {
                Delivery::Sent => delivered += 1,
                Delivery::Dropped => {}
                Delivery::Closed => closed.push(client),
            }
        }

        for client in closed {
            let failure = RagRunError::DeliveryFailure(client.to_string());
            debug!("{}: channel closed, removing session", failure);
            state.remove_session(client);
        }

        delivered
    }

    /// Apply one inbound text frame from a session
    pub async fn handle_client_message(&self, client: ClientId, text: &str) {
        let outcome = match parse_client_message(text) {
            Ok(ClientMessage::Subscribe { run_id }) => {
                self.subscribe(client, run_id.as_deref()).await.map(|_| ())
            }
            Ok(ClientMessage::Unsubscribe { run_id }) => {
                self.unsubscribe(client, run_id.as_deref()).await.map(|_| ())
            }
            Ok(ClientMessage::Ping) => {
                self.send_to(client, &ServerMessage::pong()).await;
                Ok(())
            }
            Err(message) => {
                debug!("Rejected message from {}: {}", client, message);
                self.send_to(client, &ServerMessage::error(message)).await;
                Ok(())
            }
        };

        if let Err(e) = outcome {
            debug!("Ignoring message from {}: {}", client, e);
        }
    }

    /// Send one message to one session; `false` if it could not be queued
    pub async fn send_to(&self, client: ClientId, message: &ServerMessage) -> bool {
        let mut state = self.state.lock().await;
        Self::send_locked(&mut state, client, message)
    }

    pub async fn stats(&self) -> HubStats {
        let state = self.state.lock().await;
        HubStats {
            sessions: state.sessions.len(),
            global_subscribers: state.registry.global_count(),
            tracked_runs: state.registry.tracked_runs(),
        }
    }

    /// Number of subscription sets a client is in, zero once disconnected
    pub async fn membership_count(&self, client: ClientId) -> usize {
        self.state.lock().await.registry.membership_count(client)
    }

    fn ensure_session(state: &HubState, client: ClientId) -> Result<()> {
        if state.sessions.contains_key(&client) {
            Ok(())
        } else {
            Err(RagRunError::Validation(format!("Unknown client: {client}")))
        }
    }

    fn send_locked(state: &mut HubState, client: ClientId, message: &ServerMessage) -> bool {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize message for {}: {}", client, e);
                return false;
            }
        };

        match state.deliver(client, payload) {
            Delivery::Sent => true,
            Delivery::Dropped => false,
            Delivery::Closed => {
                state.remove_session(client);
                false
            }
        }
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl ProgressSink for NotificationHub {
    async fn publish_update(&self, run_id: &str, update: RunUpdate) {
        let delivered = self.publish(run_id, update).await;
        debug!("Run {} update delivered to {} sessions", run_id, delivered);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::models::RunStatus;

    fn next_json(session: &mut SessionHandle) -> Value {
        let text = session.receiver.try_recv().expect("expected a queued message");
        serde_json::from_str(&text).unwrap()
    }

    #[tokio::test]
    async fn test_connect_sends_ack() {
        let hub = NotificationHub::default();
        let mut session = hub.connect().await;

        let ack = next_json(&mut session);
        assert_eq!(ack["type"], "connected");
        assert_eq!(ack["clientId"], session.client_id.to_string());
        assert_eq!(hub.stats().await.sessions, 1);
    }

    #[tokio::test]
    async fn test_subscribe_acks_resolved_scope() {
        let hub = NotificationHub::default();
        let mut session = hub.connect().await;
        next_json(&mut session);

        hub.subscribe(session.client_id, Some("r1")).await.unwrap();
        let ack = next_json(&mut session);
        assert_eq!(ack["type"], "subscribed");
        assert_eq!(ack["scope"], "specific");
        assert_eq!(ack["runId"], "r1");

        hub.subscribe(session.client_id, None).await.unwrap();
        let ack = next_json(&mut session);
        assert_eq!(ack["scope"], "global");

        let stats = hub.stats().await;
        assert_eq!(stats.global_subscribers, 1);
        assert_eq!(stats.tracked_runs, 1);
    }

    #[tokio::test]
    async fn test_subscribe_unknown_client_fails() {
        let hub = NotificationHub::default();
        let err = hub.subscribe(Uuid::new_v4(), Some("r1")).await.unwrap_err();
        assert!(matches!(err, RagRunError::Validation(_)));
    }

    #[tokio::test]
    async fn test_publish_removes_closed_sessions() {
        let hub = NotificationHub::default();
        let live = hub.connect().await;
        let dead = hub.connect().await;
        hub.subscribe(live.client_id, Some("r1")).await.unwrap();
        hub.subscribe(dead.client_id, None).await.unwrap();
        let dead_id = dead.client_id;
        drop(dead);

        let delivered = hub
            .publish("r1", RunUpdate::status(RunStatus::Running))
            .await;

        assert_eq!(delivered, 1);
        assert_eq!(hub.membership_count(dead_id).await, 0);
        let stats = hub.stats().await;
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.global_subscribers, 0);
    }

    #[tokio::test]
    async fn test_full_buffer_drops_only_that_message() {
        let hub = NotificationHub::new(2);
        let mut session = hub.connect().await;
        hub.subscribe(session.client_id, Some("r1")).await.unwrap();

        // Buffer holds the two acks; this one is dropped
        assert_eq!(
            hub.publish("r1", RunUpdate::status(RunStatus::Running)).await,
            0
        );
        assert_eq!(hub.stats().await.sessions, 1);

        next_json(&mut session);
        next_json(&mut session);
        assert_eq!(
            hub.publish("r1", RunUpdate::status(RunStatus::Running)).await,
            1
        );
        assert_eq!(next_json(&mut session)["type"], "run_update");
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let hub = NotificationHub::default();
        let session = hub.connect().await;
        hub.subscribe(session.client_id, Some("r1")).await.unwrap();

        assert!(hub.disconnect(session.client_id).await);
        assert!(!hub.disconnect(session.client_id).await);
        assert_eq!(hub.stats().await, HubStats {
            sessions: 0,
            global_subscribers: 0,
            tracked_runs: 0,
        });
    }

    #[tokio::test]
    async fn test_close_all_ends_receivers() {
        let hub = NotificationHub::default();
        let mut session = hub.connect().await;
        hub.subscribe(session.client_id, None).await.unwrap();

        assert_eq!(hub.close_all().await, 1);
        next_json(&mut session);
        next_json(&mut session);
        assert!(session.receiver.recv().await.is_none());
        assert_eq!(hub.stats().await.global_subscribers, 0);
    }

    #[tokio::test]
    async fn test_client_message_handling() {
        let hub = NotificationHub::default();
        let mut session = hub.connect().await;
        next_json(&mut session);

        hub.handle_client_message(session.client_id, r#"{"type":"ping"}"#)
            .await;
        assert_eq!(next_json(&mut session)["type"], "pong");

        hub.handle_client_message(session.client_id, "{oops").await;
        let error = next_json(&mut session);
        assert_eq!(error["type"], "error");
        assert_eq!(error["message"], "Invalid JSON message");

        hub.handle_client_message(session.client_id, r#"{"type":"shout"}"#)
            .await;
        assert_eq!(
            next_json(&mut session)["message"],
            "Unknown message type: shout"
        );

        hub.handle_client_message(session.client_id, r#"{"type":"subscribe","runId":"*"}"#)
            .await;
        assert_eq!(next_json(&mut session)["scope"], "global");

        hub.handle_client_message(session.client_id, r#"{"type":"unsubscribe","runId":"all"}"#)
            .await;
        let ack = next_json(&mut session);
        assert_eq!(ack["type"], "unsubscribed");
        assert_eq!(hub.stats().await.global_subscribers, 0);
    }
}
