use std::collections::HashSet;
use std::sync::Arc;

use ragrun::models::RunStatus;
use ragrun::notify::NotificationHub;
use ragrun::notify::RunUpdate;
use ragrun::notify::ServerMessage;
use ragrun::notify::SessionHandle;
use ragrun::Result;

/// Drain everything queued for a session, keeping only run updates
fn drain_updates(session: &mut SessionHandle) -> Vec<(String, RunUpdate)> {
    let mut updates = Vec::new();
    while let Ok(text) = session.receiver.try_recv() {
        let message: ServerMessage = serde_json::from_str(&text).unwrap();
        if let ServerMessage::RunUpdate { run_id, update, .. } = message {
            updates.push((run_id, update));
        }
    }
    updates
}

#[tokio::test]
async fn test_wildcard_session_sees_every_run() -> Result<()> {
    let hub = NotificationHub::default();
    let mut watcher = hub.connect().await;
    hub.subscribe(watcher.client_id, Some("*")).await?;

    assert_eq!(hub.publish("r1", RunUpdate::status(RunStatus::Running)).await, 1);
    assert_eq!(hub.publish("r2", RunUpdate::status(RunStatus::Running)).await, 1);

    let updates = drain_updates(&mut watcher);
    let runs: Vec<_> = updates.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(runs, ["r1", "r2"]);
    Ok(())
}

#[tokio::test]
async fn test_specific_subscription_is_isolated() -> Result<()> {
    let hub = NotificationHub::default();
    let mut watcher = hub.connect().await;
    hub.subscribe(watcher.client_id, Some("r4")).await?;

    assert_eq!(hub.publish("r5", RunUpdate::status(RunStatus::Running)).await, 0);
    assert!(drain_updates(&mut watcher).is_empty());

    assert_eq!(hub.publish("r4", RunUpdate::status(RunStatus::Running)).await, 1);
    assert_eq!(drain_updates(&mut watcher).len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_union_of_scopes_delivers_once() -> Result<()> {
    let hub = NotificationHub::default();
    let mut watcher = hub.connect().await;
    hub.subscribe(watcher.client_id, Some("r1")).await?;
    hub.subscribe(watcher.client_id, None).await?;

    assert_eq!(hub.publish("r1", RunUpdate::status(RunStatus::Running)).await, 1);
    assert_eq!(drain_updates(&mut watcher).len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() -> Result<()> {
    let hub = NotificationHub::default();
    let mut watcher = hub.connect().await;
    hub.subscribe(watcher.client_id, Some("r1")).await?;
    hub.unsubscribe(watcher.client_id, Some("r1")).await?;

    assert_eq!(hub.publish("r1", RunUpdate::status(RunStatus::Running)).await, 0);
    assert!(drain_updates(&mut watcher).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_disconnected_session_receives_nothing() -> Result<()> {
    let hub = NotificationHub::default();
    let watcher = hub.connect().await;
    hub.subscribe(watcher.client_id, None).await?;

    assert!(hub.disconnect(watcher.client_id).await);
    assert_eq!(hub.publish("r1", RunUpdate::status(RunStatus::Running)).await, 0);
    assert_eq!(hub.membership_count(watcher.client_id).await, 0);

    let stats = hub.stats().await;
    assert_eq!(stats.sessions, 0);
    assert_eq!(stats.global_subscribers, 0);
    Ok(())
}

#[tokio::test]
async fn test_client_protocol_round_trip() {
    let hub = NotificationHub::default();
    let mut session = hub.connect().await;
    let client = session.client_id;

    hub.handle_client_message(client, r#"{"type":"subscribe","runId":"all"}"#)
        .await;
    hub.handle_client_message(client, r#"{"type":"ping"}"#).await;
    hub.handle_client_message(client, r#"{"type":"shout"}"#).await;

    let mut replies = Vec::new();
    while let Ok(text) = session.receiver.try_recv() {
        replies.push(serde_json::from_str::<ServerMessage>(&text).unwrap());
    }

    assert!(matches!(replies[0], ServerMessage::Connected { client_id, .. } if client_id == client));
    assert!(matches!(replies[1], ServerMessage::Subscribed { ref run_id, .. } if run_id == "*"));
    assert!(matches!(replies[2], ServerMessage::Pong { .. }));
    assert!(
        matches!(replies[3], ServerMessage::Error { ref message } if message.contains("shout"))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_churn_keeps_registry_consistent() -> Result<()> {
    let hub = Arc::new(NotificationHub::new(1024));
    let mut observer = hub.connect().await;
    hub.subscribe(observer.client_id, None).await?;

    let mut tasks = Vec::new();
    for worker in 0..8 {
        let hub = hub.clone();
        tasks.push(tokio::spawn(async move {
            for round in 0..20 {
                let session = hub.connect().await;
                let run_id = format!("run-{worker}-{round}");
                hub.subscribe(session.client_id, Some(&run_id)).await?;
                hub.publish(&run_id, RunUpdate::status(RunStatus::Running))
                    .await;
                hub.disconnect(session.client_id).await;
            }
            Ok::<_, ragrun::RagRunError>(())
        }));
    }
    for task in tasks {
        task.await.unwrap()?;
    }

    let stats = hub.stats().await;
    assert_eq!(stats.sessions, 1);
    assert_eq!(stats.global_subscribers, 1);
    assert_eq!(stats.tracked_runs, 0);

    let updates = drain_updates(&mut observer);
    assert_eq!(updates.len(), 160);
    let distinct: HashSet<_> = updates.iter().map(|(id, _)| id.clone()).collect();
    assert_eq!(distinct.len(), 160);
    Ok(())
}
