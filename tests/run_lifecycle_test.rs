mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::hit;
use common::FakeSynthesizer;
use common::Harness;
use ragrun::models::RunStatus;
use ragrun::models::Stage;
use ragrun::notify::NotificationHub;
use ragrun::notify::ServerMessage;
use ragrun::pipeline::PipelineOptions;
use ragrun::pipeline::RunOutcome;
use ragrun::pipeline::INSUFFICIENT_INFORMATION_ANSWER;
use ragrun::store::RunStore;
use ragrun::Result;

#[tokio::test]
async fn test_run_completes_after_launch() -> Result<()> {
    let harness = Harness::builder().build();

    let (record, handle) = harness
        .controller
        .submit("r1", "What must I disclose?")
        .await?;
    assert_eq!(record.status, RunStatus::Pending);

    // The launcher returned before the run got a chance to start
    assert_eq!(harness.run("r1").await.status, RunStatus::Pending);

    assert_eq!(handle.await.unwrap(), RunOutcome::Completed);

    let record = harness.run("r1").await;
    assert_eq!(record.status, RunStatus::Completed);
    assert!(record.error.is_none());
    assert!(record.completed_at.is_some());

    let result = record.result.expect("completed run carries a result");
    assert!(!result.answer.is_empty());
    assert_eq!(result.stages.len(), 4);
    assert!(result.stage_latency(Stage::Synthesis).is_some());
    let ids: Vec<_> = result.documents.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, ["d1", "d2"]);

    let stages: Vec<_> = record.progress.iter().map(|note| note.stage).collect();
    assert_eq!(stages, Stage::ALL);
    Ok(())
}

#[tokio::test]
async fn test_stage_failure_fails_run_and_notifies() -> Result<()> {
    let harness = Harness::builder().fail_retrieval().build();

    let (_, handle) = harness
        .controller
        .submit("r3", "What must I disclose?")
        .await?;
    let outcome = handle.await.unwrap();
    assert!(matches!(outcome, RunOutcome::Failed(_)));

    let record = harness.run("r3").await;
    assert_eq!(record.status, RunStatus::Failed);
    assert!(record.result.is_none());
    let error = record.error.expect("failed run carries an error");
    assert!(error.contains("retrieval"), "unexpected error: {error}");
    assert!(error.contains("document store unavailable"));

    // Synthesis never ran
    assert_eq!(harness.synthesizer.calls.load(Ordering::SeqCst), 0);

    let updates = harness.sink.for_run("r3");
    let failed_stage = updates
        .iter()
        .find(|u| u.stage == Some(Stage::Retrieval))
        .expect("retrieval failure is reported");
    assert!(failed_stage.error.is_some());

    let last = updates.last().unwrap();
    assert_eq!(last.status, RunStatus::Failed);
    assert!(last.error.is_some());
    Ok(())
}

#[tokio::test]
async fn test_duplicate_launch_executes_once() -> Result<()> {
    let harness = Harness::builder().build();
    harness.store.create_run("r1", "What must I disclose?").await?;

    let first = harness.controller.launch("r1");
    let second = harness.controller.launch("r1");
    let outcomes = [first.await.unwrap(), second.await.unwrap()];

    let completed = outcomes
        .iter()
        .filter(|o| **o == RunOutcome::Completed)
        .count();
    let skipped = outcomes
        .iter()
        .filter(|o| matches!(o, RunOutcome::Skipped(_)))
        .count();
    assert_eq!((completed, skipped), (1, 1));
    assert_eq!(harness.embedder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.synthesizer.calls.load(Ordering::SeqCst), 1);

    // Relaunching a finished run is a no-op
    let again = harness.controller.launch("r1").await.unwrap();
    assert_eq!(again, RunOutcome::Skipped(RunStatus::Completed));
    assert_eq!(harness.embedder.calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_launches_on_many_threads() -> Result<()> {
    let harness = Harness::builder().build();
    harness.store.create_run("r1", "What must I disclose?").await?;

    let handles: Vec<_> = (0..8).map(|_| harness.controller.launch("r1")).collect();
    let mut completed = 0;
    for handle in handles {
        if handle.await.unwrap() == RunOutcome::Completed {
            completed += 1;
        }
    }

    assert_eq!(completed, 1);
    assert_eq!(harness.embedder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.run("r1").await.status, RunStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn test_updates_follow_stage_order() -> Result<()> {
    let harness = Harness::builder().build();
    let (_, handle) = harness.controller.submit("r1", "What must I disclose?").await?;
    handle.await.unwrap();

    let updates = harness.sink.for_run("r1");
    let trail: Vec<_> = updates.iter().map(|u| (u.status, u.stage)).collect();
    assert_eq!(
        trail,
        [
            (RunStatus::Running, None),
            (RunStatus::Running, Some(Stage::Embedding)),
            (RunStatus::Running, Some(Stage::Search)),
            (RunStatus::Running, Some(Stage::Retrieval)),
            (RunStatus::Running, Some(Stage::Synthesis)),
            (RunStatus::Completed, None),
        ]
    );

    let terminal = updates.last().unwrap();
    assert!(terminal.result.is_some());
    assert!(terminal.elapsed_ms.is_some());
    Ok(())
}

#[tokio::test]
async fn test_empty_retrieval_answers_insufficient_information() -> Result<()> {
    let harness = Harness::builder().hits(Vec::new()).build();
    let (_, handle) = harness.controller.submit("r1", "Who won in 1066?").await?;

    assert_eq!(handle.await.unwrap(), RunOutcome::Completed);

    let result = harness.run("r1").await.result.unwrap();
    assert_eq!(result.answer, INSUFFICIENT_INFORMATION_ANSWER);
    assert!(result.documents.is_empty());
    assert_eq!(harness.synthesizer.calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_min_score_drops_weak_hits() -> Result<()> {
    let options = PipelineOptions {
        min_score: Some(0.8),
        ..PipelineOptions::default()
    };
    let harness = Harness::builder()
        .hits(vec![hit("d1", 0.92), hit("d2", 0.5)])
        .options(options)
        .build();

    let (_, handle) = harness.controller.submit("r1", "What must I disclose?").await?;
    handle.await.unwrap();

    let result = harness.run("r1").await.result.unwrap();
    assert_eq!(result.documents.len(), 1);
    assert_eq!(result.documents[0].id, "d1");
    Ok(())
}

#[tokio::test]
async fn test_context_cap_too_small_reports_no_documents() -> Result<()> {
    let options = PipelineOptions {
        max_context_chars: 0,
        ..PipelineOptions::default()
    };
    let harness = Harness::builder().options(options).build();

    let (_, handle) = harness.controller.submit("r1", "What must I disclose?").await?;
    assert_eq!(handle.await.unwrap(), RunOutcome::Completed);

    // The answer and the documents it cites must agree
    let result = harness.run("r1").await.result.unwrap();
    assert_eq!(result.answer, INSUFFICIENT_INFORMATION_ANSWER);
    assert!(result.documents.is_empty());
    assert_eq!(harness.synthesizer.calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_stage_watchdog_fails_stalled_run() -> Result<()> {
    let options = PipelineOptions {
        stage_timeout: Some(Duration::from_millis(50)),
        ..PipelineOptions::default()
    };
    let harness = Harness::builder()
        .synthesizer(FakeSynthesizer {
            delay: Some(Duration::from_secs(5)),
            ..FakeSynthesizer::default()
        })
        .options(options)
        .build();

    let (_, handle) = harness.controller.submit("r1", "What must I disclose?").await?;
    assert!(matches!(handle.await.unwrap(), RunOutcome::Failed(_)));

    let record = harness.run("r1").await;
    assert_eq!(record.status, RunStatus::Failed);
    let error = record.error.unwrap();
    assert!(error.contains("synthesis"), "unexpected error: {error}");
    assert!(error.contains("Timed out"), "unexpected error: {error}");
    Ok(())
}

#[tokio::test]
async fn test_panicking_stage_still_reaches_failed() -> Result<()> {
    let harness = Harness::builder()
        .synthesizer(FakeSynthesizer {
            panic: true,
            ..FakeSynthesizer::default()
        })
        .build();

    let (_, handle) = harness.controller.submit("r1", "What must I disclose?").await?;
    let outcome = handle.await.unwrap();
    assert!(matches!(outcome, RunOutcome::Failed(ref msg) if msg.contains("panicked")));

    let record = harness.run("r1").await;
    assert_eq!(record.status, RunStatus::Failed);
    assert!(record.error.unwrap().contains("synthesizer exploded"));

    let last = harness.sink.for_run("r1").pop().unwrap();
    assert_eq!(last.status, RunStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn test_launching_unknown_run_does_not_panic() {
    let harness = Harness::builder().build();
    let outcome = harness.controller.launch("ghost").await.unwrap();

    assert!(matches!(outcome, RunOutcome::Failed(ref msg) if msg.contains("ghost")));
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_runs() -> Result<()> {
    let harness = Harness::builder()
        .synthesizer(FakeSynthesizer {
            delay: Some(Duration::from_millis(100)),
            ..FakeSynthesizer::default()
        })
        .build();

    harness.controller.submit("r1", "What must I disclose?").await?;
    harness.controller.submit("r2", "What fees apply?").await?;

    assert!(harness.controller.shutdown(Duration::from_secs(5)).await);
    assert_eq!(harness.run("r1").await.status, RunStatus::Completed);
    assert_eq!(harness.run("r2").await.status, RunStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn test_controller_publishes_through_hub() -> Result<()> {
    let hub = Arc::new(NotificationHub::default());
    let harness = Harness::builder().sink(hub.clone()).build();

    let mut watcher = hub.connect().await;
    hub.subscribe(watcher.client_id, None).await?;

    let (_, handle) = harness.controller.submit("r1", "What must I disclose?").await?;
    handle.await.unwrap();

    let mut statuses = Vec::new();
    while let Ok(text) = watcher.receiver.try_recv() {
        if let Ok(ServerMessage::RunUpdate { run_id, update, .. }) = serde_json::from_str(&text) {
            assert_eq!(run_id, "r1");
            statuses.push(update.status);
        }
    }

    assert_eq!(statuses.len(), 6);
    assert_eq!(statuses.last(), Some(&RunStatus::Completed));
    Ok(())
}
