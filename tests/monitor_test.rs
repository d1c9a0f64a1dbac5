mod common;

use chequelot::application::monitor::{ACK_TIMEOUT_CAUSE, MonitorState};
use chequelot::application::orchestrator::{Orchestrator, TriggerRequest};
use chequelot::config::BatchConfig;
use chequelot::domain::run::ExecutionStatus;
use chequelot::infrastructure::in_memory::InMemoryChequeStore;
use common::{generate_lines, write_remittance};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Default timings, directories under `root`.
fn config(root: &Path) -> BatchConfig {
    BatchConfig {
        output_dir: root.join("output"),
        ack_dir: root.join("ord"),
        receipt_dir: root.join("crl"),
        reconciliation_dir: root.join("output"),
        ..Default::default()
    }
}

fn prepared(root: &Path) -> (Orchestrator, TriggerRequest) {
    let input = root.join("in");
    fs::create_dir(&input).unwrap();
    write_remittance(&input.join("a.remise"), &generate_lines("A", 3, 12, 3)).unwrap();

    let orchestrator =
        Orchestrator::new(Arc::new(InMemoryChequeStore::new()), config(root)).unwrap();
    orchestrator.ensure_directories().unwrap();
    let request = TriggerRequest {
        input_dir: input,
        output_dir: None,
    };
    (orchestrator, request)
}

#[tokio::test(start_paused = true)]
async fn test_no_acknowledgment_times_out_after_ack_wait() {
    let root = tempfile::tempdir().unwrap();
    let (orchestrator, request) = prepared(root.path());

    let started = Instant::now();
    let run_id = orchestrator.trigger(request).await;
    let status = orchestrator
        .wait_until_settled(run_id, Duration::from_secs(1))
        .await
        .unwrap();
    let waited = started.elapsed();

    assert_eq!(status.status, ExecutionStatus::Completed);
    assert_eq!(
        status.monitor,
        Some(MonitorState::Failed {
            cause: ACK_TIMEOUT_CAUSE.into()
        })
    );
    assert!(waited >= Duration::from_secs(120));
    assert!(waited < Duration::from_secs(300));

    // Terminal: a late acknowledgment changes nothing
    fs::write(root.path().join("ord").join("late.ORD"), "").unwrap();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(orchestrator.status(run_id).await.unwrap().monitor, status.monitor);
    assert!(!root.path().join("crl").join("late.CRL").exists());
}

#[tokio::test(start_paused = true)]
async fn test_acknowledgment_arriving_mid_wait_completes_monitor() {
    let root = tempfile::tempdir().unwrap();
    let (orchestrator, request) = prepared(root.path());
    let ack_dir = root.path().join("ord");

    let run_id = orchestrator.trigger(request).await;
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(60)).await;
        fs::write(ack_dir.join("012.001.2025010112.ORD"), "").unwrap();
    });

    let status = orchestrator
        .wait_until_settled(run_id, Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(
        status.monitor,
        Some(MonitorState::Completed {
            receipts: vec!["012.001.2025010112.CRL".into()]
        })
    );
    assert!(
        root.path()
            .join("crl")
            .join("012.001.2025010112.CRL")
            .exists()
    );
}

#[tokio::test(start_paused = true)]
async fn test_status_is_observable_while_waiting() {
    let root = tempfile::tempdir().unwrap();
    let (orchestrator, request) = prepared(root.path());

    let run_id = orchestrator.trigger(request).await;
    tokio::time::sleep(Duration::from_secs(30)).await;

    let status = orchestrator.status(run_id).await.unwrap();
    assert_eq!(status.status, ExecutionStatus::Completed);
    assert_eq!(status.monitor, Some(MonitorState::WaitingForAck));
    assert_eq!(status.control_files.len(), 1);
    assert!(!status.is_settled());
}
