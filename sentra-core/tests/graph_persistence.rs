//! Integration tests for end-to-end execution and graph persistence

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use sentra_core::command::{CommandBuilder, FinalCommand};
use sentra_core::exec::{ExecutionCoordinator, RunOutput, ToolRunner};
use sentra_core::intent::IntentType;
use sentra_core::parsers::ParserRegistry;
use sentra_core::registry::ToolRegistry;
use sentra_core::store::{
    EntityStore, EntityType, ExecutionStatus, ParseStatus, RelationshipType,
};
use sentra_core::Result;

/// Runner that replays canned output instead of spawning anything
struct CannedRunner {
    stdout: String,
    exit_code: i32,
}

#[async_trait]
impl ToolRunner for CannedRunner {
    async fn run(&self, _command: &FinalCommand) -> Result<RunOutput> {
        Ok(RunOutput {
            stdout: self.stdout.clone(),
            stderr: String::new(),
            exit_code: self.exit_code,
        })
    }
}

const SCAN_OUTPUT: &str = "\
Nmap scan report for 192.168.1.10
PORT    STATE SERVICE
22/tcp  open  ssh
80/tcp  open  http
";

fn coordinator_with(
    stdout: &str,
    exit_code: i32,
    store: Arc<Mutex<EntityStore>>,
) -> ExecutionCoordinator {
    ExecutionCoordinator::new(
        Arc::new(CannedRunner {
            stdout: stdout.to_string(),
            exit_code,
        }),
        ParserRegistry::with_defaults(),
        &ToolRegistry::new(),
        store,
        Duration::from_secs(5),
    )
    .expect("parser coverage is complete")
}

fn port_scan_command() -> FinalCommand {
    let tools = ToolRegistry::new();
    let spec = tools
        .build_tool_spec(IntentType::PortScan, Some("192.168.1.10"), &HashMap::new())
        .expect("should resolve");
    CommandBuilder::new()
        .build(&spec, "port scan")
        .expect("should build")
}

#[tokio::test]
async fn test_run_persists_graph_across_reopen() {
    let temp = TempDir::new().expect("should create temp dir");
    let db_path = temp.path().join("state.db");

    {
        let store = Arc::new(Mutex::new(
            EntityStore::open(&db_path).expect("should open store"),
        ));
        let coordinator = coordinator_with(SCAN_OUTPUT, 0, Arc::clone(&store));

        let record = coordinator
            .start(IntentType::PortScan, port_scan_command(), None)
            .expect("should start")
            .join()
            .await
            .expect("should complete");

        assert_eq!(record.status, ExecutionStatus::Success);
        assert_eq!(record.entities_created, 5);
    }

    // Reopen the same file cold
    let store = EntityStore::open(&db_path).expect("should reopen store");

    let hosts = store
        .entities_by_type(EntityType::Host)
        .expect("should query");
    assert_eq!(hosts.len(), 1);

    let ports = store
        .children("host_192_168_1_10", RelationshipType::HasPort)
        .expect("should query children");
    assert_eq!(ports.len(), 2);

    let record = store
        .last_execution("port_scan")
        .expect("should query")
        .expect("history row survives reopen");
    assert_eq!(record.status, ExecutionStatus::Success);
    assert_eq!(record.parse_status, ParseStatus::Parsed);
}

#[tokio::test]
async fn test_rerun_is_idempotent_on_entities_append_only_on_history() {
    let temp = TempDir::new().expect("should create temp dir");
    let store = Arc::new(Mutex::new(
        EntityStore::open(temp.path().join("state.db")).expect("should open store"),
    ));

    for _ in 0..2 {
        let coordinator = coordinator_with(SCAN_OUTPUT, 0, Arc::clone(&store));
        coordinator
            .start(IntentType::PortScan, port_scan_command(), None)
            .expect("should start")
            .join()
            .await
            .expect("should complete");
    }

    let store = store.lock().expect("should lock");
    // Same scan twice: canonical ids dedupe the graph
    assert_eq!(
        store.entities_by_type(EntityType::Host).expect("query").len(),
        1
    );
    assert_eq!(
        store.entities_by_type(EntityType::Port).expect("query").len(),
        2
    );
    // History is append-only
    assert_eq!(store.executions(Some("port_scan")).expect("query").len(), 2);
}

#[tokio::test]
async fn test_failed_run_leaves_graph_untouched() {
    let temp = TempDir::new().expect("should create temp dir");
    let store = Arc::new(Mutex::new(
        EntityStore::open(temp.path().join("state.db")).expect("should open store"),
    ));
    let coordinator = coordinator_with("", 1, Arc::clone(&store));

    let record = coordinator
        .start(IntentType::PortScan, port_scan_command(), None)
        .expect("should start")
        .join()
        .await
        .expect("run resolves even on tool failure");

    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(record.entities_created, 0);

    let store = store.lock().expect("should lock");
    assert!(store
        .entities_by_type(EntityType::Host)
        .expect("query")
        .is_empty());
    assert_eq!(store.executions(None).expect("query").len(), 1);
}

#[tokio::test]
async fn test_checkpoint_restore_round_trip_with_history() {
    let temp = TempDir::new().expect("should create temp dir");
    let db_path = temp.path().join("state.db");
    let snapshot = temp.path().join("snapshot.db");

    let store = Arc::new(Mutex::new(
        EntityStore::open(&db_path).expect("should open store"),
    ));

    let coordinator = coordinator_with(SCAN_OUTPUT, 0, Arc::clone(&store));
    coordinator
        .start(IntentType::PortScan, port_scan_command(), None)
        .expect("should start")
        .join()
        .await
        .expect("should complete");

    store
        .lock()
        .expect("should lock")
        .checkpoint(&snapshot)
        .expect("should checkpoint");

    // Wipe the graph after the snapshot
    store
        .lock()
        .expect("should lock")
        .prune_stale(Duration::from_secs(0))
        .expect("should prune");
    assert!(store
        .lock()
        .expect("should lock")
        .entities_by_type(EntityType::Host)
        .expect("query")
        .is_empty());

    // Restore brings the entities back
    store
        .lock()
        .expect("should lock")
        .restore(&snapshot)
        .expect("should restore");
    assert_eq!(
        store
            .lock()
            .expect("should lock")
            .entities_by_type(EntityType::Host)
            .expect("query")
            .len(),
        1
    );
}
