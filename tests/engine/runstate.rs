use instinct::core::config::Config;
use instinct::core::lock::{PassLock, LOCK_FILE_NAME};
use instinct::core::store::Store;
use instinct::engine::instinct::{initialize_instinct_db, load_instincts};
use instinct::engine::pass::{run_pass, PassMode};
use instinct::engine::runstate::{self, LoadOutcome, OBSERVATION_SOURCE, RUN_STATE_FILE};
use tempfile::tempdir;

fn setup() -> (tempfile::TempDir, Store) {
    let tmp = tempdir().unwrap();
    let store_root = tmp.path().join(".instinct").join("data");
    std::fs::create_dir_all(&store_root).unwrap();
    initialize_instinct_db(&store_root).unwrap();
    (tmp, Store::new(store_root))
}

fn bash(ts: i64, session: &str, cmd: &str) -> String {
    serde_json::json!({
        "timestamp": ts,
        "session_id": session,
        "tool": "bash",
        "input": { "command_preview": cmd, "command_length": cmd.len() },
        "output": { "success": true }
    })
    .to_string()
}

fn append_live(store: &Store, lines: &[String]) {
    use std::io::Write;
    let path = store.observations_dir().join("observations.jsonl");
    let mut f = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    for line in lines {
        writeln!(f, "{}", line).unwrap();
    }
}

#[test]
fn test_offset_advances_only_after_success() {
    let (_tmp, store) = setup();
    let cfg = Config::default();
    append_live(&store, &[bash(1, "s1", "ls"), bash(2, "s1", "ls")]);

    let report = run_pass(&store, &cfg, PassMode::Incremental).unwrap();
    assert_eq!(report.scanned, 2);

    match runstate::load(&store.root) {
        LoadOutcome::Loaded(state) => {
            assert_eq!(state.offset_for(OBSERVATION_SOURCE), 2);
            assert!(state.last_run_at.is_some());
        }
        other => panic!("expected committed run state, got {:?}", other),
    }
}

#[test]
fn test_incremental_pass_reads_only_new_records() {
    let (_tmp, store) = setup();
    let cfg = Config::default();
    append_live(&store, &[bash(1, "s1", "ls"), bash(2, "s2", "ls")]);
    run_pass(&store, &cfg, PassMode::Incremental).unwrap();

    append_live(&store, &[bash(3, "s3", "ls")]);
    let report = run_pass(&store, &cfg, PassMode::Incremental).unwrap();
    assert_eq!(report.scanned, 1);
}

#[test]
fn test_rotation_between_passes_keeps_logical_position() {
    let (_tmp, store) = setup();
    let cfg = Config::default();
    append_live(
        &store,
        &[bash(1, "s1", "a"), bash(2, "s1", "b"), bash(3, "s2", "c")],
    );
    run_pass(&store, &cfg, PassMode::Incremental).unwrap();

    // Writer rotates the live file and keeps appending.
    let dir = store.observations_dir();
    std::fs::rename(
        dir.join("observations.jsonl"),
        dir.join("observations.archive-20250601-101500.jsonl"),
    )
    .unwrap();
    append_live(&store, &[bash(4, "s2", "d"), bash(5, "s3", "e")]);

    let report = run_pass(&store, &cfg, PassMode::Incremental).unwrap();
    assert_eq!(report.scanned, 2, "only post-rotation records are new");

    match runstate::load(&store.root) {
        LoadOutcome::Loaded(state) => assert_eq!(state.offset_for(OBSERVATION_SOURCE), 5),
        other => panic!("expected committed run state, got {:?}", other),
    }
}

#[test]
fn test_corrupt_run_state_falls_back_to_full_replay_with_warning() {
    let (_tmp, store) = setup();
    let cfg = Config::default();
    append_live(&store, &[bash(1, "s1", "ls"), bash(2, "s2", "ls")]);
    run_pass(&store, &cfg, PassMode::Incremental).unwrap();

    std::fs::write(store.root.join(RUN_STATE_FILE), "{definitely not json").unwrap();

    let report = run_pass(&store, &cfg, PassMode::Incremental).unwrap();
    assert_eq!(report.status, "ok");
    assert_eq!(report.scanned, 2, "corrupt state must reprocess everything");
    assert!(
        report.warnings.iter().any(|w| w.contains("full replay")),
        "fallback must be explicit, not silent"
    );

    // A fresh marker is committed afterwards.
    assert!(matches!(
        runstate::load(&store.root),
        LoadOutcome::Loaded(_)
    ));
}

#[test]
fn test_replay_ignores_but_rewrites_the_marker() {
    let (_tmp, store) = setup();
    let cfg = Config::default();
    append_live(&store, &[bash(1, "s1", "ls"), bash(2, "s2", "ls")]);
    run_pass(&store, &cfg, PassMode::Incremental).unwrap();

    let report = run_pass(&store, &cfg, PassMode::Replay).unwrap();
    assert_eq!(report.scanned, 2, "replay reprocesses the full history");
    match runstate::load(&store.root) {
        LoadOutcome::Loaded(state) => assert_eq!(state.offset_for(OBSERVATION_SOURCE), 2),
        other => panic!("expected committed run state, got {:?}", other),
    }
}

#[test]
fn test_contended_lock_exits_busy_without_mutation() {
    let (_tmp, store) = setup();
    let cfg = Config::default();
    append_live(
        &store,
        &[
            bash(1, "s1", "rg a"),
            bash(2, "s1", "rg b"),
            bash(3, "s1", "rg c"),
            bash(4, "s2", "rg d"),
            bash(5, "s2", "rg e"),
        ],
    );

    let _held = PassLock::acquire(&store.root).unwrap();
    let report = run_pass(&store, &cfg, PassMode::Incremental).unwrap();
    assert_eq!(report.status, "busy");
    assert!(load_instincts(&store).unwrap().is_empty());
    assert!(matches!(runstate::load(&store.root), LoadOutcome::Missing));
    assert!(store.root.join(LOCK_FILE_NAME).exists());
}
