use instinct::core::config::Config;
use instinct::core::store::Store;
use instinct::engine::instinct::{get_instinct, initialize_instinct_db, load_instincts};
use instinct::engine::pass::{run_pass, PassMode};
use tempfile::tempdir;

fn setup() -> (tempfile::TempDir, Store) {
    let tmp = tempdir().unwrap();
    let store_root = tmp.path().join(".instinct").join("data");
    std::fs::create_dir_all(&store_root).unwrap();
    initialize_instinct_db(&store_root).unwrap();
    (tmp, Store::new(store_root))
}

fn write_observations(store: &Store, lines: &[String]) {
    let path = store.observations_dir().join("observations.jsonl");
    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(path, content).unwrap();
}

fn bash(ts: i64, session: &str, cmd: &str, success: bool) -> String {
    serde_json::json!({
        "timestamp": ts,
        "session_id": session,
        "tool": "bash",
        "input": { "command_preview": cmd, "command_length": cmd.len() },
        "output": { "success": success, "exit_code": if success { 0 } else { 1 } }
    })
    .to_string()
}

fn edit(ts: i64, session: &str, path: &str) -> String {
    serde_json::json!({
        "timestamp": ts,
        "session_id": session,
        "tool": "edit",
        "input": { "file_path": path, "replace_all": false },
        "output": { "success": true }
    })
    .to_string()
}

fn structural_edit(ts: i64, session: &str, path: &str, category: &str) -> String {
    serde_json::json!({
        "timestamp": ts,
        "session_id": session,
        "tool": "edit",
        "input": { "file_path": path, "replace_all": false },
        "output": { "success": true },
        "structural": {
            "operation": "modify",
            "change_category": category,
            "is_correction": true
        }
    })
    .to_string()
}

fn structural_write(ts: i64, session: &str, path: &str, module: &str) -> String {
    serde_json::json!({
        "timestamp": ts,
        "session_id": session,
        "tool": "write",
        "input": { "file_path": path, "content_length": 640 },
        "output": { "success": true },
        "structural": {
            "operation": "create",
            "imports": [{ "module": module, "names": ["APIRouter"] }],
            "functions": [{ "name": "handler", "params": 1, "return_type": "Response", "is_async": true }]
        }
    })
    .to_string()
}

#[test]
fn test_error_fix_sequence_becomes_instinct() {
    let (_tmp, store) = setup();
    let cfg = Config::default();
    write_observations(
        &store,
        &[
            bash(1, "s1", "npm test", false),
            edit(2, "s1", "src/math.test.ts"),
            bash(3, "s1", "npm test", true),
            bash(10, "s2", "npm test", false),
            edit(11, "s2", "src/other.test.ts"),
            bash(12, "s2", "npm test", false),
            bash(13, "s2", "npm test", true),
        ],
    );

    let report = run_pass(&store, &cfg, PassMode::Incremental).unwrap();
    let fix_id = report
        .created
        .iter()
        .find(|id| id.starts_with("error-fix-"))
        .expect("error-fix instinct expected");
    let fix = get_instinct(&store, fix_id).unwrap().unwrap();
    assert_eq!(fix.domain, "error-handling");
    assert!(fix.trigger.contains("npm test"));
}

#[test]
fn test_structural_corrections_recur_into_instinct() {
    let (_tmp, store) = setup();
    let cfg = Config::default();
    write_observations(
        &store,
        &[
            structural_edit(1, "s1", "api/users.py", "import_fix"),
            structural_edit(2, "s1", "api/orders.py", "import_fix"),
            structural_edit(3, "s2", "api/items.py", "import_fix"),
        ],
    );

    let report = run_pass(&store, &cfg, PassMode::Incremental).unwrap();
    assert!(report
        .created
        .contains(&"structural-correction-import-fix".to_string()));
    let created = get_instinct(&store, "structural-correction-import-fix")
        .unwrap()
        .unwrap();
    assert_eq!(created.domain, "structural-correction");
    assert!(created.action.contains("imports"));
}

#[test]
fn test_import_convention_across_files() {
    let (_tmp, store) = setup();
    let cfg = Config::default();
    write_observations(
        &store,
        &[
            structural_write(1, "s1", "api/a.py", "fastapi"),
            structural_write(2, "s1", "api/b.py", "fastapi"),
            structural_write(3, "s1", "api/c.py", "fastapi"),
            structural_write(4, "s2", "api/d.py", "fastapi"),
            structural_write(5, "s2", "api/e.py", "fastapi"),
        ],
    );

    let report = run_pass(&store, &cfg, PassMode::Incremental).unwrap();
    let conv_id = report
        .created
        .iter()
        .find(|id| id.starts_with("import-convention-"))
        .expect("import convention expected");
    let conv = get_instinct(&store, conv_id).unwrap().unwrap();
    assert_eq!(conv.domain, "import-pattern");
    assert!(conv.action.contains("fastapi"));

    // Every function in the payloads is annotated: the signature
    // convention rides along.
    let sig = report
        .created
        .iter()
        .find(|id| id.starts_with("signature-convention-"));
    assert!(sig.is_some(), "typed-return convention expected");
}

#[test]
fn test_single_session_noise_is_excluded() {
    let (_tmp, store) = setup();
    let cfg = Config::default();
    // Heavy repetition, one session only.
    let lines: Vec<String> = (0..20).map(|i| bash(i, "solo", "rg pattern", true)).collect();
    write_observations(&store, &lines);

    let report = run_pass(&store, &cfg, PassMode::Incremental).unwrap();
    assert!(report.created.is_empty());
    assert!(load_instincts(&store).unwrap().is_empty());
}

#[test]
fn test_malformed_lines_are_skipped_not_fatal() {
    let (_tmp, store) = setup();
    let cfg = Config::default();
    let mut lines = vec![
        "{broken json".to_string(),
        r#"{"timestamp": "not-a-number"}"#.to_string(),
    ];
    lines.extend([
        bash(1, "s1", "rg a", true),
        bash(2, "s1", "rg b", true),
        bash(3, "s1", "rg c", true),
        bash(4, "s2", "rg d", true),
        bash(5, "s2", "rg e", true),
    ]);
    write_observations(&store, &lines);

    let report = run_pass(&store, &cfg, PassMode::Incremental).unwrap();
    assert_eq!(report.status, "ok");
    assert_eq!(report.malformed_skipped, 2);
    assert_eq!(report.scanned, 5);
    assert!(report
        .created
        .contains(&"tool-preference-content-search-rg".to_string()));
}
