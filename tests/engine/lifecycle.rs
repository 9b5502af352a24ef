use instinct::core::config::Config;
use instinct::core::store::Store;
use instinct::core::time::SECS_PER_DAY;
use instinct::engine::instinct::{
    get_instinct, initialize_instinct_db, load_instincts, load_skills, upsert_instinct, Instinct,
    Source, Status,
};
use instinct::engine::pass::{apply_skill_feedback, run_pass, store_status, PassMode};
use std::collections::BTreeSet;
use tempfile::tempdir;

fn setup() -> (tempfile::TempDir, Store) {
    let tmp = tempdir().unwrap();
    let store_root = tmp.path().join(".instinct").join("data");
    std::fs::create_dir_all(&store_root).unwrap();
    initialize_instinct_db(&store_root).unwrap();
    (tmp, Store::new(store_root))
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

fn bash_obs(ts: i64, session: &str, cmd: &str, success: bool) -> String {
    serde_json::json!({
        "timestamp": ts,
        "session_id": session,
        "tool": "bash",
        "input": { "command_preview": cmd, "command_length": cmd.len() },
        "output": { "success": success, "exit_code": if success { 0 } else { 1 } }
    })
    .to_string()
}

fn write_observations(store: &Store, lines: &[String]) {
    let path = store.observations_dir().join("observations.jsonl");
    let mut content = lines.join("\n");
    content.push('\n');
    std::fs::write(path, content).unwrap();
}

fn rg_preference_lines() -> Vec<String> {
    vec![
        bash_obs(1, "s1", "rg foo src/", true),
        bash_obs(2, "s1", "rg bar src/", true),
        bash_obs(3, "s1", "rg baz src/", true),
        bash_obs(4, "s2", "rg qux src/", true),
        bash_obs(5, "s2", "rg quux src/", true),
        bash_obs(6, "s2", "grep foo .", true),
    ]
}

fn seeded(id: &str, domain: &str, trigger: &str, action: &str, confidence: f64, reinforced_at: i64) -> Instinct {
    Instinct {
        id: id.to_string(),
        domain: domain.to_string(),
        category: "tool-preference".to_string(),
        trigger: trigger.to_string(),
        action: action.to_string(),
        confidence,
        source: Source::SessionObservation,
        status: Status::Active,
        auto_approved: false,
        created_at: reinforced_at,
        last_reinforced_at: reinforced_at,
        decay_weeks_applied: 0,
        contributing_sessions: BTreeSet::from(["s0".to_string()]),
        skill_id: None,
    }
}

#[test]
fn test_tool_preference_creation_scenario() {
    let (_tmp, store) = setup();
    let cfg = Config::default();
    write_observations(&store, &rg_preference_lines());

    let report = run_pass(&store, &cfg, PassMode::Incremental).unwrap();
    assert_eq!(report.status, "ok");
    assert_eq!(report.scanned, 6);
    assert!(report
        .created
        .contains(&"tool-preference-content-search-rg".to_string()));

    let created = get_instinct(&store, "tool-preference-content-search-rg")
        .unwrap()
        .expect("instinct should be stored");
    assert_eq!(created.confidence, 0.3);
    assert_eq!(created.domain, "tool-preference");
    assert!(!created.auto_approved);
    assert_eq!(created.contributing_sessions.len(), 2);
}

#[test]
fn test_pass_is_idempotent_without_new_observations() {
    let (_tmp, store) = setup();
    let cfg = Config::default();
    write_observations(&store, &rg_preference_lines());

    run_pass(&store, &cfg, PassMode::Incremental).unwrap();
    let before = load_instincts(&store).unwrap();

    let second = run_pass(&store, &cfg, PassMode::Incremental).unwrap();
    assert_eq!(second.status, "ok");
    assert_eq!(second.scanned, 0);
    assert!(second.created.is_empty());
    assert!(second.reinforced.is_empty());

    let after = load_instincts(&store).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_reinforcement_crosses_auto_approval_threshold() {
    let (_tmp, store) = setup();
    let cfg = Config::default();
    upsert_instinct(
        &store,
        &seeded(
            "tool-preference-content-search-rg",
            "tool-preference",
            "when searching file contents",
            "prefer `rg` for content-search (83% of observed usage)",
            0.65,
            now(),
        ),
    )
    .unwrap();
    write_observations(&store, &rg_preference_lines());

    let report = run_pass(&store, &cfg, PassMode::Incremental).unwrap();
    assert!(report
        .reinforced
        .contains(&"tool-preference-content-search-rg".to_string()));
    assert!(report.created.is_empty());

    let reinforced = get_instinct(&store, "tool-preference-content-search-rg")
        .unwrap()
        .unwrap();
    assert!((reinforced.confidence - 0.75).abs() < 1e-9);
    assert!(reinforced.auto_approved);
}

#[test]
fn test_stale_instinct_decays_and_prunes() {
    let (_tmp, store) = setup();
    let cfg = Config::default();
    // 0.4, last reinforced 35 days ago: 5 weeks × 0.05 = 0.25 off → 0.15 → pruned.
    upsert_instinct(
        &store,
        &seeded(
            "stale-habit",
            "workflow",
            "when deploying",
            "tag releases first",
            0.4,
            now() - 35 * SECS_PER_DAY,
        ),
    )
    .unwrap();

    let report = run_pass(&store, &cfg, PassMode::Incremental).unwrap();
    assert!(report.decayed.contains(&"stale-habit".to_string()));
    assert!(report.pruned.contains(&"stale-habit".to_string()));
    assert!(get_instinct(&store, "stale-habit").unwrap().is_none());
}

#[test]
fn test_confidence_bounds_hold_after_every_pass() {
    let (_tmp, store) = setup();
    let cfg = Config::default();
    upsert_instinct(
        &store,
        &seeded("near-cap", "workflow", "t1", "run checks", 0.94, now()),
    )
    .unwrap();
    upsert_instinct(
        &store,
        &seeded(
            "mid",
            "code-style",
            "t2",
            "keep modules small",
            0.5,
            now() - 20 * SECS_PER_DAY,
        ),
    )
    .unwrap();

    run_pass(&store, &cfg, PassMode::Incremental).unwrap();
    for instinct in load_instincts(&store).unwrap().values() {
        assert!(instinct.confidence >= 0.0);
        assert!(instinct.confidence <= 0.95);
        assert!(instinct.confidence >= 0.2, "below-floor records must be pruned");
    }
}

#[test]
fn test_evolution_thresholds() {
    // Two members never evolve.
    let (_tmp, store) = setup();
    let cfg = Config::default();
    upsert_instinct(&store, &seeded("a", "workflow", "t a", "act a", 0.9, now())).unwrap();
    upsert_instinct(&store, &seeded("b", "workflow", "t b", "act b", 0.9, now())).unwrap();
    let report = run_pass(&store, &cfg, PassMode::Incremental).unwrap();
    assert!(report.skills_created.is_empty());

    // Three members averaging exactly 0.5 evolve.
    let (_tmp2, store2) = setup();
    upsert_instinct(&store2, &seeded("a", "workflow", "review diffs before commit", "inspect the diff", 0.5, now())).unwrap();
    upsert_instinct(&store2, &seeded("b", "workflow", "run tests after edits", "execute the suite", 0.5, now())).unwrap();
    upsert_instinct(&store2, &seeded("c", "workflow", "tag releases when shipping", "cut a tag", 0.5, now())).unwrap();
    let report = run_pass(&store2, &cfg, PassMode::Incremental).unwrap();
    assert_eq!(report.skills_created.len(), 1);
    let skills = load_skills(&store2).unwrap();
    assert_eq!(skills.len(), 1);
    assert_eq!(skills[0].member_instinct_ids.len(), 3);
    assert!((skills[0].avg_confidence_at_creation - 0.5).abs() < 1e-9);
    // Members carry the back-reference.
    let member = get_instinct(&store2, "a").unwrap().unwrap();
    assert_eq!(member.skill_id.as_deref(), Some(skills[0].id.as_str()));

    // Unchanged membership does not re-evolve.
    let report = run_pass(&store2, &cfg, PassMode::Incremental).unwrap();
    assert!(report.skills_created.is_empty());
    assert_eq!(load_skills(&store2).unwrap().len(), 1);

    // Averaging 0.49 does not evolve.
    let (_tmp3, store3) = setup();
    upsert_instinct(&store3, &seeded("a", "workflow", "review diffs before commit", "inspect the diff", 0.49, now())).unwrap();
    upsert_instinct(&store3, &seeded("b", "workflow", "run tests after edits", "execute the suite", 0.49, now())).unwrap();
    upsert_instinct(&store3, &seeded("c", "workflow", "tag releases when shipping", "cut a tag", 0.49, now())).unwrap();
    let report = run_pass(&store3, &cfg, PassMode::Incremental).unwrap();
    assert!(report.skills_created.is_empty());
}

#[test]
fn test_replay_diff_reports_reinforcement_not_creation() {
    let (_tmp, store) = setup();
    let cfg = Config::default();
    upsert_instinct(
        &store,
        &seeded(
            "tool-preference-content-search-rg",
            "tool-preference",
            "when searching file contents",
            "prefer `rg` for content-search (83% of observed usage)",
            0.4,
            now(),
        ),
    )
    .unwrap();
    write_observations(&store, &rg_preference_lines());

    let report = run_pass(&store, &cfg, PassMode::Replay).unwrap();
    let diff = report.replay_diff.expect("replay must produce a diff");
    assert_eq!(diff.reinforced.len(), 1);
    assert!(diff.created.is_empty());
}

#[test]
fn test_disabled_observer_refuses_to_pass() {
    let (_tmp, store) = setup();
    let mut cfg = Config::default();
    cfg.observer.enabled = false;
    write_observations(&store, &rg_preference_lines());

    let report = run_pass(&store, &cfg, PassMode::Incremental).unwrap();
    assert_eq!(report.status, "disabled");
    assert!(load_instincts(&store).unwrap().is_empty());
}

#[test]
fn test_soft_cap_prunes_lowest_confidence_first() {
    let (_tmp, store) = setup();
    let mut cfg = Config::default();
    cfg.instincts.max_instincts = 2;
    upsert_instinct(&store, &seeded("low", "workflow", "t low", "low action", 0.25, now())).unwrap();
    upsert_instinct(&store, &seeded("mid", "code-style", "t mid", "mid action", 0.5, now())).unwrap();
    upsert_instinct(&store, &seeded("high", "testing", "t high", "high action", 0.9, now())).unwrap();

    let report = run_pass(&store, &cfg, PassMode::Incremental).unwrap();
    assert!(report.pruned.contains(&"low".to_string()));
    let remaining = load_instincts(&store).unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.contains_key("high"));
}

#[test]
fn test_skill_feedback_is_deduplicated_per_event() {
    let (_tmp, store) = setup();
    let cfg = Config::default();
    upsert_instinct(&store, &seeded("a", "workflow", "review diffs before commit", "inspect the diff", 0.6, now())).unwrap();
    upsert_instinct(&store, &seeded("b", "workflow", "run tests after edits", "execute the suite", 0.6, now())).unwrap();
    upsert_instinct(&store, &seeded("c", "workflow", "tag releases when shipping", "cut a tag", 0.6, now())).unwrap();
    run_pass(&store, &cfg, PassMode::Incremental).unwrap();
    let skill_id = load_skills(&store).unwrap()[0].id.clone();

    let first = apply_skill_feedback(&store, &cfg, &skill_id, "evt-1").unwrap();
    assert!(!first.duplicate);
    assert_eq!(first.reinforced.len(), 3);
    let boosted = get_instinct(&store, "a").unwrap().unwrap();
    assert!((boosted.confidence - 0.62).abs() < 1e-9);

    let second = apply_skill_feedback(&store, &cfg, &skill_id, "evt-1").unwrap();
    assert!(second.duplicate);
    assert!(second.reinforced.is_empty());
    let unchanged = get_instinct(&store, "a").unwrap().unwrap();
    assert!((unchanged.confidence - 0.62).abs() < 1e-9);
}

#[test]
fn test_inherited_instincts_survive_staleness() {
    let (_tmp, store) = setup();
    let cfg = Config::default();
    let mut inherited = seeded(
        "org-habit",
        "code-style",
        "when writing modules",
        "follow the org layout",
        0.9,
        now() - 120 * SECS_PER_DAY,
    );
    inherited.source = Source::Inherited;
    upsert_instinct(&store, &inherited).unwrap();

    let report = run_pass(&store, &cfg, PassMode::Incremental).unwrap();
    assert!(report.pruned.is_empty());
    assert!(report.decayed.is_empty());
    let kept = get_instinct(&store, "org-habit").unwrap().unwrap();
    assert_eq!(kept.confidence, 0.9);
}

#[test]
fn test_status_flags_review_candidates() {
    let (_tmp, store) = setup();
    let cfg = Config::default();
    upsert_instinct(&store, &seeded("weak", "workflow", "t", "weak action", 0.25, now())).unwrap();
    upsert_instinct(&store, &seeded("strong", "workflow", "t2", "strong action", 0.9, now())).unwrap();

    let status = store_status(&store, &cfg).unwrap();
    assert_eq!(status.instincts_total, 2);
    assert_eq!(status.review.len(), 1);
    assert_eq!(status.review[0].id, "weak");
}
