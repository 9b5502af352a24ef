//! Processing pass orchestration.
//!
//! A pass takes a fixed snapshot of the observation files, runs every
//! detector over the unprocessed window, merges candidates through the
//! confidence engine, dedups, evolves, and commits. All store mutations
//! are staged in memory and land as one transaction; the offset advances
//! only after that commit, so a failed pass leaves the prior state intact.

use crate::core::config::Config;
use crate::core::error::InstinctError;
use crate::core::lock::PassLock;
use crate::core::store::Store;
use crate::core::time;
use crate::engine::confidence::{self, ConflictPair};
use crate::engine::dedup::{self, MergeRecord};
use crate::engine::detectors;
use crate::engine::evolution;
use crate::engine::instinct::{self, Instinct, PassCommit, Status};
use crate::engine::observation;
use crate::engine::runstate::{self, LoadOutcome, RunState, OBSERVATION_SOURCE};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassMode {
    Incremental,
    Replay,
}

/// Structured pass summary: the only user-visible surface of a pass.
#[derive(Debug, Serialize)]
pub struct PassReport {
    pub status: String,
    pub mode: PassMode,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub scanned: usize,
    pub malformed_skipped: usize,
    pub candidates: usize,
    pub created: Vec<String>,
    pub reinforced: Vec<String>,
    pub decayed: Vec<String>,
    pub pruned: Vec<String>,
    pub merged: Vec<MergeRecord>,
    pub conflicted: Vec<ConflictPair>,
    pub skills_created: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay_diff: Option<ReplayDiff>,
}

impl PassReport {
    fn new(mode: PassMode, started_at: i64) -> Self {
        Self {
            status: "ok".to_string(),
            mode,
            started_at,
            finished_at: None,
            scanned: 0,
            malformed_skipped: 0,
            candidates: 0,
            created: Vec::new(),
            reinforced: Vec::new(),
            decayed: Vec::new(),
            pruned: Vec::new(),
            merged: Vec::new(),
            conflicted: Vec::new(),
            skills_created: Vec::new(),
            warnings: Vec::new(),
            replay_diff: None,
        }
    }
}

/// Diff of a replay against the pre-replay store snapshot.
#[derive(Debug, Serialize)]
pub struct ReplayDiff {
    pub created: Vec<String>,
    pub reinforced: Vec<String>,
    pub changed: Vec<String>,
    pub pruned: Vec<String>,
}

pub fn run_pass(
    store: &Store,
    cfg: &Config,
    mode: PassMode,
) -> Result<PassReport, InstinctError> {
    let started_at = time::epoch_secs();
    let mut report = PassReport::new(mode, started_at);

    if !cfg.observer.enabled {
        report.status = "disabled".to_string();
        return Ok(report);
    }

    let _lock = match PassLock::acquire(&store.root) {
        Ok(lock) => lock,
        Err(InstinctError::Busy(msg)) => {
            report.status = "busy".to_string();
            report.warnings.push(msg);
            return Ok(report);
        }
        Err(e) => return Err(e),
    };

    let mut replay = mode == PassMode::Replay;
    let mut offset = 0u64;
    if !replay {
        match runstate::load(&store.root) {
            LoadOutcome::Loaded(state) => offset = state.offset_for(OBSERVATION_SOURCE),
            LoadOutcome::Missing => {}
            LoadOutcome::Corrupt(detail) => {
                report.warnings.push(format!(
                    "run state unreadable ({}); falling back to full replay",
                    detail
                ));
                replay = true;
            }
        }
    }

    // Fixed snapshot of the files available at start time; the pass never
    // re-reads growing data.
    let snapshot = observation::load_snapshot(&store.observations_dir())?;
    let window = snapshot.window_from(if replay { 0 } else { offset });
    report.scanned = window.len();
    report.malformed_skipped = snapshot.malformed;

    let candidates = detectors::detect_patterns(&window);
    report.candidates = candidates.len();

    let mut instincts = instinct::load_instincts(store)?;
    let pre_snapshot = if mode == PassMode::Replay {
        Some(instincts.clone())
    } else {
        None
    };

    let now = time::epoch_secs();
    let transitions = confidence::apply_candidates(now, &mut instincts, &candidates, cfg);
    report.created = transitions.created;
    report.reinforced = transitions.reinforced;
    report.conflicted = transitions.conflicted;

    report.decayed = confidence::apply_decay(now, &mut instincts, cfg);
    report.pruned = confidence::prune(now, &mut instincts, cfg)
        .into_iter()
        .map(|i| i.id)
        .collect();
    report.pruned.extend(
        confidence::enforce_cap(&mut instincts, cfg)
            .into_iter()
            .map(|i| i.id),
    );

    report.merged = dedup::merge_duplicates(&mut instincts, cfg);

    let evolved_signatures = instinct::load_evolved_signatures(store)?;
    let evolution = evolution::evolve(now, &mut instincts, &evolved_signatures, cfg);
    report.skills_created = evolution.skills.iter().map(|s| s.id.clone()).collect();

    // The single logical commit; everything before this point is staging.
    let commit = PassCommit {
        instincts: instincts.values().cloned().collect(),
        new_skills: evolution.skills,
        new_signatures: evolution.signatures,
    };
    instinct::commit_pass(store, &commit)?;

    let mut state = RunState {
        schema_version: runstate::SCHEMA_VERSION.to_string(),
        ..Default::default()
    };
    state
        .sources
        .insert(OBSERVATION_SOURCE.to_string(), snapshot.end_offset);
    state.last_run_at = Some(now);
    runstate::save(&store.root, &state)?;

    if let Some(pre) = pre_snapshot {
        report.replay_diff = Some(diff_stores(&pre, &instincts, &report.reinforced));
    }

    report.finished_at = Some(time::epoch_secs());
    Ok(report)
}

fn diff_stores(
    pre: &BTreeMap<String, Instinct>,
    post: &BTreeMap<String, Instinct>,
    reinforced: &[String],
) -> ReplayDiff {
    let created = post
        .keys()
        .filter(|id| !pre.contains_key(*id))
        .cloned()
        .collect();
    let pruned = pre
        .keys()
        .filter(|id| !post.contains_key(*id))
        .cloned()
        .collect();
    let reinforced: Vec<String> = reinforced
        .iter()
        .filter(|id| post.contains_key(*id))
        .cloned()
        .collect();
    let changed = post
        .iter()
        .filter(|(id, instinct)| {
            pre.get(*id).is_some_and(|old| {
                (old.confidence - instinct.confidence).abs() > f64::EPSILON
            }) && !reinforced.contains(id)
        })
        .map(|(id, _)| id.clone())
        .collect();

    ReplayDiff {
        created,
        reinforced,
        changed,
        pruned,
    }
}

/// Store health view for `observe status`.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub observe_enabled: bool,
    pub last_run_at: Option<i64>,
    pub offset: u64,
    pub instincts_total: usize,
    pub active: usize,
    pub conflicted: usize,
    pub auto_approved: usize,
    pub skills_total: usize,
    /// Low-confidence or stale instincts worth a human look; informational.
    pub review: Vec<ReviewItem>,
}

#[derive(Debug, Serialize)]
pub struct ReviewItem {
    pub id: String,
    pub confidence: f64,
    pub days_stale: i64,
}

pub fn store_status(store: &Store, cfg: &Config) -> Result<StatusReport, InstinctError> {
    let instincts = instinct::load_instincts(store)?;
    let skills = instinct::load_skills(store)?;
    let now = time::epoch_secs();

    let (offset, last_run_at) = match runstate::load(&store.root) {
        LoadOutcome::Loaded(state) => (state.offset_for(OBSERVATION_SOURCE), state.last_run_at),
        _ => (0, None),
    };

    let review = instincts
        .values()
        .filter(|i| i.is_mutable())
        .filter_map(|i| {
            let days_stale = time::days_between(i.last_reinforced_at, now);
            let needs_review = i.confidence < cfg.instincts.prune.review_confidence
                || days_stale > cfg.instincts.prune.review_staleness_days;
            needs_review.then(|| ReviewItem {
                id: i.id.clone(),
                confidence: i.confidence,
                days_stale,
            })
        })
        .collect();

    Ok(StatusReport {
        observe_enabled: cfg.observer.enabled,
        last_run_at,
        offset,
        instincts_total: instincts.len(),
        active: instincts
            .values()
            .filter(|i| i.status == Status::Active)
            .count(),
        conflicted: instincts
            .values()
            .filter(|i| i.status == Status::Conflicted)
            .count(),
        auto_approved: instincts.values().filter(|i| i.auto_approved).count(),
        skills_total: skills.len(),
        review,
    })
}

#[derive(Debug, Serialize)]
pub struct FeedbackReport {
    pub skill_id: String,
    /// True when this usage event was already applied; nothing changed.
    pub duplicate: bool,
    pub reinforced: Vec<String>,
}

/// External signal that a skill invocation succeeded: reinforce each
/// member instinct once per usage event.
pub fn apply_skill_feedback(
    store: &Store,
    cfg: &Config,
    skill_id: &str,
    usage_event_id: &str,
) -> Result<FeedbackReport, InstinctError> {
    let Some(skill) = instinct::get_skill(store, skill_id)? else {
        return Err(InstinctError::NotFound(format!("skill '{}'", skill_id)));
    };

    if !instinct::record_skill_feedback(store, skill_id, usage_event_id)? {
        return Ok(FeedbackReport {
            skill_id: skill_id.to_string(),
            duplicate: true,
            reinforced: Vec::new(),
        });
    }

    let mut instincts = instinct::load_instincts(store)?;
    let reinforced =
        confidence::reinforce_from_skill_usage(&mut instincts, &skill.member_instinct_ids, cfg);
    let commit = PassCommit {
        instincts: instincts.values().cloned().collect(),
        ..Default::default()
    };
    instinct::commit_pass(store, &commit)?;

    Ok(FeedbackReport {
        skill_id: skill_id.to_string(),
        duplicate: false,
        reinforced,
    })
}
