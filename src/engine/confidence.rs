//! Confidence engine: every instinct lifecycle transition lives here.
//!
//! State machine per instinct: absent → active → auto-approved →
//! (active | pruned). Detectors propose, this module disposes; nothing
//! else mutates confidence. All transitions operate on the in-memory map
//! a pass is staging, so a failed pass persists nothing.

use crate::core::config::Config;
use crate::core::time;
use crate::engine::dedup::{content_overlap, tokenize};
use crate::engine::detectors::CandidatePattern;
use crate::engine::instinct::{Instinct, Source, Status};
use std::collections::BTreeMap;

/// Storage floor: values below this trigger pruning, never storage.
pub const CONFIDENCE_FLOOR: f64 = 0.2;

#[derive(Debug, Default)]
pub struct TransitionReport {
    pub created: Vec<String>,
    pub reinforced: Vec<String>,
    pub conflicted: Vec<ConflictPair>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ConflictPair {
    pub incoming: String,
    pub existing: String,
}

fn clamp_stored(confidence: f64, cfg: &Config) -> f64 {
    confidence.clamp(CONFIDENCE_FLOOR, cfg.instincts.max_confidence)
}

fn maybe_auto_approve(instinct: &mut Instinct, cfg: &Config) {
    if instinct.confidence >= cfg.instincts.auto_approve_threshold {
        instinct.auto_approved = true;
    }
}

/// Merge candidate patterns into the store: create, reinforce, or flag
/// conflicts. Inherited instincts are read-only; conflicted instincts stay
/// frozen until resolved.
pub fn apply_candidates(
    now: i64,
    instincts: &mut BTreeMap<String, Instinct>,
    candidates: &[CandidatePattern],
    cfg: &Config,
) -> TransitionReport {
    let mut report = TransitionReport::default();

    for candidate in candidates {
        if let Some(existing_id) = find_opposed(instincts, candidate) {
            if let Some(existing) = instincts.get_mut(&existing_id) {
                existing.status = Status::Conflicted;
            }
            match instincts.get_mut(&candidate.id) {
                Some(incoming) => incoming.status = Status::Conflicted,
                None => {
                    let mut incoming = new_instinct(now, candidate, cfg);
                    incoming.status = Status::Conflicted;
                    instincts.insert(incoming.id.clone(), incoming);
                }
            }
            report.conflicted.push(ConflictPair {
                incoming: candidate.id.clone(),
                existing: existing_id,
            });
            continue;
        }

        match instincts.get_mut(&candidate.id) {
            Some(existing) => {
                if !existing.is_mutable() || existing.status == Status::Conflicted {
                    continue;
                }
                existing.confidence = (existing.confidence
                    + cfg.instincts.confidence_increment)
                    .min(cfg.instincts.max_confidence);
                existing.last_reinforced_at = now;
                existing.decay_weeks_applied = 0;
                existing
                    .contributing_sessions
                    .extend(candidate.sessions.iter().cloned());
                maybe_auto_approve(existing, cfg);
                report.reinforced.push(existing.id.clone());
            }
            None => {
                let instinct = new_instinct(now, candidate, cfg);
                report.created.push(instinct.id.clone());
                instincts.insert(instinct.id.clone(), instinct);
            }
        }
    }

    report
}

fn new_instinct(now: i64, candidate: &CandidatePattern, cfg: &Config) -> Instinct {
    let mut instinct = Instinct {
        id: candidate.id.clone(),
        domain: candidate.domain.to_string(),
        category: candidate.category.as_str().to_string(),
        trigger: candidate.trigger.clone(),
        action: candidate.action.clone(),
        confidence: clamp_stored(cfg.instincts.initial_confidence, cfg),
        source: Source::SessionObservation,
        status: Status::Active,
        auto_approved: false,
        created_at: now,
        last_reinforced_at: now,
        decay_weeks_applied: 0,
        contributing_sessions: candidate.sessions.iter().cloned().collect(),
        skill_id: None,
    };
    maybe_auto_approve(&mut instinct, cfg);
    instinct
}

const POSITIVE_MARKERS: [&str; 5] = ["prefer", "use", "always", "adopt", "follow"];
const NEGATIVE_MARKERS: [&str; 5] = ["avoid", "never", "stop", "skip", "drop"];

fn action_polarity(action: &str) -> Option<bool> {
    let tokens = tokenize(action);
    if POSITIVE_MARKERS.iter().any(|m| tokens.contains(*m)) {
        return Some(true);
    }
    if NEGATIVE_MARKERS.iter().any(|m| tokens.contains(*m)) {
        return Some(false);
    }
    None
}

/// An existing active instinct in the candidate's domain whose action is
/// semantically opposed: opposite polarity over the same action subject,
/// with near-identical triggers. Returns the opposing id.
fn find_opposed(
    instincts: &BTreeMap<String, Instinct>,
    candidate: &CandidatePattern,
) -> Option<String> {
    let candidate_polarity = action_polarity(&candidate.action)?;

    for (id, instinct) in instincts {
        if *id == candidate.id
            || instinct.domain != candidate.domain
            || instinct.status != Status::Active
        {
            continue;
        }
        let Some(polarity) = action_polarity(&instinct.action) else {
            continue;
        };
        if polarity == candidate_polarity {
            continue;
        }
        let trigger_match = content_overlap(&candidate.trigger, &instinct.trigger) >= 0.5;
        let subject_match = content_overlap(
            &strip_polarity(&candidate.action),
            &strip_polarity(&instinct.action),
        ) >= 0.5;
        if trigger_match && subject_match {
            return Some(id.clone());
        }
    }
    None
}

fn strip_polarity(action: &str) -> String {
    action
        .split_whitespace()
        .filter(|w| {
            let lower = w.to_ascii_lowercase();
            !POSITIVE_MARKERS.contains(&lower.as_str())
                && !NEGATIVE_MARKERS.contains(&lower.as_str())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Time-based decay. Weeks are counted from the last reinforcement, and
/// the weeks already subtracted are tracked per instinct, so passes within
/// the same day change nothing. Auto-approved instincts decay at half
/// rate; the flag itself is never cleared here.
pub fn apply_decay(
    now: i64,
    instincts: &mut BTreeMap<String, Instinct>,
    cfg: &Config,
) -> Vec<String> {
    let mut decayed = Vec::new();
    if !cfg.instincts.decay.enabled {
        return decayed;
    }

    for instinct in instincts.values_mut() {
        if !instinct.is_mutable() || instinct.status == Status::Conflicted {
            continue;
        }
        let days = time::days_between(instinct.last_reinforced_at, now);
        if days < cfg.instincts.decay.grace_period_days {
            continue;
        }
        let target_weeks = days / 7;
        let delta_weeks = target_weeks - instinct.decay_weeks_applied;
        if delta_weeks <= 0 {
            continue;
        }
        let rate = if instinct.auto_approved {
            cfg.instincts.decay.decay_per_week / 2.0
        } else {
            cfg.instincts.decay.decay_per_week
        };
        // Never below 0.0 in a single step; pruning handles the floor.
        instinct.confidence = (instinct.confidence - delta_weeks as f64 * rate).max(0.0);
        instinct.decay_weeks_applied = target_weeks;
        decayed.push(instinct.id.clone());
    }
    decayed
}

/// Remove instincts below the confidence floor or past the staleness
/// horizon. Inherited instincts are policy-exempt. Returns the removed
/// records for reporting.
pub fn prune(
    now: i64,
    instincts: &mut BTreeMap<String, Instinct>,
    cfg: &Config,
) -> Vec<Instinct> {
    let prune_cfg = &cfg.instincts.prune;
    let doomed: Vec<String> = instincts
        .values()
        .filter(|i| {
            i.is_mutable()
                && (i.confidence < prune_cfg.auto_remove_confidence
                    || time::days_between(i.last_reinforced_at, now)
                        > prune_cfg.auto_remove_staleness_days)
        })
        .map(|i| i.id.clone())
        .collect();

    doomed
        .into_iter()
        .filter_map(|id| instincts.remove(&id))
        .collect()
}

/// Soft cap: evict lowest-confidence active instincts first, regardless of
/// age, until the store fits.
pub fn enforce_cap(
    instincts: &mut BTreeMap<String, Instinct>,
    cfg: &Config,
) -> Vec<Instinct> {
    let mut removed = Vec::new();
    if instincts.len() <= cfg.instincts.max_instincts {
        return removed;
    }

    let mut evictable: Vec<(String, f64)> = instincts
        .values()
        .filter(|i| i.is_mutable() && i.status == Status::Active)
        .map(|i| (i.id.clone(), i.confidence))
        .collect();
    evictable.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });

    let mut queue = evictable.into_iter();
    while instincts.len() > cfg.instincts.max_instincts {
        let Some((id, _)) = queue.next() else {
            break;
        };
        if let Some(i) = instincts.remove(&id) {
            removed.push(i);
        }
    }
    removed
}

/// Skill-usage feedback: a fixed small boost per member instinct, capped
/// like any other gain. Event-level dedup happens in the store ledger
/// before this is called.
pub fn reinforce_from_skill_usage(
    instincts: &mut BTreeMap<String, Instinct>,
    member_ids: &[String],
    cfg: &Config,
) -> Vec<String> {
    let mut reinforced = Vec::new();
    for id in member_ids {
        let Some(instinct) = instincts.get_mut(id) else {
            continue;
        };
        if !instinct.is_mutable() || instinct.status != Status::Active {
            continue;
        }
        instinct.confidence = (instinct.confidence + cfg.instincts.skill_feedback_increment)
            .min(cfg.instincts.max_confidence);
        maybe_auto_approve(instinct, cfg);
        reinforced.push(id.clone());
    }
    reinforced
}
