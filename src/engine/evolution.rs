//! Evolution engine: clusters validated instincts into skill artifacts.
//!
//! Active, non-inherited instincts group by domain; a group with at least
//! `minClusterSize` members averaging `minAverageConfidence` evolves into
//! one skill. A cluster's identity is the SHA-256 of its sorted member
//! ids, so an already-evolved membership never re-evolves until it
//! materially changes.

use crate::core::config::Config;
use crate::core::time;
use crate::engine::instinct::{Instinct, Skill, Status};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
pub struct EvolutionOutcome {
    pub skills: Vec<Skill>,
    /// (signature, skill_id) for each newly evolved cluster.
    pub signatures: Vec<(String, String)>,
}

/// Deterministic identity of a cluster's membership.
pub fn cluster_signature(member_ids: &[String]) -> String {
    let mut sorted: Vec<&String> = member_ids.iter().collect();
    sorted.sort();
    let mut hasher = Sha256::new();
    for id in sorted {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Evolve qualifying domain groups into skills and stamp members with the
/// weak back-reference. Reads member instincts, never deletes them.
pub fn evolve(
    now: i64,
    instincts: &mut BTreeMap<String, Instinct>,
    already_evolved: &BTreeSet<String>,
    cfg: &Config,
) -> EvolutionOutcome {
    let mut by_domain: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for instinct in instincts.values() {
        if instinct.status != Status::Active || !instinct.is_mutable() {
            continue;
        }
        by_domain
            .entry(instinct.domain.clone())
            .or_default()
            .push(instinct.id.clone());
    }

    let mut outcome = EvolutionOutcome::default();

    for (domain, member_ids) in by_domain {
        if member_ids.len() < cfg.evolution.min_cluster_size {
            continue;
        }
        let avg: f64 = member_ids
            .iter()
            .map(|id| instincts[id].confidence)
            .sum::<f64>()
            / member_ids.len() as f64;
        if avg < cfg.evolution.min_average_confidence {
            continue;
        }

        let signature = cluster_signature(&member_ids);
        if already_evolved.contains(&signature) {
            continue;
        }

        let skill = Skill {
            id: time::new_event_id(),
            domain: domain.clone(),
            member_instinct_ids: member_ids.clone(),
            avg_confidence_at_creation: avg,
            created_at: now,
        };
        for id in &member_ids {
            if let Some(member) = instincts.get_mut(id) {
                member.skill_id = Some(skill.id.clone());
            }
        }
        outcome.signatures.push((signature, skill.id.clone()));
        outcome.skills.push(skill);
    }

    outcome
}
