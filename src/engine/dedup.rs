//! Dedup/merge engine: consolidates near-duplicate instincts.
//!
//! Similarity is measured over the combined `(trigger, action)` text as
//! the better of token-overlap ratio and edit-distance ratio. Pairs at or
//! above the threshold merge into the higher-confidence record; the
//! subordinate is removed. Running the merge twice over the same store is
//! a no-op after the first run.

use crate::core::config::Config;
use crate::engine::instinct::{Instinct, Status};
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;

/// Lowercase alphanumeric tokens of a text.
pub fn tokenize(text: &str) -> FxHashSet<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
        .collect()
}

/// Jaccard overlap of token sets.
pub fn content_overlap(a: &str, b: &str) -> f64 {
    let ta = tokenize(a);
    let tb = tokenize(b);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

/// Normalized edit-distance similarity in [0, 1].
pub fn edit_ratio(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

fn combined_text(instinct: &Instinct) -> String {
    format!("{} {}", instinct.trigger, instinct.action)
}

/// Similarity of two instincts over their trigger/action text.
pub fn similarity(a: &Instinct, b: &Instinct) -> f64 {
    let ta = combined_text(a);
    let tb = combined_text(b);
    content_overlap(&ta, &tb).max(edit_ratio(&ta, &tb))
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MergeRecord {
    pub kept: String,
    pub removed: String,
}

/// Merge same-domain active pairs above the similarity threshold. The
/// higher-confidence record survives with the union of contributing
/// sessions and a small confidence bonus; ties break toward the older
/// record, then the lexicographically smaller id. Inherited instincts are
/// confidence-read-only and never merge.
pub fn merge_duplicates(
    instincts: &mut BTreeMap<String, Instinct>,
    cfg: &Config,
) -> Vec<MergeRecord> {
    let threshold = cfg.dedup.similarity_threshold;
    let ids: Vec<String> = instincts
        .values()
        .filter(|i| i.status == Status::Active && i.is_mutable())
        .map(|i| i.id.clone())
        .collect();

    let mut merges = Vec::new();
    let mut removed: FxHashSet<String> = FxHashSet::default();

    for i in 0..ids.len() {
        if removed.contains(&ids[i]) {
            continue;
        }
        for j in (i + 1)..ids.len() {
            if removed.contains(&ids[i]) {
                break;
            }
            if removed.contains(&ids[j]) {
                continue;
            }
            let (a, b) = (&instincts[&ids[i]], &instincts[&ids[j]]);
            if a.domain != b.domain {
                continue;
            }
            if similarity(a, b) < threshold {
                continue;
            }

            let a_wins = match a
                .confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
            {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Less => false,
                std::cmp::Ordering::Equal => {
                    (a.created_at, &a.id) <= (b.created_at, &b.id)
                }
            };
            let (survivor_id, subordinate_id) = if a_wins {
                (ids[i].clone(), ids[j].clone())
            } else {
                (ids[j].clone(), ids[i].clone())
            };

            let subordinate = instincts.remove(&subordinate_id).unwrap();
            removed.insert(subordinate_id.clone());
            let survivor = instincts.get_mut(&survivor_id).unwrap();
            survivor.confidence = (survivor.confidence.max(subordinate.confidence) + 0.05)
                .min(cfg.instincts.max_confidence);
            survivor
                .contributing_sessions
                .extend(subordinate.contributing_sessions);
            merges.push(MergeRecord {
                kept: survivor_id,
                removed: subordinate_id,
            });
        }
    }
    merges
}
