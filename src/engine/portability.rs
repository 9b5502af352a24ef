//! Export/import of instinct sets as portable documents.
//!
//! Export serializes a filtered subset (by domain and/or minimum
//! confidence) with a SHA-256 content checksum. Import verifies the
//! checksum and merges the incoming set into the local store using the
//! same similarity rules as the dedup engine, marking survivors as
//! imported.

use crate::core::config::Config;
use crate::core::error::InstinctError;
use crate::core::store::Store;
use crate::core::time;
use crate::engine::confidence::CONFIDENCE_FLOOR;
use crate::engine::dedup;
use crate::engine::instinct::{self, Instinct, PassCommit, Source, Status};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

pub const SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Serialize, Deserialize)]
pub struct PortableDocument {
    pub schema_version: String,
    pub exported_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
    /// SHA-256 of the canonical JSON of `instincts`.
    pub checksum: String,
    pub instincts: Vec<Instinct>,
}

fn content_checksum(instincts: &[Instinct]) -> Result<String, InstinctError> {
    let canonical = serde_json::to_string(instincts)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Write a filtered instinct set to `output`. Returns the export count.
pub fn export_instincts(
    store: &Store,
    output: &Path,
    domain: Option<&str>,
    min_confidence: Option<f64>,
) -> Result<usize, InstinctError> {
    let instincts: Vec<Instinct> = instinct::load_instincts(store)?
        .into_values()
        .filter(|i| i.status == Status::Active)
        .filter(|i| domain.is_none_or(|d| i.domain == d))
        .filter(|i| min_confidence.is_none_or(|min| i.confidence >= min))
        .collect();

    let doc = PortableDocument {
        schema_version: SCHEMA_VERSION.to_string(),
        exported_at: time::epoch_secs(),
        domain_filter: domain.map(str::to_string),
        min_confidence,
        checksum: content_checksum(&instincts)?,
        instincts,
    };

    std::fs::write(output, serde_json::to_string_pretty(&doc)?)
        .map_err(InstinctError::IoError)?;
    Ok(doc.instincts.len())
}

#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub read: usize,
    pub inserted: Vec<String>,
    pub merged: Vec<dedup::MergeRecord>,
}

/// Merge a portable document into the local store. Incoming records become
/// `imported`, confidence clamped to the storage bounds; near-duplicates
/// consolidate through the dedup engine in the same commit.
pub fn import_instincts(
    store: &Store,
    input: &Path,
    cfg: &Config,
) -> Result<ImportReport, InstinctError> {
    let raw = std::fs::read_to_string(input).map_err(InstinctError::IoError)?;
    let doc: PortableDocument = serde_json::from_str(&raw)?;

    let expected = content_checksum(&doc.instincts)?;
    if expected != doc.checksum {
        return Err(InstinctError::ValidationError(format!(
            "import checksum mismatch: expected {}, document says {}",
            expected, doc.checksum
        )));
    }

    let mut instincts = instinct::load_instincts(store)?;
    let mut inserted = Vec::new();
    let read = doc.instincts.len();

    for mut incoming in doc.instincts {
        incoming.source = Source::Imported;
        incoming.status = Status::Active;
        incoming.skill_id = None;
        incoming.confidence = incoming
            .confidence
            .clamp(CONFIDENCE_FLOOR, cfg.instincts.max_confidence);

        if let Some(existing) = instincts.get_mut(&incoming.id) {
            // Same id: fold sessions in and keep the stronger confidence.
            existing
                .contributing_sessions
                .extend(incoming.contributing_sessions);
            existing.confidence = existing.confidence.max(incoming.confidence);
            continue;
        }
        inserted.push(incoming.id.clone());
        instincts.insert(incoming.id.clone(), incoming);
    }

    let merged = dedup::merge_duplicates(&mut instincts, cfg);
    // An incoming record consumed by a merge was consolidated, not inserted.
    inserted.retain(|id| instincts.contains_key(id));

    let commit = PassCommit {
        instincts: instincts.values().cloned().collect(),
        ..Default::default()
    };
    instinct::commit_pass(store, &commit)?;

    Ok(ImportReport {
        read,
        inserted,
        merged,
    })
}
