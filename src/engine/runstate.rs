//! Run state tracker: logical offsets for idempotent incremental passes.
//!
//! The offset references a logical record position, never a byte offset
//! tied to one physical file, so writer-side rotation is invisible here.
//! The file is written atomically (temp file + rename) and only after a
//! pass succeeds; a crash mid-pass leaves the prior offset intact. An
//! unreadable file degrades to a full replay with an explicit warning
//! rather than silently reprocessing nothing.

use crate::core::error::InstinctError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const RUN_STATE_FILE: &str = "runstate.json";
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Name of the single logical observation stream.
pub const OBSERVATION_SOURCE: &str = "observations";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RunState {
    #[serde(default)]
    pub schema_version: String,
    /// Last processed logical offset per observation source.
    #[serde(default)]
    pub sources: BTreeMap<String, u64>,
    #[serde(default)]
    pub last_run_at: Option<i64>,
}

impl RunState {
    pub fn offset_for(&self, source: &str) -> u64 {
        self.sources.get(source).copied().unwrap_or(0)
    }
}

/// Outcome of reading the run-state file.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(RunState),
    /// First run; no state yet.
    Missing,
    /// Unreadable or unparsable; caller falls back to a full replay.
    Corrupt(String),
}

pub fn load(root: &Path) -> LoadOutcome {
    let path = root.join(RUN_STATE_FILE);
    if !path.exists() {
        return LoadOutcome::Missing;
    }
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) => return LoadOutcome::Corrupt(e.to_string()),
    };
    match serde_json::from_str::<RunState>(&raw) {
        Ok(state) => LoadOutcome::Loaded(state),
        Err(e) => LoadOutcome::Corrupt(e.to_string()),
    }
}

/// Atomically persist the run state: write a sibling temp file, then
/// rename over the target.
pub fn save(root: &Path, state: &RunState) -> Result<(), InstinctError> {
    let path = root.join(RUN_STATE_FILE);
    let tmp = root.join(format!("{}.tmp", RUN_STATE_FILE));
    let raw = serde_json::to_string_pretty(state)?;
    fs::write(&tmp, raw).map_err(InstinctError::IoError)?;
    fs::rename(&tmp, &path).map_err(InstinctError::IoError)?;
    Ok(())
}
