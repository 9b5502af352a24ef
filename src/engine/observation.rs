//! Observation model and log reader.
//!
//! Observations are line-delimited JSON records appended by an external
//! hook. Each record captures one tool invocation's metadata: paths,
//! lengths, previews, and success flags, never file content. The `tool`
//! field discriminates the input shape, so the record is modeled as a
//! tagged union and detectors pattern-match only the variants they
//! understand.
//!
//! The external writer size-rotates the live file into
//! `observations.archive-<stamp>.jsonl` siblings. Archive names embed the
//! rotation stamp, so sorting them ascending restores chronological order;
//! the logical offset is the count of non-empty lines across the archives
//! followed by the live file, and survives rotation.

use crate::core::error::InstinctError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

pub const OBSERVATIONS_FILE: &str = "observations.jsonl";
pub const ARCHIVE_PREFIX: &str = "observations.archive-";

/// One structured record of a single tool invocation's metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    /// Unix-epoch seconds at invocation time.
    pub timestamp: i64,
    pub session_id: String,
    #[serde(flatten)]
    pub input: ToolInput,
    #[serde(default)]
    pub output: OutputSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structural: Option<StructuralPayload>,
}

/// Tool-specific input summary, discriminated by the `tool` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "tool", content = "input", rename_all = "kebab-case")]
pub enum ToolInput {
    Read {
        file_path: String,
    },
    Write {
        file_path: String,
        #[serde(default)]
        content_length: u64,
    },
    Edit {
        file_path: String,
        #[serde(default)]
        replace_all: bool,
    },
    Bash {
        /// First ≤200 chars of the command; secrets sanitized upstream.
        command_preview: String,
        #[serde(default)]
        command_length: u64,
    },
    SkillUse {
        skill: String,
    },
}

impl ToolInput {
    pub fn tool_name(&self) -> &'static str {
        match self {
            ToolInput::Read { .. } => "read",
            ToolInput::Write { .. } => "write",
            ToolInput::Edit { .. } => "edit",
            ToolInput::Bash { .. } => "bash",
            ToolInput::SkillUse { .. } => "skill-use",
        }
    }

    pub fn file_path(&self) -> Option<&str> {
        match self {
            ToolInput::Read { file_path }
            | ToolInput::Write { file_path, .. }
            | ToolInput::Edit { file_path, .. } => Some(file_path),
            _ => None,
        }
    }

    pub fn command(&self) -> Option<&str> {
        match self {
            ToolInput::Bash {
                command_preview, ..
            } => Some(command_preview),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputSummary {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

fn default_success() -> bool {
    true
}

impl Default for OutputSummary {
    fn default() -> Self {
        Self {
            success: true,
            exit_code: None,
        }
    }
}

impl OutputSummary {
    pub fn failed(&self) -> bool {
        !self.success || self.exit_code.is_some_and(|c| c != 0)
    }
}

/// Pre-computed structural facts attached when the tool created or
/// modified source text. Extraction happens upstream; the engine only
/// consumes the result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StructuralPayload {
    pub operation: StructuralOperation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<ImportRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionSig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorators: Vec<DecoratorRef>,
    /// Change classification for modify operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_category: Option<ChangeCategory>,
    /// Set upstream when the modify followed a recent write to the same file.
    #[serde(default)]
    pub is_correction: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StructuralOperation {
    #[default]
    Create,
    Modify,
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportRef {
    pub module: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionSig {
    pub name: String,
    #[serde(default)]
    pub params: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(default)]
    pub is_async: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecoratorRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCategory {
    ImportFix,
    TypeChange,
    DecoratorChange,
    FunctionChange,
    StructuralAddition,
    Mixed,
}

impl ChangeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeCategory::ImportFix => "import_fix",
            ChangeCategory::TypeChange => "type_change",
            ChangeCategory::DecoratorChange => "decorator_change",
            ChangeCategory::FunctionChange => "function_change",
            ChangeCategory::StructuralAddition => "structural_addition",
            ChangeCategory::Mixed => "mixed",
        }
    }
}

/// A record paired with its logical position in the store.
#[derive(Debug, Clone)]
pub struct IndexedObservation {
    pub offset: u64,
    pub observation: Observation,
}

/// Fixed snapshot of the observation files that existed at pass start.
#[derive(Debug, Default)]
pub struct LogSnapshot {
    pub records: Vec<IndexedObservation>,
    /// Lines that failed to parse; skipped, counted, never fatal.
    pub malformed: usize,
    /// Total non-empty lines seen; the offset a successful pass commits.
    pub end_offset: u64,
}

impl LogSnapshot {
    /// Records at or after the given logical offset, in log order.
    pub fn window_from(&self, offset: u64) -> Vec<Observation> {
        let start = self.records.partition_point(|r| r.offset < offset);
        self.records[start..]
            .iter()
            .map(|r| r.observation.clone())
            .collect()
    }
}

/// Read every observation file under `dir` into one ordered snapshot.
///
/// Rotated archives sort lexicographically by their embedded stamp, so the
/// read order is archives ascending, then the live file. Missing files
/// yield an empty snapshot rather than an error.
pub fn load_snapshot(dir: &Path) -> Result<LogSnapshot, InstinctError> {
    let mut files: Vec<PathBuf> = Vec::new();

    if dir.is_dir() {
        let mut archives: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(InstinctError::IoError)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(ARCHIVE_PREFIX) && n.ends_with(".jsonl"))
            })
            .collect();
        archives.sort();
        files.extend(archives);
    }

    let live = dir.join(OBSERVATIONS_FILE);
    if live.exists() {
        files.push(live);
    }

    let mut snapshot = LogSnapshot::default();
    let mut cursor: u64 = 0;

    for path in files {
        let file = File::open(&path).map_err(InstinctError::IoError)?;
        let reader = BufReader::new(file);
        for line in reader.lines() {
            let line = line.map_err(InstinctError::IoError)?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Observation>(&line) {
                Ok(obs) => snapshot.records.push(IndexedObservation {
                    offset: cursor,
                    observation: obs,
                }),
                Err(_) => snapshot.malformed += 1,
            }
            cursor += 1;
        }
    }

    snapshot.end_offset = cursor;
    Ok(snapshot)
}
