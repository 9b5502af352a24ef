//! Engine configuration: built-in defaults overlaid with `.instinct/config.toml`.
//!
//! Every field has a serde default, so a missing or partial config file
//! degrades to the stock thresholds rather than failing the pass.

use crate::core::error::InstinctError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Template written by `instinct init` so the knobs are discoverable.
pub const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../../assets/config.default.toml");

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub observer: ObserverConfig,
    #[serde(default)]
    pub instincts: InstinctConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub evolution: EvolutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ObserverConfig {
    /// Master switch: when false, `observe run` refuses to pass.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InstinctConfig {
    #[serde(default = "default_initial_confidence")]
    pub initial_confidence: f64,
    #[serde(default = "default_confidence_increment")]
    pub confidence_increment: f64,
    #[serde(default = "default_max_confidence")]
    pub max_confidence: f64,
    #[serde(default = "default_auto_approve_threshold")]
    pub auto_approve_threshold: f64,
    #[serde(default = "default_skill_feedback_increment")]
    pub skill_feedback_increment: f64,
    /// Soft cap: lowest-confidence active instincts are pruned first when
    /// the store grows past this.
    #[serde(default = "default_max_instincts")]
    pub max_instincts: usize,
    #[serde(default)]
    pub decay: DecayConfig,
    #[serde(default)]
    pub prune: PruneConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DecayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_grace_period_days")]
    pub grace_period_days: i64,
    #[serde(default = "default_decay_per_week")]
    pub decay_per_week: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PruneConfig {
    #[serde(default = "default_auto_remove_confidence")]
    pub auto_remove_confidence: f64,
    #[serde(default = "default_auto_remove_staleness_days")]
    pub auto_remove_staleness_days: i64,
    /// Review thresholds surface candidates in `observe status`; they never
    /// delete anything on their own.
    #[serde(default = "default_review_confidence")]
    pub review_confidence: f64,
    #[serde(default = "default_review_staleness_days")]
    pub review_staleness_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DedupConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EvolutionConfig {
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,
    #[serde(default = "default_min_average_confidence")]
    pub min_average_confidence: f64,
}

fn default_true() -> bool {
    true
}
fn default_initial_confidence() -> f64 {
    0.3
}
fn default_confidence_increment() -> f64 {
    0.1
}
fn default_max_confidence() -> f64 {
    0.95
}
fn default_auto_approve_threshold() -> f64 {
    0.7
}
fn default_skill_feedback_increment() -> f64 {
    0.02
}
fn default_max_instincts() -> usize {
    100
}
fn default_grace_period_days() -> i64 {
    14
}
fn default_decay_per_week() -> f64 {
    0.05
}
fn default_auto_remove_confidence() -> f64 {
    0.2
}
fn default_auto_remove_staleness_days() -> i64 {
    60
}
fn default_review_confidence() -> f64 {
    0.3
}
fn default_review_staleness_days() -> i64 {
    30
}
fn default_similarity_threshold() -> f64 {
    0.85
}
fn default_min_cluster_size() -> usize {
    3
}
fn default_min_average_confidence() -> f64 {
    0.5
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for InstinctConfig {
    fn default() -> Self {
        Self {
            initial_confidence: default_initial_confidence(),
            confidence_increment: default_confidence_increment(),
            max_confidence: default_max_confidence(),
            auto_approve_threshold: default_auto_approve_threshold(),
            skill_feedback_increment: default_skill_feedback_increment(),
            max_instincts: default_max_instincts(),
            decay: DecayConfig::default(),
            prune: PruneConfig::default(),
        }
    }
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_period_days: default_grace_period_days(),
            decay_per_week: default_decay_per_week(),
        }
    }
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            auto_remove_confidence: default_auto_remove_confidence(),
            auto_remove_staleness_days: default_auto_remove_staleness_days(),
            review_confidence: default_review_confidence(),
            review_staleness_days: default_review_staleness_days(),
        }
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            min_cluster_size: default_min_cluster_size(),
            min_average_confidence: default_min_average_confidence(),
        }
    }
}

impl Config {
    /// Load configuration from `<project_dir>/.instinct/config.toml`,
    /// falling back to defaults when the file is absent.
    pub fn load(instinct_dir: &Path) -> Result<Self, InstinctError> {
        let path = instinct_dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path).map_err(InstinctError::IoError)?;
        toml::from_str(&raw)
            .map_err(|e| InstinctError::ConfigError(format!("{}: {}", path.display(), e)))
    }
}
