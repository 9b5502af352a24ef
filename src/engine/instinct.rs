//! Instinct and skill records plus the SQLite-backed store.
//!
//! The store exclusively owns instinct lifecycle transitions: detectors
//! only propose candidates, and every mutation lands here through the
//! broker in a single transaction per pass.
//!
//! # For AI Agents
//!
//! - **Check instincts before acting**: `instinct instinct list --domain <d>`
//! - **Auto-approved instincts are established behavior**; treat them as
//!   standing guidance until they decay out.
//! - **Conflicted instincts need a human**: resolve with
//!   `instinct instinct resolve`.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::InstinctError;
use crate::core::store::Store;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const INSTINCT_DB_SCHEMA_INSTINCTS: &str = "
    CREATE TABLE IF NOT EXISTS instincts (
        id TEXT PRIMARY KEY,
        domain TEXT NOT NULL,
        category TEXT NOT NULL,
        \"trigger\" TEXT NOT NULL,
        action TEXT NOT NULL,
        confidence REAL NOT NULL,
        source TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active',
        auto_approved INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        last_reinforced_at INTEGER NOT NULL,
        decay_weeks_applied INTEGER NOT NULL DEFAULT 0,
        contributing_sessions TEXT NOT NULL,
        skill_id TEXT
    )
";
pub const INSTINCT_DB_SCHEMA_INSTINCTS_DOMAIN_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_instincts_domain ON instincts(domain)";
pub const INSTINCT_DB_SCHEMA_SKILLS: &str = "
    CREATE TABLE IF NOT EXISTS skills (
        id TEXT PRIMARY KEY,
        domain TEXT NOT NULL,
        member_instinct_ids TEXT NOT NULL,
        avg_confidence_at_creation REAL NOT NULL,
        created_at INTEGER NOT NULL
    )
";
pub const INSTINCT_DB_SCHEMA_EVOLVED: &str = "
    CREATE TABLE IF NOT EXISTS evolved_clusters (
        signature TEXT PRIMARY KEY,
        skill_id TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
";
pub const INSTINCT_DB_SCHEMA_FEEDBACK: &str = "
    CREATE TABLE IF NOT EXISTS skill_feedback (
        usage_event_id TEXT NOT NULL,
        skill_id TEXT NOT NULL,
        applied_at INTEGER NOT NULL,
        PRIMARY KEY (usage_event_id, skill_id)
    )
";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    SessionObservation,
    Inherited,
    Imported,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::SessionObservation => "session-observation",
            Source::Inherited => "inherited",
            Source::Imported => "imported",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, InstinctError> {
        match raw {
            "session-observation" => Ok(Source::SessionObservation),
            "inherited" => Ok(Source::Inherited),
            "imported" => Ok(Source::Imported),
            other => Err(InstinctError::ValidationError(format!(
                "unknown instinct source '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Active,
    Conflicted,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Conflicted => "conflicted",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, InstinctError> {
        match raw {
            "active" => Ok(Status::Active),
            "conflicted" => Ok(Status::Conflicted),
            other => Err(InstinctError::ValidationError(format!(
                "unknown instinct status '{}'",
                other
            ))),
        }
    }
}

/// A learned, scorable behavior. Pruned records are deleted, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instinct {
    pub id: String,
    pub domain: String,
    pub category: String,
    pub trigger: String,
    pub action: String,
    pub confidence: f64,
    pub source: Source,
    pub status: Status,
    pub auto_approved: bool,
    pub created_at: i64,
    pub last_reinforced_at: i64,
    /// Whole weeks of decay already subtracted since the last
    /// reinforcement; keeps time-based decay idempotent across same-day
    /// passes.
    pub decay_weeks_applied: i64,
    pub contributing_sessions: BTreeSet<String>,
    /// Weak back-reference to the most recent skill evolved from this
    /// instinct's cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_id: Option<String>,
}

impl Instinct {
    pub fn is_mutable(&self) -> bool {
        self.source != Source::Inherited
    }
}

/// An evolved artifact grouping related instincts. Never mutated after
/// creation; usage counters live externally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Skill {
    pub id: String,
    pub domain: String,
    pub member_instinct_ids: Vec<String>,
    pub avg_confidence_at_creation: f64,
    pub created_at: i64,
}

pub fn initialize_instinct_db(root: &std::path::Path) -> Result<(), InstinctError> {
    let broker = DbBroker::new(root);
    let db_path = db::instinct_db_path(root);

    broker.with_conn(&db_path, "instinct", "instinct.init", |conn| {
        conn.execute(INSTINCT_DB_SCHEMA_INSTINCTS, [])?;
        conn.execute(INSTINCT_DB_SCHEMA_INSTINCTS_DOMAIN_INDEX, [])?;
        conn.execute(INSTINCT_DB_SCHEMA_SKILLS, [])?;
        conn.execute(INSTINCT_DB_SCHEMA_EVOLVED, [])?;
        conn.execute(INSTINCT_DB_SCHEMA_FEEDBACK, [])?;
        Ok(())
    })
}

fn row_to_instinct(row: &rusqlite::Row) -> Result<Instinct, rusqlite::Error> {
    let source_raw: String = row.get(6)?;
    let status_raw: String = row.get(7)?;
    let sessions_raw: String = row.get(12)?;
    Ok(Instinct {
        id: row.get(0)?,
        domain: row.get(1)?,
        category: row.get(2)?,
        trigger: row.get(3)?,
        action: row.get(4)?,
        confidence: row.get(5)?,
        source: Source::parse(&source_raw).unwrap_or(Source::SessionObservation),
        status: Status::parse(&status_raw).unwrap_or(Status::Active),
        auto_approved: row.get::<_, i64>(8)? != 0,
        created_at: row.get(9)?,
        last_reinforced_at: row.get(10)?,
        decay_weeks_applied: row.get(11)?,
        contributing_sessions: serde_json::from_str(&sessions_raw).unwrap_or_default(),
        skill_id: row.get(13)?,
    })
}

const INSTINCT_COLUMNS: &str = "id, domain, category, \"trigger\", action, confidence, source, status, \
     auto_approved, created_at, last_reinforced_at, decay_weeks_applied, \
     contributing_sessions, skill_id";

pub fn load_instincts(store: &Store) -> Result<BTreeMap<String, Instinct>, InstinctError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::instinct_db_path(&store.root);

    broker.with_conn(&db_path, "instinct", "instinct.load", |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM instincts ORDER BY id",
            INSTINCT_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_instinct)?;
        let mut out = BTreeMap::new();
        for r in rows {
            let instinct = r?;
            out.insert(instinct.id.clone(), instinct);
        }
        Ok(out)
    })
}

pub fn get_instinct(store: &Store, id: &str) -> Result<Option<Instinct>, InstinctError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::instinct_db_path(&store.root);

    broker.with_conn(&db_path, "instinct", "instinct.get", |conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM instincts WHERE id = ?1",
            INSTINCT_COLUMNS
        ))?;
        let result = stmt.query_row(params![id], row_to_instinct);
        match result {
            Ok(i) => Ok(Some(i)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(InstinctError::RusqliteError(e)),
        }
    })
}

fn row_to_skill(row: &rusqlite::Row) -> Result<Skill, rusqlite::Error> {
    let members_raw: String = row.get(2)?;
    Ok(Skill {
        id: row.get(0)?,
        domain: row.get(1)?,
        member_instinct_ids: serde_json::from_str(&members_raw).unwrap_or_default(),
        avg_confidence_at_creation: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn load_skills(store: &Store) -> Result<Vec<Skill>, InstinctError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::instinct_db_path(&store.root);

    broker.with_conn(&db_path, "instinct", "skill.load", |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, domain, member_instinct_ids, avg_confidence_at_creation, created_at
             FROM skills ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([], row_to_skill)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    })
}

pub fn get_skill(store: &Store, id: &str) -> Result<Option<Skill>, InstinctError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::instinct_db_path(&store.root);

    broker.with_conn(&db_path, "instinct", "skill.get", |conn| {
        let mut stmt = conn.prepare(
            "SELECT id, domain, member_instinct_ids, avg_confidence_at_creation, created_at
             FROM skills WHERE id = ?1",
        )?;
        match stmt.query_row(params![id], row_to_skill) {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(InstinctError::RusqliteError(e)),
        }
    })
}

pub fn load_evolved_signatures(
    store: &Store,
) -> Result<std::collections::BTreeSet<String>, InstinctError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::instinct_db_path(&store.root);

    broker.with_conn(&db_path, "instinct", "evolved.load", |conn| {
        let mut stmt = conn.prepare("SELECT signature FROM evolved_clusters")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = std::collections::BTreeSet::new();
        for r in rows {
            out.insert(r?);
        }
        Ok(out)
    })
}

/// Everything a pass wants persisted, applied as one logical commit.
#[derive(Debug, Default)]
pub struct PassCommit {
    /// Full post-pass instinct set; the table is rewritten to match.
    pub instincts: Vec<Instinct>,
    pub new_skills: Vec<Skill>,
    /// (signature, skill_id) pairs for newly evolved clusters.
    pub new_signatures: Vec<(String, String)>,
}

/// Persist a completed pass in a single transaction. Any failure rolls the
/// whole commit back, leaving the prior store intact.
pub fn commit_pass(store: &Store, commit: &PassCommit) -> Result<(), InstinctError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::instinct_db_path(&store.root);
    let now = crate::core::time::epoch_secs();

    broker.with_conn(&db_path, "instinct", "instinct.commit", |conn| {
        conn.execute("BEGIN IMMEDIATE", [])?;
        let result = (|| -> Result<(), InstinctError> {
            conn.execute("DELETE FROM instincts", [])?;
            {
                let mut stmt = conn.prepare(&format!(
                    "INSERT INTO instincts ({}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
                    INSTINCT_COLUMNS
                ))?;
                for i in &commit.instincts {
                    stmt.execute(params![
                        i.id,
                        i.domain,
                        i.category,
                        i.trigger,
                        i.action,
                        i.confidence,
                        i.source.as_str(),
                        i.status.as_str(),
                        i.auto_approved as i64,
                        i.created_at,
                        i.last_reinforced_at,
                        i.decay_weeks_applied,
                        serde_json::to_string(&i.contributing_sessions).unwrap(),
                        i.skill_id,
                    ])?;
                }
            }
            for s in &commit.new_skills {
                conn.execute(
                    "INSERT INTO skills (id, domain, member_instinct_ids, avg_confidence_at_creation, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        s.id,
                        s.domain,
                        serde_json::to_string(&s.member_instinct_ids).unwrap(),
                        s.avg_confidence_at_creation,
                        s.created_at,
                    ],
                )?;
            }
            for (signature, skill_id) in &commit.new_signatures {
                conn.execute(
                    "INSERT OR IGNORE INTO evolved_clusters (signature, skill_id, created_at)
                     VALUES (?1, ?2, ?3)",
                    params![signature, skill_id, now],
                )?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                conn.execute("COMMIT", [])?;
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    })
}

/// Upsert a single record outside a pass (import, manual resolution).
pub fn upsert_instinct(store: &Store, instinct: &Instinct) -> Result<(), InstinctError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::instinct_db_path(&store.root);

    broker.with_conn(&db_path, "instinct", "instinct.upsert", |conn| {
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO instincts ({}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
                INSTINCT_COLUMNS
            ),
            params![
                instinct.id,
                instinct.domain,
                instinct.category,
                instinct.trigger,
                instinct.action,
                instinct.confidence,
                instinct.source.as_str(),
                instinct.status.as_str(),
                instinct.auto_approved as i64,
                instinct.created_at,
                instinct.last_reinforced_at,
                instinct.decay_weeks_applied,
                serde_json::to_string(&instinct.contributing_sessions).unwrap(),
                instinct.skill_id,
            ],
        )?;
        Ok(())
    })
}

pub fn delete_instinct(store: &Store, id: &str) -> Result<bool, InstinctError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::instinct_db_path(&store.root);

    broker.with_conn(&db_path, "instinct", "instinct.delete", |conn| {
        let n = conn.execute("DELETE FROM instincts WHERE id = ?1", params![id])?;
        Ok(n > 0)
    })
}

/// Record a skill usage event, returning false when this event was already
/// applied (the feedback loop reinforces each member at most once per
/// event).
pub fn record_skill_feedback(
    store: &Store,
    skill_id: &str,
    usage_event_id: &str,
) -> Result<bool, InstinctError> {
    let broker = DbBroker::new(&store.root);
    let db_path = db::instinct_db_path(&store.root);
    let now = crate::core::time::epoch_secs();

    broker.with_conn(&db_path, "instinct", "skill.feedback", |conn| {
        let n = conn.execute(
            "INSERT OR IGNORE INTO skill_feedback (usage_event_id, skill_id, applied_at)
             VALUES (?1, ?2, ?3)",
            params![usage_event_id, skill_id, now],
        )?;
        Ok(n > 0)
    })
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "instinct",
        "version": "0.1.0",
        "description": "Scored, decaying, mergeable learned behaviors",
        "commands": [
            { "name": "list", "description": "List instincts, optionally by domain", "parameters": ["domain?", "format"] },
            { "name": "show", "description": "Show one instinct", "parameters": ["id"] },
            { "name": "resolve", "description": "Resolve a conflicted instinct", "parameters": ["id", "keep|drop"] },
            { "name": "export", "description": "Export a filtered instinct set", "parameters": ["output", "domain?", "min-confidence?"] },
            { "name": "import", "description": "Merge a portable instinct set", "parameters": ["input"] }
        ],
        "storage": ["instinct.db"],
        "domains": [
            "tool-preference", "code-style", "workflow", "testing", "error-handling",
            "import-pattern", "signature-convention", "decorator-usage",
            "structural-correction", "architecture"
        ]
    })
}
