//! Instinct: a local-first lifecycle engine for learned agent behavior.
//!
//! **Instinct is the daemonless engine that turns raw tool-use
//! observations into scored, decaying, mergeable instincts.**
//!
//! An external hook appends observation records; this engine is invoked on
//! demand to run a processing pass over the unread window, propose
//! candidate patterns, score them, and evolve validated clusters into
//! reusable skills.
//!
//! # Core Principles
//!
//! - **Local-first**: all state lives under `.instinct/`, versioned and
//!   auditable
//! - **Deterministic**: passes are idempotent over an unchanged log;
//!   replay rebuilds the same store
//! - **All-or-nothing**: a pass commits once or not at all; the offset
//!   only advances after a successful commit
//! - **Detectors propose, the confidence engine disposes**: no component
//!   mutates stored confidence ad hoc
//!
//! # For AI Agents
//!
//! 1. Run passes through the CLI: `instinct observe run`
//! 2. Check standing guidance: `instinct instinct list`
//! 3. Report skill usage so the feedback loop closes:
//!    `instinct skill feedback --skill <id> --event <id>`
//!
//! # Crate Structure
//!
//! - [`core`]: store handle, broker, config, lock, time, errors
//! - [`engine`]: observation log, detectors, confidence, dedup, evolution,
//!   run state, pass orchestration, portability

pub mod core;
pub mod engine;

use crate::core::{
    config::{self, Config},
    error::InstinctError,
    store::Store,
};
use crate::engine::{instinct, pass, portability};

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

pub const INSTINCT_DIR: &str = ".instinct";

#[derive(Parser, Debug)]
#[clap(
    name = "instinct",
    version = env!("CARGO_PKG_VERSION"),
    about = "Instinct is the daemonless, local-first lifecycle engine that turns raw tool-use observations into scored, decaying, mergeable instincts and evolves validated clusters into reusable skills."
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bootstrap the engine in a project directory
    #[clap(name = "init", visible_alias = "i")]
    Init(InitCli),

    /// Run and inspect processing passes
    #[clap(name = "observe", visible_alias = "o")]
    Observe(ObserveCli),

    /// Inspect and manage instinct records
    #[clap(name = "instinct")]
    Instinct(InstinctCli),

    /// Inspect evolved skills and report their usage
    #[clap(name = "skill", visible_alias = "s")]
    Skill(SkillCli),

    /// Show subsystem schemas
    #[clap(name = "schema")]
    Schema(SchemaCli),

    /// Show version information
    #[clap(name = "version")]
    Version,
}

#[derive(clap::Args, Debug)]
struct InitCli {
    /// Directory to initialize (defaults to current working directory).
    #[clap(short, long)]
    dir: Option<PathBuf>,
    /// Reinitialize even when `.instinct` already exists.
    #[clap(long)]
    force: bool,
}

#[derive(clap::Args, Debug)]
struct ObserveCli {
    #[clap(subcommand)]
    command: ObserveCommand,
}

#[derive(Subcommand, Debug)]
enum ObserveCommand {
    /// Execute a processing pass over unread observations
    Run {
        /// Reprocess the entire observation history and report the diff.
        #[clap(long)]
        replay: bool,
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Show run state, store counts, and review candidates
    Status {
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },
}

#[derive(clap::Args, Debug)]
struct InstinctCli {
    #[clap(subcommand)]
    command: InstinctCommand,
}

#[derive(Subcommand, Debug)]
enum InstinctCommand {
    /// List instinct records
    List {
        /// Filter by domain.
        #[clap(long)]
        domain: Option<String>,
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Show one instinct record
    Show {
        #[clap(long)]
        id: String,
    },
    /// Resolve a conflicted instinct
    Resolve {
        #[clap(long)]
        id: String,
        /// Keep the record and return it to active status.
        #[clap(long, conflicts_with = "drop")]
        keep: bool,
        /// Delete the record.
        #[clap(long)]
        drop: bool,
    },
    /// Export a filtered instinct set to a portable document
    Export {
        #[clap(long)]
        output: PathBuf,
        #[clap(long)]
        domain: Option<String>,
        #[clap(long)]
        min_confidence: Option<f64>,
    },
    /// Merge a portable instinct document into the local store
    Import {
        #[clap(long)]
        input: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct SkillCli {
    #[clap(subcommand)]
    command: SkillCommand,
}

#[derive(Subcommand, Debug)]
enum SkillCommand {
    /// List evolved skills
    List {
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Record a successful skill invocation (reinforces member instincts)
    Feedback {
        /// Skill id.
        #[clap(long)]
        skill: String,
        /// Usage event id; each event reinforces members at most once.
        #[clap(long)]
        event: String,
    },
}

#[derive(clap::Args, Debug)]
struct SchemaCli {
    /// Optional: filter by subsystem name.
    #[clap(long)]
    subsystem: Option<String>,
}

fn find_instinct_project_root(start_dir: &Path) -> Result<PathBuf, InstinctError> {
    let mut current_dir = PathBuf::from(start_dir);
    loop {
        if current_dir.join(INSTINCT_DIR).exists() {
            return Ok(current_dir);
        }
        if !current_dir.pop() {
            return Err(InstinctError::NotFound(
                "'.instinct' directory not found in current or parent directories. Run `instinct init` first.".to_string(),
            ));
        }
    }
}

pub fn run() -> Result<(), InstinctError> {
    let cli = Cli::parse();
    let current_dir = std::env::current_dir()?;

    match cli.command {
        Command::Version => {
            println!("v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Init(init_cli) => run_init(&current_dir, init_cli),
        Command::Schema(schema_cli) => {
            let mut schemas = std::collections::BTreeMap::new();
            schemas.insert("instinct", instinct::schema());
            schemas.insert("broker", crate::core::broker::schema());

            let output = if let Some(sub) = schema_cli.subsystem {
                schemas
                    .get(sub.as_str())
                    .cloned()
                    .unwrap_or(serde_json::json!({ "error": "subsystem not found" }))
            } else {
                serde_json::json!({
                    "schema_version": "1.0.0",
                    "subsystems": schemas
                })
            };
            println!("{}", serde_json::to_string_pretty(&output).unwrap());
            Ok(())
        }
        command => {
            let project_root = find_instinct_project_root(&current_dir)?;
            let instinct_dir = project_root.join(INSTINCT_DIR);
            let store_root = instinct_dir.join("data");
            fs::create_dir_all(&store_root).map_err(InstinctError::IoError)?;

            let store = Store::new(store_root);
            let cfg = Config::load(&instinct_dir)?;
            instinct::initialize_instinct_db(&store.root)?;

            match command {
                Command::Observe(observe_cli) => run_observe(&store, &cfg, observe_cli),
                Command::Instinct(instinct_cli) => run_instinct(&store, &cfg, instinct_cli),
                Command::Skill(skill_cli) => run_skill(&store, &cfg, skill_cli),
                _ => unreachable!(),
            }
        }
    }
}

fn run_init(current_dir: &Path, init_cli: InitCli) -> Result<(), InstinctError> {
    let target_dir = match init_cli.dir {
        Some(d) => d,
        None => current_dir.to_path_buf(),
    };
    let target_dir = fs::canonicalize(&target_dir).map_err(InstinctError::IoError)?;
    let instinct_dir = target_dir.join(INSTINCT_DIR);

    if instinct_dir.exists() && !init_cli.force {
        println!(
            "{} {} already initialized; use {} to override",
            "⚠".bright_yellow(),
            target_dir.display(),
            "--force".bright_cyan().bold()
        );
        return Ok(());
    }

    let store_root = instinct_dir.join("data");
    fs::create_dir_all(&store_root).map_err(InstinctError::IoError)?;

    println!();
    println!(
        "  {}",
        "INSTINCT · LIFECYCLE ENGINE".bright_cyan().bold()
    );
    println!();

    let db_path = crate::core::db::instinct_db_path(&store_root);
    if db_path.exists() {
        println!(
            "    {} {} {}",
            "✓".bright_green(),
            "instinct.db".bright_white(),
            "(preserved - existing data kept)".bright_black()
        );
    } else {
        instinct::initialize_instinct_db(&store_root)?;
        println!("    {} {}", "●".bright_green(), "instinct.db".bright_white());
    }

    let config_path = instinct_dir.join(config::CONFIG_FILE_NAME);
    if config_path.exists() {
        println!(
            "    {} {} {}",
            "✓".bright_green(),
            config::CONFIG_FILE_NAME.bright_white(),
            "(preserved - existing settings kept)".bright_black()
        );
    } else {
        fs::write(&config_path, config::DEFAULT_CONFIG_TEMPLATE)
            .map_err(InstinctError::IoError)?;
        println!(
            "    {} {}",
            "●".bright_green(),
            config::CONFIG_FILE_NAME.bright_white()
        );
    }

    println!();
    println!(
        "  {} Observation log expected at {}",
        "▸".bright_cyan(),
        instinct_dir
            .join(engine::observation::OBSERVATIONS_FILE)
            .display()
    );
    println!(
        "  {} Run {} after observations accumulate",
        "▸".bright_cyan(),
        "instinct observe run".bright_cyan().bold()
    );
    println!();
    Ok(())
}

fn run_observe(store: &Store, cfg: &Config, cli: ObserveCli) -> Result<(), InstinctError> {
    match cli.command {
        ObserveCommand::Run { replay, format } => {
            let mode = if replay {
                pass::PassMode::Replay
            } else {
                pass::PassMode::Incremental
            };
            let report = pass::run_pass(store, cfg, mode)?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&report).unwrap());
            } else {
                print_pass_report(&report);
            }
            Ok(())
        }
        ObserveCommand::Status { format } => {
            let status = pass::store_status(store, cfg)?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&status).unwrap());
            } else {
                print_status_report(&status);
            }
            Ok(())
        }
    }
}

fn print_pass_report(report: &pass::PassReport) {
    match report.status.as_str() {
        "busy" => {
            println!(
                "{} another pass is running; nothing was changed",
                "⚠ BUSY".bright_yellow().bold()
            );
            return;
        }
        "disabled" => {
            println!(
                "{} observation passes are disabled in config",
                "⚠ DISABLED".bright_yellow().bold()
            );
            return;
        }
        _ => {}
    }

    println!("{}", "Pass complete".bright_green().bold());
    for warning in &report.warnings {
        println!("  {} {}", "⚠".bright_yellow(), warning);
    }
    println!(
        "  scanned {} observations ({} malformed skipped), {} candidates",
        report.scanned, report.malformed_skipped, report.candidates
    );
    println!(
        "  {} created, {} reinforced, {} decayed, {} pruned, {} merged, {} conflicted",
        report.created.len(),
        report.reinforced.len(),
        report.decayed.len(),
        report.pruned.len(),
        report.merged.len(),
        report.conflicted.len()
    );
    if !report.skills_created.is_empty() {
        println!(
            "  {} {} skill(s) evolved",
            "★".bright_cyan(),
            report.skills_created.len()
        );
    }
    if let Some(diff) = &report.replay_diff {
        println!("{}", "Replay diff".bright_white().bold());
        println!(
            "  {} created, {} reinforced, {} changed, {} pruned",
            diff.created.len(),
            diff.reinforced.len(),
            diff.changed.len(),
            diff.pruned.len()
        );
    }
}

fn print_status_report(status: &pass::StatusReport) {
    println!("{}", "Store status".bright_white().bold());
    println!(
        "  observe enabled: {} | offset: {} | last run: {}",
        status.observe_enabled,
        status.offset,
        status
            .last_run_at
            .map(|t| format!("{}Z", t))
            .unwrap_or_else(|| "never".to_string())
    );
    println!(
        "  instincts: {} total, {} active, {} conflicted, {} auto-approved | skills: {}",
        status.instincts_total,
        status.active,
        status.conflicted,
        status.auto_approved,
        status.skills_total
    );
    if status.review.is_empty() {
        println!("  nothing flagged for review");
    } else {
        println!("  {} flagged for review:", status.review.len());
        for item in &status.review {
            println!(
                "    - {} (confidence {:.2}, {} days stale)",
                item.id, item.confidence, item.days_stale
            );
        }
    }
}

fn run_instinct(store: &Store, cfg: &Config, cli: InstinctCli) -> Result<(), InstinctError> {
    match cli.command {
        InstinctCommand::List { domain, format } => {
            let instincts: Vec<_> = instinct::load_instincts(store)?
                .into_values()
                .filter(|i| domain.as_deref().is_none_or(|d| i.domain == d))
                .collect();
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&instincts).unwrap());
            } else if instincts.is_empty() {
                println!("No instincts recorded yet.");
            } else {
                for i in &instincts {
                    let marker = match (i.status, i.auto_approved) {
                        (instinct::Status::Conflicted, _) => "✗".bright_red(),
                        (_, true) => "★".bright_cyan(),
                        _ => "·".bright_black(),
                    };
                    println!(
                        "  {} {} [{}] {:.2}  {} → {}",
                        marker,
                        i.id.bright_white(),
                        i.domain,
                        i.confidence,
                        i.trigger,
                        i.action
                    );
                }
            }
            Ok(())
        }
        InstinctCommand::Show { id } => match instinct::get_instinct(store, &id)? {
            Some(i) => {
                println!("{}", serde_json::to_string_pretty(&i).unwrap());
                Ok(())
            }
            None => Err(InstinctError::NotFound(format!("instinct '{}'", id))),
        },
        InstinctCommand::Resolve { id, keep, drop } => {
            if keep == drop {
                return Err(InstinctError::ValidationError(
                    "resolve requires exactly one of --keep or --drop".to_string(),
                ));
            }
            let Some(mut record) = instinct::get_instinct(store, &id)? else {
                return Err(InstinctError::NotFound(format!("instinct '{}'", id)));
            };
            if keep {
                record.status = instinct::Status::Active;
                instinct::upsert_instinct(store, &record)?;
                println!("✓ {} returned to active status", id);
            } else {
                instinct::delete_instinct(store, &id)?;
                println!("✓ {} removed", id);
            }
            Ok(())
        }
        InstinctCommand::Export {
            output,
            domain,
            min_confidence,
        } => {
            let count = portability::export_instincts(
                store,
                &output,
                domain.as_deref(),
                min_confidence,
            )?;
            println!("✓ Exported {} instinct(s) to {}", count, output.display());
            Ok(())
        }
        InstinctCommand::Import { input } => {
            let report = portability::import_instincts(store, &input, cfg)?;
            println!(
                "✓ Imported {} record(s): {} inserted, {} merged",
                report.read,
                report.inserted.len(),
                report.merged.len()
            );
            Ok(())
        }
    }
}

fn run_skill(store: &Store, cfg: &Config, cli: SkillCli) -> Result<(), InstinctError> {
    match cli.command {
        SkillCommand::List { format } => {
            let skills = instinct::load_skills(store)?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&skills).unwrap());
            } else if skills.is_empty() {
                println!("No skills evolved yet.");
            } else {
                for s in &skills {
                    println!(
                        "  {} {} [{}] {} members, avg confidence {:.2} at creation",
                        "★".bright_cyan(),
                        s.id.bright_white(),
                        s.domain,
                        s.member_instinct_ids.len(),
                        s.avg_confidence_at_creation
                    );
                }
            }
            Ok(())
        }
        SkillCommand::Feedback { skill, event } => {
            let report = pass::apply_skill_feedback(store, cfg, &skill, &event)?;
            if report.duplicate {
                println!("Event already applied; no reinforcement.");
            } else {
                println!(
                    "✓ Reinforced {} member instinct(s) of {}",
                    report.reinforced.len(),
                    report.skill_id
                );
            }
            Ok(())
        }
    }
}
