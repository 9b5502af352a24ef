//! Pattern detectors: pure scans over an observation window.
//!
//! Each detector proposes `CandidatePattern`s and never touches stored
//! state; the confidence engine owns every lifecycle transition. A pattern
//! only survives the common gate when its evidence count meets the
//! category minimum and it recurs across enough distinct sessions —
//! single-session repetition is excluded as noise.

use crate::engine::observation::{
    Observation, StructuralOperation, ToolInput,
};
use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::LazyLock;

/// Detector categories, declared in priority order: when two candidates
/// from different categories produce the same instinct id in one pass, the
/// earlier variant wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    ErrorFix,
    StructuralCorrection,
    UserCorrection,
    ImportConvention,
    SignatureConvention,
    DecoratorPreference,
    WorkflowSequence,
    ToolPreference,
    FilePattern,
    CommandPattern,
    EditPattern,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::ErrorFix => "error-fix",
            Category::StructuralCorrection => "structural-correction",
            Category::UserCorrection => "user-correction",
            Category::ImportConvention => "import-convention",
            Category::SignatureConvention => "signature-convention",
            Category::DecoratorPreference => "decorator-preference",
            Category::WorkflowSequence => "workflow-sequence",
            Category::ToolPreference => "tool-preference",
            Category::FilePattern => "file-pattern",
            Category::CommandPattern => "command-pattern",
            Category::EditPattern => "edit-pattern",
        }
    }

    pub fn domain(&self) -> &'static str {
        match self {
            Category::ErrorFix => "error-handling",
            Category::StructuralCorrection => "structural-correction",
            Category::UserCorrection => "code-style",
            Category::ImportConvention => "import-pattern",
            Category::SignatureConvention => "signature-convention",
            Category::DecoratorPreference => "decorator-usage",
            Category::WorkflowSequence => "workflow",
            Category::ToolPreference => "tool-preference",
            Category::FilePattern => "code-style",
            Category::CommandPattern => "workflow",
            Category::EditPattern => "code-style",
        }
    }

    /// Minimum evidence for the common gate. Error-fix and structural
    /// corrections carry structurally verified evidence; command patterns
    /// state their own recurrence rule.
    pub fn min_evidence(&self) -> usize {
        match self {
            Category::ErrorFix | Category::StructuralCorrection | Category::CommandPattern => 3,
            _ => 5,
        }
    }

    pub fn min_sessions(&self) -> usize {
        match self {
            Category::WorkflowSequence => 3,
            _ => 2,
        }
    }
}

/// A proposed recurring behavior, not yet an instinct.
#[derive(Debug, Clone)]
pub struct CandidatePattern {
    pub id: String,
    pub category: Category,
    pub domain: &'static str,
    pub trigger: String,
    pub action: String,
    pub evidence_count: usize,
    pub sessions: FxHashSet<String>,
}

impl CandidatePattern {
    pub fn new(
        category: Category,
        key: &str,
        trigger: String,
        action: String,
        evidence_count: usize,
        sessions: FxHashSet<String>,
    ) -> Self {
        Self {
            id: slug(&format!("{}-{}", category.as_str(), key)),
            category,
            domain: category.domain(),
            trigger,
            action,
            evidence_count,
            sessions,
        }
    }

    pub fn session_spread(&self) -> usize {
        self.sessions.len()
    }

    pub fn passes_gate(&self) -> bool {
        self.evidence_count >= self.category.min_evidence()
            && self.session_spread() >= self.category.min_sessions()
    }
}

/// Stable slug: lowercase alphanumerics with single hyphens.
pub fn slug(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_hyphen = true;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            out.push('-');
            last_hyphen = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Run every detector over the window, apply the common gate, and resolve
/// same-id collisions by category priority.
pub fn detect_patterns(window: &[Observation]) -> Vec<CandidatePattern> {
    let sessions = split_sessions(window);

    let mut candidates: Vec<CandidatePattern> = Vec::new();
    candidates.extend(detect_error_fixes(&sessions));
    candidates.extend(detect_structural_corrections(&sessions));
    candidates.extend(detect_corrections(&sessions));
    candidates.extend(detect_structural_conventions(window));
    candidates.extend(detect_workflow_sequences(&sessions));
    candidates.extend(detect_tool_preferences(window));
    candidates.extend(detect_file_patterns(window));
    candidates.extend(detect_command_patterns(&sessions));
    candidates.extend(detect_edit_patterns(&sessions));

    candidates.retain(|c| c.passes_gate());

    // Priority order, then id for determinism; first id occurrence wins.
    candidates.sort_by(|a, b| a.category.cmp(&b.category).then(a.id.cmp(&b.id)));
    let mut seen: FxHashSet<String> = FxHashSet::default();
    candidates.retain(|c| seen.insert(c.id.clone()));
    candidates
}

/// Per-session observation sequences, preserving log order. Ordering
/// across sessions carries no meaning and is never relied upon.
fn split_sessions<'a>(window: &'a [Observation]) -> Vec<(String, Vec<&'a Observation>)> {
    let mut by_session: FxHashMap<String, Vec<&'a Observation>> = FxHashMap::default();
    let mut order: Vec<String> = Vec::new();
    for obs in window {
        if !by_session.contains_key(&obs.session_id) {
            order.push(obs.session_id.clone());
        }
        by_session.entry(obs.session_id.clone()).or_default().push(obs);
    }
    order
        .into_iter()
        .map(|s| {
            let v = by_session.remove(&s).unwrap_or_default();
            (s, v)
        })
        .collect()
}

static REDIRECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(echo|cat|printf)\b.*>").unwrap());

fn first_token(cmd: &str) -> Option<&str> {
    cmd.split_whitespace().find(|t| !t.contains('='))
}

/// Normalized command prefix: program plus subcommand when present.
fn command_prefix(cmd: &str) -> Option<String> {
    let mut tokens = cmd.split_whitespace().filter(|t| !t.contains('='));
    let program = tokens.next()?;
    match tokens.next() {
        Some(sub) if !sub.starts_with('-') => Some(format!("{} {}", program, sub)),
        _ => Some(program.to_string()),
    }
}

fn file_ext(path: &str) -> Option<&str> {
    let base = path.rsplit(['/', '\\']).next()?;
    let dot = base.rfind('.')?;
    if dot == 0 {
        return None;
    }
    Some(&base[dot..])
}

/// Naming case convention of a file basename, extension stripped.
fn case_style(path: &str) -> Option<&'static str> {
    let base = path.rsplit(['/', '\\']).next()?;
    let stem = base.split('.').next()?;
    if stem.is_empty() {
        return None;
    }
    let has_upper = stem.chars().any(|c| c.is_ascii_uppercase());
    if stem.contains('-') {
        Some("kebab-case")
    } else if stem.contains('_') {
        Some("snake_case")
    } else if stem.chars().next().is_some_and(|c| c.is_ascii_uppercase()) && has_upper {
        Some("PascalCase")
    } else if has_upper {
        Some("camelCase")
    } else {
        None
    }
}

// --- Tool preference -------------------------------------------------------

/// Task categories a tool choice can express a preference within.
fn task_category(obs: &Observation) -> Option<(&'static str, String)> {
    match &obs.input {
        ToolInput::Bash {
            command_preview, ..
        } => {
            let token = first_token(command_preview)?;
            match token {
                "grep" | "rg" | "ag" => Some(("content-search", token.to_string())),
                "npm" | "yarn" | "pnpm" | "bun" => Some(("package-manager", token.to_string())),
                "pytest" | "jest" | "vitest" => Some(("test-runner", token.to_string())),
                _ if REDIRECT_RE.is_match(command_preview) => {
                    Some(("file-write", "shell-redirect".to_string()))
                }
                _ => None,
            }
        }
        ToolInput::Write { .. } => Some(("file-write", "write-tool".to_string())),
        _ => None,
    }
}

fn category_trigger(category: &str) -> String {
    match category {
        "content-search" => "when searching file contents".to_string(),
        "package-manager" => "when running package manager commands".to_string(),
        "test-runner" => "when running tests".to_string(),
        "file-write" => "when writing files".to_string(),
        other => format!("when performing {} tasks", other),
    }
}

/// One tool's share of a task category exceeding 70% is a preference.
fn detect_tool_preferences(window: &[Observation]) -> Vec<CandidatePattern> {
    // category -> choice -> (count, sessions)
    let mut groups: FxHashMap<&'static str, FxHashMap<String, (usize, FxHashSet<String>)>> =
        FxHashMap::default();

    for obs in window {
        if let Some((category, choice)) = task_category(obs) {
            let entry = groups
                .entry(category)
                .or_default()
                .entry(choice)
                .or_insert_with(|| (0, FxHashSet::default()));
            entry.0 += 1;
            entry.1.insert(obs.session_id.clone());
        }
    }

    let mut out = Vec::new();
    for (category, choices) in groups {
        let total: usize = choices.values().map(|(n, _)| n).sum();
        if total == 0 {
            continue;
        }
        let Some((choice, (count, sessions))) = choices
            .into_iter()
            .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(a.0.cmp(&b.0)))
        else {
            continue;
        };
        let share = count as f64 / total as f64;
        if share > 0.7 {
            let pct = (share * 100.0).round() as u32;
            out.push(CandidatePattern::new(
                Category::ToolPreference,
                &format!("{}-{}", category, choice),
                category_trigger(category),
                format!("prefer `{}` for {} ({}% of observed usage)", choice, category, pct),
                count,
                sessions,
            ));
        }
    }
    out
}

// --- File/naming pattern ---------------------------------------------------

/// One naming convention covering >80% of file creations per extension.
fn detect_file_patterns(window: &[Observation]) -> Vec<CandidatePattern> {
    // ext -> style -> (count, sessions)
    let mut groups: FxHashMap<String, FxHashMap<&'static str, (usize, FxHashSet<String>)>> =
        FxHashMap::default();

    for obs in window {
        let ToolInput::Write { file_path, .. } = &obs.input else {
            continue;
        };
        let (Some(ext), Some(style)) = (file_ext(file_path), case_style(file_path)) else {
            continue;
        };
        let entry = groups
            .entry(ext.to_string())
            .or_default()
            .entry(style)
            .or_insert_with(|| (0, FxHashSet::default()));
        entry.0 += 1;
        entry.1.insert(obs.session_id.clone());
    }

    let mut out = Vec::new();
    for (ext, styles) in groups {
        let total: usize = styles.values().map(|(n, _)| n).sum();
        let Some((style, (count, sessions))) = styles
            .into_iter()
            .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(a.0.cmp(b.0)))
        else {
            continue;
        };
        if total > 0 && count as f64 / total as f64 > 0.8 {
            out.push(CandidatePattern::new(
                Category::FilePattern,
                &format!("{}-{}", ext, style),
                format!("when creating new {} files", ext),
                format!("name {} files in {}", ext, style),
                count,
                sessions,
            ));
        }
    }
    out
}

// --- Edit/correction patterns ----------------------------------------------

const CORRECTION_GAP: usize = 3;

/// Write→Edit pairs on the same file within a short tool-use window are
/// corrections of just-generated content.
fn detect_corrections(sessions: &[(String, Vec<&Observation>)]) -> Vec<CandidatePattern> {
    let mut events = 0usize;
    let mut spread: FxHashSet<String> = FxHashSet::default();

    for (session, seq) in sessions {
        for (i, obs) in seq.iter().enumerate() {
            let ToolInput::Write { file_path, .. } = &obs.input else {
                continue;
            };
            for later in seq.iter().skip(i + 1).take(CORRECTION_GAP + 1) {
                if let ToolInput::Edit {
                    file_path: edited, ..
                } = &later.input
                {
                    if edited == file_path {
                        events += 1;
                        spread.insert(session.clone());
                        break;
                    }
                }
            }
        }
    }

    if events == 0 {
        return Vec::new();
    }
    vec![CandidatePattern::new(
        Category::UserCorrection,
        "post-write-edit",
        "after writing a new file".to_string(),
        format!(
            "review generated files before moving on; {} writes needed immediate edits",
            events
        ),
        events,
        spread,
    )]
}

/// Batch-edit signals: replace_all edits and ≥3 edits to one file in a
/// session both indicate refinement workflows.
fn detect_edit_patterns(sessions: &[(String, Vec<&Observation>)]) -> Vec<CandidatePattern> {
    let mut replace_all_events = 0usize;
    let mut replace_all_spread: FxHashSet<String> = FxHashSet::default();
    let mut refine_events = 0usize;
    let mut refine_spread: FxHashSet<String> = FxHashSet::default();

    for (session, seq) in sessions {
        let mut edits_per_file: FxHashMap<&str, usize> = FxHashMap::default();
        for obs in seq {
            if let ToolInput::Edit {
                file_path,
                replace_all,
            } = &obs.input
            {
                if *replace_all {
                    replace_all_events += 1;
                    replace_all_spread.insert(session.clone());
                }
                *edits_per_file.entry(file_path.as_str()).or_default() += 1;
            }
        }
        for (_, count) in edits_per_file {
            if count >= 3 {
                refine_events += count;
                refine_spread.insert(session.clone());
            }
        }
    }

    let mut out = Vec::new();
    if replace_all_events > 0 {
        out.push(CandidatePattern::new(
            Category::EditPattern,
            "replace-all-batch",
            "when applying a repetitive change across a file".to_string(),
            "use a replace-all batch edit instead of serial single edits".to_string(),
            replace_all_events,
            replace_all_spread,
        ));
    }
    if refine_events > 0 {
        out.push(CandidatePattern::new(
            Category::EditPattern,
            "multi-edit-refinement",
            "when a file needs several related changes".to_string(),
            "plan edits up front; files are being reworked three or more times".to_string(),
            refine_events,
            refine_spread,
        ));
    }
    out
}

// --- Command patterns ------------------------------------------------------

/// Recurring normalized command prefixes with their dominant preceding tool.
fn detect_command_patterns(sessions: &[(String, Vec<&Observation>)]) -> Vec<CandidatePattern> {
    // prefix -> (count, sessions, preceding tool counts)
    struct Group {
        count: usize,
        sessions: FxHashSet<String>,
        preceded_by: FxHashMap<&'static str, usize>,
    }
    let mut groups: FxHashMap<String, Group> = FxHashMap::default();

    for (session, seq) in sessions {
        for (i, obs) in seq.iter().enumerate() {
            let Some(cmd) = obs.input.command() else {
                continue;
            };
            let Some(prefix) = command_prefix(cmd) else {
                continue;
            };
            let g = groups.entry(prefix).or_insert_with(|| Group {
                count: 0,
                sessions: FxHashSet::default(),
                preceded_by: FxHashMap::default(),
            });
            g.count += 1;
            g.sessions.insert(session.clone());
            if i > 0 {
                *g.preceded_by.entry(seq[i - 1].input.tool_name()).or_default() += 1;
            }
        }
    }

    let mut out = Vec::new();
    for (prefix, g) in groups {
        let context = g
            .preceded_by
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(a.0.cmp(b.0)))
            .filter(|(_, n)| **n * 2 > g.count)
            .map(|(tool, _)| *tool);
        let trigger = match context {
            Some(tool) => format!("after {} steps that lead into `{}`", tool, prefix),
            None => format!("when the task calls for `{}`", prefix),
        };
        out.push(CandidatePattern::new(
            Category::CommandPattern,
            &prefix,
            trigger,
            format!("run `{}`; it recurs in this workflow", prefix),
            g.count,
            g.sessions,
        ));
    }
    out
}

// --- Error-fix sequences ---------------------------------------------------

const ERROR_FIX_LOOKAHEAD: usize = 3;

/// Pair a failing Bash invocation with a corrective action in the next
/// 1–3 observations of the same session: either the same command
/// succeeding, or an edit to a file.
fn detect_error_fixes(sessions: &[(String, Vec<&Observation>)]) -> Vec<CandidatePattern> {
    struct Group {
        count: usize,
        sessions: FxHashSet<String>,
        edit_fixes: usize,
    }
    let mut groups: FxHashMap<String, Group> = FxHashMap::default();

    for (session, seq) in sessions {
        for (i, obs) in seq.iter().enumerate() {
            let Some(cmd) = obs.input.command() else {
                continue;
            };
            if !obs.output.failed() {
                continue;
            }
            let Some(prefix) = command_prefix(cmd) else {
                continue;
            };

            let mut fix: Option<bool> = None; // Some(true) = edit fix, Some(false) = retry fix
            for later in seq.iter().skip(i + 1).take(ERROR_FIX_LOOKAHEAD) {
                match &later.input {
                    ToolInput::Bash {
                        command_preview, ..
                    } if !later.output.failed()
                        && command_prefix(command_preview).as_deref() == Some(prefix.as_str()) =>
                    {
                        fix = Some(false);
                        break;
                    }
                    ToolInput::Edit { .. } | ToolInput::Write { .. } => {
                        fix = Some(true);
                        break;
                    }
                    _ => {}
                }
            }

            if let Some(edit_fix) = fix {
                let g = groups.entry(prefix.clone()).or_insert_with(|| Group {
                    count: 0,
                    sessions: FxHashSet::default(),
                    edit_fixes: 0,
                });
                g.count += 1;
                g.sessions.insert(session.clone());
                if edit_fix {
                    g.edit_fixes += 1;
                }
            }
        }
    }

    let mut out = Vec::new();
    for (prefix, g) in groups {
        let action = if g.edit_fixes * 2 >= g.count {
            format!(
                "fix the affected file before re-running; this resolved {} `{}` failures",
                g.count, prefix
            )
        } else {
            format!(
                "re-run `{}` after adjusting; retries resolved {} failures",
                prefix, g.count
            )
        };
        out.push(CandidatePattern::new(
            Category::ErrorFix,
            &format!("{}-recovery", prefix),
            format!("when `{}` fails", prefix),
            action,
            g.count,
            g.sessions,
        ));
    }
    out
}

// --- Workflow sequences ----------------------------------------------------

const WORKFLOW_MIN_LEN: usize = 2;
const WORKFLOW_MAX_LEN: usize = 5;

/// Sliding 2–5 length tool-chain shapes per session, with single-step gap
/// tolerance. A shape recurring in enough distinct sessions is a workflow.
fn detect_workflow_sequences(sessions: &[(String, Vec<&Observation>)]) -> Vec<CandidatePattern> {
    let mut shapes: FxHashMap<String, (usize, FxHashSet<String>)> = FxHashMap::default();

    for (session, seq) in sessions {
        let tools: Vec<&'static str> = seq.iter().map(|o| o.input.tool_name()).collect();
        let mut session_shapes: FxHashSet<String> = FxHashSet::default();

        for len in WORKFLOW_MIN_LEN..=WORKFLOW_MAX_LEN {
            // Contiguous windows.
            for w in tools.windows(len) {
                if let Some(shape) = shape_of(w) {
                    session_shapes.insert(shape);
                }
            }
            // One interior element skipped.
            for w in tools.windows(len + 1) {
                for skip in 1..len {
                    let gapped: Vec<&'static str> = w
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| *i != skip)
                        .map(|(_, t)| *t)
                        .collect();
                    if let Some(shape) = shape_of(&gapped) {
                        session_shapes.insert(shape);
                    }
                }
            }
        }

        for shape in session_shapes {
            // Evidence counts occurrences within the session too.
            let occurrences = count_shape(&tools, &shape);
            let entry = shapes
                .entry(shape)
                .or_insert_with(|| (0, FxHashSet::default()));
            entry.0 += occurrences;
            entry.1.insert(session.clone());
        }
    }

    let mut out = Vec::new();
    for (shape, (count, spread)) in shapes {
        let first = shape.split('>').next().unwrap_or_default().to_string();
        out.push(CandidatePattern::new(
            Category::WorkflowSequence,
            &shape,
            format!("when a task starts with a {} step", first),
            format!(
                "follow the {} sequence; it recurs across {} sessions",
                shape.replace('>', " → "),
                spread.len()
            ),
            count,
            spread,
        ));
    }
    out
}

/// A shape must mix at least two distinct tools to mean anything.
fn shape_of(tools: &[&'static str]) -> Option<String> {
    let distinct: FxHashSet<&&str> = tools.iter().collect();
    if distinct.len() < 2 {
        return None;
    }
    Some(tools.join(">"))
}

fn count_shape(tools: &[&'static str], shape: &str) -> usize {
    let parts: Vec<&str> = shape.split('>').collect();
    if parts.len() > tools.len() {
        return 0;
    }
    tools
        .windows(parts.len())
        .filter(|w| w.iter().zip(parts.iter()).all(|(a, b)| a == b))
        .count()
        .max(1)
}

// --- Structural conventions ------------------------------------------------

const CONVENTION_MIN_FILES: usize = 5;
const CONVENTION_SHARE: f64 = 0.8;

/// Import/signature/decorator conventions from structural payloads of file
/// creations, grouped by file-suffix type.
fn detect_structural_conventions(window: &[Observation]) -> Vec<CandidatePattern> {
    struct FileFacts {
        session_id: String,
        imports: FxHashSet<String>,
        decorators: FxHashSet<String>,
        typed_returns: bool,
        has_functions: bool,
    }
    // ext -> file_path -> facts (last write wins)
    let mut by_ext: FxHashMap<String, FxHashMap<String, FileFacts>> = FxHashMap::default();

    for obs in window {
        let Some(structural) = &obs.structural else {
            continue;
        };
        if structural.operation != StructuralOperation::Create {
            continue;
        }
        let Some(path) = obs.input.file_path() else {
            continue;
        };
        let Some(ext) = file_ext(path) else {
            continue;
        };
        let facts = FileFacts {
            session_id: obs.session_id.clone(),
            imports: structural.imports.iter().map(|i| i.module.clone()).collect(),
            decorators: structural
                .decorators
                .iter()
                .map(|d| d.name.clone())
                .collect(),
            typed_returns: !structural.functions.is_empty()
                && structural
                    .functions
                    .iter()
                    .all(|f| f.return_type.is_some()),
            has_functions: !structural.functions.is_empty(),
        };
        by_ext
            .entry(ext.to_string())
            .or_default()
            .insert(path.to_string(), facts);
    }

    let mut out = Vec::new();
    for (ext, files) in by_ext {
        if files.len() < CONVENTION_MIN_FILES {
            continue;
        }
        let total = files.len();

        // Imports present in >80% of files of this type.
        let mut import_counts: FxHashMap<&str, (usize, FxHashSet<String>)> = FxHashMap::default();
        for facts in files.values() {
            for module in &facts.imports {
                let e = import_counts
                    .entry(module.as_str())
                    .or_insert_with(|| (0, FxHashSet::default()));
                e.0 += 1;
                e.1.insert(facts.session_id.clone());
            }
        }
        for (module, (count, spread)) in import_counts {
            if count as f64 / total as f64 > CONVENTION_SHARE {
                out.push(CandidatePattern::new(
                    Category::ImportConvention,
                    &format!("{}-{}", ext, module),
                    format!("when creating {} files", ext),
                    format!("import `{}`; it appears in nearly every {} file", module, ext),
                    count,
                    spread,
                ));
            }
        }

        // Annotated return types across files with functions.
        let with_functions: Vec<&FileFacts> =
            files.values().filter(|f| f.has_functions).collect();
        if with_functions.len() >= CONVENTION_MIN_FILES {
            let typed: Vec<&&FileFacts> =
                with_functions.iter().filter(|f| f.typed_returns).collect();
            if typed.len() as f64 / with_functions.len() as f64 > CONVENTION_SHARE {
                let spread: FxHashSet<String> =
                    typed.iter().map(|f| f.session_id.clone()).collect();
                out.push(CandidatePattern::new(
                    Category::SignatureConvention,
                    &format!("{}-typed-returns", ext),
                    format!("when declaring functions in {} files", ext),
                    "annotate return types on every function".to_string(),
                    typed.len(),
                    spread,
                ));
            }
        }

        // Decorator names present in >80% of files of this type.
        let mut decorator_counts: FxHashMap<&str, (usize, FxHashSet<String>)> =
            FxHashMap::default();
        for facts in files.values() {
            for name in &facts.decorators {
                let e = decorator_counts
                    .entry(name.as_str())
                    .or_insert_with(|| (0, FxHashSet::default()));
                e.0 += 1;
                e.1.insert(facts.session_id.clone());
            }
        }
        for (name, (count, spread)) in decorator_counts {
            if count as f64 / total as f64 > CONVENTION_SHARE {
                out.push(CandidatePattern::new(
                    Category::DecoratorPreference,
                    &format!("{}-{}", ext, name),
                    format!("when decorating definitions in {} files", ext),
                    format!("apply `@{}` the way the rest of the codebase does", name),
                    count,
                    spread,
                ));
            }
        }
    }
    out
}

// --- Structural corrections ------------------------------------------------

/// Write→Edit structural diffs, already classified upstream, recurring by
/// change category. Ranked above generic corrections because the evidence
/// is structurally verified rather than positional.
fn detect_structural_corrections(
    sessions: &[(String, Vec<&Observation>)],
) -> Vec<CandidatePattern> {
    let mut groups: FxHashMap<&'static str, (usize, FxHashSet<String>)> = FxHashMap::default();

    for (session, seq) in sessions {
        for obs in seq {
            let Some(structural) = &obs.structural else {
                continue;
            };
            if structural.operation != StructuralOperation::Modify {
                continue;
            }
            let Some(category) = structural.change_category else {
                continue;
            };
            let entry = groups
                .entry(category.as_str())
                .or_insert_with(|| (0, FxHashSet::default()));
            entry.0 += 1;
            entry.1.insert(session.clone());
        }
    }

    let mut out = Vec::new();
    for (category, (count, spread)) in groups {
        let action = match category {
            "import_fix" => "double-check imports in generated code; import corrections keep recurring".to_string(),
            "type_change" => "verify return and parameter types before writing; type corrections keep recurring".to_string(),
            "decorator_change" => "confirm decorator usage up front; decorator corrections keep recurring".to_string(),
            "function_change" => "settle function signatures before generating; signature rework keeps recurring".to_string(),
            "structural_addition" => "sketch the full structure first; structure is being added after the fact".to_string(),
            other => format!("review {} changes in generated code; they keep recurring", other),
        };
        out.push(CandidatePattern::new(
            Category::StructuralCorrection,
            category,
            "after generating new source code".to_string(),
            action,
            count,
            spread,
        ));
    }
    out
}
