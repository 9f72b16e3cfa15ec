//! File reconciliation: associate index rows with files under a base directory.
//!
//! Candidates are collected by one directory walk into a filename index. Each eligible
//! row derives an expected filename from one of its fields and looks it up there. One
//! hit resolves the row, several hits leave it ambiguous with every candidate recorded.

use crate::error::MigrationError;
use crate::migrate::config::{MappingConfig, MatchingDefaults};
use crate::migrate::index_store::{
    ENTRY_TYPE_COLUMN, EntryType, IndexRecord, IndexStore, PARENT_ID_COLUMN,
};
use crate::migrate::mapping::{
    MappingEntry, MappingSummary, MatchOutcome, WriteMode, decide_write_mode, load_mappings,
    summarize, write_mappings,
};
use crate::migrate::paths::ProjectPaths;
use crate::migrate::state;
use crate::migrate::util::quote_ident;
use anyhow::{Context, Result};
use chrono::Utc;
use clap::ValueEnum;
use glob::{MatchOptions as GlobOptions, Pattern};
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum MappingKind {
    SourceFiles,
    AccessFiles,
    AggregateTop,
    AggregateBottom,
    AltText,
    Assessment,
}

impl MappingKind {
    pub const ALL: [MappingKind; 6] = [
        Self::SourceFiles,
        Self::AccessFiles,
        Self::AggregateTop,
        Self::AggregateBottom,
        Self::AltText,
        Self::Assessment,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::SourceFiles => "source-files",
            Self::AccessFiles => "access-files",
            Self::AggregateTop => "aggregate-top",
            Self::AggregateBottom => "aggregate-bottom",
            Self::AltText => "alt-text",
            Self::Assessment => "assessment",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            Self::SourceFiles => "source_files.csv",
            Self::AccessFiles => "access_files.csv",
            Self::AggregateTop => "aggregate_top_files.csv",
            Self::AggregateBottom => "aggregate_bottom_files.csv",
            Self::AltText => "alt_text_files.csv",
            Self::Assessment => "assessment_files.csv",
        }
    }

    /// Aggregate mappings accumulate attachments across runs instead of replacing them.
    pub fn aggregate(self) -> bool {
        matches!(self, Self::AggregateTop | Self::AggregateBottom)
    }

    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::AltText => &["txt"],
            Self::Assessment => &["json"],
            _ => &[],
        }
    }

    /// Work-level kinds attach to whole works; the rest attach to individual files.
    pub fn work_level(self) -> bool {
        self.aggregate()
    }

    fn eligibility_sql(self) -> String {
        let entry = quote_ident(ENTRY_TYPE_COLUMN);
        let parent = quote_ident(PARENT_ID_COLUMN);
        let object = EntryType::CompoundObject.label();
        let child = EntryType::CompoundChild.label();
        let grouped = EntryType::GroupedWork.label();
        if self.work_level() {
            format!(
                "{entry} IN ('{object}', '{grouped}') OR ({entry} IS NULL AND {parent} IS NULL)"
            )
        } else {
            format!("{entry} IS NULL OR {entry} = '{child}'")
        }
    }
}

/// Glob over `/`-joined paths relative to the base directory. `*`, `?` and `[...]`
/// stay within one segment; `**` crosses segments.
#[derive(Debug, Clone)]
pub struct PathGlob {
    pattern: Pattern,
    recursive: bool,
}

const GLOB_OPTIONS: GlobOptions = GlobOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

impl PathGlob {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim().trim_start_matches("./");
        if pattern.is_empty() {
            return Err(MigrationError::InvalidInput("path pattern cannot be empty".into()).into());
        }
        let compiled = Pattern::new(pattern).map_err(|err| {
            MigrationError::InvalidInput(format!("invalid path pattern `{pattern}`: {err}"))
        })?;
        Ok(Self {
            pattern: compiled,
            recursive: pattern.contains('/'),
        })
    }

    /// Whether the walk must descend below the base directory.
    pub fn recursive(&self) -> bool {
        self.recursive
    }

    pub fn matches(&self, relative: &str) -> bool {
        self.pattern.matches_with(relative, GLOB_OPTIONS)
    }
}

/// Field value to expected filename, through an anchored capture pattern and a template.
#[derive(Debug, Clone)]
pub struct KeyTransform {
    pattern: Regex,
    template: String,
}

impl KeyTransform {
    pub fn new(field_pattern: &str, template: &str) -> Result<Self> {
        let pattern = Regex::new(&format!("^(?:{field_pattern})$")).map_err(|err| {
            MigrationError::InvalidInput(format!("invalid field pattern `{field_pattern}`: {err}"))
        })?;
        if template.is_empty() {
            return Err(
                MigrationError::InvalidInput("filename template cannot be empty".into()).into(),
            );
        }
        Ok(Self {
            pattern,
            template: template.to_string(),
        })
    }

    /// `None` when the value does not match the pattern.
    pub fn apply(&self, raw: &str) -> Option<String> {
        let caps = self.pattern.captures(raw)?;
        let mut out = String::new();
        caps.expand(&self.template, &mut out);
        Some(out)
    }
}

/// Filename to absolute candidate paths, in walk order.
#[derive(Debug, Default)]
pub struct CandidateIndex {
    by_name: HashMap<String, Vec<String>>,
    files: usize,
}

impl CandidateIndex {
    pub fn build(
        base: &Path,
        glob: &PathGlob,
        extensions: &[&str],
        lowercase: bool,
    ) -> Result<Self> {
        let mut walker = WalkDir::new(base).min_depth(1).sort_by_file_name();
        if !glob.recursive() {
            walker = walker.max_depth(1);
        }

        let mut index = Self::default();
        for entry in walker {
            let entry = entry.with_context(|| format!("failed to walk {}", base.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(base) else {
                continue;
            };
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !glob.matches(&relative) {
                continue;
            }
            if !extensions.is_empty() {
                let ext = entry
                    .path()
                    .extension()
                    .map(|e| e.to_string_lossy().to_ascii_lowercase())
                    .unwrap_or_default();
                if !extensions.contains(&ext.as_str()) {
                    continue;
                }
            }

            let name = entry.file_name().to_string_lossy();
            let key = if lowercase {
                name.to_lowercase()
            } else {
                name.into_owned()
            };
            index
                .by_name
                .entry(key)
                .or_default()
                .push(entry.path().to_string_lossy().into_owned());
            index.files += 1;
        }
        Ok(index)
    }

    pub fn files(&self) -> usize {
        self.files
    }

    pub fn lookup(&self, key: &str) -> &[String] {
        self.by_name.get(key).map(Vec::as_slice).unwrap_or_default()
    }
}

/// One mapping run, with config defaults already overlaid by caller flags.
#[derive(Debug, Clone)]
pub struct MatchOptions {
    pub kind: MappingKind,
    pub base_path: PathBuf,
    pub export_field: String,
    pub field_pattern: String,
    pub filename_template: String,
    pub path_pattern: String,
    pub lowercase: bool,
    pub update: bool,
    pub force: bool,
    pub dry_run: bool,
}

impl MatchOptions {
    pub fn new(kind: MappingKind, base_path: PathBuf, defaults: &MatchingDefaults) -> Self {
        Self {
            kind,
            base_path,
            export_field: defaults.export_field.clone(),
            field_pattern: defaults.field_pattern.clone(),
            filename_template: defaults.filename_template.clone(),
            path_pattern: defaults.path_pattern.clone(),
            lowercase: defaults.lowercase,
            update: false,
            force: false,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MappingOutcome {
    pub kind: MappingKind,
    pub mapping_path: PathBuf,
    pub mode: WriteMode,
    pub candidate_files: usize,
    pub entries: Vec<MappingEntry>,
    pub summary: MappingSummary,
    pub written: bool,
}

fn union(mut first: Vec<String>, second: &[String]) -> Vec<String> {
    for path in second {
        if !first.contains(path) {
            first.push(path.clone());
        }
    }
    first
}

/// Combine a prior entry's outcome with a freshly computed one for an update run.
pub fn merge_outcome(
    prior: &MatchOutcome,
    fresh: MatchOutcome,
    aggregate: bool,
    force: bool,
) -> MatchOutcome {
    use MatchOutcome::{Ambiguous, Resolved, Unmapped};

    match (prior, fresh) {
        (_, Unmapped) => prior.clone(),
        (_, fresh) if force => fresh,
        (Unmapped, fresh) => fresh,
        (Resolved(existing), Resolved(found)) => {
            if aggregate {
                Resolved(union(existing.clone(), &found))
            } else {
                prior.clone()
            }
        }
        (Resolved(existing), Ambiguous(found)) => Ambiguous(union(existing.clone(), &found)),
        (Ambiguous(_), Resolved(found)) => Resolved(found),
        (Ambiguous(existing), Ambiguous(found)) => Ambiguous(union(existing.clone(), &found)),
    }
}

fn fresh_entry(
    record: &IndexRecord,
    opts: &MatchOptions,
    transform: &KeyTransform,
    candidates: &CandidateIndex,
) -> MappingEntry {
    let raw = record.field(&opts.export_field).unwrap_or_default().trim();
    let Some(expected) = (!raw.is_empty()).then(|| transform.apply(raw)).flatten() else {
        return MappingEntry::blank(record.id.clone());
    };

    let key = if opts.lowercase {
        expected.to_lowercase()
    } else {
        expected.clone()
    };
    let outcome = match candidates.lookup(&key) {
        [] => MatchOutcome::Unmapped,
        [only] => MatchOutcome::Resolved(vec![only.clone()]),
        many => {
            debug!(
                id = %record.id,
                expected = %expected,
                candidates = many.len(),
                "ambiguous match"
            );
            MatchOutcome::Ambiguous(many.to_vec())
        }
    };
    MappingEntry {
        cdm_id: record.id.clone(),
        matching_value: expected,
        outcome,
    }
}

fn eligible_rows(store: &IndexStore, kind: MappingKind) -> Result<Vec<IndexRecord>> {
    store.scan(&kind.eligibility_sql(), &[])
}

fn persist(
    paths: &ProjectPaths,
    mapping: &MappingConfig,
    kind: MappingKind,
    mapping_path: &Path,
    entries: &[MappingEntry],
) -> Result<()> {
    write_mappings(mapping_path, &mapping.path_delimiter, entries)?;
    state::update(paths, |s| {
        s.mappings_updated_date
            .insert(kind.name().to_string(), Utc::now());
    })?;
    Ok(())
}

pub fn run_mapping(
    paths: &ProjectPaths,
    mapping: &MappingConfig,
    opts: &MatchOptions,
) -> Result<MappingOutcome> {
    let store = IndexStore::open(&paths.index_db)?;
    if !opts.base_path.is_dir() {
        return Err(MigrationError::InvalidState(format!(
            "base path {} is not a directory",
            opts.base_path.display()
        ))
        .into());
    }
    if !store.has_column(&opts.export_field) {
        return Err(MigrationError::InvalidInput(format!(
            "`{}` is not an index field",
            opts.export_field
        ))
        .into());
    }
    let transform = KeyTransform::new(&opts.field_pattern, &opts.filename_template)?;
    let glob = PathGlob::new(&opts.path_pattern)?;

    let kind = opts.kind;
    let mapping_path = paths.mapping_file(kind.file_name());
    let mode = decide_write_mode(mapping_path.exists(), opts.update, opts.force)?;
    let prior: HashMap<String, MappingEntry> = match mode {
        WriteMode::Fresh => HashMap::new(),
        WriteMode::Merge | WriteMode::MergeForce => {
            load_mappings(&mapping_path, &mapping.path_delimiter)?
                .into_iter()
                .map(|e| (e.cdm_id.clone(), e))
                .collect()
        }
    };

    let base = fs::canonicalize(&opts.base_path)
        .with_context(|| format!("failed to resolve {}", opts.base_path.display()))?;
    let candidates = CandidateIndex::build(&base, &glob, kind.extensions(), opts.lowercase)?;
    debug!(base = %base.display(), files = candidates.files(), "candidate files indexed");

    let rows = eligible_rows(&store, kind)?;
    let entries: Vec<MappingEntry> = rows
        .iter()
        .map(|record| {
            let fresh = fresh_entry(record, opts, &transform, &candidates);
            let Some(before) = prior.get(&record.id) else {
                return fresh;
            };
            if fresh.outcome == MatchOutcome::Unmapped {
                return before.clone();
            }
            let outcome = merge_outcome(
                &before.outcome,
                fresh.outcome,
                kind.aggregate(),
                mode == WriteMode::MergeForce,
            );
            MappingEntry {
                cdm_id: fresh.cdm_id,
                matching_value: fresh.matching_value,
                outcome,
            }
        })
        .collect();

    let summary = summarize(&entries);
    if !opts.dry_run {
        persist(paths, mapping, kind, &mapping_path, &entries)?;
    }
    info!(
        kind = kind.name(),
        mode = mode.label(),
        resolved = summary.resolved,
        ambiguous = summary.ambiguous,
        unmapped = summary.unmapped,
        dry_run = opts.dry_run,
        "mapping computed"
    );

    Ok(MappingOutcome {
        kind,
        mapping_path,
        mode,
        candidate_files: candidates.files(),
        entries,
        summary,
        written: !opts.dry_run,
    })
}

/// Write one empty row per eligible record, for mappings authored by hand.
pub fn populate_blank(
    paths: &ProjectPaths,
    mapping: &MappingConfig,
    kind: MappingKind,
    force: bool,
    dry_run: bool,
) -> Result<MappingOutcome> {
    let store = IndexStore::open(&paths.index_db)?;
    let mapping_path = paths.mapping_file(kind.file_name());
    let mode = decide_write_mode(mapping_path.exists(), false, force)?;

    let entries: Vec<MappingEntry> = eligible_rows(&store, kind)?
        .into_iter()
        .map(|record| MappingEntry::blank(record.id))
        .collect();
    if !dry_run {
        persist(paths, mapping, kind, &mapping_path, &entries)?;
    }
    info!(kind = kind.name(), rows = entries.len(), dry_run, "blank mapping populated");

    Ok(MappingOutcome {
        kind,
        mapping_path,
        mode,
        candidate_files: 0,
        summary: summarize(&entries),
        entries,
        written: !dry_run,
    })
}
