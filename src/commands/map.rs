use anyhow::Result;
use std::path::PathBuf;

use crate::commands::CommandReport;
use crate::error::MigrationError;
use crate::migrate::config::load_config;
use crate::migrate::matcher::{self, MappingKind, MappingOutcome, MatchOptions};
use crate::migrate::paths::{ProjectPaths, expand_home};

/// Flags as given on the command line; unset values fall back to config.
#[derive(Debug, Clone)]
pub struct MapOptions {
    pub kind: MappingKind,
    pub base_path: Option<PathBuf>,
    pub export_field: Option<String>,
    pub field_pattern: Option<String>,
    pub filename_template: Option<String>,
    pub path_pattern: Option<String>,
    pub lowercase: bool,
    pub update: bool,
    pub force: bool,
    pub dry_run: bool,
    pub blank: bool,
}

fn report_outcome(report: &mut CommandReport, outcome: &MappingOutcome) {
    report.detail(format!("kind={}", outcome.kind.name()));
    report.detail(format!("mapping_path={}", outcome.mapping_path.display()));
    report.detail(format!("mode={}", outcome.mode.label()));
    report.detail(format!("rows={}", outcome.entries.len()));
    report.detail(format!("resolved={}", outcome.summary.resolved));
    report.detail(format!("ambiguous={}", outcome.summary.ambiguous));
    report.detail(format!("unmapped={}", outcome.summary.unmapped));
    if !outcome.written {
        report.detail("dry-run: mapping file left unchanged");
    }
}

pub fn run(paths: &ProjectPaths, opts: &MapOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("map");
    let cfg = load_config(paths)?;

    if opts.blank {
        if opts.update {
            return Err(MigrationError::InvalidInput(
                "a blank mapping cannot be combined with update".into(),
            )
            .into());
        }
        let outcome =
            matcher::populate_blank(paths, &cfg.mapping, opts.kind, opts.force, opts.dry_run)?;
        report_outcome(&mut report, &outcome);
        return Ok(report);
    }

    let Some(base_path) = opts.base_path.as_deref() else {
        return Err(
            MigrationError::InvalidInput("a base path is required to match files".into()).into(),
        );
    };
    let mut match_opts = MatchOptions::new(opts.kind, expand_home(base_path), &cfg.matching);
    if let Some(field) = &opts.export_field {
        match_opts.export_field = field.clone();
    }
    if let Some(pattern) = &opts.field_pattern {
        match_opts.field_pattern = pattern.clone();
    }
    if let Some(template) = &opts.filename_template {
        match_opts.filename_template = template.clone();
    }
    if let Some(pattern) = &opts.path_pattern {
        match_opts.path_pattern = pattern.clone();
    }
    match_opts.lowercase |= opts.lowercase;
    match_opts.update = opts.update;
    match_opts.force = opts.force;
    match_opts.dry_run = opts.dry_run;

    report.detail(format!("base_path={}", match_opts.base_path.display()));
    report.detail(format!("export_field={}", match_opts.export_field));
    report.detail(format!("field_pattern={}", match_opts.field_pattern));
    report.detail(format!("filename_template={}", match_opts.filename_template));
    report.detail(format!("path_pattern={}", match_opts.path_pattern));

    let outcome = matcher::run_mapping(paths, &cfg.mapping, &match_opts)?;
    report.detail(format!("candidate_files={}", outcome.candidate_files));
    report_outcome(&mut report, &outcome);
    Ok(report)
}
