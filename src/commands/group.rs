use anyhow::Result;

use crate::commands::CommandReport;
use crate::migrate::group;
use crate::migrate::paths::ProjectPaths;

#[derive(Debug, Clone)]
pub struct GroupGenerateOptions {
    pub field: String,
    pub force: bool,
}

pub fn run_generate(paths: &ProjectPaths, opts: &GroupGenerateOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("group-generate");
    report.detail(format!("field={}", opts.field));

    let outcome = group::generate(paths, &opts.field, opts.force)?;
    report.detail(format!("mapping_path={}", outcome.mapping_path.display()));
    report.detail(format!("records={}", outcome.records));
    report.detail(format!("records_with_key={}", outcome.with_key));
    report.detail(format!("distinct_keys={}", outcome.distinct_keys));
    Ok(report)
}

pub fn run_sync(paths: &ProjectPaths) -> Result<CommandReport> {
    let mut report = CommandReport::new("group-sync");
    report.detail(format!("mapping_path={}", paths.group_mapping.display()));

    let outcome = group::sync(paths)?;
    report.detail(format!("groups_created={}", outcome.groups_created));
    report.detail(format!("members_grouped={}", outcome.members_grouped));
    report.detail(format!("singletons_skipped={}", outcome.singletons_skipped));
    report.detail(format!("previous_groups_removed={}", outcome.synthetic_removed));
    report.detail(format!("previous_groups_kept={}", outcome.synthetic_kept));
    if outcome.missing_ids > 0 {
        report.detail(format!(
            "missing_ids={} (mapped records no longer in the index)",
            outcome.missing_ids
        ));
    }
    Ok(report)
}
