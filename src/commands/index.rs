use anyhow::Result;

use crate::commands::CommandReport;
use crate::migrate::indexer;
use crate::migrate::paths::ProjectPaths;

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub force: bool,
}

pub fn run(paths: &ProjectPaths, opts: &IndexOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("index");
    report.detail(format!("exports_dir={}", paths.exports_dir.display()));

    let outcome = indexer::index_all(paths, opts.force)?;
    report.detail(format!("index_path={}", outcome.index_path.display()));
    report.detail(format!("catalog_fields={}", outcome.catalog_fields));
    report.detail(format!("export_files={}", outcome.export_files));
    report.detail(format!("records={}", outcome.records));
    report.detail(format!("compound_objects={}", outcome.compound_objects));
    report.detail(format!("compound_children={}", outcome.compound_children));
    if outcome.records == 0 {
        report.issue("no exported records found; the index is empty");
    }
    Ok(report)
}

pub fn run_remove(paths: &ProjectPaths) -> Result<CommandReport> {
    let mut report = CommandReport::new("index-remove");
    report.detail(format!("index_path={}", paths.index_db.display()));
    if indexer::remove_index(paths)? {
        report.detail("removed=true");
    } else {
        report.detail("removed=false (no index present)");
    }
    Ok(report)
}
