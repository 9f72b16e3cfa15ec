use anyhow::Result;

use crate::commands::CommandReport;
use crate::migrate::filter::{self, FilterOptions, FilterSelection};
use crate::migrate::index_store::IndexStore;
use crate::migrate::paths::ProjectPaths;

#[derive(Debug, Clone, Default)]
pub struct FilterCommandOptions {
    pub filter: FilterOptions,
    pub dry_run: bool,
}

fn describe(selection: &FilterSelection) -> String {
    match selection {
        FilterSelection::Include(values) => format!("include={}", values.join(",")),
        FilterSelection::Exclude(values) => format!("exclude={}", values.join(",")),
        FilterSelection::IncludeRange { start, end } => format!("include_range={start}..={end}"),
        FilterSelection::ExcludeRange { start, end } => format!("exclude_range={start}..={end}"),
    }
}

pub fn run(paths: &ProjectPaths, opts: &FilterCommandOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("filter");
    let selection = FilterSelection::from_options(&opts.filter)?;
    let field = opts.filter.field.as_str();
    report.detail(format!("field={field}"));
    report.detail(describe(&selection));

    let mut store = IndexStore::open(&paths.index_db)?;
    if opts.dry_run {
        let counts = filter::calculate_remainder(&store, field, &selection)?;
        report.detail(format!("total={}", counts.total));
        report.detail(format!("remainder={}", counts.remainder));
        report.detail("dry-run: index left unchanged");
        if counts.remainder == 0 {
            report.issue("selection would remove every record");
        } else if counts.is_degenerate() {
            report.issue("selection would not remove any record");
        }
        return Ok(report);
    }

    let counts = filter::filter_index(&mut store, field, &selection)?;
    report.detail(format!("total={}", counts.total));
    report.detail(format!("remainder={}", counts.remainder));
    report.detail(format!("removed={}", counts.total - counts.remainder));
    Ok(report)
}
