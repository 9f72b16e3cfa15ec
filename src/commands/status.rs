use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::commands::CommandReport;
use crate::migrate::config::load_config;
use crate::migrate::index_store::{EntryType, IndexStore};
use crate::migrate::mapping::{load_mappings, summarize};
use crate::migrate::matcher::MappingKind;
use crate::migrate::paths::ProjectPaths;
use crate::migrate::state;

fn stamp(value: Option<&DateTime<Utc>>) -> String {
    value.map_or_else(|| "never".to_string(), |d| d.to_rfc3339())
}

pub fn run(paths: &ProjectPaths) -> Result<CommandReport> {
    let mut report = CommandReport::new("status");
    let st = state::load(paths)?;
    let cfg = load_config(paths)?;

    report.detail(format!("project_dir={}", paths.project_dir.display()));
    report.detail(format!("indexed={}", stamp(st.indexed_date.as_ref())));
    report.detail(format!(
        "group_mapping_generated={}",
        stamp(st.group_mappings_generated_date.as_ref())
    ));
    report.detail(format!(
        "group_mapping_synced={}",
        stamp(st.group_mappings_synced_date.as_ref())
    ));
    if let Some(field) = &st.group_mapping_field {
        report.detail(format!("group_mapping_field={field}"));
    }

    if IndexStore::exists(&paths.index_db) {
        let store = IndexStore::open(&paths.index_db)?;
        let counts = store.count_by_entry_type()?;
        report.detail(format!("index_path={}", store.path().display()));
        report.detail(format!("records={}", store.count()?));
        for entry_type in [
            EntryType::Regular,
            EntryType::CompoundObject,
            EntryType::CompoundChild,
            EntryType::GroupedWork,
        ] {
            let n = counts.get(&entry_type).copied().unwrap_or(0);
            report.detail(format!("records.{}={n}", entry_type.label()));
        }
        let dangling = store.dangling_parent_count()?;
        if dangling > 0 {
            report.issue(format!("{dangling} records point at a missing parent"));
        }
    } else {
        report.detail("index=missing");
    }

    for kind in MappingKind::ALL {
        let path = paths.mapping_file(kind.file_name());
        if !path.exists() {
            continue;
        }
        let summary = summarize(&load_mappings(&path, &cfg.mapping.path_delimiter)?);
        let updated = stamp(st.mappings_updated_date.get(kind.name()));
        report.detail(format!(
            "mapping.{}: resolved={} ambiguous={} unmapped={} updated={updated}",
            kind.name(),
            summary.resolved,
            summary.ambiguous,
            summary.unmapped
        ));
    }
    Ok(report)
}
