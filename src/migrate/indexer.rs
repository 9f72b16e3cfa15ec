use crate::error::MigrationError;
use crate::migrate::compound;
use crate::migrate::field_catalog::{FieldCatalog, ID_FIELD};
use crate::migrate::index_store::{EntryType, IndexRecord, IndexStore};
use crate::migrate::paths::ProjectPaths;
use crate::migrate::state;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const SYNTHETIC_ID_PREFIX: &str = "grp:";

#[derive(Debug, Clone, Deserialize)]
struct ExportedRecord {
    fields: BTreeMap<String, String>,
    #[serde(default)]
    compound: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct IndexOutcome {
    pub catalog_fields: usize,
    pub export_files: usize,
    pub records: usize,
    pub compound_objects: usize,
    pub compound_children: usize,
    pub index_path: PathBuf,
}

fn export_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(MigrationError::Load(format!(
            "export directory {} does not exist",
            dir.display()
        ))
        .into());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
            files.push(path);
        }
    }
    files.sort();
    if files.is_empty() {
        return Err(MigrationError::Load(format!(
            "no exported record files (*.jsonl) in {}",
            dir.display()
        ))
        .into());
    }
    Ok(files)
}

fn to_record(raw: &ExportedRecord, catalog: &FieldCatalog, columns: &[String]) -> IndexRecord {
    let mut mapped: BTreeMap<&str, &str> = BTreeMap::new();
    for (nick, value) in &raw.fields {
        if let Some(alias) = catalog.alias_for(nick) {
            mapped.insert(alias, value.as_str());
        }
    }
    let id = mapped.get(ID_FIELD).copied().unwrap_or_default().trim();
    let mut record = IndexRecord::new(id, EntryType::Regular);
    for column in columns.iter().skip(1) {
        let value = mapped.get(column.as_str()).copied().unwrap_or_default();
        record.set_field(column, value);
    }
    record
}

/// Parse every exported record and compound descriptor into index rows. Nothing
/// touches the store until the whole export has parsed.
pub fn read_exports(
    paths: &ProjectPaths,
    catalog: &FieldCatalog,
) -> Result<(usize, Vec<IndexRecord>)> {
    let files = export_files(&paths.exports_dir)?;
    let columns = catalog.export_fields();
    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    for file in &files {
        let raw = fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        for (line_no, line) in raw.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let exported: ExportedRecord = serde_json::from_str(trimmed).map_err(|err| {
                MigrationError::Load(format!(
                    "malformed record at {}:{}: {err}",
                    file.display(),
                    line_no + 1
                ))
            })?;
            let record = to_record(&exported, catalog, &columns);
            if record.id.is_empty() {
                return Err(MigrationError::Load(format!(
                    "record at {}:{} has no {ID_FIELD}",
                    file.display(),
                    line_no + 1
                ))
                .into());
            }

            let expanded = match exported.compound.as_deref().map(str::trim) {
                Some(name) if !name.is_empty() => {
                    let descriptor = compound::load_descriptor(&paths.cpds_dir, name)?;
                    compound::expand(record, &descriptor, catalog)?
                }
                _ => vec![record],
            };

            for row in expanded {
                if row.id.starts_with(SYNTHETIC_ID_PREFIX) {
                    return Err(MigrationError::Load(format!(
                        "record id `{}` uses the reserved `{SYNTHETIC_ID_PREFIX}` prefix",
                        row.id
                    ))
                    .into());
                }
                if !seen.insert(row.id.clone()) {
                    return Err(MigrationError::Load(format!(
                        "duplicate record id `{}` in {}",
                        row.id,
                        file.display()
                    ))
                    .into());
                }
                rows.push(row);
            }
        }
    }
    Ok((files.len(), rows))
}

/// Build the index from the project's exports. The new store replaces any prior one
/// only once it is fully loaded; on failure the prior store and project state stay.
pub fn index_all(paths: &ProjectPaths, force: bool) -> Result<IndexOutcome> {
    if IndexStore::exists(&paths.index_db) && !force {
        return Err(MigrationError::StateAlreadyExists(format!(
            "index {} already exists, use force to recreate it",
            paths.index_db.display()
        ))
        .into());
    }

    let catalog = FieldCatalog::load(&paths.field_catalog)?;
    let (export_files, rows) = read_exports(paths, &catalog)?;

    IndexStore::replace_database(&paths.index_db, &catalog.export_fields(), |store| {
        store.insert_all(&rows).map(|_| ())
    })?;

    state::update(paths, |s| s.indexed_date = Some(Utc::now()))?;

    let outcome = IndexOutcome {
        catalog_fields: catalog.fields().len(),
        export_files,
        records: rows.len(),
        compound_objects: rows
            .iter()
            .filter(|r| r.entry_type == EntryType::CompoundObject)
            .count(),
        compound_children: rows
            .iter()
            .filter(|r| r.entry_type == EntryType::CompoundChild)
            .count(),
        index_path: paths.index_db.clone(),
    };
    info!(
        records = outcome.records,
        compound_objects = outcome.compound_objects,
        compound_children = outcome.compound_children,
        "index load complete"
    );
    Ok(outcome)
}

/// Delete the index and clear the indexed timestamp.
pub fn remove_index(paths: &ProjectPaths) -> Result<bool> {
    let removed = IndexStore::remove_index(&paths.index_db)?;
    if removed {
        state::update(paths, |s| s.indexed_date = None)?;
    }
    Ok(removed)
}
