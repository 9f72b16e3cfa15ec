//! Grouped works: records clustered by a shared field value.
//!
//! Generation writes `id,group_key` rows for every regular record. Sync turns that
//! file into synthetic `grp:<field>:<value>` rows and re-parents the members. A sync
//! always removes every previously synthesized row and link first, so switching the
//! grouping field never leaves stale parents behind.

use crate::error::MigrationError;
use crate::migrate::field_catalog::{
    CREATED_FIELD, FieldCatalog, ID_FIELD, MODIFIED_FIELD, TITLE_NICK,
};
use crate::migrate::index_store::{
    ENTRY_TYPE_COLUMN, EntryType, IndexRecord, IndexStore, PARENT_ID_COLUMN, TABLE, insert_rows,
};
use crate::migrate::indexer::SYNTHETIC_ID_PREFIX;
use crate::migrate::paths::ProjectPaths;
use crate::migrate::state;
use crate::migrate::util::{quote_ident, write_atomic};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMappingRow {
    pub id: String,
    #[serde(default)]
    pub group_key: String,
}

#[derive(Debug, Clone, Default)]
pub struct GroupGenerateOutcome {
    pub mapping_path: PathBuf,
    pub records: usize,
    pub with_key: usize,
    pub distinct_keys: usize,
}

#[derive(Debug, Clone, Default)]
pub struct GroupSyncOutcome {
    pub groups_created: usize,
    pub members_grouped: usize,
    pub singletons_skipped: usize,
    pub missing_ids: usize,
    pub synthetic_removed: usize,
    pub synthetic_kept: usize,
}

pub fn synthetic_id(group_key: &str) -> String {
    format!("{SYNTHETIC_ID_PREFIX}{group_key}")
}

fn group_key(field: &str, value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        String::new()
    } else {
        format!("{field}:{value}")
    }
}

pub fn load_group_mapping(path: &Path) -> Result<Vec<GroupMappingRow>> {
    if !path.exists() {
        return Err(MigrationError::InvalidState(format!(
            "group mapping {} has not been generated",
            path.display()
        ))
        .into());
    }
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for row in reader.deserialize::<GroupMappingRow>() {
        let row = row.map_err(|err| {
            MigrationError::Load(format!("malformed group mapping {}: {err}", path.display()))
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// Write the group mapping for `field` over all regular records, in index order.
pub fn generate(paths: &ProjectPaths, field: &str, force: bool) -> Result<GroupGenerateOutcome> {
    let store = IndexStore::open(&paths.index_db)?;
    if field == ID_FIELD || !store.has_column(field) {
        return Err(MigrationError::InvalidInput(format!(
            "`{field}` is not a groupable index field"
        ))
        .into());
    }
    if paths.group_mapping.exists() && !force {
        return Err(MigrationError::StateAlreadyExists(format!(
            "group mapping {} already exists, use force to regenerate it",
            paths.group_mapping.display()
        ))
        .into());
    }

    let regular = store.scan(&format!("{} IS NULL", quote_ident(ENTRY_TYPE_COLUMN)), &[])?;
    let rows: Vec<GroupMappingRow> = regular
        .iter()
        .map(|r| GroupMappingRow {
            id: r.id.clone(),
            group_key: group_key(field, r.field(field).unwrap_or_default()),
        })
        .collect();

    write_atomic(&paths.group_mapping, |file| {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(["id", "group_key"])?;
        for row in &rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    })?;

    state::update(paths, |s| {
        s.group_mappings_generated_date = Some(Utc::now());
        s.group_mapping_field = Some(field.to_string());
    })?;

    let keys: BTreeSet<&str> = rows
        .iter()
        .map(|r| r.group_key.as_str())
        .filter(|k| !k.is_empty())
        .collect();
    let outcome = GroupGenerateOutcome {
        mapping_path: paths.group_mapping.clone(),
        records: rows.len(),
        with_key: rows.iter().filter(|r| !r.group_key.is_empty()).count(),
        distinct_keys: keys.len(),
    };
    info!(
        field,
        records = outcome.records,
        keys = outcome.distinct_keys,
        "group mapping generated"
    );
    Ok(outcome)
}

/// Build the synthetic row for a group from its representative member.
fn grouped_work_row(
    key: &str,
    representative: &IndexRecord,
    store: &IndexStore,
    title_column: Option<&str>,
) -> IndexRecord {
    let mut row = IndexRecord::new(synthetic_id(key), EntryType::GroupedWork);
    for column in title_column.into_iter().chain([CREATED_FIELD, MODIFIED_FIELD]) {
        if store.has_column(column) {
            row.set_field(column, representative.field(column).unwrap_or_default());
        }
    }
    if let Some((field, value)) = key.split_once(':')
        && store.has_column(field)
    {
        row.set_field(field, value);
    }
    row
}

pub fn sync(paths: &ProjectPaths) -> Result<GroupSyncOutcome> {
    let mut store = IndexStore::open(&paths.index_db)?;
    let mapping = load_group_mapping(&paths.group_mapping)?;
    let catalog = FieldCatalog::load(&paths.field_catalog)?;
    let title_column = catalog.alias_for(TITLE_NICK);

    let records = store.all_records()?;
    let positions: HashMap<&str, usize> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id.as_str(), i))
        .collect();

    let mut out = GroupSyncOutcome::default();
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    let mut assigned: HashMap<&str, &str> = HashMap::new();
    for row in &mapping {
        let key = row.group_key.trim();
        if key.is_empty() {
            continue;
        }
        if !key.contains(':') {
            return Err(MigrationError::InvalidInput(format!(
                "group key `{key}` for record {} is not in field:value form",
                row.id
            ))
            .into());
        }
        if let Some(prior) = assigned.insert(row.id.as_str(), key)
            && prior != key
        {
            return Err(MigrationError::InvalidInput(format!(
                "record {} is listed under both `{prior}` and `{key}`",
                row.id
            ))
            .into());
        }
        let Some(&pos) = positions.get(row.id.as_str()) else {
            debug!(id = %row.id, "group mapping names a record not in the index");
            out.missing_ids += 1;
            continue;
        };
        let record = &records[pos];
        if record.entry_type != EntryType::Regular {
            return Err(MigrationError::InvalidInput(format!(
                "record {} is a {} row and cannot join a grouped work",
                record.id,
                record.entry_type.label()
            ))
            .into());
        }
        groups.entry(key).or_default().push(pos);
    }

    let mut synthetic = Vec::new();
    let mut links: Vec<(String, String)> = Vec::new();
    for (key, mut members) in groups {
        members.sort_unstable();
        members.dedup();
        if members.len() < 2 {
            out.singletons_skipped += 1;
            continue;
        }
        let work = grouped_work_row(key, &records[members[0]], &store, title_column);
        for pos in &members {
            links.push((records[*pos].id.clone(), work.id.clone()));
        }
        out.members_grouped += members.len();
        synthetic.push(work);
    }
    out.groups_created = synthetic.len();

    let previous: BTreeSet<String> = records
        .iter()
        .filter(|r| r.entry_type == EntryType::GroupedWork)
        .map(|r| r.id.clone())
        .collect();
    let next: BTreeSet<String> = synthetic.iter().map(|r| r.id.clone()).collect();
    out.synthetic_removed = previous.difference(&next).count();
    out.synthetic_kept = previous.intersection(&next).count();

    let columns = store.field_columns().to_vec();
    let entry = quote_ident(ENTRY_TYPE_COLUMN);
    let parent = quote_ident(PARENT_ID_COLUMN);
    let id = quote_ident(ID_FIELD);
    let grouped = EntryType::GroupedWork.as_db().unwrap_or_default();

    let tx = store.conn_mut().transaction()?;
    tx.execute(
        &format!(
            "UPDATE {TABLE} SET {parent} = NULL WHERE {parent} IN \
             (SELECT {id} FROM {TABLE} WHERE {entry} = ?1)"
        ),
        [grouped],
    )?;
    tx.execute(&format!("DELETE FROM {TABLE} WHERE {entry} = ?1"), [grouped])?;
    insert_rows(&tx, &columns, &synthetic)?;
    {
        let mut stmt = tx.prepare(&format!("UPDATE {TABLE} SET {parent} = ?1 WHERE {id} = ?2"))?;
        for (member, work) in &links {
            stmt.execute([work, member])?;
        }
    }
    tx.commit()?;

    state::update(paths, |s| s.group_mappings_synced_date = Some(Utc::now()))?;
    info!(
        groups = out.groups_created,
        members = out.members_grouped,
        removed = out.synthetic_removed,
        "group mapping synced"
    );
    Ok(out)
}
