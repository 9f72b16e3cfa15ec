//! SQLite-backed index of exported records.
//!
//! One flat table holds every exported record plus the synthesized rows for
//! compound objects and grouped works. Hierarchy lives in the parent id column,
//! so filtering and reporting can query it without walking a graph.

use crate::error::MigrationError;
use crate::migrate::field_catalog::{CREATED_FIELD, ID_FIELD, MODIFIED_FIELD};
use crate::migrate::util::{placeholders, quote_ident};
use anyhow::{Context, Result};
use rusqlite::{Connection, ErrorCode, OptionalExtension, ToSql, params_from_iter};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const TABLE: &str = "records";
pub const ENTRY_TYPE_COLUMN: &str = "migration_entry_type";
pub const PARENT_ID_COLUMN: &str = "migration_parent_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryType {
    Regular,
    CompoundObject,
    CompoundChild,
    GroupedWork,
}

impl EntryType {
    /// Stored value; regular rows store NULL.
    pub fn as_db(self) -> Option<&'static str> {
        match self {
            Self::Regular => None,
            Self::CompoundObject => Some("compound_object"),
            Self::CompoundChild => Some("compound_child"),
            Self::GroupedWork => Some("grouped_work"),
        }
    }

    pub fn from_db(raw: Option<&str>) -> Result<Self> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Self::Regular),
            Some("compound_object") => Ok(Self::CompoundObject),
            Some("compound_child") => Ok(Self::CompoundChild),
            Some("grouped_work") => Ok(Self::GroupedWork),
            Some(other) => anyhow::bail!("unknown entry type `{other}` in index"),
        }
    }

    pub fn label(self) -> &'static str {
        self.as_db().unwrap_or("regular")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    pub id: String,
    /// Export alias to value, in column order. Unset values are empty strings.
    pub fields: Vec<(String, String)>,
    pub entry_type: EntryType,
    pub parent_id: Option<String>,
}

impl IndexRecord {
    pub fn new(id: impl Into<String>, entry_type: EntryType) -> Self {
        Self {
            id: id.into(),
            fields: Vec::new(),
            entry_type,
            parent_id: None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        if name == ID_FIELD {
            return Some(&self.id);
        }
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_field(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn created_date(&self) -> &str {
        self.field(CREATED_FIELD).unwrap_or_default()
    }

    pub fn modified_date(&self) -> &str {
        self.field(MODIFIED_FIELD).unwrap_or_default()
    }
}

pub struct IndexStore {
    conn: Connection,
    path: PathBuf,
    columns: Vec<String>,
}

impl IndexStore {
    pub fn exists(path: &Path) -> bool {
        path.is_file()
    }

    /// Create the store file and schema. `field_columns` must start with the id column.
    pub fn create_database(path: &Path, field_columns: &[String], force: bool) -> Result<Self> {
        if field_columns.first().map(String::as_str) != Some(ID_FIELD) {
            anyhow::bail!("index columns must start with `{ID_FIELD}`");
        }
        if Self::exists(path) {
            if !force {
                return Err(MigrationError::StateAlreadyExists(format!(
                    "index {} already exists, use force to recreate it",
                    path.display()
                ))
                .into());
            }
            Self::remove_index(path)?;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to create index {}", path.display()))?;
        let mut defs = Vec::with_capacity(field_columns.len() + 2);
        for (i, column) in field_columns.iter().enumerate() {
            if i == 0 {
                defs.push(format!("{} TEXT PRIMARY KEY NOT NULL", quote_ident(column)));
            } else {
                defs.push(format!("{} TEXT NOT NULL DEFAULT ''", quote_ident(column)));
            }
        }
        defs.push(format!("{} TEXT", quote_ident(ENTRY_TYPE_COLUMN)));
        defs.push(format!("{} TEXT", quote_ident(PARENT_ID_COLUMN)));

        conn.execute_batch(&format!(
            "CREATE TABLE {table} ({defs});\n\
             CREATE INDEX records_parent_idx ON {table} ({parent});\n\
             CREATE INDEX records_entry_type_idx ON {table} ({entry});",
            table = TABLE,
            defs = defs.join(", "),
            parent = quote_ident(PARENT_ID_COLUMN),
            entry = quote_ident(ENTRY_TYPE_COLUMN),
        ))
        .with_context(|| format!("failed to create schema in {}", path.display()))?;
        debug!(path = %path.display(), columns = field_columns.len(), "index schema created");

        Ok(Self {
            conn,
            path: path.to_path_buf(),
            columns: field_columns.to_vec(),
        })
    }

    pub fn open(path: &Path) -> Result<Self> {
        if !Self::exists(path) {
            return Err(MigrationError::InvalidState(format!(
                "index {} does not exist, run the index command first",
                path.display()
            ))
            .into());
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open index {}", path.display()))?;
        let columns = read_field_columns(&conn)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            columns,
        })
    }

    /// Delete the store file. Returns false when there was nothing to delete.
    pub fn remove_index(path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))?;
        info!(path = %path.display(), "index removed");
        Ok(true)
    }

    /// Build a new store in a sibling staging directory, fill it, then rename it over
    /// `target`. Until the rename, any store already at `target` is left as it was.
    pub fn replace_database<F>(target: &Path, field_columns: &[String], fill: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let dir = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let staging = tempfile::Builder::new()
            .prefix(".index-")
            .tempdir_in(dir)
            .with_context(|| format!("failed to create staging directory in {}", dir.display()))?;
        let staged = staging.path().join("index.db");

        let mut store = Self::create_database(&staged, field_columns, false)?;
        fill(&mut store)?;
        drop(store);
        fs::rename(&staged, target)
            .with_context(|| format!("failed to replace {}", target.display()))?;
        debug!(path = %target.display(), "index replaced");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Export-alias columns, id first.
    pub fn field_columns(&self) -> &[String] {
        &self.columns
    }

    /// Every column: export aliases plus the migration columns.
    pub fn columns(&self) -> Vec<String> {
        let mut out = self.columns.clone();
        out.push(ENTRY_TYPE_COLUMN.to_string());
        out.push(PARENT_ID_COLUMN.to_string());
        out
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn insert_all(&mut self, records: &[IndexRecord]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        insert_rows(&tx, &self.columns, records)?;
        tx.commit()?;
        Ok(records.len())
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {TABLE}"), [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn count_by_entry_type(&self) -> Result<BTreeMap<EntryType, usize>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {col}, COUNT(*) FROM {TABLE} GROUP BY {col}",
            col = quote_ident(ENTRY_TYPE_COLUMN)
        ))?;
        let mut rows = stmt.query([])?;
        let mut out = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let raw: Option<String> = row.get(0)?;
            let n: i64 = row.get(1)?;
            *out.entry(EntryType::from_db(raw.as_deref())?).or_insert(0) += n as usize;
        }
        Ok(out)
    }

    pub fn get(&self, id: &str) -> Result<Option<IndexRecord>> {
        let sql = format!(
            "SELECT {} FROM {TABLE} WHERE {} = ?",
            self.select_list(),
            quote_ident(ID_FIELD)
        );
        let raw = self
            .conn
            .query_row(&sql, [id], |row| self.read_raw(row))
            .optional()?;
        raw.map(|r| r.into_record(&self.columns)).transpose()
    }

    /// Read-only scan of rows matching `where_sql`, in insertion order.
    pub fn scan(&self, where_sql: &str, params: &[&dyn ToSql]) -> Result<Vec<IndexRecord>> {
        let clause = if where_sql.trim().is_empty() {
            String::new()
        } else {
            format!(" WHERE {where_sql}")
        };
        let sql = format!(
            "SELECT {} FROM {TABLE}{clause} ORDER BY rowid",
            self.select_list()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params, |row| self.read_raw(row))?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(raw?.into_record(&self.columns)?);
        }
        Ok(out)
    }

    pub fn all_records(&self) -> Result<Vec<IndexRecord>> {
        self.scan("", &[])
    }

    /// Rows whose parent id names a row that does not exist.
    pub fn dangling_parent_count(&self) -> Result<usize> {
        let n: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {TABLE} WHERE {parent} IS NOT NULL \
                 AND {parent} NOT IN (SELECT {id} FROM {TABLE})",
                parent = quote_ident(PARENT_ID_COLUMN),
                id = quote_ident(ID_FIELD),
            ),
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    fn select_list(&self) -> String {
        self.columns()
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn read_raw(&self, row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
        let mut values = Vec::with_capacity(self.columns.len());
        for i in 0..self.columns.len() {
            let value: Option<String> = row.get(i)?;
            values.push(value.unwrap_or_default());
        }
        let entry_type: Option<String> = row.get(self.columns.len())?;
        let parent_id: Option<String> = row.get(self.columns.len() + 1)?;
        Ok(RawRow {
            values,
            entry_type,
            parent_id,
        })
    }
}

struct RawRow {
    values: Vec<String>,
    entry_type: Option<String>,
    parent_id: Option<String>,
}

impl RawRow {
    fn into_record(self, columns: &[String]) -> Result<IndexRecord> {
        let mut values = self.values.into_iter();
        let id = values.next().unwrap_or_default();
        let fields = columns.iter().skip(1).cloned().zip(values).collect();
        Ok(IndexRecord {
            id,
            fields,
            entry_type: EntryType::from_db(self.entry_type.as_deref())?,
            parent_id: self.parent_id.filter(|p| !p.is_empty()),
        })
    }
}

fn read_field_columns(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({TABLE})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    if names.is_empty() {
        anyhow::bail!("index is missing the {TABLE} table");
    }
    Ok(names
        .into_iter()
        .filter(|n| n != ENTRY_TYPE_COLUMN && n != PARENT_ID_COLUMN)
        .collect())
}

/// Insert rows with the given field columns. Runs on whatever transaction the
/// caller holds; a duplicate id aborts with a load error.
pub fn insert_rows(conn: &Connection, columns: &[String], records: &[IndexRecord]) -> Result<()> {
    let mut all = columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>();
    all.push(quote_ident(ENTRY_TYPE_COLUMN));
    all.push(quote_ident(PARENT_ID_COLUMN));
    let sql = format!(
        "INSERT INTO {TABLE} ({}) VALUES ({})",
        all.join(", "),
        placeholders(all.len())
    );
    let mut stmt = conn.prepare(&sql)?;

    for record in records {
        let mut values: Vec<Option<String>> = Vec::with_capacity(all.len());
        values.push(Some(record.id.clone()));
        for column in columns.iter().skip(1) {
            values.push(Some(record.field(column).unwrap_or_default().to_string()));
        }
        values.push(record.entry_type.as_db().map(str::to_string));
        values.push(record.parent_id.clone());

        match stmt.execute(params_from_iter(values.iter())) {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                return Err(MigrationError::Load(format!(
                    "duplicate record id `{}` in index",
                    record.id
                ))
                .into());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to insert record {}", record.id));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn columns() -> Vec<String> {
        ["dmrecord", "dmcreated", "dmmodified", "title", "file"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn record(id: &str, title: &str) -> IndexRecord {
        let mut r = IndexRecord::new(id, EntryType::Regular);
        r.set_field("title", title);
        r.set_field("dmcreated", "2005-01-01");
        r
    }

    #[test]
    fn create_refuses_existing_store_without_force() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("index.db");
        let mut store = IndexStore::create_database(&path, &columns(), false).expect("create");
        store.insert_all(&[record("1", "one")]).expect("insert");
        drop(store);

        let err = IndexStore::create_database(&path, &columns(), false)
            .err()
            .expect("conflict");
        assert!(matches!(
            crate::error::classify(&err),
            Some(MigrationError::StateAlreadyExists(_))
        ));
        let store = IndexStore::open(&path).expect("open");
        assert_eq!(store.count().expect("count"), 1);
    }

    #[test]
    fn failed_replace_keeps_previous_store() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("index.db");
        let mut store = IndexStore::create_database(&path, &columns(), false).expect("create");
        store.insert_all(&[record("1", "one")]).expect("insert");
        drop(store);

        let err = IndexStore::replace_database(&path, &columns(), |store| {
            store
                .insert_all(&[record("2", "two"), record("2", "again")])
                .map(|_| ())
        });
        assert!(err.is_err());
        let store = IndexStore::open(&path).expect("open");
        assert_eq!(store.get("1").expect("get").expect("row").field("title"), Some("one"));
        assert_eq!(store.count().expect("count"), 1);
        drop(store);

        IndexStore::replace_database(&path, &columns(), |store| {
            store.insert_all(&[record("3", "three")]).map(|_| ())
        })
        .expect("replace");
        let store = IndexStore::open(&path).expect("open");
        assert!(store.get("1").expect("get").is_none());
        assert_eq!(store.count().expect("count"), 1);
        let leftovers = fs::read_dir(tmp.path()).expect("read dir").count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn force_recreate_drops_previous_rows() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("index.db");
        let mut store = IndexStore::create_database(&path, &columns(), false).expect("create");
        store
            .insert_all(&[record("1", "one"), record("2", "two")])
            .expect("insert");
        drop(store);

        let mut store = IndexStore::create_database(&path, &columns(), true).expect("recreate");
        store.insert_all(&[record("3", "three")]).expect("insert");
        let ids: Vec<String> = store
            .all_records()
            .expect("scan")
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["3"]);
    }

    #[test]
    fn duplicate_id_is_a_load_error_and_commits_nothing() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("index.db");
        let mut store = IndexStore::create_database(&path, &columns(), false).expect("create");
        let err = store
            .insert_all(&[record("1", "a"), record("2", "b"), record("1", "c")])
            .unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(MigrationError::Load(_))
        ));
        assert_eq!(store.count().expect("count"), 0);
    }

    #[test]
    fn open_missing_store_is_invalid_state() {
        let tmp = tempdir().expect("tempdir");
        let err = IndexStore::open(&tmp.path().join("index.db")).err().expect("missing");
        assert!(matches!(
            crate::error::classify(&err),
            Some(MigrationError::InvalidState(_))
        ));
    }

    #[test]
    fn rows_round_trip_with_hierarchy_and_defaults() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("index.db");
        let mut store = IndexStore::create_database(&path, &columns(), false).expect("create");
        let parent = IndexRecord::new("10", EntryType::CompoundObject);
        let mut child = record("11", "page 1");
        child.entry_type = EntryType::CompoundChild;
        child.parent_id = Some("10".into());
        store.insert_all(&[parent, child]).expect("insert");
        drop(store);

        let store = IndexStore::open(&path).expect("open");
        assert_eq!(store.field_columns(), columns().as_slice());
        assert_eq!(store.columns().len(), columns().len() + 2);

        let got = store.get("11").expect("get").expect("row");
        assert_eq!(got.entry_type, EntryType::CompoundChild);
        assert_eq!(got.parent_id.as_deref(), Some("10"));
        assert_eq!(got.field("title"), Some("page 1"));
        assert_eq!(got.field("file"), Some(""));
        assert_eq!(got.created_date(), "2005-01-01");

        let counts = store.count_by_entry_type().expect("counts");
        assert_eq!(counts.get(&EntryType::CompoundObject), Some(&1));
        assert_eq!(counts.get(&EntryType::CompoundChild), Some(&1));
        assert_eq!(store.dangling_parent_count().expect("dangling"), 0);
        assert!(store.get("missing").expect("get").is_none());
    }

    #[test]
    fn scan_preserves_insertion_order() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("index.db");
        let mut store = IndexStore::create_database(&path, &columns(), false).expect("create");
        store
            .insert_all(&[record("9", "a"), record("10", "b"), record("2", "c")])
            .expect("insert");
        let ids: Vec<String> = store
            .scan("\"title\" <> ?", rusqlite::params!["b"])
            .expect("scan")
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["9", "2"]);
    }
}
