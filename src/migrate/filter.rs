use crate::error::MigrationError;
use crate::migrate::field_catalog::ID_FIELD;
use crate::migrate::index_store::{
    ENTRY_TYPE_COLUMN, EntryType, IndexStore, PARENT_ID_COLUMN, TABLE,
};
use crate::migrate::util::{placeholders, quote_ident};
use anyhow::Result;
use rusqlite::params_from_iter;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSelection {
    Include(Vec<String>),
    Exclude(Vec<String>),
    IncludeRange { start: String, end: String },
    ExcludeRange { start: String, end: String },
}

/// Raw filter options as a caller collects them; at most one kind may be set.
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    pub field: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub include_range_start: Option<String>,
    pub include_range_end: Option<String>,
    pub exclude_range_start: Option<String>,
    pub exclude_range_end: Option<String>,
}

fn range(
    start: &Option<String>,
    end: &Option<String>,
    label: &str,
) -> Result<Option<(String, String)>> {
    match (start, end) {
        (None, None) => Ok(None),
        (Some(s), Some(e)) => {
            if s > e {
                return Err(MigrationError::InvalidInput(format!(
                    "{label} range start `{s}` is after end `{e}`"
                ))
                .into());
            }
            Ok(Some((s.clone(), e.clone())))
        }
        _ => Err(MigrationError::InvalidInput(format!(
            "{label} range needs both a start and an end"
        ))
        .into()),
    }
}

impl FilterSelection {
    pub fn from_options(opts: &FilterOptions) -> Result<Self> {
        let include_range = range(&opts.include_range_start, &opts.include_range_end, "include")?;
        let exclude_range = range(&opts.exclude_range_start, &opts.exclude_range_end, "exclude")?;

        let mut chosen = Vec::new();
        if !opts.include.is_empty() {
            chosen.push(Self::Include(opts.include.clone()));
        }
        if !opts.exclude.is_empty() {
            chosen.push(Self::Exclude(opts.exclude.clone()));
        }
        if let Some((start, end)) = include_range {
            chosen.push(Self::IncludeRange { start, end });
        }
        if let Some((start, end)) = exclude_range {
            chosen.push(Self::ExcludeRange { start, end });
        }

        match chosen.len() {
            0 => Err(MigrationError::InvalidInput(
                "a filter needs one of include, exclude, include range, or exclude range".into(),
            )
            .into()),
            1 => Ok(chosen.remove(0)),
            _ => Err(MigrationError::InvalidInput(
                "include, exclude, include range, and exclude range are mutually exclusive".into(),
            )
            .into()),
        }
    }

    /// SQL condition over `col` (already quoted), with its parameters.
    fn condition(&self, col: &str) -> (String, Vec<String>) {
        match self {
            Self::Include(values) => (
                format!("{col} IN ({})", placeholders(values.len())),
                values.clone(),
            ),
            Self::Exclude(values) => (
                format!("{col} NOT IN ({})", placeholders(values.len())),
                values.clone(),
            ),
            Self::IncludeRange { start, end } => (
                format!("({col} >= ? AND {col} <= ?)"),
                vec![start.clone(), end.clone()],
            ),
            Self::ExcludeRange { start, end } => (
                format!("NOT ({col} >= ? AND {col} <= ?)"),
                vec![start.clone(), end.clone()],
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterRemainder {
    pub total: usize,
    pub remainder: usize,
}

impl FilterRemainder {
    /// A filter that keeps nothing or removes nothing.
    pub fn is_degenerate(&self) -> bool {
        self.remainder == 0 || self.remainder == self.total
    }
}

/// `WITH` clause defining `retained(id)`. Record rows are selected on their own
/// value, and a compound child also needs its compound parent selected. Grouped
/// works carry no values of their own and survive while at least two members do.
fn retained_cte(field: &str, selection: &FilterSelection) -> (String, Vec<String>) {
    let column = quote_ident(field);
    let (cond, mut params) = selection.condition(&format!("r.{column}"));
    let (parent_cond, parent_params) = selection.condition(&format!("p.{column}"));
    params.extend(parent_params);
    let id = quote_ident(ID_FIELD);
    let parent = quote_ident(PARENT_ID_COLUMN);
    let entry = quote_ident(ENTRY_TYPE_COLUMN);
    let grouped = EntryType::GroupedWork.label();
    let sql = format!(
        "WITH kept AS (SELECT r.{id} AS id, r.{parent} AS parent FROM {TABLE} r \
         WHERE r.{entry} IS NOT '{grouped}' AND ({cond}) AND (r.{parent} IS NULL OR EXISTS \
         (SELECT 1 FROM {TABLE} p WHERE p.{id} = r.{parent} \
         AND (p.{entry} = '{grouped}' OR ({parent_cond}))))), \
         retained AS (SELECT id FROM kept UNION ALL SELECT g.{id} FROM {TABLE} g \
         WHERE g.{entry} = '{grouped}' \
         AND (SELECT COUNT(*) FROM kept k WHERE k.parent = g.{id}) >= 2)"
    );
    (sql, params)
}

fn check_field(store: &IndexStore, field: &str) -> Result<()> {
    if store.has_column(field) {
        return Ok(());
    }
    Err(MigrationError::InvalidInput(format!("`{field}` is not an index field")).into())
}

pub fn calculate_remainder(
    store: &IndexStore,
    field: &str,
    selection: &FilterSelection,
) -> Result<FilterRemainder> {
    check_field(store, field)?;
    let total = store.count()?;
    let (retained, params) = retained_cte(field, selection);
    let remainder: i64 = store.conn().query_row(
        &format!("{retained} SELECT COUNT(*) FROM retained"),
        params_from_iter(params.iter()),
        |row| row.get(0),
    )?;
    Ok(FilterRemainder {
        total,
        remainder: remainder as usize,
    })
}

/// Delete every row the selection does not retain. Refuses selections that would
/// keep nothing or change nothing, leaving the store as it was.
pub fn filter_index(
    store: &mut IndexStore,
    field: &str,
    selection: &FilterSelection,
) -> Result<FilterRemainder> {
    let counts = calculate_remainder(store, field, selection)?;
    if counts.remainder == 0 {
        return Err(MigrationError::InvalidInput(format!(
            "filter on `{field}` would remove all {} records",
            counts.total
        ))
        .into());
    }
    if counts.remainder == counts.total {
        return Err(MigrationError::InvalidInput(format!(
            "filter on `{field}` would not remove any records"
        ))
        .into());
    }

    let (retained, params) = retained_cte(field, selection);
    let id = quote_ident(ID_FIELD);
    let parent = quote_ident(PARENT_ID_COLUMN);
    let tx = store.conn_mut().transaction()?;
    let removed = tx.execute(
        &format!("{retained} DELETE FROM {TABLE} WHERE {id} NOT IN (SELECT id FROM retained)"),
        params_from_iter(params.iter()),
    )?;
    // Members of a dropped grouped work become standalone records again.
    let ungrouped = tx.execute(
        &format!(
            "UPDATE {TABLE} SET {parent} = NULL WHERE {parent} IS NOT NULL \
             AND {parent} NOT IN (SELECT {id} FROM {TABLE})"
        ),
        [],
    )?;
    tx.commit()?;
    info!(
        field,
        removed,
        ungrouped,
        remaining = counts.remainder,
        "index filtered"
    );
    Ok(counts)
}
