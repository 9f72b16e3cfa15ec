//! CSV persistence for reconciliation results.

use crate::error::MigrationError;
use crate::migrate::util::write_atomic;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Result of matching one record against the candidate files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Unmapped,
    /// One path, or for aggregate mappings the paths accumulated across runs.
    Resolved(Vec<String>),
    /// More than one candidate; never resolved automatically.
    Ambiguous(Vec<String>),
}

impl MatchOutcome {
    pub fn source_paths(&self) -> &[String] {
        match self {
            Self::Resolved(paths) => paths,
            _ => &[],
        }
    }

    pub fn potential_matches(&self) -> &[String] {
        match self {
            Self::Ambiguous(paths) => paths,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub cdm_id: String,
    pub matching_value: String,
    pub outcome: MatchOutcome,
}

impl MappingEntry {
    pub fn blank(cdm_id: impl Into<String>) -> Self {
        Self {
            cdm_id: cdm_id.into(),
            matching_value: String::new(),
            outcome: MatchOutcome::Unmapped,
        }
    }
}

const MAPPING_HEADER: [&str; 4] = ["id", "matching_value", "source_file", "potential_matches"];

#[derive(Debug, Serialize, Deserialize)]
struct MappingRow {
    id: String,
    #[serde(default)]
    matching_value: String,
    #[serde(default)]
    source_file: String,
    #[serde(default)]
    potential_matches: String,
}

fn split_paths(raw: &str, delimiter: &str) -> Vec<String> {
    raw.split(delimiter)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

impl MappingRow {
    fn into_entry(self, delimiter: &str) -> MappingEntry {
        let sources = split_paths(&self.source_file, delimiter);
        let potentials = split_paths(&self.potential_matches, delimiter);
        // A hand-filled source column settles the row even if candidates were left behind.
        let outcome = if !sources.is_empty() {
            MatchOutcome::Resolved(sources)
        } else if !potentials.is_empty() {
            MatchOutcome::Ambiguous(potentials)
        } else {
            MatchOutcome::Unmapped
        };
        MappingEntry {
            cdm_id: self.id,
            matching_value: self.matching_value,
            outcome,
        }
    }

    fn from_entry(entry: &MappingEntry, delimiter: &str) -> Self {
        Self {
            id: entry.cdm_id.clone(),
            matching_value: entry.matching_value.clone(),
            source_file: entry.outcome.source_paths().join(delimiter),
            potential_matches: entry.outcome.potential_matches().join(delimiter),
        }
    }
}

pub fn load_mappings(path: &Path, delimiter: &str) -> Result<Vec<MappingEntry>> {
    if !path.exists() {
        return Err(MigrationError::InvalidState(format!(
            "mapping {} does not exist",
            path.display()
        ))
        .into());
    }
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut out = Vec::new();
    for row in reader.deserialize::<MappingRow>() {
        let row = row.map_err(|err| {
            MigrationError::Load(format!("malformed mapping {}: {err}", path.display()))
        })?;
        out.push(row.into_entry(delimiter));
    }
    Ok(out)
}

/// A path must come back unchanged from `split_paths`.
fn check_storable(entry: &MappingEntry, delimiter: &str) -> Result<()> {
    let paths = entry
        .outcome
        .source_paths()
        .iter()
        .chain(entry.outcome.potential_matches());
    for candidate in paths {
        if candidate.contains(delimiter) || candidate.trim() != candidate {
            return Err(MigrationError::InvalidInput(format!(
                "path `{candidate}` for record {} contains the mapping delimiter `{delimiter}` \
                 or surrounding whitespace",
                entry.cdm_id
            ))
            .into());
        }
    }
    Ok(())
}

pub fn write_mappings(path: &Path, delimiter: &str, entries: &[MappingEntry]) -> Result<()> {
    for entry in entries {
        check_storable(entry, delimiter)?;
    }
    write_atomic(path, |file| {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(MAPPING_HEADER)?;
        for entry in entries {
            writer.serialize(MappingRow::from_entry(entry, delimiter))?;
        }
        writer.flush()?;
        Ok(())
    })
}

/// How a mapping run treats an existing mapping file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Fresh,
    Merge,
    MergeForce,
}

impl WriteMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Merge => "update",
            Self::MergeForce => "update-force",
        }
    }
}

/// Decide how to treat the mapping file from whether it exists and the flags.
pub fn decide_write_mode(existing: bool, update: bool, force: bool) -> Result<WriteMode> {
    match (existing, update, force) {
        (false, _, _) => Ok(WriteMode::Fresh),
        (true, false, false) => Err(MigrationError::StateAlreadyExists(
            "mapping file already exists, use update to merge or force to overwrite".into(),
        )
        .into()),
        (true, true, false) => Ok(WriteMode::Merge),
        (true, true, true) => Ok(WriteMode::MergeForce),
        (true, false, true) => Ok(WriteMode::Fresh),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MappingSummary {
    pub resolved: usize,
    pub ambiguous: usize,
    pub unmapped: usize,
}

pub fn summarize(entries: &[MappingEntry]) -> MappingSummary {
    let mut out = MappingSummary::default();
    for entry in entries {
        match entry.outcome {
            MatchOutcome::Unmapped => out.unmapped += 1,
            MatchOutcome::Resolved(_) => out.resolved += 1,
            MatchOutcome::Ambiguous(_) => out.ambiguous += 1,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn write_mode_decision_table() {
        let table = [
            (false, false, false, Some(WriteMode::Fresh)),
            (false, true, false, Some(WriteMode::Fresh)),
            (false, false, true, Some(WriteMode::Fresh)),
            (false, true, true, Some(WriteMode::Fresh)),
            (true, false, false, None),
            (true, true, false, Some(WriteMode::Merge)),
            (true, true, true, Some(WriteMode::MergeForce)),
            (true, false, true, Some(WriteMode::Fresh)),
        ];
        for (existing, update, force, want) in table {
            let got = decide_write_mode(existing, update, force).ok();
            assert_eq!(
                got, want,
                "existing={existing} update={update} force={force}"
            );
        }
        let err = decide_write_mode(true, false, false).unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(MigrationError::StateAlreadyExists(_))
        ));
    }

    #[test]
    fn entries_persist_with_path_order_and_outcome_tags() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("aggregate_top_files.csv");
        let entries = vec![
            MappingEntry {
                cdm_id: "1".into(),
                matching_value: "a.pdf".into(),
                outcome: MatchOutcome::Resolved(vec!["/b/z.pdf".into(), "/b/a.pdf".into()]),
            },
            MappingEntry {
                cdm_id: "2".into(),
                matching_value: "dup.tif".into(),
                outcome: MatchOutcome::Ambiguous(vec!["/b/dup.tif".into(), "/b/n/dup.tif".into()]),
            },
            MappingEntry::blank("3"),
        ];
        write_mappings(&path, "|", &entries).expect("write");

        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.starts_with("id,matching_value,source_file,potential_matches\n"));
        assert!(raw.contains("1,a.pdf,/b/z.pdf|/b/a.pdf,\n"));

        let loaded = load_mappings(&path, "|").expect("load");
        assert_eq!(loaded, entries);
        assert_eq!(
            summarize(&loaded),
            MappingSummary {
                resolved: 1,
                ambiguous: 1,
                unmapped: 1
            }
        );
    }

    #[test]
    fn paths_that_would_not_reload_are_refused() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("source_files.csv");
        fs::write(&path, "original\n").expect("seed");

        for bad in ["/b/a|b.tif", "/b/trailing.tif "] {
            let entries = vec![MappingEntry {
                cdm_id: "1".into(),
                matching_value: "a.tif".into(),
                outcome: MatchOutcome::Ambiguous(vec!["/b/a.tif".into(), bad.into()]),
            }];
            let err = write_mappings(&path, "|", &entries).unwrap_err();
            assert!(matches!(
                crate::error::classify(&err),
                Some(MigrationError::InvalidInput(_))
            ));
        }
        assert_eq!(fs::read_to_string(&path).expect("read"), "original\n");
    }

    #[test]
    fn hand_resolved_row_wins_over_leftover_candidates() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("source_files.csv");
        fs::write(
            &path,
            "id,matching_value,source_file,potential_matches\n7,x.tif,/chosen/x.tif,/a/x.tif|/b/x.tif\n",
        )
        .expect("write");
        let loaded = load_mappings(&path, "|").expect("load");
        assert_eq!(
            loaded[0].outcome,
            MatchOutcome::Resolved(vec!["/chosen/x.tif".into()])
        );
    }

    #[test]
    fn missing_mapping_is_invalid_state() {
        let tmp = tempdir().expect("tempdir");
        let err = load_mappings(&tmp.path().join("none.csv"), "|").unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(MigrationError::InvalidState(_))
        ));
    }
}
