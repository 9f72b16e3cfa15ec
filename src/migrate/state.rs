use crate::migrate::paths::ProjectPaths;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectState {
    pub schema_version: u32,
    pub indexed_date: Option<DateTime<Utc>>,
    pub group_mappings_generated_date: Option<DateTime<Utc>>,
    pub group_mappings_synced_date: Option<DateTime<Utc>>,
    pub group_mapping_field: Option<String>,
    pub mappings_updated_date: BTreeMap<String, DateTime<Utc>>,
}

impl Default for ProjectState {
    fn default() -> Self {
        Self {
            schema_version: 1,
            indexed_date: None,
            group_mappings_generated_date: None,
            group_mappings_synced_date: None,
            group_mapping_field: None,
            mappings_updated_date: BTreeMap::new(),
        }
    }
}

pub fn load(paths: &ProjectPaths) -> Result<ProjectState> {
    let file = &paths.state_file;
    if !file.exists() {
        return Ok(ProjectState::default());
    }

    let raw =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let parsed: ProjectState = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    Ok(parsed)
}

pub fn save(paths: &ProjectPaths, state: &ProjectState) -> Result<PathBuf> {
    let file = paths.state_file.clone();
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let data = serde_json::to_string_pretty(state)?;
    fs::write(&file, format!("{data}\n"))
        .with_context(|| format!("failed to write {}", file.display()))?;
    Ok(file)
}

/// Load, apply `change`, and save in one step.
pub fn update<F>(paths: &ProjectPaths, change: F) -> Result<ProjectState>
where
    F: FnOnce(&mut ProjectState),
{
    let mut state = load(paths)?;
    change(&mut state);
    save(paths, &state)?;
    Ok(state)
}
