use crate::migrate::paths::ProjectPaths;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingDefaults {
    pub export_field: String,
    pub field_pattern: String,
    pub filename_template: String,
    pub path_pattern: String,
    pub lowercase: bool,
}

impl Default for MatchingDefaults {
    fn default() -> Self {
        Self {
            export_field: "file".to_string(),
            field_pattern: "(.+)".to_string(),
            filename_template: "$1".to_string(),
            path_pattern: "*".to_string(),
            lowercase: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Joins multiple paths in one mapping cell. Paths containing it, or with
    /// surrounding whitespace, are rejected when a mapping is written.
    pub path_delimiter: String,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            path_delimiter: "|".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MigrateConfig {
    pub matching: MatchingDefaults,
    pub mapping: MappingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialMigrateConfig {
    matching: Option<MatchingDefaults>,
    mapping: Option<MappingConfig>,
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => match v.trim() {
            "1" | "true" | "TRUE" | "yes" | "on" => true,
            "0" | "false" | "FALSE" | "no" | "off" => false,
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn validate(cfg: &MigrateConfig) -> Result<()> {
    if cfg.matching.export_field.trim().is_empty() {
        return Err(anyhow!("invalid matching export field: cannot be empty"));
    }
    if cfg.matching.filename_template.is_empty() {
        return Err(anyhow!("invalid filename template: cannot be empty"));
    }
    if cfg.matching.path_pattern.trim().is_empty() {
        return Err(anyhow!("invalid path pattern: cannot be empty"));
    }
    if cfg.mapping.path_delimiter.is_empty() {
        return Err(anyhow!("invalid mapping path delimiter: cannot be empty"));
    }
    Ok(())
}

fn merge_file_config(paths: &ProjectPaths, base: &mut MigrateConfig) -> Result<()> {
    let path = &paths.config_file;
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read migrate config {}", path.display()))?;
    let parsed: PartialMigrateConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse migrate config {}: {err}", path.display()))?;
    if let Some(matching) = parsed.matching {
        base.matching = matching;
    }
    if let Some(mapping) = parsed.mapping {
        base.mapping = mapping;
    }
    Ok(())
}

pub fn load_config(paths: &ProjectPaths) -> Result<MigrateConfig> {
    let mut cfg = MigrateConfig::default();
    merge_file_config(paths, &mut cfg)?;

    cfg.matching.export_field =
        env_or_string("CDM_MIGRATE_EXPORT_FIELD", &cfg.matching.export_field);
    cfg.matching.field_pattern =
        env_or_string("CDM_MIGRATE_FIELD_PATTERN", &cfg.matching.field_pattern);
    cfg.matching.filename_template = env_or_string(
        "CDM_MIGRATE_FILENAME_TEMPLATE",
        &cfg.matching.filename_template,
    );
    cfg.matching.path_pattern =
        env_or_string("CDM_MIGRATE_PATH_PATTERN", &cfg.matching.path_pattern);
    cfg.matching.lowercase = env_or_bool("CDM_MIGRATE_LOWERCASE", cfg.matching.lowercase);
    cfg.mapping.path_delimiter =
        env_or_string("CDM_MIGRATE_PATH_DELIMITER", &cfg.mapping.path_delimiter);

    validate(&cfg)?;
    Ok(cfg)
}
