//! Catalog of legacy fields and the export aliases they are indexed under.

use crate::error::MigrationError;
use crate::migrate::index_store::{ENTRY_TYPE_COLUMN, PARENT_ID_COLUMN};
use anyhow::Result;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeSet;
use std::path::Path;

pub const ID_FIELD: &str = "dmrecord";
pub const CREATED_FIELD: &str = "dmcreated";
pub const MODIFIED_FIELD: &str = "dmmodified";
pub const TITLE_NICK: &str = "title";
pub const FILE_NICK: &str = "find";

/// Columns present in every index no matter what the catalog lists.
pub const RESERVED_FIELDS: [&str; 3] = [ID_FIELD, CREATED_FIELD, MODIFIED_FIELD];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldInfo {
    pub nick: String,
    pub export_as: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "flag")]
    pub skip_export: bool,
    #[serde(default, deserialize_with = "flag")]
    pub cdm_required: bool,
}

fn flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "n" | "no" | "0" => Ok(false),
        "true" | "y" | "yes" | "1" => Ok(true),
        other => Err(serde::de::Error::custom(format!("invalid flag `{other}`"))),
    }
}

#[derive(Debug, Clone, Default)]
pub struct FieldCatalog {
    fields: Vec<FieldInfo>,
}

impl FieldCatalog {
    pub fn new(fields: Vec<FieldInfo>) -> Result<Self> {
        let catalog = Self { fields };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MigrationError::Load(format!(
                "field catalog {} does not exist",
                path.display()
            ))
            .into());
        }
        let mut reader = csv::Reader::from_path(path).map_err(|err| {
            MigrationError::Load(format!("failed to open {}: {err}", path.display()))
        })?;
        let mut fields = Vec::new();
        for row in reader.deserialize::<FieldInfo>() {
            let info = row.map_err(|err| {
                MigrationError::Load(format!("malformed field catalog {}: {err}", path.display()))
            })?;
            fields.push(info);
        }
        Self::new(fields)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for field in &self.fields {
            let alias = field.export_as.trim();
            if field.nick.trim().is_empty() || alias.is_empty() {
                return Err(MigrationError::Load(format!(
                    "field catalog entry `{}` needs both nick and export_as",
                    field.nick
                ))
                .into());
            }
            if alias == ENTRY_TYPE_COLUMN || alias == PARENT_ID_COLUMN {
                return Err(MigrationError::Load(format!(
                    "export alias `{alias}` collides with a migration column"
                ))
                .into());
            }
            if !seen.insert(alias.to_string()) {
                return Err(MigrationError::Load(format!(
                    "export alias `{alias}` is listed more than once"
                ))
                .into());
            }
        }
        Ok(())
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Export aliases that become index columns: reserved fields first, then the
    /// non-skipped catalog aliases in catalog order.
    pub fn export_fields(&self) -> Vec<String> {
        let mut out: Vec<String> = RESERVED_FIELDS.iter().map(|f| f.to_string()).collect();
        for field in &self.fields {
            if field.skip_export || out.iter().any(|f| f == &field.export_as) {
                continue;
            }
            out.push(field.export_as.clone());
        }
        out
    }

    /// Export alias a legacy nick is indexed under, or `None` when skipped or unknown.
    pub fn alias_for(&self, nick: &str) -> Option<&str> {
        if let Some(reserved) = RESERVED_FIELDS.iter().find(|f| **f == nick) {
            return Some(reserved);
        }
        self.fields
            .iter()
            .find(|f| f.nick == nick && !f.skip_export)
            .map(|f| f.export_as.as_str())
    }
}
