use crate::error::MigrationError;
use crate::migrate::field_catalog::{
    CREATED_FIELD, FILE_NICK, FieldCatalog, MODIFIED_FIELD, TITLE_NICK,
};
use crate::migrate::index_store::{EntryType, IndexRecord};
use anyhow::Result;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Component, Path};

#[derive(Debug, Clone, Deserialize)]
pub struct CompoundDescriptor {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub pages: Vec<CompoundPage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompoundPage {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

pub fn load_descriptor(cpds_dir: &Path, name: &str) -> Result<CompoundDescriptor> {
    let relative = Path::new(name);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if name.trim().is_empty() || escapes {
        return Err(MigrationError::Load(format!(
            "compound descriptor reference `{name}` must be a file name inside {}",
            cpds_dir.display()
        ))
        .into());
    }

    let path = cpds_dir.join(relative);
    let raw = fs::read_to_string(&path).map_err(|err| {
        MigrationError::Load(format!(
            "failed to read compound descriptor {}: {err}",
            path.display()
        ))
    })?;
    let descriptor: CompoundDescriptor = serde_json::from_str(&raw).map_err(|err| {
        MigrationError::Load(format!(
            "malformed compound descriptor {}: {err}",
            path.display()
        ))
    })?;
    if descriptor.pages.is_empty() {
        return Err(MigrationError::Load(format!(
            "compound descriptor {} lists no pages",
            path.display()
        ))
        .into());
    }
    Ok(descriptor)
}

/// Turn a record and its descriptor into the compound object row followed by one
/// child row per page, in descriptor order.
pub fn expand(
    mut parent: IndexRecord,
    descriptor: &CompoundDescriptor,
    catalog: &FieldCatalog,
) -> Result<Vec<IndexRecord>> {
    parent.entry_type = EntryType::CompoundObject;
    parent.parent_id = None;

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(descriptor.pages.len() + 1);
    for (position, page) in descriptor.pages.iter().enumerate() {
        let id = page.id.trim();
        if id.is_empty() {
            return Err(MigrationError::Load(format!(
                "page {} of compound object {} has no id",
                position + 1,
                parent.id
            ))
            .into());
        }
        if id == parent.id || !seen.insert(id.to_string()) {
            return Err(MigrationError::Load(format!(
                "compound object {} repeats page id {id}",
                parent.id
            ))
            .into());
        }

        let mut child = IndexRecord::new(id, EntryType::CompoundChild);
        child.parent_id = Some(parent.id.clone());
        for (nick, value) in &page.fields {
            if let Some(alias) = catalog.alias_for(nick) {
                child.set_field(alias, value.clone());
            }
        }
        fill_if_empty(&mut child, catalog.alias_for(TITLE_NICK), &page.title);
        fill_if_empty(&mut child, catalog.alias_for(FILE_NICK), &page.file);

        let created = page.created.as_deref().unwrap_or(parent.created_date());
        let modified = page.modified.as_deref().unwrap_or(parent.modified_date());
        fill_if_empty(&mut child, Some(CREATED_FIELD), created);
        fill_if_empty(&mut child, Some(MODIFIED_FIELD), modified);
        out.push(child);
    }

    out.insert(0, parent);
    Ok(out)
}

fn fill_if_empty(record: &mut IndexRecord, alias: Option<&str>, value: &str) {
    let Some(alias) = alias else {
        return;
    };
    if value.is_empty() || record.field(alias).is_some_and(|v| !v.is_empty()) {
        return;
    }
    record.set_field(alias, value);
}
