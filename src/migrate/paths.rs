use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub project_dir: PathBuf,
    pub state_file: PathBuf,
    pub config_file: PathBuf,
    pub field_catalog: PathBuf,
    pub exports_dir: PathBuf,
    pub cpds_dir: PathBuf,
    pub index_db: PathBuf,
    pub group_mapping: PathBuf,
}

impl ProjectPaths {
    pub fn new(project_dir: &Path) -> Self {
        let exports_dir = project_dir.join("exports");
        Self {
            project_dir: project_dir.to_path_buf(),
            state_file: project_dir.join(".project.json"),
            config_file: env_or_default_path(
                "CDM_MIGRATE_CONFIG_PATH",
                project_dir.join("migrate.toml"),
            ),
            field_catalog: project_dir.join("cdm_fields.csv"),
            cpds_dir: exports_dir.join("cpds"),
            exports_dir,
            index_db: project_dir.join("index.db"),
            group_mapping: project_dir.join("group_mappings.csv"),
        }
    }

    pub fn mapping_file(&self, file_name: &str) -> PathBuf {
        self.project_dir.join(file_name)
    }
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Resolve the project directory: explicit flag, then `CDM_MIGRATE_PROJECT`, then the cwd.
pub fn resolve_paths(project: Option<&Path>) -> Result<ProjectPaths> {
    let dir = match project {
        Some(dir) => expand_home(dir),
        None => {
            let cwd = env::current_dir().context("current directory could not be resolved")?;
            expand_home(&env_or_default_path("CDM_MIGRATE_PROJECT", cwd))
        }
    };
    Ok(ProjectPaths::new(&dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted_in_project_dir() {
        let paths = ProjectPaths::new(Path::new("/work/proj"));
        assert_eq!(paths.index_db, PathBuf::from("/work/proj/index.db"));
        assert_eq!(paths.cpds_dir, PathBuf::from("/work/proj/exports/cpds"));
        assert_eq!(
            paths.mapping_file("source_files.csv"),
            PathBuf::from("/work/proj/source_files.csv")
        );
    }

    #[test]
    fn tilde_expands_only_as_first_component() {
        let home = dirs::home_dir().expect("home");
        assert_eq!(expand_home(Path::new("~/scans")), home.join("scans"));
        assert_eq!(expand_home(Path::new("/a/~/b")), PathBuf::from("/a/~/b"));
    }

    #[test]
    fn explicit_project_wins() {
        let paths = resolve_paths(Some(Path::new("/explicit"))).expect("paths");
        assert_eq!(paths.project_dir, PathBuf::from("/explicit"));
    }
}
