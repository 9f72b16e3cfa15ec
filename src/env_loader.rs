use std::env;
use std::path::{Path, PathBuf};

fn project_dotenv_path(project: Option<&Path>, env_project: Option<PathBuf>) -> Option<PathBuf> {
    let base = project.map(Path::to_path_buf).or(env_project)?;
    Some(base.join(".env"))
}

/// Load `.env` from the working directory, then from the project directory.
/// Variables already set are never overridden.
pub fn load_dotenv(project: Option<&Path>) {
    let _ = dotenvy::dotenv();

    let Some(path) = project_dotenv_path(
        project,
        env::var_os("CDM_MIGRATE_PROJECT").map(PathBuf::from),
    ) else {
        return;
    };
    if path.is_file() {
        let _ = dotenvy::from_path(&path);
    }
}
