use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("already exists: {0}")]
    StateAlreadyExists(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("failed to load: {0}")]
    Load(String),
}

impl MigrationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidState(_) => "INVALID_STATE",
            Self::StateAlreadyExists(_) => "ALREADY_EXISTS",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Load(_) => "LOAD_FAILED",
        }
    }
}

/// Find the typed migration error inside an `anyhow` chain, if there is one.
pub fn classify(err: &anyhow::Error) -> Option<&MigrationError> {
    err.chain().find_map(|cause| cause.downcast_ref::<MigrationError>())
}
