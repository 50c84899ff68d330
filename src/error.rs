use colpersist_core::PersistError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Mapping parse error: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Collection role '{0}' not found")]
    UnknownRole(String),

    #[error("Invalid mapping: {0}")]
    InvalidMapping(String),
}

impl MappingError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        MappingError::InvalidMapping(msg.into())
    }
}

impl serde::Serialize for MappingError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

pub type MappingResult<T> = Result<T, MappingError>;
