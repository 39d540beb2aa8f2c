//! Error types for model_sync

use thiserror::Error;

/// Result type for model_sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for model_sync
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unsupported declaration: {0}")]
    UnsupportedDeclaration(String),

    #[error("Failed to execute `{action}`: {source}")]
    StatementExecution {
        action: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Schema analysis error: {0}")]
    SchemaAnalysisError(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Whether the synchronizer may skip the offending source or declaration
    /// and carry on with the rest of the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::ConfigError(_) | Error::UnsupportedDeclaration(_))
    }
}

/// Convert Serde JSON errors to model_sync errors
impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

/// Convert YAML errors to model_sync errors
impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

/// Convert TOML deserialization errors to model_sync errors
impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::ConfigError(error.to_string())
    }
}
