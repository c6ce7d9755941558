use thiserror::Error;

use crate::types::Direction;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("schema error: {0}")]
    Schema(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("migration {app}/{unit} failed going {direction}: {source}")]
    UnitExecution {
        app: String,
        unit: String,
        direction: Direction,
        #[source]
        source: anyhow::Error,
    },

    #[error("unknown migration for app {app}: {id}")]
    UnknownMigration { app: String, id: String },

    #[error("migration declared twice for app {app}: {id}")]
    DuplicateMigration { app: String, id: String },

    #[error("application already registered: {0}")]
    DuplicateApplication(String),

    #[error("{operation} aborted for app {app}: {source}")]
    Aborted {
        operation: &'static str,
        app: String,
        #[source]
        source: Box<Error>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap a failure that happened inside an engine transaction.
    pub fn aborted(operation: &'static str, app: impl Into<String>, source: Error) -> Self {
        Error::Aborted {
            operation,
            app: app.into(),
            source: Box::new(source),
        }
    }

    /// The innermost error, skipping any `Aborted` wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Error::Aborted { source, .. } => source.root(),
            other => other,
        }
    }
}
