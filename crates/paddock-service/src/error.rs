//! Error types for paddock-service.

use std::path::PathBuf;

use crate::config::ConfigError;

/// Errors from service commands.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] paddock_core::Error),

    #[error(transparent)]
    Store(#[from] paddock_store::Error),

    #[error("Failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result type alias using paddock-service's Error type.
pub type Result<T> = std::result::Result<T, Error>;
