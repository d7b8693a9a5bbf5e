use std::path::PathBuf;

use thiserror::Error;

use skycast_core::types::UnknownFeedKind;
use skycast_core::{BuildError, FetchError};

/// Error surface for server startup, configuration and the runtime.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("station table: {0}")]
    Stations(#[from] FetchError),

    #[error("startup failed: {0}")]
    Setup(String),

    #[error("{task} task join failure: {message}")]
    Join { task: &'static str, message: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ServerError {
    ServerError::Io {
        path: path.into(),
        source,
    }
}

/// A control message that cannot be acted on. Logged; never sent to the
/// client and never fatal to the connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed control message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("control message must be a JSON object")]
    NotAnObject,

    #[error("control message is missing '{0}'")]
    MissingField(&'static str),

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error(transparent)]
    UnknownFeed(#[from] UnknownFeedKind),

    #[error("cannot build feed: {0}")]
    Build(#[from] BuildError),
}
