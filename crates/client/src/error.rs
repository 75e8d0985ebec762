use questboard_protocol::{DraftError, PlayerNameError};
use std::path::PathBuf;

/// Local usage errors. Remote failures never show up here; they degrade to
/// cached or default data instead.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    InvalidName(#[from] PlayerNameError),

    #[error("no player is logged in")]
    NotLoggedIn,

    #[error("admin password required")]
    AdminLocked,

    #[error("unknown quest: {0}")]
    UnknownQuest(String),

    #[error(transparent)]
    InvalidDraft(#[from] DraftError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
