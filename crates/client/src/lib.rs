//! Client side of Questboard: a local cache, the remote fallback chain, and
//! the player and admin operations built on top of them.

mod cache;
pub mod config;
mod error;
pub mod remote;
mod sync;
pub mod view;

pub use cache::{LocalCache, SessionPlayer, QUEST_CACHE_TTL_MS};
pub use config::{ClientConfig, JsonBinConfig, PrimaryConfig};
pub use error::{ClientError, ConfigError};
pub use sync::{default_quests, SyncClient, PLACEHOLDER_QUEST_ID};
