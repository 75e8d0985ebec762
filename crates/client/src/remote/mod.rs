//! Remote backends, consulted in priority order.
//!
//! Every backend implements [`RemoteStore`]. Failures never escape a backend:
//! they are logged and reported as `None`/`false` so the caller can move on to
//! the next one.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use questboard_protocol::{ProgressEntry, SnapshotPatch};
use reqwest::Url;

use crate::config::ClientConfig;

mod jsonbin;
mod primary;
mod static_file;

pub use jsonbin::{JsonBinStore, JSONBIN_BASE_URL};
pub use primary::PrimaryStore;
pub use static_file::StaticFileStore;

/// What a writable backend expects to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Quests, progress and players together, on every write.
    FullSnapshot,
    /// Only the field that changed.
    SingleField,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    fn name(&self) -> &str;

    /// `None` when the backend is unreachable or answered with something
    /// unusable.
    async fn read(&self) -> Option<SnapshotPatch>;

    fn is_writable(&self) -> bool {
        true
    }

    fn write_mode(&self) -> WriteMode {
        WriteMode::SingleField
    }

    async fn write(&self, _patch: &SnapshotPatch) -> bool {
        false
    }

    /// Whether `patch_progress` and `register_player` reach the backend.
    fn supports_patch(&self) -> bool {
        false
    }

    async fn patch_progress(&self, _player: &str, _quest_id: &str, _entry: &ProgressEntry) -> bool {
        false
    }

    async fn register_player(&self, _name: &str) {}
}

/// Ordered list of backends; earlier entries win.
#[derive(Default)]
pub struct RemoteChain {
    stores: Vec<Box<dyn RemoteStore>>,
}

impl RemoteChain {
    pub fn new(stores: Vec<Box<dyn RemoteStore>>) -> Self {
        Self { stores }
    }

    /// Primary, then JSONBin, then the static file, skipping disabled ones.
    /// Without `static_base_url` the static file is looked up next to the
    /// primary service.
    pub fn from_config(config: &ClientConfig, client: reqwest::Client) -> Self {
        let mut stores: Vec<Box<dyn RemoteStore>> = Vec::new();
        if config.primary.enabled {
            stores.push(Box::new(PrimaryStore::with_client(
                client.clone(),
                config.primary.base_url.clone(),
            )));
        }
        if config.jsonbin.enabled {
            let base = config
                .jsonbin
                .base_url
                .clone()
                .unwrap_or_else(|| JSONBIN_BASE_URL.to_string());
            stores.push(Box::new(JsonBinStore::with_client(
                client.clone(),
                base,
                config.jsonbin.bin_id.clone(),
                config.jsonbin.api_key.clone(),
            )));
        }
        let static_base = config
            .static_base_url
            .as_ref()
            .filter(|b| !b.trim().is_empty())
            .or(config.primary.enabled.then_some(&config.primary.base_url));
        if let Some(base) = static_base {
            stores.push(Box::new(StaticFileStore::with_client(client, base.clone())));
        }
        Self { stores }
    }

    pub fn names(&self) -> Vec<&str> {
        self.stores.iter().map(|s| s.name()).collect()
    }

    /// First backend whose answer carries a quest list.
    pub async fn read_first(&self) -> Option<(&str, SnapshotPatch)> {
        for store in &self.stores {
            match store.read().await {
                Some(snapshot) if snapshot.quests.is_some() => {
                    return Some((store.name(), snapshot));
                }
                Some(_) => {
                    tracing::warn!(store = store.name(), "remote answered without quests, falling back");
                }
                None => {
                    tracing::debug!(store = store.name(), "remote unavailable, falling back");
                }
            }
        }
        None
    }

    /// Where writes go: the first writable backend.
    pub fn write_target(&self) -> Option<&dyn RemoteStore> {
        self.stores
            .iter()
            .map(|s| s.as_ref())
            .find(|s| s.is_writable())
    }

    /// The write target, if it takes single-entry updates.
    pub fn patch_target(&self) -> Option<&dyn RemoteStore> {
        self.write_target().filter(|s| s.supports_patch())
    }
}

/// Appends percent-encoded `segments` to `base`.
pub(crate) fn join_url(base: &str, segments: &[&str]) -> anyhow::Result<Url> {
    let mut url = Url::parse(base.trim()).with_context(|| format!("invalid base url: {base}"))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("base url cannot take a path: {base}"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
