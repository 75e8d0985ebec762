use async_trait::async_trait;
use questboard_protocol::{ProgressEntry, RegisterPlayer, SnapshotPatch};
use reqwest::Method;
use serde::Serialize;

use super::{join_url, RemoteStore, WriteMode};

/// The Questboard store service.
pub struct PrimaryStore {
    client: reqwest::Client,
    base_url: String,
}

impl PrimaryStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn fetch(&self) -> anyhow::Result<SnapshotPatch> {
        let url = join_url(&self.base_url, &["api", "data"])?;
        let snapshot = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(snapshot)
    }

    async fn send<T>(&self, method: Method, segments: &[&str], body: &T) -> anyhow::Result<()>
    where
        T: Serialize + ?Sized + Sync,
    {
        let url = join_url(&self.base_url, segments)?;
        self.client
            .request(method, url)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for PrimaryStore {
    fn name(&self) -> &str {
        "primary"
    }

    async fn read(&self) -> Option<SnapshotPatch> {
        match self.fetch().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(store = "primary", "read failed, falling back: {e:#}");
                None
            }
        }
    }

    fn write_mode(&self) -> WriteMode {
        WriteMode::FullSnapshot
    }

    async fn write(&self, patch: &SnapshotPatch) -> bool {
        match self.send(Method::PUT, &["api", "data"], patch).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(store = "primary", "write failed: {e:#}");
                false
            }
        }
    }

    fn supports_patch(&self) -> bool {
        true
    }

    async fn patch_progress(&self, player: &str, quest_id: &str, entry: &ProgressEntry) -> bool {
        let segments = ["api", "progress", player, quest_id];
        match self.send(Method::PATCH, &segments, entry).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(store = "primary", player, quest_id, "progress patch failed: {e:#}");
                false
            }
        }
    }

    async fn register_player(&self, name: &str) {
        let body = RegisterPlayer {
            name: name.to_string(),
        };
        if let Err(e) = self.send(Method::POST, &["api", "players"], &body).await {
            tracing::warn!(store = "primary", player = name, "player registration failed: {e:#}");
        }
    }
}
