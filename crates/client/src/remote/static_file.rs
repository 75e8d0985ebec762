use async_trait::async_trait;
use questboard_protocol::{Quest, SnapshotPatch};
use serde::Deserialize;

use super::{join_url, RemoteStore};
use crate::cache::now_ms;

pub const QUEST_FILE_NAME: &str = "quests.json";

#[derive(Debug, Deserialize)]
struct QuestFile {
    #[serde(default)]
    quests: Option<Vec<Quest>>,
}

/// A `quests.json` published somewhere static. Read only, quests only.
pub struct StaticFileStore {
    client: reqwest::Client,
    base_url: String,
}

impl StaticFileStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    async fn fetch(&self) -> anyhow::Result<QuestFile> {
        let mut url = join_url(&self.base_url, &[QUEST_FILE_NAME])?;
        // Bust intermediate caches; the file changes by hand.
        url.query_pairs_mut().append_pair("t", &now_ms().to_string());
        let file = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(file)
    }
}

#[async_trait]
impl RemoteStore for StaticFileStore {
    fn name(&self) -> &str {
        "static"
    }

    async fn read(&self) -> Option<SnapshotPatch> {
        match self.fetch().await {
            Ok(file) => Some(SnapshotPatch {
                quests: file.quests,
                ..SnapshotPatch::default()
            }),
            Err(e) => {
                tracing::warn!(store = "static", "read failed, falling back: {e:#}");
                None
            }
        }
    }

    fn is_writable(&self) -> bool {
        false
    }
}
