use anyhow::anyhow;
use async_trait::async_trait;
use questboard_protocol::SnapshotPatch;
use serde_json::{Map, Value};

use super::{join_url, RemoteStore};

pub const JSONBIN_BASE_URL: &str = "https://api.jsonbin.io/v3/b";

const MASTER_KEY_HEADER: &str = "X-Master-Key";
const BIN_META_HEADER: &str = "X-Bin-Meta";

/// A hosted JSON bin holding the whole shared state as one blob.
///
/// Writes are read-modify-write of the entire blob with no locking, so two
/// clients writing at once can lose one update.
pub struct JsonBinStore {
    client: reqwest::Client,
    base_url: String,
    bin_id: String,
    api_key: String,
}

impl JsonBinStore {
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        bin_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            bin_id: bin_id.into(),
            api_key: api_key.into(),
        }
    }

    async fn fetch_blob(&self) -> anyhow::Result<Value> {
        let url = join_url(&self.base_url, &[self.bin_id.as_str(), "latest"])?;
        let blob = self
            .client
            .get(url)
            .header(MASTER_KEY_HEADER, &self.api_key)
            .header(BIN_META_HEADER, "false")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(blob)
    }

    async fn put_blob(&self, blob: &Map<String, Value>) -> anyhow::Result<()> {
        let url = join_url(&self.base_url, &[self.bin_id.as_str()])?;
        self.client
            .put(url)
            .header(MASTER_KEY_HEADER, &self.api_key)
            .json(blob)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn merge_and_put(&self, patch: &SnapshotPatch) -> anyhow::Result<()> {
        let mut blob = match self.fetch_blob().await {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(e) => {
                tracing::warn!(store = "jsonbin", "read before write failed, writing fresh blob: {e:#}");
                Map::new()
            }
        };
        let Value::Object(fields) = serde_json::to_value(patch)? else {
            return Err(anyhow!("snapshot patch did not serialize to an object"));
        };
        blob.extend(fields);
        self.put_blob(&blob).await
    }
}

#[async_trait]
impl RemoteStore for JsonBinStore {
    fn name(&self) -> &str {
        "jsonbin"
    }

    async fn read(&self) -> Option<SnapshotPatch> {
        let decoded = match self.fetch_blob().await {
            Ok(blob) => serde_json::from_value(blob).map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };
        match decoded {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(store = "jsonbin", "read failed, falling back: {e:#}");
                None
            }
        }
    }

    async fn write(&self, patch: &SnapshotPatch) -> bool {
        match self.merge_and_put(patch).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(store = "jsonbin", "write failed: {e:#}");
                false
            }
        }
    }
}
