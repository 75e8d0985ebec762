use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};


pub const DATA_FILE_NAME: &str = "db.json";

/// The stored document.
///
/// Quests and progress entries are opaque to the store: whatever a client
/// sent is what the next reader gets back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub quests: Vec<Value>,
    /// `player -> questId -> entry`.
    #[serde(default)]
    pub progress: Map<String, Value>,
    #[serde(default)]
    pub players: Vec<String>,
}

/// Present fields overwrite, absent or `null` ones are left alone.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DocumentPatch {
    #[serde(default)]
    pub quests: Option<Vec<Value>>,
    #[serde(default)]
    pub progress: Option<Map<String, Value>>,
    #[serde(default)]
    pub players: Option<Vec<String>>,
}

impl DocumentPatch {
    pub fn is_empty(&self) -> bool {
        self.quests.is_none() && self.progress.is_none() && self.players.is_none()
    }

    fn apply_to(self, doc: &mut Document) {
        if let Some(quests) = self.quests {
            doc.quests = quests;
        }
        if let Some(progress) = self.progress {
            doc.progress = progress;
        }
        if let Some(players) = self.players {
            doc.players = players;
        }
    }
}

/// Shape of the read-only seed file.
#[derive(Debug, Default, Deserialize)]
struct SeedFile {
    #[serde(default)]
    quests: Vec<Value>,
}

/// Authoritative store backed by a single JSON document.
///
/// Reads never fail: a missing document is seeded once, an unreadable one
/// reads as empty. Writes are best effort and only logged on failure. Every
/// mutation runs read-modify-write under one lock so concurrent handlers in
/// this process cannot lose each other's updates.
#[derive(Debug, Clone)]
pub struct Engine {
    data_path: PathBuf,
    seed_path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl Engine {
    pub fn new(data_path: impl Into<PathBuf>, seed_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            seed_path: seed_path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Store rooted at `data_dir/db.json`.
    pub fn in_dir(data_dir: impl AsRef<Path>, seed_path: impl Into<PathBuf>) -> Self {
        Self::new(data_dir.as_ref().join(DATA_FILE_NAME), seed_path)
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn snapshot(&self) -> Document {
        let _guard = self.guard();
        self.read_or_seed()
    }

    /// Seeds the store first if needed, even when `patch` is empty.
    pub fn apply(&self, patch: DocumentPatch) {
        self.mutate(|db| {
            let changed = !patch.is_empty();
            patch.apply_to(db);
            changed
        });
    }

    pub fn quests(&self) -> Vec<Value> {
        self.snapshot().quests
    }

    pub fn replace_quests(&self, quests: Vec<Value>) {
        self.mutate(|db| {
            db.quests = quests;
            true
        });
    }

    pub fn progress(&self) -> Map<String, Value> {
        self.snapshot().progress
    }

    pub fn replace_progress(&self, progress: Map<String, Value>) {
        self.mutate(|db| {
            db.progress = progress;
            true
        });
    }

    /// Overwrites exactly one `(player, quest)` entry. A player slot that is
    /// not an object is replaced by one.
    pub fn set_progress_entry(&self, player: &str, quest_id: &str, entry: Value) {
        self.mutate(|db| {
            let slot = db
                .progress
                .entry(player)
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Some(entries) = slot.as_object_mut() {
                entries.insert(quest_id.to_string(), entry);
            }
            true
        });
    }

    pub fn players(&self) -> Vec<String> {
        self.snapshot().players
    }

    /// Appends `name` unless already known. Returns whether it was new.
    pub fn register_player(&self, name: &str) -> bool {
        let added = self.mutate(|db| {
            if db.players.iter().any(|p| p == name) {
                return false;
            }
            db.players.push(name.to_string());
            true
        });
        if added {
            tracing::info!(player = name, "new player registered");
        }
        added
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // A panicked handler leaves nothing half-written in memory; the file is
        // the source of truth.
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `f` on the current document and persists it when `f` returns true.
    fn mutate(&self, f: impl FnOnce(&mut Document) -> bool) -> bool {
        let _guard = self.guard();
        let mut db = self.read_or_seed();
        let changed = f(&mut db);
        if changed {
            self.write_logged(&db);
        }
        changed
    }

    fn read_or_seed(&self) -> Document {
        match self.load() {
            Ok(Some(db)) => db,
            Ok(None) => {
                let quests = match self.load_seed() {
                    Ok(q) => q,
                    Err(e) => {
                        tracing::warn!(
                            seed = %self.seed_path.display(),
                            "seed file unavailable, starting with no quests: {e:#}"
                        );
                        Vec::new()
                    }
                };
                let db = Document {
                    quests,
                    ..Document::default()
                };
                self.write_logged(&db);
                tracing::info!(
                    quests = db.quests.len(),
                    path = %self.data_path.display(),
                    "store initialised from seed"
                );
                db
            }
            Err(e) => {
                tracing::error!("store read failed, serving empty snapshot: {e:#}");
                Document::default()
            }
        }
    }

    fn load(&self) -> anyhow::Result<Option<Document>> {
        let raw = match std::fs::read_to_string(&self.data_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("read store: {}", self.data_path.display()))
            }
        };
        let db = serde_json::from_str(&raw)
            .with_context(|| format!("parse store: {}", self.data_path.display()))?;
        Ok(Some(db))
    }

    fn load_seed(&self) -> anyhow::Result<Vec<Value>> {
        let raw = std::fs::read_to_string(&self.seed_path)
            .with_context(|| format!("read seed: {}", self.seed_path.display()))?;
        let seed: SeedFile = serde_json::from_str(&raw)
            .with_context(|| format!("parse seed: {}", self.seed_path.display()))?;
        Ok(seed.quests)
    }

    fn write_logged(&self, db: &Document) {
        if let Err(e) = self.persist(db) {
            tracing::error!("store write failed, change lost: {e:#}");
        }
    }

    fn persist(&self, db: &Document) -> anyhow::Result<()> {
        if let Some(dir) = self.data_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create data dir: {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(db)?;
        let tmp = self.data_path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.data_path)
            .with_context(|| format!("replace store: {}", self.data_path.display()))?;
        Ok(())
    }
}
