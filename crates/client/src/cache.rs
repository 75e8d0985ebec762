use anyhow::Context;
use questboard_protocol::{PlayerProgress, ProgressEntry, ProgressMap, Quest, SnapshotPatch};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use time::OffsetDateTime;

/// How long a cached quest list counts as fresh.
pub const QUEST_CACHE_TTL_MS: i64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPlayer {
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

/// Entries that survive restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Durable {
    #[serde(default)]
    all_progress: ProgressMap,
    #[serde(default)]
    known_players: Vec<String>,
    #[serde(default)]
    quests: Option<Vec<Quest>>,
    #[serde(default)]
    quests_cached_at_ms: Option<i64>,
}

#[derive(Debug, Default)]
struct Session {
    player: Option<SessionPlayer>,
    admin: bool,
}

/// Client-side copy of the shared state.
///
/// Session entries (current player, admin unlock) live in memory only. The
/// rest is written through to a JSON file after every change when a path is
/// configured; failing to write it is logged and otherwise ignored.
#[derive(Debug)]
pub struct LocalCache {
    path: Option<PathBuf>,
    durable: Mutex<Durable>,
    session: Mutex<Session>,
}

impl LocalCache {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            durable: Mutex::new(Durable::default()),
            session: Mutex::new(Session::default()),
        }
    }

    /// Opens (or lazily creates) the cache file at `path`. Missing or corrupt
    /// files start empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let durable = match load(&path) {
            Ok(Some(d)) => d,
            Ok(None) => Durable::default(),
            Err(e) => {
                tracing::warn!("local cache unreadable, starting empty: {e:#}");
                Durable::default()
            }
        };
        Self {
            path: Some(path),
            durable: Mutex::new(durable),
            session: Mutex::new(Session::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|d| d.join("questboard").join("cache.json"))
    }

    // ---- session ----

    pub fn current_player(&self) -> Option<SessionPlayer> {
        self.session().player.clone()
    }

    pub fn set_current_player(&self, player: SessionPlayer) {
        self.session().player = Some(player);
    }

    pub fn clear_current_player(&self) {
        self.session().player = None;
    }

    pub fn is_admin(&self) -> bool {
        self.session().admin
    }

    pub fn set_admin(&self, admin: bool) {
        self.session().admin = admin;
    }

    // ---- progress ----

    pub fn all_progress(&self) -> ProgressMap {
        self.durable().all_progress.clone()
    }

    pub fn save_all_progress(&self, progress: ProgressMap) {
        self.update(|d| d.all_progress = progress);
    }

    pub fn player_progress(&self, player: &str) -> PlayerProgress {
        self.durable()
            .all_progress
            .get(player)
            .cloned()
            .unwrap_or_default()
    }

    pub fn update_player_progress(&self, player: &str, quest_id: &str, entry: ProgressEntry) {
        self.update(|d| {
            d.all_progress
                .entry(player.to_string())
                .or_default()
                .insert(quest_id.to_string(), entry);
        });
    }

    // ---- players ----

    pub fn known_players(&self) -> Vec<String> {
        self.durable().known_players.clone()
    }

    pub fn set_known_players(&self, players: Vec<String>) {
        self.update(|d| d.known_players = players);
    }

    /// Returns whether the name was new.
    pub fn add_known_player(&self, name: &str) -> bool {
        self.update(|d| {
            if d.known_players.iter().any(|p| p == name) {
                return false;
            }
            d.known_players.push(name.to_string());
            true
        })
    }

    // ---- quests ----

    pub fn cached_quests(&self) -> Option<Vec<Quest>> {
        self.durable().quests.clone()
    }

    pub fn set_cached_quests(&self, quests: Vec<Quest>) {
        self.set_cached_quests_at(quests, now_ms());
    }

    pub fn set_cached_quests_at(&self, quests: Vec<Quest>, at_ms: i64) {
        self.update(|d| {
            d.quests = Some(quests);
            d.quests_cached_at_ms = Some(at_ms);
        });
    }

    pub fn quests_cached_at_ms(&self) -> Option<i64> {
        self.durable().quests_cached_at_ms
    }

    pub fn is_cache_valid(&self) -> bool {
        self.is_cache_valid_at(now_ms())
    }

    pub fn is_cache_valid_at(&self, now_ms: i64) -> bool {
        match self.quests_cached_at_ms() {
            Some(at) => now_ms - at < QUEST_CACHE_TTL_MS,
            None => false,
        }
    }

    /// Everything the cache knows, as a full-snapshot write. Quests are left
    /// out when none were ever cached so a remote list is never blanked.
    pub fn full_patch(&self) -> SnapshotPatch {
        let d = self.durable();
        SnapshotPatch {
            quests: d.quests.clone(),
            progress: Some(d.all_progress.clone()),
            players: Some(d.known_players.clone()),
        }
    }

    /// Overwrites every field present in `remote`. No merging.
    pub fn absorb(&self, remote: &SnapshotPatch) {
        if let Some(quests) = &remote.quests {
            self.set_cached_quests(quests.clone());
        }
        if let Some(progress) = &remote.progress {
            self.save_all_progress(progress.clone());
        }
        if let Some(players) = &remote.players {
            self.set_known_players(players.clone());
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn durable(&self) -> MutexGuard<'_, Durable> {
        self.durable.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn update<R>(&self, f: impl FnOnce(&mut Durable) -> R) -> R {
        let mut d = self.durable();
        let out = f(&mut *d);
        if let Some(path) = &self.path {
            if let Err(e) = persist(path, &d) {
                tracing::warn!("local cache write failed: {e:#}");
            }
        }
        out
    }
}

pub(crate) fn now_ms() -> i64 {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    millis.try_into().unwrap_or(i64::MAX)
}

fn load(path: &Path) -> anyhow::Result<Option<Durable>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("read cache: {}", path.display())),
    };
    let d = serde_json::from_str(&raw).with_context(|| format!("parse cache: {}", path.display()))?;
    Ok(Some(d))
}

fn persist(path: &Path, d: &Durable) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create cache dir: {}", dir.display()))?;
    }
    let json = serde_json::to_string(d)?;
    std::fs::write(path, json).with_context(|| format!("write cache: {}", path.display()))?;
    Ok(())
}
