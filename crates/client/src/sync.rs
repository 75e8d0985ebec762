use questboard_protocol::{
    validate_player_name, Difficulty, ProgressAction, ProgressEntry, ProgressMap, Quest,
    QuestDraft, SnapshotPatch,
};
use time::OffsetDateTime;

use crate::cache::{LocalCache, SessionPlayer};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::remote::{RemoteChain, WriteMode};
use crate::view::{AdminDashboard, QuestBoard};

pub const PLACEHOLDER_QUEST_ID: &str = "q_default_1";

/// Shown when no backend and no cache can provide quests.
pub fn default_quests() -> Vec<Quest> {
    vec![Quest {
        id: PLACEHOLDER_QUEST_ID.to_string(),
        title: "Welcome!".to_string(),
        description: "The quest list could not be loaded. Check the server configuration."
            .to_string(),
        reward_item: "Configuration required".to_string(),
        reward_icon: "⚙️".to_string(),
        difficulty: Difficulty::Facile,
        xp: 0,
        active: true,
        extra: Default::default(),
    }]
}

/// Keeps the local cache and the remote backends in step.
///
/// Reads take the first backend that answers and overwrite the cache with it.
/// Writes land in the cache first and are then pushed, best effort, to the
/// first writable backend. Nothing here fails because a backend is down.
pub struct SyncClient {
    cache: LocalCache,
    remotes: RemoteChain,
    admin_password: String,
}

impl SyncClient {
    pub fn new(cache: LocalCache, remotes: RemoteChain, admin_password: impl Into<String>) -> Self {
        Self {
            cache,
            remotes,
            admin_password: admin_password.into(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        let cache = match config.cache_path.clone().or_else(LocalCache::default_path) {
            Some(path) => LocalCache::open(path),
            None => LocalCache::in_memory(),
        };
        let remotes = RemoteChain::from_config(config, reqwest::Client::new());
        tracing::debug!(backends = ?remotes.names(), "sync client configured");
        Self::new(cache, remotes, config.admin_password.clone())
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn remotes(&self) -> &RemoteChain {
        &self.remotes
    }

    // ---- read path ----

    /// Remote backends in order, then the cached list, then the placeholder.
    pub async fn load_quests(&self) -> Vec<Quest> {
        if let Some((store, snapshot)) = self.remotes.read_first().await {
            tracing::debug!(store, "quests loaded from remote");
            self.cache.absorb(&snapshot);
            return snapshot.quests.unwrap_or_default();
        }
        if let Some(cached) = self.cache.cached_quests() {
            tracing::info!("all remotes unavailable, using cached quests");
            return cached;
        }
        tracing::warn!("no remote and no cache, using placeholder quests");
        default_quests()
    }

    // ---- write path ----

    pub async fn save_quests(&self, quests: Vec<Quest>) {
        self.cache.set_cached_quests(quests.clone());
        self.push(SnapshotPatch::quests(quests)).await;
    }

    pub async fn save_progress(&self, progress: ProgressMap) {
        self.cache.save_all_progress(progress.clone());
        self.push(SnapshotPatch::progress(progress)).await;
    }

    async fn push(&self, changed: SnapshotPatch) {
        let Some(target) = self.remotes.write_target() else {
            tracing::debug!("no writable remote, change kept locally");
            return;
        };
        let patch = match target.write_mode() {
            WriteMode::FullSnapshot => self.cache.full_patch(),
            WriteMode::SingleField => changed,
        };
        if !target.write(&patch).await {
            tracing::warn!(store = target.name(), "remote write failed, change kept locally");
        }
    }

    /// Applies `action` to one entry. `None` when it does not apply to the
    /// entry's current state.
    async fn transition(
        &self,
        player: &str,
        quest_id: &str,
        action: ProgressAction,
    ) -> Option<ProgressEntry> {
        let progress = self.cache.player_progress(player);
        let Some(next) = action.apply(progress.get(quest_id), OffsetDateTime::now_utc()) else {
            tracing::debug!(player, quest_id, ?action, "transition does not apply, ignored");
            return None;
        };
        self.cache.update_player_progress(player, quest_id, next.clone());

        match self.remotes.patch_target() {
            Some(target) => {
                target.patch_progress(player, quest_id, &next).await;
                if action == ProgressAction::Request {
                    target.register_player(player).await;
                }
            }
            None => self.push(SnapshotPatch::progress(self.cache.all_progress())).await,
        }
        Some(next)
    }

    // ---- player ----

    pub async fn login(&self, name: &str) -> Result<SessionPlayer, ClientError> {
        let name = validate_player_name(name)?;
        let player = SessionPlayer {
            name,
            joined_at: OffsetDateTime::now_utc(),
        };
        self.cache.set_current_player(player.clone());
        self.cache.add_known_player(&player.name);
        if let Some(target) = self.remotes.patch_target() {
            target.register_player(&player.name).await;
        }
        tracing::info!(player = %player.name, "player logged in");
        Ok(player)
    }

    pub fn logout(&self) {
        self.cache.clear_current_player();
    }

    pub fn current_player(&self) -> Option<SessionPlayer> {
        self.cache.current_player()
    }

    /// `available -> pending` for the logged-in player.
    pub async fn mark_quest_done(
        &self,
        quest_id: &str,
    ) -> Result<Option<ProgressEntry>, ClientError> {
        let player = self.current_player().ok_or(ClientError::NotLoggedIn)?;
        Ok(self
            .transition(&player.name, quest_id, ProgressAction::Request)
            .await)
    }

    pub async fn player_board(&self) -> Result<QuestBoard, ClientError> {
        let player = self.current_player().ok_or(ClientError::NotLoggedIn)?;
        let quests = self.load_quests().await;
        let progress = self.cache.player_progress(&player.name);
        Ok(QuestBoard::new(player.name, quests, progress))
    }

    // ---- admin ----

    pub fn admin_login(&self, password: &str) -> bool {
        let ok = password == self.admin_password;
        self.cache.set_admin(ok);
        if !ok {
            tracing::warn!("admin login rejected");
        }
        ok
    }

    pub fn admin_logout(&self) {
        self.cache.set_admin(false);
    }

    pub fn is_admin(&self) -> bool {
        self.cache.is_admin()
    }

    fn require_admin(&self) -> Result<(), ClientError> {
        if self.cache.is_admin() {
            Ok(())
        } else {
            Err(ClientError::AdminLocked)
        }
    }

    pub async fn load_admin_dashboard(&self) -> Result<AdminDashboard, ClientError> {
        self.require_admin()?;
        let quests = self.load_quests().await;
        if let Some(target) = self.remotes.write_target() {
            if let Some(remote) = target.read().await {
                self.cache.absorb(&SnapshotPatch {
                    quests: None,
                    ..remote
                });
            }
        }
        Ok(AdminDashboard::new(
            quests,
            self.cache.all_progress(),
            self.cache.known_players(),
        ))
    }

    /// `pending -> validated`.
    pub async fn validate(
        &self,
        player: &str,
        quest_id: &str,
    ) -> Result<Option<ProgressEntry>, ClientError> {
        self.require_admin()?;
        Ok(self.transition(player, quest_id, ProgressAction::Validate).await)
    }

    /// `pending -> available`.
    pub async fn reject(
        &self,
        player: &str,
        quest_id: &str,
    ) -> Result<Option<ProgressEntry>, ClientError> {
        self.require_admin()?;
        Ok(self.transition(player, quest_id, ProgressAction::Reject).await)
    }

    async fn admin_quests(&self) -> Vec<Quest> {
        match self.cache.cached_quests() {
            Some(quests) => quests,
            None => self.load_quests().await,
        }
    }

    /// Flips `active` and returns the new value.
    pub async fn toggle_quest_active(&self, quest_id: &str) -> Result<bool, ClientError> {
        self.require_admin()?;
        let mut quests = self.admin_quests().await;
        let quest = quests
            .iter_mut()
            .find(|q| q.id == quest_id)
            .ok_or_else(|| ClientError::UnknownQuest(quest_id.to_string()))?;
        quest.active = !quest.active;
        let active = quest.active;
        self.save_quests(quests).await;
        Ok(active)
    }

    /// Progress pointing at the quest is left in place.
    pub async fn delete_quest(&self, quest_id: &str) -> Result<(), ClientError> {
        self.require_admin()?;
        let mut quests = self.admin_quests().await;
        let before = quests.len();
        quests.retain(|q| q.id != quest_id);
        if quests.len() == before {
            return Err(ClientError::UnknownQuest(quest_id.to_string()));
        }
        self.save_quests(quests).await;
        Ok(())
    }

    pub async fn add_quest(&self, draft: QuestDraft) -> Result<Quest, ClientError> {
        self.require_admin()?;
        let quest = draft.into_quest(OffsetDateTime::now_utc())?;
        let mut quests = self.admin_quests().await;
        quests.push(quest.clone());
        self.save_quests(quests).await;
        tracing::info!(quest = %quest.id, "quest added");
        Ok(quest)
    }
}
