use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use time::{OffsetDateTime, UtcOffset};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Facile,
    Moyen,
    Difficile,
    #[serde(rename = "Légendaire")]
    Legendaire,
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::Facile
    }
}

/// A quest as the admin defined it. Only `id` is mandatory on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quest {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reward_item: String,
    #[serde(default)]
    pub reward_icon: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub xp: u32,
    #[serde(default)]
    pub active: bool,
    /// Unrecognised fields, written back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Available,
    Pending,
    Validated,
}

impl Default for ProgressStatus {
    fn default() -> Self {
        Self::Available
    }
}

/// An instant as it appears on the wire.
///
/// The text is kept verbatim, so a timestamp read from a store is written
/// back exactly as it came. New timestamps use UTC with millisecond
/// precision, e.g. `2024-01-01T00:00:00.000Z`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    pub fn at(instant: OffsetDateTime) -> Self {
        let t = instant.to_offset(UtcOffset::UTC);
        Self(format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
            t.year(),
            u8::from(t.month()),
            t.day(),
            t.hour(),
            t.minute(),
            t.second(),
            t.millisecond()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Completion state of one quest for one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    pub status: ProgressStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_at: Option<Timestamp>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProgressEntry {
    pub fn available() -> Self {
        Self {
            status: ProgressStatus::Available,
            requested_at: None,
            validated_at: None,
            extra: Map::new(),
        }
    }

    pub fn pending(requested_at: OffsetDateTime) -> Self {
        Self {
            status: ProgressStatus::Pending,
            requested_at: Some(Timestamp::at(requested_at)),
            validated_at: None,
            extra: Map::new(),
        }
    }

    pub fn validated(requested_at: Option<Timestamp>, validated_at: OffsetDateTime) -> Self {
        Self {
            status: ProgressStatus::Validated,
            requested_at,
            validated_at: Some(Timestamp::at(validated_at)),
            extra: Map::new(),
        }
    }
}

/// `questId -> entry` for a single player.
pub type PlayerProgress = BTreeMap<String, ProgressEntry>;

/// `playerName -> questId -> entry` for everybody.
pub type ProgressMap = BTreeMap<String, PlayerProgress>;

/// Partial snapshot: present fields overwrite, absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quests: Option<Vec<Quest>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub players: Option<Vec<String>>,
}

impl SnapshotPatch {
    pub fn quests(quests: Vec<Quest>) -> Self {
        Self {
            quests: Some(quests),
            ..Self::default()
        }
    }

    pub fn progress(progress: ProgressMap) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPlayer {
    pub name: String,
}

// ---- player names ----

pub const PLAYER_NAME_MIN: usize = 2;
pub const PLAYER_NAME_MAX: usize = 16;

static PLAYER_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("player name regex"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlayerNameError {
    #[error("player name is empty")]
    Empty,
    #[error("player name must be 2-16 characters, got {0}")]
    Length(usize),
    #[error("player name may only contain letters, digits and '_'")]
    Charset,
}

/// Trims and checks a Minecraft player name, returning the trimmed name.
pub fn validate_player_name(raw: &str) -> Result<String, PlayerNameError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(PlayerNameError::Empty);
    }
    let len = name.chars().count();
    if !(PLAYER_NAME_MIN..=PLAYER_NAME_MAX).contains(&len) {
        return Err(PlayerNameError::Length(len));
    }
    if !PLAYER_NAME_RE.is_match(name) {
        return Err(PlayerNameError::Charset);
    }
    Ok(name.to_string())
}

// ---- progress state machine ----

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressAction {
    /// Player marks the quest done.
    Request,
    /// Admin approves a pending request.
    Validate,
    /// Admin sends a pending request back to available.
    Reject,
}

impl ProgressAction {
    /// Returns the next entry, or `None` when the action does not apply to the
    /// current state.
    pub fn apply(self, current: Option<&ProgressEntry>, now: OffsetDateTime) -> Option<ProgressEntry> {
        let status = current.map(|e| e.status).unwrap_or_default();
        match (self, status) {
            (Self::Request, ProgressStatus::Available) => Some(ProgressEntry::pending(now)),
            (Self::Validate, ProgressStatus::Pending) => Some(ProgressEntry::validated(
                current.and_then(|e| e.requested_at.clone()),
                now,
            )),
            (Self::Reject, ProgressStatus::Pending) => Some(ProgressEntry::available()),
            _ => None,
        }
    }
}

pub fn status_of(progress: &PlayerProgress, quest_id: &str) -> ProgressStatus {
    progress
        .get(quest_id)
        .map(|e| e.status)
        .unwrap_or_default()
}

/// Sum of `xp` over active quests the player has validated.
pub fn total_xp(quests: &[Quest], progress: &PlayerProgress) -> u64 {
    quests
        .iter()
        .filter(|q| q.active && status_of(progress, &q.id) == ProgressStatus::Validated)
        .map(|q| u64::from(q.xp))
        .sum()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlayerStats {
    pub active: usize,
    pub validated: usize,
    pub pending: usize,
    pub xp: u64,
}

pub fn player_stats(quests: &[Quest], progress: &PlayerProgress) -> PlayerStats {
    let count = |status: ProgressStatus| {
        quests
            .iter()
            .filter(|q| status_of(progress, &q.id) == status)
            .count()
    };
    PlayerStats {
        active: quests.iter().filter(|q| q.active).count(),
        validated: count(ProgressStatus::Validated),
        pending: count(ProgressStatus::Pending),
        xp: total_xp(quests, progress),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingRequest {
    pub player: String,
    pub quest: Quest,
    pub requested_at: Option<Timestamp>,
}

/// Pending requests across all players. Entries pointing at deleted quests
/// are skipped.
pub fn pending_requests(quests: &[Quest], all: &ProgressMap) -> Vec<PendingRequest> {
    let mut out = Vec::new();
    for (player, progress) in all {
        for (quest_id, entry) in progress {
            if entry.status != ProgressStatus::Pending {
                continue;
            }
            if let Some(quest) = quests.iter().find(|q| &q.id == quest_id) {
                out.push(PendingRequest {
                    player: player.clone(),
                    quest: quest.clone(),
                    requested_at: entry.requested_at.clone(),
                });
            }
        }
    }
    out
}

// ---- admin quest form ----

pub const DEFAULT_REWARD_ICON: &str = "⭐";
pub const DEFAULT_QUEST_XP: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestDraft {
    pub title: String,
    pub description: String,
    pub reward_item: String,
    #[serde(default)]
    pub reward_icon: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub xp: Option<u32>,
}

impl QuestDraft {
    pub fn into_quest(self, now: OffsetDateTime) -> Result<Quest, DraftError> {
        let title = required(&self.title, "title")?;
        let description = required(&self.description, "description")?;
        let reward_item = required(&self.reward_item, "reward_item")?;
        let reward_icon = self
            .reward_icon
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_REWARD_ICON)
            .to_string();
        let millis = now.unix_timestamp_nanos() / 1_000_000;
        Ok(Quest {
            id: format!("q_{millis}"),
            title,
            description,
            reward_item,
            reward_icon,
            difficulty: self.difficulty,
            xp: self.xp.unwrap_or(DEFAULT_QUEST_XP),
            active: true,
            extra: Map::new(),
        })
    }
}

fn required(value: &str, field: &'static str) -> Result<String, DraftError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(DraftError::MissingField(field));
    }
    Ok(v.to_string())
}
