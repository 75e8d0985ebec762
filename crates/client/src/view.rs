//! View state owned by whoever drives the pages: one value per screen,
//! passed to the renderer, no globals.

use questboard_protocol::{
    pending_requests, player_stats, status_of, Difficulty, PendingRequest, PlayerProgress,
    PlayerStats, ProgressEntry, ProgressMap, ProgressStatus, Quest,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestFilter {
    pub difficulty: Option<Difficulty>,
    /// Quests without an entry count as `available`.
    pub status: Option<ProgressStatus>,
    /// Case-insensitive match on title or description.
    pub search: String,
}

impl QuestFilter {
    pub fn matches(&self, quest: &Quest, progress: &PlayerProgress) -> bool {
        if self.difficulty.is_some_and(|d| d != quest.difficulty) {
            return false;
        }
        if self
            .status
            .is_some_and(|s| s != status_of(progress, &quest.id))
        {
            return false;
        }
        let needle = self.search.trim().to_lowercase();
        needle.is_empty()
            || quest.title.to_lowercase().contains(&needle)
            || quest.description.to_lowercase().contains(&needle)
    }
}

/// A player's quest page.
#[derive(Debug, Clone)]
pub struct QuestBoard {
    player: String,
    quests: Vec<Quest>,
    progress: PlayerProgress,
    pub filter: QuestFilter,
}

impl QuestBoard {
    pub fn new(player: impl Into<String>, quests: Vec<Quest>, progress: PlayerProgress) -> Self {
        Self {
            player: player.into(),
            quests,
            progress,
            filter: QuestFilter::default(),
        }
    }

    pub fn player(&self) -> &str {
        &self.player
    }

    pub fn progress(&self) -> &PlayerProgress {
        &self.progress
    }

    pub fn status(&self, quest_id: &str) -> ProgressStatus {
        status_of(&self.progress, quest_id)
    }

    pub fn active_quests(&self) -> impl Iterator<Item = &Quest> {
        self.quests.iter().filter(|q| q.active)
    }

    /// Active quests passing the current filter.
    pub fn visible(&self) -> Vec<&Quest> {
        self.active_quests()
            .filter(|q| self.filter.matches(q, &self.progress))
            .collect()
    }

    /// Difficulties present among active quests, first-seen order.
    pub fn difficulties(&self) -> Vec<Difficulty> {
        let mut out = Vec::new();
        for q in self.active_quests() {
            if !out.contains(&q.difficulty) {
                out.push(q.difficulty);
            }
        }
        out
    }

    pub fn stats(&self) -> PlayerStats {
        player_stats(&self.quests, &self.progress)
    }

    pub fn rewards(&self) -> Vec<&Quest> {
        self.quests
            .iter()
            .filter(|q| self.status(&q.id) == ProgressStatus::Validated)
            .collect()
    }

    pub fn record(&mut self, quest_id: &str, entry: ProgressEntry) {
        self.progress.insert(quest_id.to_string(), entry);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRow {
    pub name: String,
    pub validated: usize,
    pub pending: usize,
    pub xp: u64,
}

/// Everything the admin page shows.
#[derive(Debug, Clone)]
pub struct AdminDashboard {
    pub quests: Vec<Quest>,
    pub progress: ProgressMap,
    pub players: Vec<String>,
    pub pending: Vec<PendingRequest>,
    pub rows: Vec<PlayerRow>,
    pub total_validated: usize,
}

impl AdminDashboard {
    pub fn new(quests: Vec<Quest>, progress: ProgressMap, players: Vec<String>) -> Self {
        let pending = pending_requests(&quests, &progress);
        let empty = PlayerProgress::new();
        let rows: Vec<PlayerRow> = players
            .iter()
            .map(|name| {
                let stats = player_stats(&quests, progress.get(name).unwrap_or(&empty));
                PlayerRow {
                    name: name.clone(),
                    validated: stats.validated,
                    pending: stats.pending,
                    xp: stats.xp,
                }
            })
            .collect();
        let total_validated = progress
            .values()
            .map(|p| player_stats(&quests, p).validated)
            .sum();
        Self {
            quests,
            progress,
            players,
            pending,
            rows,
            total_validated,
        }
    }

    pub fn total_pending(&self) -> usize {
        self.pending.len()
    }
}
