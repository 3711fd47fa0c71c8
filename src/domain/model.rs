use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Steam application id. Always positive.
pub type AppId = u32;

/// Store category id that marks trading-card support.
pub const TRADING_CARDS_CATEGORY_ID: u64 = 29;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub cached_games: usize,
    pub games_with_cards: usize,
    pub games_without_cards: usize,
}

/// Per-batch knobs for trading-card filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CardFilterOptions {
    pub max_games: usize,
    pub max_checks: Option<u32>,
    pub skip_failures: bool,
}

/// Outcome of a drop-progress check: the kept games plus whatever per-game
/// evidence the checker gathered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DropFilterOutcome {
    pub kept: Vec<AppId>,
    pub per_game: BTreeMap<AppId, bool>,
}

/// Everything the game manager decided during one selection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilteringReport {
    pub steam_id: String,
    pub all_games: Vec<AppId>,
    pub games_with_cards: Vec<AppId>,
    pub games_with_drops: Vec<AppId>,
    pub final_games: Vec<AppId>,
    pub excluded_games: Vec<AppId>,
    pub scraping_results: BTreeMap<AppId, bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OwnedGamesEnvelope {
    pub response: Option<OwnedGamesResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OwnedGamesResponse {
    pub games: Option<Vec<OwnedGame>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OwnedGame {
    pub appid: AppId,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct VanityEnvelope {
    pub response: VanityResponse,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct VanityResponse {
    pub success: u8,
    pub steamid: Option<String>,
    pub message: Option<String>,
}
