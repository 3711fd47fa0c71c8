use crate::adapters::{BadgeService, CardDropChecker, HttpSession, SteamLibrary, TradingCardDetector};
use crate::config::Settings;
use crate::domain::model::{AppId, CardFilterOptions, FilteringReport};
use crate::domain::ports::{DropFilter, GameLibrary, GameSelector, TradingCardFilter};
use crate::utils::error::{BotError, Result};
use crate::utils::report::ReportWriter;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Chooses the games to idle: library → trading cards → remaining drops →
/// exclusions → cap.
pub struct GameManager {
    settings: Settings,
    library: Arc<dyn GameLibrary>,
    cards: Arc<dyn TradingCardFilter>,
    badges: Option<Arc<dyn DropFilter>>,
    scraper: Arc<dyn DropFilter>,
    report: ReportWriter,
}

impl GameManager {
    pub fn new(
        settings: Settings,
        library: Arc<dyn GameLibrary>,
        cards: Arc<dyn TradingCardFilter>,
        scraper: Arc<dyn DropFilter>,
    ) -> Self {
        Self {
            settings,
            library,
            cards,
            badges: None,
            scraper,
            report: ReportWriter::disabled(),
        }
    }

    /// Wires the Steam adapters described by `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let http = HttpSession::from_settings(settings)?;
        let report = match &settings.report_dir {
            Some(dir) => ReportWriter::new(dir),
            None => ReportWriter::disabled(),
        };

        let library = Arc::new(SteamLibrary::from_settings(settings, http.clone(), report.clone()));
        let cards = Arc::new(TradingCardDetector::from_settings(settings, http.clone()));
        let scraper = Arc::new(CardDropChecker::from_settings(settings, report.clone())?);

        let manager = Self::new(settings.clone(), library, cards, scraper).with_report(report);
        if settings.filter_completed_card_drops {
            let badges = Arc::new(BadgeService::from_settings(settings, http));
            return Ok(manager.with_badge_service(badges));
        }
        Ok(manager)
    }

    /// Badge progress is preferred over scraping when an API key is configured.
    pub fn with_badge_service(mut self, badges: Arc<dyn DropFilter>) -> Self {
        self.badges = Some(badges);
        self
    }

    pub fn with_report(mut self, report: ReportWriter) -> Self {
        self.report = report;
        self
    }

    fn card_filter_options(&self, candidates: usize) -> CardFilterOptions {
        let max_games = self.settings.max_games_to_idle;
        // 預留額外名額給之後會被掉卡檢查剔除的遊戲
        let padded = if self.settings.filter_completed_card_drops {
            (max_games + (max_games / 2).max(5)).min(candidates)
        } else {
            max_games
        };
        CardFilterOptions {
            max_games: padded,
            max_checks: self.settings.max_checks,
            skip_failures: self.settings.skip_failures,
        }
    }

    async fn filter_completed_card_drops(
        &self,
        games: &[AppId],
        steam_id: &str,
    ) -> (Vec<AppId>, BTreeMap<AppId, bool>) {
        if games.is_empty() {
            return (Vec::new(), BTreeMap::new());
        }

        if let Some(badges) = self.badges.as_ref().filter(|_| self.settings.has_api_key()) {
            tracing::info!("Consulting badge service for authoritative data...");
            match badges.filter_games_with_drops(games, steam_id).await {
                Ok(outcome) => {
                    tracing::info!(
                        "Badge service completed: {}/{} games have remaining drops",
                        outcome.kept.len(),
                        games.len()
                    );
                    if outcome.kept.is_empty() {
                        tracing::info!("All candidate games have already dropped their trading cards");
                    }
                    return (outcome.kept, outcome.per_game);
                }
                Err(e) if e.is_timeout() => {
                    tracing::warn!("Badge progress request timed out: {}", e);
                }
                Err(e) => {
                    tracing::warn!("Failed to retrieve badge progress: {}", e);
                }
            }
        }

        tracing::info!("Checking card drops via web scraping...");
        match self.scraper.filter_games_with_drops(games, steam_id).await {
            Ok(outcome) => {
                tracing::info!(
                    "Web scraping completed: {}/{} games have drops",
                    outcome.kept.len(),
                    games.len()
                );
                if outcome.kept.is_empty() {
                    tracing::info!("All candidate games have already dropped their trading cards");
                }
                (outcome.kept, outcome.per_game)
            }
            Err(e) => {
                tracing::warn!("Web scraping failed: {}", e);
                tracing::warn!("Could not check card drop status, including all games as fallback");
                (games.to_vec(), BTreeMap::new())
            }
        }
    }

    pub async fn select(&self, steam_id: Option<&str>) -> Vec<AppId> {
        let settings = &self.settings;
        let max_games = settings.max_games_to_idle;

        let all_games = if settings.use_owned_games {
            tracing::info!("Getting owned games from Steam library...");
            let games = self.library.owned_games(steam_id).await;
            tracing::info!("Found {} owned games", games.len());
            games
        } else {
            tracing::info!("Using manually specified game list...");
            settings.game_app_ids.clone()
        };

        let games_with_cards = if settings.filter_trading_cards {
            tracing::info!("Filtering games with trading cards...");
            let options = self.card_filter_options(all_games.len());
            let games = self
                .cards
                .filter_games_with_trading_cards(&all_games, options)
                .await;
            tracing::info!("Found {} games with trading cards", games.len());
            if let Err(e) = self.report.log_api_results(
                "trading_cards",
                &games,
                serde_json::json!({"total_checked": all_games.len()}),
            ) {
                tracing::debug!("Failed to write trading card report: {}", e);
            }
            games
        } else {
            all_games.clone()
        };

        let (mut games_with_drops, scraping_results) = match steam_id {
            Some(id) if settings.filter_completed_card_drops => {
                tracing::info!("Filtering completed card drops...");
                let filtered = self.filter_completed_card_drops(&games_with_cards, id).await;
                tracing::info!("After filtering drops: {} games remaining", filtered.0.len());
                filtered
            }
            _ => (games_with_cards.clone(), BTreeMap::new()),
        };

        let mut excluded_games = Vec::new();
        if !settings.exclude_app_ids.is_empty() {
            let before = games_with_drops.len();
            games_with_drops.retain(|id| !settings.exclude_app_ids.contains(id));
            excluded_games = all_games
                .iter()
                .copied()
                .filter(|id| settings.exclude_app_ids.contains(id))
                .collect();
            let removed = before - games_with_drops.len();
            if removed > 0 {
                tracing::info!("Excluded {} games via configuration overrides", removed);
            }
        }

        let final_games: Vec<AppId> = games_with_drops.iter().copied().take(max_games).collect();

        let report = FilteringReport {
            steam_id: steam_id.unwrap_or("manual").to_string(),
            all_games,
            games_with_cards,
            games_with_drops,
            final_games,
            excluded_games,
            scraping_results,
        };
        if let Err(e) = self.report.log_filtering_process(&report) {
            tracing::debug!("Failed to write filtering report: {}", e);
        }

        if !report.final_games.is_empty() {
            tracing::info!("Final games to idle: {:?}", report.final_games);
            return report.final_games;
        }

        tracing::warn!("No games found to idle after filtering");
        if settings.filter_completed_card_drops
            && report.games_with_drops.len() == report.games_with_cards.len()
        {
            tracing::info!("Attempting fallback: including games that couldn't be checked");
            let fallback: Vec<AppId> = report.games_with_cards.iter().copied().take(max_games).collect();
            if !fallback.is_empty() {
                tracing::info!("Using fallback games: {:?}", fallback);
                return fallback;
            }
        }
        if report.games_with_drops.is_empty() {
            return Vec::new();
        }
        settings.configured_games()
    }
}

#[async_trait]
impl GameSelector for GameManager {
    async fn games_to_idle(&self, steam_id: Option<&str>) -> Vec<AppId> {
        self.select(steam_id).await
    }

    fn clear_cache(&self) {
        self.library.clear_cache();
        self.cards.clear_cache();
        if let Some(badges) = &self.badges {
            badges.clear_cache();
        }
        self.scraper.clear_cache();
    }
}

/// Reason attached to `NoGamesToIdle` when selection comes back empty.
pub fn empty_selection_error(settings: &Settings) -> BotError {
    let reason = if settings.filter_completed_card_drops {
        "no candidate game has trading-card drops remaining"
    } else if settings.filter_trading_cards {
        "no candidate game supports trading cards"
    } else {
        "the game list is empty"
    };
    BotError::NoGamesToIdle {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::DropFilterOutcome;
    use secrecy::SecretString;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct StubLibrary {
        games: Vec<AppId>,
        cleared: AtomicUsize,
    }

    #[async_trait]
    impl GameLibrary for StubLibrary {
        async fn owned_games(&self, _steam_id: Option<&str>) -> Vec<AppId> {
            self.games.clone()
        }
        fn clear_cache(&self) {
            self.cleared.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct StubCards {
        with_cards: Vec<AppId>,
        seen: Mutex<Option<CardFilterOptions>>,
    }

    #[async_trait]
    impl TradingCardFilter for StubCards {
        async fn filter_games_with_trading_cards(
            &self,
            games: &[AppId],
            options: CardFilterOptions,
        ) -> Vec<AppId> {
            *self.seen.lock().unwrap() = Some(options);
            games
                .iter()
                .copied()
                .filter(|id| self.with_cards.contains(id))
                .take(options.max_games)
                .collect()
        }
        fn clear_cache(&self) {}
    }

    enum DropBehaviour {
        Keep(Vec<AppId>),
        Timeout,
        Fail,
    }

    struct StubDrops {
        behaviour: DropBehaviour,
        calls: AtomicUsize,
    }

    impl StubDrops {
        fn new(behaviour: DropBehaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DropFilter for StubDrops {
        async fn filter_games_with_drops(
            &self,
            games: &[AppId],
            _steam_id: &str,
        ) -> Result<DropFilterOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                DropBehaviour::Keep(keep) => {
                    let per_game = games.iter().map(|id| (*id, keep.contains(id))).collect();
                    Ok(DropFilterOutcome {
                        kept: games.iter().copied().filter(|id| keep.contains(id)).collect(),
                        per_game,
                    })
                }
                DropBehaviour::Timeout => Err(BotError::ApiTimeout {
                    message: "Timeout retrieving badge data".to_string(),
                }),
                DropBehaviour::Fail => Err(BotError::BadgeServiceError {
                    message: "boom".to_string(),
                }),
            }
        }
    }

    fn settings() -> Settings {
        Settings {
            game_app_ids: vec![570, 730],
            max_games_to_idle: 3,
            steam_api_key: Some(SecretString::new("KEY".into())),
            report_dir: None,
            ..Settings::default()
        }
    }

    fn manager(
        settings: Settings,
        owned: Vec<AppId>,
        with_cards: Vec<AppId>,
        scraper: Arc<StubDrops>,
    ) -> (GameManager, Arc<StubCards>) {
        let library = Arc::new(StubLibrary {
            games: owned,
            cleared: AtomicUsize::new(0),
        });
        let cards = Arc::new(StubCards {
            with_cards,
            ..StubCards::default()
        });
        let manager = GameManager::new(settings, library, cards.clone(), scraper);
        (manager, cards)
    }

    #[tokio::test]
    async fn test_manual_list_without_filters() {
        let settings = Settings {
            use_owned_games: false,
            filter_trading_cards: false,
            filter_completed_card_drops: false,
            game_app_ids: vec![1, 2, 3, 4],
            ..settings()
        };
        let scraper = StubDrops::new(DropBehaviour::Fail);
        let (manager, cards) = manager(settings, vec![99], vec![], scraper.clone());

        let games = manager.games_to_idle(Some("123")).await;
        assert_eq!(games, vec![1, 2, 3]);
        assert!(cards.seen.lock().unwrap().is_none());
        assert_eq!(scraper.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_card_target_is_padded_for_drop_filtering() {
        let owned: Vec<AppId> = (1..=20).collect();
        let scraper = StubDrops::new(DropBehaviour::Keep(owned.clone()));
        let (manager, cards) = manager(settings(), owned.clone(), owned, scraper);

        let games = manager.games_to_idle(Some("123")).await;
        assert_eq!(games, vec![1, 2, 3]);
        // 3 + max(5, 1)
        assert_eq!(cards.seen.lock().unwrap().unwrap().max_games, 8);
    }

    #[tokio::test]
    async fn test_padding_is_capped_by_candidates() {
        let scraper = StubDrops::new(DropBehaviour::Keep(vec![1, 2]));
        let (manager, cards) = manager(settings(), vec![1, 2], vec![1, 2], scraper);

        manager.games_to_idle(Some("123")).await;
        assert_eq!(cards.seen.lock().unwrap().unwrap().max_games, 2);
    }

    #[tokio::test]
    async fn test_no_padding_without_drop_filter() {
        let settings = Settings {
            filter_completed_card_drops: false,
            max_checks: Some(7),
            skip_failures: true,
            ..settings()
        };
        let scraper = StubDrops::new(DropBehaviour::Fail);
        let (manager, cards) = manager(settings, (1..=20).collect(), vec![5, 6], scraper);

        let games = manager.games_to_idle(Some("123")).await;
        assert_eq!(games, vec![5, 6]);
        let options = cards.seen.lock().unwrap().unwrap();
        assert_eq!(
            options,
            CardFilterOptions {
                max_games: 3,
                max_checks: Some(7),
                skip_failures: true
            }
        );
    }

    #[tokio::test]
    async fn test_badge_service_is_preferred() {
        let badges = StubDrops::new(DropBehaviour::Keep(vec![2, 3]));
        let scraper = StubDrops::new(DropBehaviour::Keep(vec![1]));
        let (manager, _) = manager(settings(), vec![1, 2, 3], vec![1, 2, 3], scraper.clone());
        let manager = manager.with_badge_service(badges.clone());

        assert_eq!(manager.games_to_idle(Some("123")).await, vec![2, 3]);
        assert_eq!(badges.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scraper.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_badge_service_needs_api_key() {
        let settings = Settings {
            steam_api_key: None,
            ..settings()
        };
        let badges = StubDrops::new(DropBehaviour::Keep(vec![2]));
        let scraper = StubDrops::new(DropBehaviour::Keep(vec![1]));
        let (manager, _) = manager(settings, vec![1, 2], vec![1, 2], scraper.clone());
        let manager = manager.with_badge_service(badges.clone());

        assert_eq!(manager.games_to_idle(Some("123")).await, vec![1]);
        assert_eq!(badges.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_badge_failures_fall_back_to_scraping() {
        for behaviour in [DropBehaviour::Timeout, DropBehaviour::Fail] {
            let badges = StubDrops::new(behaviour);
            let scraper = StubDrops::new(DropBehaviour::Keep(vec![1, 3]));
            let (manager, _) = manager(settings(), vec![1, 2, 3], vec![1, 2, 3], scraper.clone());
            let manager = manager.with_badge_service(badges);

            assert_eq!(manager.games_to_idle(Some("123")).await, vec![1, 3]);
            assert_eq!(scraper.calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_all_drop_checks_failing_keeps_every_game() {
        let badges = StubDrops::new(DropBehaviour::Fail);
        let scraper = StubDrops::new(DropBehaviour::Fail);
        let (manager, _) = manager(settings(), vec![1, 2], vec![1, 2], scraper);
        let manager = manager.with_badge_service(badges);

        assert_eq!(manager.games_to_idle(Some("123")).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_drop_filter_skipped_without_steam_id() {
        let scraper = StubDrops::new(DropBehaviour::Keep(vec![]));
        let (manager, _) = manager(settings(), vec![1, 2], vec![1, 2], scraper.clone());

        assert_eq!(manager.games_to_idle(None).await, vec![1, 2]);
        assert_eq!(scraper.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exclusions_and_cap() {
        let settings = Settings {
            exclude_app_ids: vec![2, 4],
            ..settings()
        };
        let owned = vec![1, 2, 3, 4, 5, 6];
        let scraper = StubDrops::new(DropBehaviour::Keep(owned.clone()));
        let (manager, _) = manager(settings, owned.clone(), owned, scraper);

        assert_eq!(manager.games_to_idle(Some("123")).await, vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn test_exhausted_drops_yield_empty_list() {
        let scraper = StubDrops::new(DropBehaviour::Keep(vec![]));
        let (manager, _) = manager(settings(), vec![1, 2], vec![1, 2], scraper);

        assert!(manager.games_to_idle(Some("123")).await.is_empty());
    }

    #[tokio::test]
    async fn test_filtering_report_is_written() {
        let temp_dir = TempDir::new().unwrap();
        let scraper = StubDrops::new(DropBehaviour::Keep(vec![1]));
        let (manager, _) = manager(settings(), vec![1, 2], vec![1, 2], scraper);
        let manager = manager.with_report(ReportWriter::new(temp_dir.path()));

        manager.games_to_idle(Some("123")).await;

        let report = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .find(|entry| entry.file_name().to_string_lossy().starts_with("game_filtering_"))
            .expect("filtering report");
        let body: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(report.path()).unwrap()).unwrap();
        assert_eq!(body["steam_id"], "123");
        assert_eq!(body["final_games"], 1);
        assert_eq!(body["details"]["scraping_results"]["2"], false);
        assert!(temp_dir.path().join("trading_cards_results.json").exists());
    }

    #[tokio::test]
    async fn test_clear_cache_reaches_every_component() {
        let library = Arc::new(StubLibrary {
            games: vec![],
            cleared: AtomicUsize::new(0),
        });
        let manager = GameManager::new(
            settings(),
            library.clone(),
            Arc::new(StubCards::default()),
            StubDrops::new(DropBehaviour::Fail),
        );
        GameSelector::clear_cache(&manager);
        assert_eq!(library.cleared.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_selection_error_is_low_severity() {
        let err = empty_selection_error(&settings());
        assert_eq!(err.severity().exit_code(), 0);
    }
}
