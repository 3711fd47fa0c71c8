use crate::config::Settings;
use crate::core::games::empty_selection_error;
use crate::domain::model::AppId;
use crate::domain::ports::{GameSelector, SteamClient};
use crate::utils::error::Result;
use crate::utils::monitor::ProcessMonitor;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Pause after an error inside the idle loop.
pub const ERROR_BACKOFF: Duration = Duration::from_secs(30);

enum LoopControl {
    Continue,
    Stop,
}

pub struct IdleBot<C: SteamClient> {
    settings: Settings,
    client: C,
    selector: Arc<dyn GameSelector>,
    monitor: ProcessMonitor,
}

impl<C: SteamClient> IdleBot<C> {
    pub fn new(settings: Settings, client: C, selector: Arc<dyn GameSelector>) -> Self {
        Self {
            settings,
            client,
            selector,
            monitor: ProcessMonitor::default(),
        }
    }

    pub fn with_monitor(mut self, monitor: ProcessMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Runs until the drops are exhausted, an unrecoverable error occurs or
    /// `shutdown` resolves. Idling is always stopped before returning.
    pub async fn run<F>(&mut self, dry_run: bool, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if dry_run {
            tracing::info!("Running in dry-run mode...");
            println!("{}", dry_run_summary(&self.settings));
            return Ok(());
        }

        let result = tokio::select! {
            result = self.run_session() => result,
            _ = shutdown => {
                tracing::info!("Bot interrupted by user");
                Ok(())
            }
        };

        if let Err(e) = &result {
            tracing::error!("Bot error: {}", e);
        }
        self.cleanup().await;
        result
    }

    async fn run_session(&mut self) -> Result<()> {
        tracing::info!("🚀 Starting Steam Idle Bot...");
        self.client.initialize().await?;
        self.client.login().await?;
        self.monitor.log_stats("Login");

        let steam_id = self.client.steam_id();
        let games = self.selector.games_to_idle(steam_id.as_deref()).await;
        if games.is_empty() {
            return Err(empty_selection_error(&self.settings));
        }

        self.client.start_idling(&games).await?;
        self.main_loop(games).await;
        Ok(())
    }

    async fn main_loop(&mut self, mut games: Vec<AppId>) {
        tracing::info!("Entering main idle loop...");
        tracing::info!("Press Ctrl+C to stop");

        let mut last_refresh = Instant::now();
        loop {
            self.client.sleep(self.settings.poll_interval()).await;

            match self.tick(&mut games, &mut last_refresh).await {
                Ok(LoopControl::Continue) => {}
                Ok(LoopControl::Stop) => break,
                Err(e) => {
                    tracing::error!("Error in main loop: {}", e);
                    self.client.sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }

    async fn tick(&mut self, games: &mut Vec<AppId>, last_refresh: &mut Instant) -> Result<LoopControl> {
        if last_refresh.elapsed() >= self.settings.refresh_interval() {
            tracing::info!("🔄 Refreshing game status...");
            *last_refresh = Instant::now();

            let steam_id = self.client.steam_id();
            let new_games = self.selector.games_to_idle(steam_id.as_deref()).await;
            self.monitor.log_stats("Refresh");

            if new_games.is_empty() {
                tracing::info!("✅ All trading-card drops exhausted, stopping");
                self.client.stop_idling().await?;
                return Ok(LoopControl::Stop);
            }
            if new_games != *games {
                tracing::info!("Updating games from {} to {}", games.len(), new_games.len());
                self.client.refresh_games(&new_games).await?;
                *games = new_games;
            }
        }

        if !self.client.is_connected().await {
            tracing::warn!("Lost connection to Steam, restarting idling...");
            self.client.start_idling(games).await?;
        }
        Ok(LoopControl::Continue)
    }

    async fn cleanup(&mut self) {
        tracing::info!("Cleaning up...");
        if let Err(e) = self.client.stop_idling().await {
            tracing::error!("Failed to stop idling: {}", e);
        }
        if let Err(e) = self.client.logout().await {
            tracing::error!("Error during logout: {}", e);
        }
        tracing::info!("Steam Idle Bot stopped");
    }
}

/// Resolved configuration and candidate list shown by `--dry-run`.
pub fn dry_run_summary(settings: &Settings) -> String {
    let games = settings.configured_games();
    let api_key = if settings.has_api_key() { "Set" } else { "Not set" };
    [
        "Configuration:".to_string(),
        format!("  - Filter Trading Cards: {}", settings.filter_trading_cards),
        format!("  - Skip Completed Card Drops: {}", settings.filter_completed_card_drops),
        format!("  - Use Owned Games: {}", settings.use_owned_games),
        format!("  - Max Games to Idle: {}", settings.max_games_to_idle),
        format!(
            "  - Card Cache: {}",
            if settings.enable_card_cache { settings.card_cache_path.as_str() } else { "disabled" }
        ),
        format!("  - Steam API Key: {}", api_key),
        format!("  - Games to idle: {} games", games.len()),
        format!("  - Game IDs: {:?}", games),
    ]
    .join("\n")
}
