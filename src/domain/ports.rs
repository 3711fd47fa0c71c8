use crate::domain::model::{AppId, CardFilterOptions, DropFilterOutcome};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Session with Steam that reports games as being played.
#[async_trait]
pub trait SteamClient: Send + Sync {
    async fn initialize(&mut self) -> Result<()>;
    async fn login(&mut self) -> Result<()>;
    fn steam_id(&self) -> Option<String>;
    async fn start_idling(&mut self, games: &[AppId]) -> Result<()>;
    async fn stop_idling(&mut self) -> Result<()>;
    async fn is_connected(&mut self) -> bool;
    async fn logout(&mut self) -> Result<()>;

    async fn refresh_games(&mut self, games: &[AppId]) -> Result<()> {
        self.start_idling(games).await
    }

    /// Yields while idling; implementations with their own event loop pump it here.
    async fn sleep(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Source of the user's game library.
#[async_trait]
pub trait GameLibrary: Send + Sync {
    async fn owned_games(&self, steam_id: Option<&str>) -> Vec<AppId>;
    fn clear_cache(&self);
}

/// Filters candidates down to games that support trading cards.
#[async_trait]
pub trait TradingCardFilter: Send + Sync {
    async fn filter_games_with_trading_cards(
        &self,
        games: &[AppId],
        options: CardFilterOptions,
    ) -> Vec<AppId>;
    fn clear_cache(&self);
}

/// Filters out games whose trading-card drops are exhausted.
#[async_trait]
pub trait DropFilter: Send + Sync {
    async fn filter_games_with_drops(
        &self,
        games: &[AppId],
        steam_id: &str,
    ) -> Result<DropFilterOutcome>;

    fn clear_cache(&self) {}
}

/// Chooses the games to idle for a given account.
#[async_trait]
pub trait GameSelector: Send + Sync {
    async fn games_to_idle(&self, steam_id: Option<&str>) -> Vec<AppId>;
    fn clear_cache(&self);
}
