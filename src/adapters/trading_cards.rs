use crate::adapters::card_cache::CardCache;
use crate::adapters::http::HttpSession;
use crate::config::Settings;
use crate::domain::model::{AppId, CacheStats, CardFilterOptions, TRADING_CARDS_CATEGORY_ID};
use crate::domain::ports::TradingCardFilter;
use crate::utils::error::{BotError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

/// Detects trading-card support through the store `appdetails` endpoint.
pub struct TradingCardDetector {
    http: HttpSession,
    store_url: String,
    rate_limit_delay: Duration,
    cache: Mutex<CardCache>,
}

impl TradingCardDetector {
    pub fn new(
        http: HttpSession,
        store_url: impl Into<String>,
        rate_limit_delay: Duration,
        cache: CardCache,
    ) -> Self {
        Self {
            http,
            store_url: store_url.into().trim_end_matches('/').to_string(),
            rate_limit_delay,
            cache: Mutex::new(cache),
        }
    }

    pub fn from_settings(settings: &Settings, http: HttpSession) -> Self {
        let cache = if settings.enable_card_cache {
            CardCache::load(&settings.card_cache_path, settings.card_cache_ttl_days)
        } else {
            CardCache::in_memory()
        };
        Self::new(
            http,
            &settings.endpoints.store_url,
            settings.rate_limit_delay(),
            cache,
        )
    }

    fn cached(&self, app_id: AppId) -> Option<bool> {
        self.cache.lock().ok()?.get(app_id)
    }

    fn remember(&self, app_id: AppId, has_cards: bool) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remember(app_id, has_cards);
        }
    }

    pub fn persist_cache(&self) {
        if let Ok(cache) = self.cache.lock() {
            cache.save();
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache
            .lock()
            .map(|cache| cache.stats())
            .unwrap_or_default()
    }

    /// Returns whether `app_id` has trading cards, answering from the cache when possible.
    pub async fn has_trading_cards(&self, app_id: AppId) -> Result<bool> {
        if let Some(has_cards) = self.cached(app_id) {
            return Ok(has_cards);
        }
        let has_cards = self.lookup(app_id).await?;
        self.remember(app_id, has_cards);
        Ok(has_cards)
    }

    async fn lookup(&self, app_id: AppId) -> Result<bool> {
        let url = format!("{}/api/appdetails", self.store_url);
        let query = [
            ("appids", app_id.to_string()),
            ("filters", "categories".to_string()),
        ];

        let body: Value = self
            .http
            .get_json(&url, &query)
            .await
            .map_err(|e| classify_error(app_id, e))?;

        let entry = body
            .get(app_id.to_string())
            .filter(|entry| entry.get("success").and_then(Value::as_bool) == Some(true))
            .ok_or_else(|| BotError::TradingCardDetectionError {
                message: format!("Failed to get app details for {}", app_id),
            })?;

        // 沒有分類時 Steam 會回傳 `"data": []`
        let has_cards = entry
            .pointer("/data/categories")
            .and_then(Value::as_array)
            .map(|categories| {
                categories.iter().any(|category| {
                    category.get("id").and_then(Value::as_u64) == Some(TRADING_CARDS_CATEGORY_ID)
                })
            })
            .unwrap_or(false);

        tracing::debug!("App {} trading cards: {}", app_id, has_cards);
        Ok(has_cards)
    }
}

fn classify_error(app_id: AppId, err: BotError) -> BotError {
    if err.is_timeout() {
        return BotError::ApiTimeout {
            message: format!("Timeout checking trading cards for app {}", app_id),
        };
    }
    match err {
        BotError::RateLimitError { .. } => err,
        BotError::SerializationError(e) => BotError::TradingCardDetectionError {
            message: format!("Invalid store response for app {}: {}", app_id, e),
        },
        other => BotError::TradingCardDetectionError {
            message: format!(
                "Network error checking trading cards for app {}: {}",
                app_id, other
            ),
        },
    }
}

#[async_trait]
impl TradingCardFilter for TradingCardDetector {
    /// Keeps input order and stops once `max_games` matches are found. After
    /// `max_checks` successful store responses only cached answers are used.
    async fn filter_games_with_trading_cards(
        &self,
        games: &[AppId],
        options: CardFilterOptions,
    ) -> Vec<AppId> {
        let mut filtered = Vec::new();
        let mut checks: u32 = 0;
        let mut limit_logged = false;

        for &app_id in games {
            if filtered.len() >= options.max_games {
                break;
            }

            if let Some(has_cards) = self.cached(app_id) {
                if has_cards {
                    filtered.push(app_id);
                }
                continue;
            }

            if options.max_checks.is_some_and(|max| checks >= max) {
                if !limit_logged {
                    tracing::info!(
                        "Reached max checks ({}), using cached results only",
                        checks
                    );
                    limit_logged = true;
                }
                continue;
            }

            match self.has_trading_cards(app_id).await {
                Ok(has_cards) => {
                    checks += 1;
                    if has_cards {
                        filtered.push(app_id);
                    }
                    tokio::time::sleep(self.rate_limit_delay).await;
                }
                Err(e) if e.is_timeout() => {
                    tracing::warn!("Timeout checking trading cards for game {}: {}", app_id, e);
                }
                // 下架或 DLC 常回傳 success=false，視為沒有卡片
                Err(e @ BotError::TradingCardDetectionError { .. }) => {
                    if !options.skip_failures {
                        tracing::debug!("Trading card detection failed for app {}: {}", app_id, e);
                    }
                }
                Err(e) => {
                    if !options.skip_failures {
                        tracing::info!("Error checking trading cards for game {}: {}", app_id, e);
                    }
                }
            }
        }

        self.persist_cache();
        filtered.truncate(options.max_games);
        filtered
    }

    fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::RetryPolicy;
    use httpmock::prelude::*;
    use tempfile::TempDir;

    fn detector(server: &MockServer, cache: CardCache) -> TradingCardDetector {
        let policy = RetryPolicy {
            total: 0,
            ..RetryPolicy::default()
        };
        let http = HttpSession::new(Duration::from_secs(5), policy).unwrap();
        TradingCardDetector::new(http, server.base_url(), Duration::ZERO, cache)
    }

    fn mock_app(server: &MockServer, app_id: AppId, body: serde_json::Value) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/appdetails")
                .query_param("appids", app_id.to_string())
                .query_param("filters", "categories");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(body);
        })
    }

    fn with_categories(app_id: AppId, ids: &[u64]) -> serde_json::Value {
        let categories: Vec<_> = ids
            .iter()
            .map(|id| serde_json::json!({"id": id, "description": "category"}))
            .collect();
        serde_json::json!({ app_id.to_string(): {"success": true, "data": {"categories": categories}} })
    }

    #[tokio::test]
    async fn test_has_trading_cards_success() {
        let server = MockServer::start();
        let api_mock = mock_app(&server, 123, with_categories(123, &[2, 29]));

        let detector = detector(&server, CardCache::in_memory());
        assert!(detector.has_trading_cards(123).await.unwrap());
        api_mock.assert();

        // second call answered from memory
        assert!(detector.has_trading_cards(123).await.unwrap());
        api_mock.assert_hits(1);
    }

    #[tokio::test]
    async fn test_has_trading_cards_no_cards() {
        let server = MockServer::start();
        mock_app(&server, 123, with_categories(123, &[1]));

        let detector = detector(&server, CardCache::in_memory());
        assert!(!detector.has_trading_cards(123).await.unwrap());
        assert_eq!(detector.cache_stats().games_without_cards, 1);
    }

    #[tokio::test]
    async fn test_empty_data_array_means_no_cards() {
        let server = MockServer::start();
        mock_app(&server, 5, serde_json::json!({"5": {"success": true, "data": []}}));

        let detector = detector(&server, CardCache::in_memory());
        assert!(!detector.has_trading_cards(5).await.unwrap());
    }

    #[tokio::test]
    async fn test_has_trading_cards_api_failure() {
        let server = MockServer::start();
        mock_app(&server, 123, serde_json::json!({"123": {"success": false}}));

        let detector = detector(&server, CardCache::in_memory());
        let err = detector.has_trading_cards(123).await.unwrap_err();
        assert!(matches!(err, BotError::TradingCardDetectionError { .. }));
        assert_eq!(detector.cache_stats().cached_games, 0);
    }

    #[tokio::test]
    async fn test_has_trading_cards_network_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/appdetails");
            then.status(403);
        });

        let detector = detector(&server, CardCache::in_memory());
        let err = detector.has_trading_cards(123).await.unwrap_err();
        assert!(matches!(err, BotError::TradingCardDetectionError { .. }));
    }

    #[tokio::test]
    async fn test_has_trading_cards_timeout() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/appdetails");
            then.status(200)
                .delay(Duration::from_millis(500))
                .json_body(with_categories(123, &[29]));
        });

        let policy = RetryPolicy {
            total: 0,
            ..RetryPolicy::default()
        };
        let http = HttpSession::new(Duration::from_millis(50), policy).unwrap();
        let detector =
            TradingCardDetector::new(http, server.base_url(), Duration::ZERO, CardCache::in_memory());

        let err = detector.has_trading_cards(123).await.unwrap_err();
        assert!(matches!(err, BotError::ApiTimeout { .. }));
    }

    #[tokio::test]
    async fn test_filter_games_with_trading_cards() {
        let server = MockServer::start();
        mock_app(&server, 1, with_categories(1, &[29]));
        mock_app(&server, 2, with_categories(2, &[1]));
        mock_app(&server, 3, with_categories(3, &[29]));
        let fourth = mock_app(&server, 4, with_categories(4, &[29]));

        let detector = detector(&server, CardCache::in_memory());
        let options = CardFilterOptions {
            max_games: 2,
            ..CardFilterOptions::default()
        };
        let result = detector
            .filter_games_with_trading_cards(&[1, 2, 3, 4], options)
            .await;

        assert_eq!(result, vec![1, 3]);
        fourth.assert_hits(0);
    }

    #[tokio::test]
    async fn test_failures_are_treated_as_no_cards() {
        let server = MockServer::start();
        mock_app(&server, 1, serde_json::json!({"1": {"success": false}}));
        mock_app(&server, 2, with_categories(2, &[29]));

        let detector = detector(&server, CardCache::in_memory());
        let options = CardFilterOptions {
            max_games: 10,
            max_checks: None,
            skip_failures: true,
        };
        let result = detector.filter_games_with_trading_cards(&[1, 2], options).await;
        assert_eq!(result, vec![2]);
    }

    #[tokio::test]
    async fn test_rate_limit_delay_only_follows_successful_lookups() {
        let server = MockServer::start();
        mock_app(&server, 1, serde_json::json!({"1": {"success": false}}));
        mock_app(&server, 2, serde_json::json!({"2": {"success": false}}));
        mock_app(&server, 3, with_categories(3, &[29]));

        let policy = RetryPolicy {
            total: 0,
            ..RetryPolicy::default()
        };
        let http = HttpSession::new(Duration::from_secs(5), policy).unwrap();
        let detector = TradingCardDetector::new(
            http,
            server.base_url(),
            Duration::from_millis(400),
            CardCache::in_memory(),
        );
        let options = CardFilterOptions {
            max_games: 10,
            max_checks: None,
            skip_failures: true,
        };

        let started = std::time::Instant::now();
        let result = detector.filter_games_with_trading_cards(&[1, 2, 3], options).await;
        let elapsed = started.elapsed();

        assert_eq!(result, vec![3]);
        // one pause for app 3, none for the two failures
        assert!(elapsed >= Duration::from_millis(400));
        assert!(elapsed < Duration::from_millis(1200), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_max_checks_stops_store_lookups() {
        let server = MockServer::start();
        let first = mock_app(&server, 1, with_categories(1, &[29]));
        let second = mock_app(&server, 2, with_categories(2, &[29]));
        let third = mock_app(&server, 3, with_categories(3, &[29]));

        let mut cache = CardCache::in_memory();
        cache.remember(4, true);
        let detector = detector(&server, cache);

        let options = CardFilterOptions {
            max_games: 10,
            max_checks: Some(2),
            skip_failures: false,
        };
        let result = detector
            .filter_games_with_trading_cards(&[1, 2, 3, 4], options)
            .await;

        first.assert_hits(1);
        second.assert_hits(1);
        third.assert_hits(0);
        // cached answers are still used after the limit
        assert_eq!(result, vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn test_cache_is_persisted_after_batch() {
        let server = MockServer::start();
        mock_app(&server, 570, with_categories(570, &[29]));

        let temp_dir = TempDir::new().unwrap();
        let cache_file = temp_dir.path().join("trading_cards.json");
        let detector = detector(&server, CardCache::load(&cache_file, 30));

        let options = CardFilterOptions {
            max_games: 5,
            ..CardFilterOptions::default()
        };
        detector.filter_games_with_trading_cards(&[570], options).await;

        let reloaded = CardCache::load(&cache_file, 30);
        assert_eq!(reloaded.get(570), Some(true));
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let mut cache = CardCache::in_memory();
        cache.remember(1, true);
        cache.remember(2, false);
        let server = MockServer::start();
        let detector = detector(&server, cache);

        assert_eq!(detector.cache_stats().cached_games, 2);
        TradingCardFilter::clear_cache(&detector);
        assert_eq!(detector.cache_stats(), CacheStats::default());
    }
}
