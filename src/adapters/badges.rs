use crate::adapters::http::HttpSession;
use crate::config::Settings;
use crate::domain::model::{AppId, DropFilterOutcome};
use crate::domain::ports::DropFilter;
use crate::utils::error::{BotError, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::collections::HashMap;

/// Reads badge progress from `IPlayerService/GetBadges` to find games whose
/// card drops are exhausted.
pub struct BadgeService {
    http: HttpSession,
    web_api_url: String,
    api_key: Option<SecretString>,
}

impl BadgeService {
    pub fn new(http: HttpSession, web_api_url: impl Into<String>, api_key: Option<SecretString>) -> Self {
        Self {
            http,
            web_api_url: web_api_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn from_settings(settings: &Settings, http: HttpSession) -> Self {
        Self::new(
            http,
            &settings.endpoints.web_api_url,
            settings.steam_api_key.clone(),
        )
    }

    /// `appid -> cards_remaining` for every badge that reports a count.
    pub async fn fetch_cards_remaining(&self, steam_id: &str) -> Result<HashMap<AppId, i64>> {
        let key = self
            .api_key
            .as_ref()
            .map(|k| k.expose_secret().to_string())
            .ok_or_else(|| BotError::BadgeServiceError {
                message: "Steam API key required to check trading-card drop progress".to_string(),
            })?;

        let url = format!("{}/IPlayerService/GetBadges/v1/", self.web_api_url);
        let query = [
            ("key", key),
            ("steamid", steam_id.to_string()),
            ("format", "json".to_string()),
        ];

        let data: Value = self.http.get_json(&url, &query).await.map_err(|e| {
            if e.is_timeout() {
                return BotError::ApiTimeout {
                    message: "Timeout retrieving badge data".to_string(),
                };
            }
            match e {
                BotError::SerializationError(_) => BotError::BadgeServiceError {
                    message: "Invalid JSON response from badge API".to_string(),
                },
                other => BotError::BadgeServiceError {
                    message: format!("Network error retrieving badge data: {}", other),
                },
            }
        })?;

        Ok(parse_badges(&data))
    }

    pub async fn filter_games_with_remaining_cards(
        &self,
        games: &[AppId],
        steam_id: &str,
    ) -> Result<Vec<AppId>> {
        Ok(self.filter_outcome(games, steam_id).await?.kept)
    }

    async fn filter_outcome(&self, games: &[AppId], steam_id: &str) -> Result<DropFilterOutcome> {
        let remaining = self.fetch_cards_remaining(steam_id).await?;
        let mut outcome = DropFilterOutcome::default();
        let mut skipped = 0;

        for &app_id in games {
            match remaining.get(&app_id) {
                Some(&count) if count <= 0 => {
                    skipped += 1;
                    outcome.per_game.insert(app_id, false);
                }
                Some(_) => {
                    outcome.per_game.insert(app_id, true);
                    outcome.kept.push(app_id);
                }
                // 沒有徽章資料，保留
                None => outcome.kept.push(app_id),
            }
        }

        if skipped > 0 {
            tracing::info!(
                "Filtered out {} games with no trading-card drops remaining",
                skipped
            );
        }
        Ok(outcome)
    }
}

fn lenient_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_badges(data: &Value) -> HashMap<AppId, i64> {
    let Some(badges) = data.pointer("/response/badges").and_then(Value::as_array) else {
        return HashMap::new();
    };

    badges
        .iter()
        .filter_map(|badge| {
            let app_id = badge
                .get("appid")
                .and_then(lenient_int)
                .filter(|id| *id > 0)
                .and_then(|id| AppId::try_from(id).ok())?;
            let remaining = badge.get("cards_remaining").and_then(lenient_int)?;
            Some((app_id, remaining))
        })
        .collect()
}

#[async_trait]
impl DropFilter for BadgeService {
    async fn filter_games_with_drops(
        &self,
        games: &[AppId],
        steam_id: &str,
    ) -> Result<DropFilterOutcome> {
        self.filter_outcome(games, steam_id).await
    }
}
