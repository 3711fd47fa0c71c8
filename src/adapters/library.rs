use crate::adapters::http::HttpSession;
use crate::config::Settings;
use crate::domain::model::{AppId, OwnedGamesEnvelope, VanityEnvelope};
use crate::domain::ports::GameLibrary;
use crate::utils::error::{BotError, Result};
use crate::utils::report::ReportWriter;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Mutex;

/// Owned games through `IPlayerService/GetOwnedGames`, falling back to the
/// configured list when the Web API cannot be used.
pub struct SteamLibrary {
    http: HttpSession,
    web_api_url: String,
    api_key: Option<SecretString>,
    configured: Vec<AppId>,
    report: ReportWriter,
    owned: Mutex<Option<Vec<AppId>>>,
}

impl SteamLibrary {
    pub fn new(
        http: HttpSession,
        web_api_url: impl Into<String>,
        api_key: Option<SecretString>,
        configured: Vec<AppId>,
        report: ReportWriter,
    ) -> Self {
        Self {
            http,
            web_api_url: web_api_url.into().trim_end_matches('/').to_string(),
            api_key,
            configured,
            report,
            owned: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &Settings, http: HttpSession, report: ReportWriter) -> Self {
        Self::new(
            http,
            &settings.endpoints.web_api_url,
            settings.steam_api_key.clone(),
            settings.game_app_ids.clone(),
            report,
        )
    }

    fn memoised(&self) -> Option<Vec<AppId>> {
        self.owned.lock().ok()?.clone()
    }

    /// Calls the Web API directly; the result is memoised until `clear_cache`.
    pub async fn fetch_owned_games(&self, api_key: &str, steam_id: &str) -> Result<Vec<AppId>> {
        let url = format!("{}/IPlayerService/GetOwnedGames/v0001/", self.web_api_url);
        let query = [
            ("key", api_key.to_string()),
            ("steamid", steam_id.to_string()),
            ("format", "json".to_string()),
            ("include_appinfo", "1".to_string()),
        ];

        let envelope: OwnedGamesEnvelope = self.http.get_json(&url, &query).await.map_err(|e| {
            if e.is_timeout() {
                return BotError::ApiTimeout {
                    message: "Timeout retrieving owned games".to_string(),
                };
            }
            BotError::GameLibraryError {
                message: format!("Network error retrieving owned games: {}", e),
            }
        })?;

        let games: Vec<AppId> = envelope
            .response
            .and_then(|r| r.games)
            .ok_or_else(|| BotError::GameLibraryError {
                message: "Invalid response from Steam API".to_string(),
            })?
            .into_iter()
            .map(|g| g.appid)
            .collect();

        tracing::info!("Retrieved {} owned games via API", games.len());
        if let Ok(mut owned) = self.owned.lock() {
            *owned = Some(games.clone());
        }
        Ok(games)
    }

    fn log_source(&self, games: &[AppId], details: serde_json::Value) {
        if let Err(e) = self.report.log_api_results("owned_games", games, details) {
            tracing::debug!("Failed to write owned games report: {}", e);
        }
    }
}

#[async_trait]
impl GameLibrary for SteamLibrary {
    async fn owned_games(&self, steam_id: Option<&str>) -> Vec<AppId> {
        if let Some(games) = self.memoised() {
            return games;
        }

        let api_key = self.api_key.as_ref().map(|k| k.expose_secret().to_string());
        let (Some(api_key), Some(steam_id)) = (api_key, steam_id) else {
            tracing::warn!("Steam API key not available, using configured game list");
            self.log_source(&self.configured, serde_json::json!({"source": "config"}));
            return self.configured.clone();
        };

        match self.fetch_owned_games(&api_key, steam_id).await {
            Ok(games) => {
                self.log_source(&games, serde_json::json!({"source": "api"}));
                games
            }
            Err(e) => {
                tracing::error!("Error getting owned games: {}", e);
                self.log_source(
                    &self.configured,
                    serde_json::json!({"source": "config_fallback", "error": e.to_string()}),
                );
                self.configured.clone()
            }
        }
    }

    fn clear_cache(&self) {
        if let Ok(mut owned) = self.owned.lock() {
            *owned = None;
        }
    }
}

/// Resolves a vanity profile name to a SteamID64 through `ISteamUser/ResolveVanityURL`.
pub async fn resolve_vanity_url(
    http: &HttpSession,
    web_api_url: &str,
    api_key: &str,
    vanity: &str,
) -> Result<String> {
    let url = format!(
        "{}/ISteamUser/ResolveVanityURL/v1/",
        web_api_url.trim_end_matches('/')
    );
    let query = [("key", api_key.to_string()), ("vanityurl", vanity.to_string())];
    let envelope: VanityEnvelope = http.get_json(&url, &query).await?;

    match envelope.response {
        r if r.success == 1 => r.steamid.ok_or_else(|| BotError::AuthenticationError {
            message: format!("No steam id returned for '{}'", vanity),
        }),
        r => Err(BotError::AuthenticationError {
            message: format!(
                "Could not resolve vanity name '{}': {}",
                vanity,
                r.message.unwrap_or_else(|| "no match".to_string())
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::RetryPolicy;
    use httpmock::prelude::*;
    use std::time::Duration;

    fn http() -> HttpSession {
        let policy = RetryPolicy {
            total: 0,
            ..RetryPolicy::default()
        };
        HttpSession::new(Duration::from_secs(5), policy).unwrap()
    }

    fn library(server: &MockServer, key: Option<&str>) -> SteamLibrary {
        SteamLibrary::new(
            http(),
            server.base_url(),
            key.map(|k| SecretString::new(k.into())),
            vec![570, 730],
            ReportWriter::disabled(),
        )
    }

    #[tokio::test]
    async fn test_owned_games_are_fetched_once() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/IPlayerService/GetOwnedGames/v0001/")
                .query_param("key", "KEY")
                .query_param("steamid", "76561198000000000")
                .query_param("include_appinfo", "1");
            then.status(200).json_body(serde_json::json!({
                "response": {"game_count": 2, "games": [
                    {"appid": 440, "name": "Team Fortress 2", "playtime_forever": 10},
                    {"appid": 620, "name": "Portal 2"},
                ]}
            }));
        });

        let library = library(&server, Some("KEY"));
        let first = library.owned_games(Some("76561198000000000")).await;
        let second = library.owned_games(Some("76561198000000000")).await;

        assert_eq!(first, vec![440, 620]);
        assert_eq!(second, first);
        api_mock.assert_hits(1);

        library.clear_cache();
        library.owned_games(Some("76561198000000000")).await;
        api_mock.assert_hits(2);
    }

    #[tokio::test]
    async fn test_without_api_key_uses_configured_games() {
        let server = MockServer::start();
        let library = library(&server, None);
        assert_eq!(library.owned_games(Some("123")).await, vec![570, 730]);
    }

    #[tokio::test]
    async fn test_without_steam_id_uses_configured_games() {
        let server = MockServer::start();
        let library = library(&server, Some("KEY"));
        assert_eq!(library.owned_games(None).await, vec![570, 730]);
    }

    #[tokio::test]
    async fn test_invalid_response_falls_back_to_configured_games() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/IPlayerService/GetOwnedGames/v0001/");
            then.status(200).json_body(serde_json::json!({"response": {}}));
        });

        let library = library(&server, Some("KEY"));
        let err = library.fetch_owned_games("KEY", "123").await.unwrap_err();
        assert!(matches!(err, BotError::GameLibraryError { .. }));
        assert_eq!(library.owned_games(Some("123")).await, vec![570, 730]);
    }

    #[tokio::test]
    async fn test_resolve_vanity_url() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/ISteamUser/ResolveVanityURL/v1/")
                .query_param("vanityurl", "someone");
            then.status(200).json_body(serde_json::json!({
                "response": {"steamid": "76561198000000000", "success": 1}
            }));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/ISteamUser/ResolveVanityURL/v1/")
                .query_param("vanityurl", "nobody");
            then.status(200).json_body(serde_json::json!({
                "response": {"success": 42, "message": "No match"}
            }));
        });

        let http = http();
        let resolved = resolve_vanity_url(&http, &server.base_url(), "KEY", "someone")
            .await
            .unwrap();
        assert_eq!(resolved, "76561198000000000");

        let err = resolve_vanity_url(&http, &server.base_url(), "KEY", "nobody")
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::AuthenticationError { .. }));
    }
}
