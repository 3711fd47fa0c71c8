//! Scrapes the community badge page (`/gamecards/<appid>/`) to tell whether a
//! game can still drop cards. Used when the badge API is unavailable.

use crate::adapters::http::{HttpSession, RetryPolicy};
use crate::config::Settings;
use crate::domain::model::{AppId, DropFilterOutcome};
use crate::domain::ports::DropFilter;
use crate::utils::error::{BotError, Result};
use crate::utils::report::ReportWriter;
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

const PREVIEW_CHARS: usize = 500;

static COMMUNITY_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://steamcommunity\.com/").expect("static regex"));
static STEAM64: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{17}").expect("static regex"));
static PROGRESS_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<span class="progress_info_bold">([^<]+)</span>"#).expect("static regex")
});
static NUMBERS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("static regex"));
static DROP_COUNT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(\d+)\s*card drops? remaining",
        r"(?i)(\d+)\s*drops? remaining",
        r"(?i)remaining\s*:\s*(\d+)",
        r"(?i)progress_info_bold[^>]*>([^<]*(\d+)[^<]*)</span>",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

/// Builds the badge progress URL for a SteamID64, vanity name, community path
/// (`profiles/<id>`, `id/<name>`) or full community URL.
pub fn build_gamecards_url(community_url: &str, steam_id: &str, app_id: AppId) -> Result<String> {
    let base = community_url.trim_end_matches('/');
    let cleaned = steam_id.trim().trim_matches('/');
    if cleaned.is_empty() {
        return Err(BotError::CardDropCheckError {
            message: "Steam ID cannot be empty".to_string(),
        });
    }

    let cleaned = COMMUNITY_PREFIX.replace(cleaned, "");
    let cleaned = cleaned
        .strip_prefix(&format!("{}/", base))
        .unwrap_or(cleaned.as_ref());

    for prefix in ["profiles", "id"] {
        if let Some(rest) = cleaned.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) {
            let identifier = rest.trim_matches('/');
            if identifier.is_empty() {
                return Err(BotError::CardDropCheckError {
                    message: "Steam ID segment cannot be empty".to_string(),
                });
            }
            return Ok(format!("{}/{}/{}/gamecards/{}/", base, prefix, identifier, app_id));
        }
    }

    if cleaned.len() >= 17 && cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Ok(format!("{}/profiles/{}/gamecards/{}/", base, cleaned, app_id));
    }
    if let Some(m) = STEAM64.find(cleaned) {
        return Ok(format!("{}/profiles/{}/gamecards/{}/", base, m.as_str(), app_id));
    }
    Ok(format!("{}/id/{}/gamecards/{}/", base, cleaned, app_id))
}

/// Decides from the badge page HTML whether drops remain. Unknown pages
/// count as having drops.
pub fn classify_gamecards_page(content: &str) -> bool {
    let lower = content.to_lowercase();

    let mut result = if lower.contains("não dará mais cartas") {
        false
    } else if lower.contains("pode dar mais") {
        true
    } else if lower.contains("no card drops remaining") {
        false
    } else if lower.contains("can drop more") || lower.contains("drops remaining") {
        true
    } else if let Some(caps) = PROGRESS_SPAN.captures(content) {
        classify_progress_text(&caps[1].trim().to_lowercase())
    } else {
        if !(lower.contains("card drops") || lower.contains("trading cards")) {
            tracing::warn!("Could not determine drop status, assuming has drops");
        }
        true
    };

    // 明確的剩餘掉落數字優先
    for pattern in DROP_COUNT_PATTERNS.iter() {
        let Some(caps) = pattern.captures(content) else {
            continue;
        };
        if let Ok(remaining) = caps[1].trim().parse::<u32>() {
            result = remaining > 0;
            break;
        }
    }

    result
}

fn classify_progress_text(span: &str) -> bool {
    if span.contains("não dará mais") || span.contains("no card drops") {
        return false;
    }
    if span.contains("pode dar mais") || span.contains("drops remaining") {
        return true;
    }
    let numbers = NUMBERS.find_iter(span).count();
    if numbers == 0 {
        tracing::warn!("Unknown progress text '{}', assuming has drops", span);
        return true;
    }
    numbers >= 2 || span.contains("remaining")
}

pub struct CardDropChecker {
    http: HttpSession,
    community_url: String,
    report: ReportWriter,
}

impl CardDropChecker {
    pub fn new(http: HttpSession, community_url: impl Into<String>, report: ReportWriter) -> Self {
        Self {
            http,
            community_url: community_url.into(),
            report,
        }
    }

    /// Uses a browser user agent; the community site serves a stripped page otherwise.
    pub fn from_settings(settings: &Settings, report: ReportWriter) -> Result<Self> {
        let http = HttpSession::with_user_agent(
            settings.api_timeout(),
            RetryPolicy::from_settings(settings),
            BROWSER_USER_AGENT,
        )?;
        Ok(Self::new(http, &settings.endpoints.community_url, report))
    }

    pub async fn has_remaining_drops(&self, app_id: AppId, steam_id: &str) -> Result<bool> {
        Ok(self.check(app_id, steam_id).await?.0)
    }

    async fn check(&self, app_id: AppId, steam_id: &str) -> Result<(bool, String)> {
        let url = build_gamecards_url(&self.community_url, steam_id, app_id)?;
        let content = self.http.get_text(&url, &[]).await.map_err(|e| {
            if e.is_timeout() {
                BotError::ApiTimeout {
                    message: format!("Timeout checking card drops for {}", app_id),
                }
            } else {
                BotError::CardDropCheckError {
                    message: format!("Network error checking card drops for {}: {}", app_id, e),
                }
            }
        })?;

        let has_drops = classify_gamecards_page(&content);
        tracing::debug!("Game {} has drops: {}", app_id, has_drops);
        let preview: String = content.chars().take(PREVIEW_CHARS).collect();
        Ok((has_drops, preview))
    }
}

#[async_trait]
impl DropFilter for CardDropChecker {
    /// A game whose page cannot be checked is kept.
    async fn filter_games_with_drops(
        &self,
        games: &[AppId],
        steam_id: &str,
    ) -> Result<DropFilterOutcome> {
        tracing::info!("Checking card drops for {} games via web scraping...", games.len());

        let mut outcome = DropFilterOutcome::default();
        let mut previews = BTreeMap::new();
        let mut skipped = 0;

        for &app_id in games {
            match self.check(app_id, steam_id).await {
                Ok((true, preview)) => {
                    outcome.per_game.insert(app_id, true);
                    outcome.kept.push(app_id);
                    previews.insert(app_id, preview);
                }
                Ok((false, preview)) => {
                    skipped += 1;
                    tracing::info!("Filtered out game {} - no remaining drops", app_id);
                    outcome.per_game.insert(app_id, false);
                    previews.insert(app_id, preview);
                }
                Err(e) => {
                    tracing::warn!("Failed to check drops for {}: {}", app_id, e);
                    outcome.per_game.insert(app_id, true);
                    outcome.kept.push(app_id);
                }
            }
        }

        if let Err(e) = self
            .report
            .log_scraping_results(steam_id, &outcome.per_game, &previews)
        {
            tracing::debug!("Failed to write scraping report: {}", e);
        }
        if let Err(e) = self.report.log_api_results(
            "web_scraping",
            games,
            serde_json::to_value(&outcome.per_game)?,
        ) {
            tracing::debug!("Failed to write scraping report: {}", e);
        }

        if skipped > 0 {
            tracing::info!(
                "Filtered out {} games with no card drops remaining via web scraping",
                skipped
            );
        }
        Ok(outcome)
    }
}
