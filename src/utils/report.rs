//! JSON reports describing how the idle list was chosen.
//!
//! Each selection pass writes `game_filtering_<timestamp>.json`; individual API
//! and scraping results are appended to `<api>_results.json` and
//! `scraping_results.json` so they can be compared across refreshes.

use crate::domain::model::{AppId, FilteringReport};
use crate::utils::error::Result;
use chrono::Local;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize)]
struct FilteringLog<'a> {
    timestamp: String,
    steam_id: &'a str,
    total_games: usize,
    games_with_cards: usize,
    games_with_drops: usize,
    final_games: usize,
    excluded_games: usize,
    details: &'a FilteringReport,
}

#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: Option<PathBuf>,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    fn ensure_dir(&self) -> Result<Option<&Path>> {
        match &self.dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                Ok(Some(dir.as_path()))
            }
            None => Ok(None),
        }
    }

    /// Writes the full filtering report and returns the file it was saved to.
    pub fn log_filtering_process(&self, report: &FilteringReport) -> Result<Option<PathBuf>> {
        let Some(dir) = self.ensure_dir()? else {
            return Ok(None);
        };

        let log = FilteringLog {
            timestamp: Local::now().to_rfc3339(),
            steam_id: &report.steam_id,
            total_games: report.all_games.len(),
            games_with_cards: report.games_with_cards.len(),
            games_with_drops: report.games_with_drops.len(),
            final_games: report.final_games.len(),
            excluded_games: report.excluded_games.len(),
            details: report,
        };

        let filename = dir.join(format!(
            "game_filtering_{}.json",
            Local::now().format("%Y%m%d_%H%M%S")
        ));
        fs::write(&filename, serde_json::to_string_pretty(&log)?)?;
        tracing::info!("Detailed filtering log saved to: {}", filename.display());
        Ok(Some(filename))
    }

    pub fn log_api_results(
        &self,
        api_name: &str,
        games: &[AppId],
        results: serde_json::Value,
    ) -> Result<()> {
        let Some(dir) = self.ensure_dir()? else {
            return Ok(());
        };

        let entry = serde_json::json!({
            "timestamp": Local::now().to_rfc3339(),
            "api_name": api_name,
            "games_count": games.len(),
            "games": games,
            "results": results,
        });
        append_entry(&dir.join(format!("{}_results.json", api_name)), entry)
    }

    pub fn log_scraping_results(
        &self,
        steam_id: &str,
        results: &BTreeMap<AppId, bool>,
        previews: &BTreeMap<AppId, String>,
    ) -> Result<()> {
        let Some(dir) = self.ensure_dir()? else {
            return Ok(());
        };

        let path = dir.join("scraping_results.json");
        let mut existing = read_entries(&path);
        let timestamp = Local::now().to_rfc3339();
        for (app_id, has_drops) in results {
            let preview = previews
                .get(app_id)
                .map(|p| {
                    let mut short: String = p.chars().take(PREVIEW_CHARS).collect();
                    short.push_str("...");
                    short
                })
                .unwrap_or_default();
            existing.push(serde_json::json!({
                "timestamp": timestamp,
                "app_id": app_id,
                "steam_id": steam_id,
                "has_drops": has_drops,
                "content_preview": preview,
            }));
        }
        fs::write(&path, serde_json::to_string_pretty(&existing)?)?;
        Ok(())
    }
}

/// Reads an append-style JSON array; a missing or corrupt file starts fresh.
fn read_entries(path: &Path) -> Vec<serde_json::Value> {
    fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<Vec<serde_json::Value>>(&raw).ok())
        .unwrap_or_default()
}

fn append_entry(path: &Path, entry: serde_json::Value) -> Result<()> {
    let mut existing = read_entries(path);
    existing.push(entry);
    fs::write(path, serde_json::to_string_pretty(&existing)?)?;
    Ok(())
}
