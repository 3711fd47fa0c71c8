use crate::domain::model::{AppId, CacheStats};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub has_cards: bool,
    /// Unix timestamp (seconds) of the lookup.
    pub ts: f64,
}

/// Trading-card lookups persisted as
/// `{"<appid>": {"has_cards": bool, "ts": <unix seconds>}}`.
#[derive(Debug, Clone)]
pub struct CardCache {
    path: Option<PathBuf>,
    ttl_days: u64,
    entries: HashMap<AppId, CacheEntry>,
}

pub fn now_ts() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

impl CardCache {
    /// In-memory only; nothing is read or written.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            ttl_days: 0,
            entries: HashMap::new(),
        }
    }

    /// Loads unexpired entries from `path`. A missing or unreadable file yields
    /// an empty cache.
    pub fn load(path: impl Into<PathBuf>, ttl_days: u64) -> Self {
        let path = path.into();
        let entries = read_entries(&path, ttl_days, now_ts());
        tracing::debug!(
            "Loaded {} trading-card cache entries from {}",
            entries.len(),
            path.display()
        );
        Self {
            path: Some(path),
            ttl_days,
            entries,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.path.is_some()
    }

    pub fn ttl_days(&self) -> u64 {
        self.ttl_days
    }

    pub fn get(&self, app_id: AppId) -> Option<bool> {
        self.entries.get(&app_id).map(|e| e.has_cards)
    }

    pub fn remember(&mut self, app_id: AppId, has_cards: bool) {
        self.insert(app_id, has_cards, now_ts());
    }

    pub fn insert(&mut self, app_id: AppId, has_cards: bool, ts: f64) {
        self.entries.insert(app_id, CacheEntry { has_cards, ts });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let with_cards = self.entries.values().filter(|e| e.has_cards).count();
        CacheStats {
            cached_games: self.entries.len(),
            games_with_cards: with_cards,
            games_without_cards: self.entries.len() - with_cards,
        }
    }

    /// Writes the cache via a temp file and rename. Failures are logged, never raised.
    pub fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = write_entries(path, &self.entries) {
            tracing::debug!("Failed to save trading card cache: {}", e);
        }
    }
}

fn read_entries(path: &Path, ttl_days: u64, now: f64) -> HashMap<AppId, CacheEntry> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            tracing::debug!("Failed to load trading card cache: {}", e);
            return HashMap::new();
        }
    };

    let parsed: HashMap<String, serde_json::Value> = match serde_json::from_str(&raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!("Failed to load trading card cache: {}", e);
            return HashMap::new();
        }
    };

    let ttl_secs = ttl_days as f64 * SECONDS_PER_DAY;
    parsed
        .into_iter()
        .filter_map(|(key, value)| {
            let app_id = key.trim().parse::<AppId>().ok().filter(|id| *id > 0)?;
            let entry: CacheEntry = serde_json::from_value(value).ok()?;
            (now - entry.ts <= ttl_secs).then_some((app_id, entry))
        })
        .collect()
}

fn write_entries(path: &Path, entries: &HashMap<AppId, CacheEntry>) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    // 依 app id 排序，方便比對快取檔差異
    let ordered: BTreeMap<String, &CacheEntry> = entries
        .iter()
        .map(|(id, entry)| (id.to_string(), entry))
        .collect();
    let body = serde_json::to_string(&ordered)?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)
}
