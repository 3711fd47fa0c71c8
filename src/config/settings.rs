use crate::domain::model::AppId;
use crate::utils::error::{BotError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Steam allows at most 32 games in "currently playing".
pub const STEAM_MAX_GAMES: usize = 32;

const LOG_LEVELS: [&str; 5] = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

mod optional_secret {
    use secrecy::SecretString;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(value
            .filter(|v| !v.trim().is_empty())
            .map(|v| SecretString::new(v.into())))
    }
}

/// Base URLs of the Steam services the bot talks to.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SteamEndpoints {
    pub store_url: String,
    pub web_api_url: String,
    pub community_url: String,
}

impl Default for SteamEndpoints {
    fn default() -> Self {
        Self {
            store_url: "https://store.steampowered.com".to_string(),
            web_api_url: "https://api.steampowered.com".to_string(),
            community_url: "https://steamcommunity.com".to_string(),
        }
    }
}

impl SteamEndpoints {
    /// Points every service at one base URL (mock servers in tests).
    pub fn single(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        Self {
            store_url: base.clone(),
            web_api_url: base.clone(),
            community_url: base,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Steam credentials
    #[serde(alias = "USERNAME")]
    pub username: Option<String>,
    #[serde(alias = "PASSWORD", deserialize_with = "optional_secret::deserialize")]
    pub password: Option<SecretString>,
    #[serde(alias = "STEAM_API_KEY", deserialize_with = "optional_secret::deserialize")]
    pub steam_api_key: Option<SecretString>,
    /// SteamID64 or vanity name; resolved after login when absent.
    pub steam_id: Option<String>,

    // Game selection
    #[serde(alias = "GAME_APP_IDS")]
    pub game_app_ids: Vec<AppId>,
    #[serde(alias = "FILTER_TRADING_CARDS")]
    pub filter_trading_cards: bool,
    #[serde(alias = "USE_OWNED_GAMES")]
    pub use_owned_games: bool,
    #[serde(alias = "MAX_GAMES_TO_IDLE")]
    pub max_games_to_idle: usize,
    pub filter_completed_card_drops: bool,
    pub exclude_app_ids: Vec<AppId>,

    // Logging
    #[serde(alias = "LOG_LEVEL")]
    pub log_level: String,
    pub log_file: Option<String>,
    pub log_json: bool,
    /// Directory for filtering reports; unset disables them.
    pub report_dir: Option<String>,

    // HTTP
    pub api_timeout: u64,
    pub rate_limit_delay: f64,
    pub retry_total: u32,
    pub retry_backoff_factor: f64,

    // Trading-card cache
    pub enable_card_cache: bool,
    pub card_cache_path: String,
    pub card_cache_ttl_days: u64,
    pub max_checks: Option<u32>,
    pub skip_failures: bool,

    // Idle loop
    pub poll_interval_secs: u64,
    pub refresh_interval_secs: u64,
    /// Helper command launched once per idled game; `{appid}` is substituted.
    pub idle_command: Vec<String>,

    pub endpoints: SteamEndpoints,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            steam_api_key: None,
            steam_id: None,
            game_app_ids: vec![570, 730],
            filter_trading_cards: true,
            use_owned_games: true,
            max_games_to_idle: 30,
            filter_completed_card_drops: true,
            exclude_app_ids: Vec::new(),
            log_level: "INFO".to_string(),
            log_file: None,
            log_json: false,
            report_dir: Some("logs".to_string()),
            api_timeout: 10,
            rate_limit_delay: 0.5,
            retry_total: 3,
            retry_backoff_factor: 0.5,
            enable_card_cache: true,
            card_cache_path: ".cache/trading_cards.json".to_string(),
            card_cache_ttl_days: 30,
            max_checks: None,
            skip_failures: false,
            poll_interval_secs: 60,
            refresh_interval_secs: 600,
            idle_command: vec!["steam-idle".to_string(), "{appid}".to_string()],
            endpoints: SteamEndpoints::default(),
        }
    }
}

impl Settings {
    /// 從 TOML 檔案載入設定
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            BotError::config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析設定
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);
        toml::from_str(&processed)
            .map_err(|e| BotError::config(format!("TOML parsing error: {}", e)))
    }

    /// Replaces `${VAR}` with the environment value; unknown variables stay as-is.
    fn substitute_env_vars(content: &str) -> String {
        // The pattern is a literal and always compiles.
        let re = Regex::new(r"\$\{([^}]+)\}").expect("static regex");
        re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .into_owned()
    }

    /// Resolves settings the way the binaries do: file (explicit path must
    /// exist, the default may be absent), then `.env`, then the environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut settings = match config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(BotError::config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                Self::from_file(path)?
            }
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(DEFAULT_CONFIG_PATH)?
            }
            None => {
                tracing::debug!("No {} found, using defaults", DEFAULT_CONFIG_PATH);
                Self::default()
            }
        };

        load_dotenv()?;
        settings.apply_env_from(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Environment overrides: `STEAM_USERNAME`, `STEAM_PASSWORD`,
    /// `STEAM_API_KEY`, `STEAM_ID`.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(username) = get("STEAM_USERNAME") {
            self.username = Some(username);
        }
        if let Some(password) = get("STEAM_PASSWORD") {
            self.password = Some(SecretString::new(password.into()));
        }
        if let Some(key) = get("STEAM_API_KEY") {
            self.steam_api_key = Some(SecretString::new(key.into()));
        }
        if let Some(steam_id) = get("STEAM_ID") {
            self.steam_id = Some(steam_id);
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.steam_api_key.as_ref().map(|k| k.expose_secret())
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.rate_limit_delay).unwrap_or_default()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Candidate list used when no network is involved (dry run).
    pub fn configured_games(&self) -> Vec<AppId> {
        self.game_app_ids
            .iter()
            .copied()
            .take(self.max_games_to_idle)
            .collect()
    }

    /// Returns the account the idle helper presents games for.
    ///
    /// The helper rides on the already signed-in Steam client, so only the
    /// username is required; a configured password must still be real.
    pub fn ensure_credentials_configured(&self) -> Result<&str> {
        let username = validation::validate_required_field("username", &self.username)?;
        validation::validate_not_placeholder("username", username)?;
        if let Some(password) = &self.password {
            validation::validate_not_placeholder("password", password.expose_secret())?;
        }
        Ok(username.trim())
    }

    pub fn validate_config(&self) -> Result<()> {
        if let Some(username) = &self.username {
            validation::validate_not_placeholder("username", username)?;
        }
        if let Some(password) = &self.password {
            validation::validate_not_placeholder("password", password.expose_secret())?;
        }

        validation::validate_app_ids("game_app_ids", &self.game_app_ids)?;
        validation::validate_app_ids("exclude_app_ids", &self.exclude_app_ids)?;
        validation::validate_range("max_games_to_idle", self.max_games_to_idle, 1, STEAM_MAX_GAMES)?;
        validation::validate_range("api_timeout", self.api_timeout, 1, 60)?;
        validation::validate_range("rate_limit_delay", self.rate_limit_delay, 0.1, 5.0)?;
        validation::validate_range("retry_total", self.retry_total, 0, 10)?;
        validation::validate_range("retry_backoff_factor", self.retry_backoff_factor, 0.0, 10.0)?;
        validation::validate_range("card_cache_ttl_days", self.card_cache_ttl_days, 1, 365)?;
        if let Some(max_checks) = self.max_checks {
            validation::validate_range("max_checks", max_checks, 1, 10_000)?;
        }
        validation::validate_positive_number("poll_interval_secs", self.poll_interval_secs, 1)?;
        validation::validate_positive_number(
            "refresh_interval_secs",
            self.refresh_interval_secs,
            1,
        )?;

        if !LOG_LEVELS.contains(&self.log_level.to_ascii_uppercase().as_str()) {
            return Err(BotError::invalid_value(
                "log_level",
                &self.log_level,
                format!("Must be one of {}", LOG_LEVELS.join(", ")),
            ));
        }

        validation::validate_path("card_cache_path", &self.card_cache_path)?;
        if let Some(dir) = &self.report_dir {
            validation::validate_path("report_dir", dir)?;
        }

        match self.idle_command.first() {
            Some(program) => validation::validate_non_empty_string("idle_command", program)?,
            None => {
                return Err(BotError::invalid_value(
                    "idle_command",
                    "[]",
                    "Command cannot be empty",
                ))
            }
        }

        validation::validate_url("endpoints.store_url", &self.endpoints.store_url)?;
        validation::validate_url("endpoints.web_api_url", &self.endpoints.web_api_url)?;
        validation::validate_url("endpoints.community_url", &self.endpoints.community_url)?;

        Ok(())
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

fn dotenv_disabled() -> bool {
    matches!(
        std::env::var("DOTENV_DISABLED").ok().as_deref(),
        Some("true") | Some("1")
    )
}

/// Loads `.env` when present. Parse errors never echo the offending line.
pub fn load_dotenv() -> Result<()> {
    if dotenv_disabled() {
        return Ok(());
    }

    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(dotenvy::Error::LineParse(_, idx)) => Err(BotError::config(format!(
            ".env parse error at position {}",
            idx
        ))),
        Err(dotenvy::Error::Io(e)) => Err(BotError::config(format!(
            "Failed to read .env: {}",
            e.kind()
        ))),
        Err(_) => Err(BotError::config("Failed to load .env")),
    }
}
