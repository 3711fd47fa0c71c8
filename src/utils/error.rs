use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Steam authentication failed: {message}")]
    AuthenticationError { message: String },

    #[error("Steam connection error: {message}")]
    ConnectionError { message: String },

    #[error("Steam API timeout: {message}")]
    ApiTimeout { message: String },

    #[error("Trading card detection failed: {message}")]
    TradingCardDetectionError { message: String },

    #[error("Game library error: {message}")]
    GameLibraryError { message: String },

    #[error("Rate limited by Steam (retry after {retry_after:?})")]
    RateLimitError { retry_after: Option<Duration> },

    #[error("Badge service error: {message}")]
    BadgeServiceError { message: String },

    #[error("Card drop check failed: {message}")]
    CardDropCheckError { message: String },

    #[error("Request to {url} failed after {attempts} attempts (last status {status})")]
    MaxRetriesExceeded {
        url: String,
        attempts: usize,
        status: u16,
    },

    #[error("Idle helper not available: {program}")]
    IdleHelperMissing { program: String },

    #[error("No games to idle: {reason}")]
    NoGamesToIdle { reason: String },
}

pub type Result<T> = std::result::Result<T, BotError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Authentication,
    Network,
    SteamApi,
    Filesystem,
    Data,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// Process exit code used by the binaries.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

impl BotError {
    pub fn config(message: impl Into<String>) -> Self {
        BotError::ConfigError {
            message: message.into(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        BotError::InvalidConfigValueError {
            field: field.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            BotError::ConfigError { .. }
            | BotError::MissingConfigError { .. }
            | BotError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            BotError::AuthenticationError { .. } => ErrorCategory::Authentication,
            BotError::HttpError(_)
            | BotError::ConnectionError { .. }
            | BotError::ApiTimeout { .. }
            | BotError::MaxRetriesExceeded { .. } => ErrorCategory::Network,
            BotError::TradingCardDetectionError { .. }
            | BotError::GameLibraryError { .. }
            | BotError::RateLimitError { .. }
            | BotError::BadgeServiceError { .. }
            | BotError::CardDropCheckError { .. } => ErrorCategory::SteamApi,
            BotError::IoError(_) => ErrorCategory::Filesystem,
            BotError::SerializationError(_) => ErrorCategory::Data,
            BotError::IdleHelperMissing { .. } | BotError::NoGamesToIdle { .. } => {
                ErrorCategory::Idle
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            BotError::NoGamesToIdle { .. } => ErrorSeverity::Low,
            BotError::HttpError(_)
            | BotError::ConnectionError { .. }
            | BotError::ApiTimeout { .. }
            | BotError::RateLimitError { .. }
            | BotError::MaxRetriesExceeded { .. } => ErrorSeverity::Medium,
            BotError::TradingCardDetectionError { .. }
            | BotError::GameLibraryError { .. }
            | BotError::BadgeServiceError { .. }
            | BotError::CardDropCheckError { .. }
            | BotError::SerializationError(_)
            | BotError::AuthenticationError { .. } => ErrorSeverity::High,
            BotError::ConfigError { .. }
            | BotError::MissingConfigError { .. }
            | BotError::InvalidConfigValueError { .. }
            | BotError::IdleHelperMissing { .. }
            | BotError::IoError(_) => ErrorSeverity::Critical,
        }
    }

    /// Timeouts are reported even when `skip_failures` is set.
    pub fn is_timeout(&self) -> bool {
        match self {
            BotError::ApiTimeout { .. } => true,
            BotError::HttpError(e) => e.is_timeout(),
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            BotError::MissingConfigError { .. } | BotError::ConfigError { .. } => {
                "Set STEAM_USERNAME / STEAM_PASSWORD (or edit config.toml) and try again"
            }
            BotError::InvalidConfigValueError { .. } => {
                "Fix the highlighted value in your configuration file"
            }
            BotError::AuthenticationError { .. } => {
                "Check your credentials and approve the Steam Guard request on your phone or e-mail"
            }
            BotError::ConnectionError { .. } => {
                "Make sure the Steam client is running and you are online"
            }
            BotError::ApiTimeout { .. } | BotError::HttpError(_) => {
                "Steam may be slow right now; try again later or raise api_timeout"
            }
            BotError::RateLimitError { .. } | BotError::MaxRetriesExceeded { .. } => {
                "Steam is throttling requests; raise rate_limit_delay or use --max-checks"
            }
            BotError::TradingCardDetectionError { .. } => {
                "Run with --no-trading-cards to skip the store lookup"
            }
            BotError::GameLibraryError { .. } => {
                "Check STEAM_API_KEY and that your game details are public"
            }
            BotError::BadgeServiceError { .. } | BotError::CardDropCheckError { .. } => {
                "Run with --keep-completed-drops to skip drop progress checks"
            }
            BotError::IdleHelperMissing { .. } => {
                "Install the idle helper or point idle_command at it in config.toml"
            }
            BotError::NoGamesToIdle { .. } => {
                "All card drops may be exhausted; add games to game_app_ids or use --keep-completed-drops"
            }
            BotError::IoError(_) => "Check file permissions and free disk space",
            BotError::SerializationError(_) => {
                "Delete the trading-card cache file and run again"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            BotError::MissingConfigError { field } => {
                format!("Steam credentials are not configured ({} missing)", field)
            }
            BotError::AuthenticationError { .. } => {
                "Failed to log in to Steam (Steam Guard or account lockout?)".to_string()
            }
            BotError::NoGamesToIdle { reason } => format!("Nothing to idle: {}", reason),
            BotError::IdleHelperMissing { program } => {
                format!("Idle helper '{}' was not found", program)
            }
            other => other.to_string(),
        }
    }
}
