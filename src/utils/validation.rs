use crate::utils::error::{BotError, Result};
use url::Url;

/// Placeholder values shipped in the example configuration.
const PLACEHOLDER_CREDENTIALS: &[&str] = &["your_steam_username", "your_steam_password"];

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(BotError::invalid_value(
            field_name,
            url_str,
            "URL cannot be empty",
        ));
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(BotError::invalid_value(
                field_name,
                url_str,
                format!("Unsupported URL scheme: {}", scheme),
            )),
        },
        Err(e) => Err(BotError::invalid_value(
            field_name,
            url_str,
            format!("Invalid URL format: {}", e),
        )),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(BotError::invalid_value(
            field_name,
            path,
            "Path cannot be empty",
        ));
    }

    if path.contains('\0') {
        return Err(BotError::invalid_value(
            field_name,
            path,
            "Path contains null bytes",
        ));
    }

    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(BotError::invalid_value(
            field_name,
            value,
            format!("Value must be at least {}", min_value),
        ));
    }
    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| BotError::MissingConfigError {
        field: field_name.to_string(),
    })
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(BotError::invalid_value(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

/// Rejects the placeholder credentials from the example configuration.
pub fn validate_not_placeholder(field_name: &str, value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() || PLACEHOLDER_CREDENTIALS.contains(&trimmed.to_lowercase().as_str()) {
        return Err(BotError::invalid_value(
            field_name,
            if trimmed.is_empty() { "<empty>" } else { "<placeholder>" },
            "please provide real credentials, not placeholder values from config.example.toml",
        ));
    }
    Ok(())
}

pub fn validate_app_ids(field_name: &str, ids: &[u32]) -> Result<()> {
    if let Some(bad) = ids.iter().find(|id| **id == 0) {
        return Err(BotError::invalid_value(
            field_name,
            bad,
            "All game IDs must be positive integers",
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    // NaN 不可比較，需明確排除
    if !(value >= min && value <= max) {
        return Err(BotError::invalid_value(
            field_name,
            value,
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("store_api_url", "https://store.steampowered.com").is_ok());
        assert!(validate_url("store_api_url", "http://127.0.0.1:8080").is_ok());
        assert!(validate_url("store_api_url", "").is_err());
        assert!(validate_url("store_api_url", "invalid-url").is_err());
        assert!(validate_url("store_api_url", "ftp://example.com").is_err());
    }

    #[test]
    fn test_validate_placeholder_credentials() {
        assert!(validate_not_placeholder("username", "gaben").is_ok());
        assert!(validate_not_placeholder("username", "your_steam_username").is_err());
        assert!(validate_not_placeholder("password", " YOUR_STEAM_PASSWORD ").is_err());
        assert!(validate_not_placeholder("password", "   ").is_err());
    }

    #[test]
    fn test_validate_app_ids() {
        assert!(validate_app_ids("game_app_ids", &[570, 730]).is_ok());
        assert!(validate_app_ids("game_app_ids", &[570, 0]).is_err());
    }

    #[test]
    fn test_validate_range() {
        assert!(validate_range("max_games_to_idle", 32, 1, 32).is_ok());
        assert!(validate_range("max_games_to_idle", 33, 1, 32).is_err());
        assert!(validate_range("rate_limit_delay", 0.05, 0.1, 5.0).is_err());
        assert!(validate_range("rate_limit_delay", f64::NAN, 0.1, 5.0).is_err());
        assert!(validate_range("retry_backoff_factor", f64::INFINITY, 0.0, 10.0).is_err());
    }
}
