use crate::config::settings::Settings;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Parser)]
#[command(name = "steam-idle-bot")]
#[command(about = "Steam Idle Bot with Trading Card Support")]
#[command(after_help = "Examples:
  steam-idle-bot                    # Run normally
  steam-idle-bot --dry-run          # Test configuration
  steam-idle-bot --no-trading-cards # Skip trading card filtering
  steam-idle-bot --max-games 10     # Limit to 10 games")]
pub struct CliArgs {
    /// Do not login or contact Steam; print configuration and chosen games then exit
    #[arg(long)]
    pub dry_run: bool,

    /// Skip trading card filtering for faster startup
    #[arg(long)]
    pub no_trading_cards: bool,

    /// Include games even if all trading-card drops are exhausted
    #[arg(long)]
    pub keep_completed_drops: bool,

    /// Maximum number of games to idle (overrides config)
    #[arg(long, value_name = "N")]
    pub max_games: Option<usize>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable persistent trading-card cache
    #[arg(long)]
    pub no_cache: bool,

    /// Cap the number of trading-card checks (performance tuning)
    #[arg(long, value_name = "N")]
    pub max_checks: Option<u32>,

    /// Suppress non-timeout errors during trading-card checks
    #[arg(long)]
    pub skip_failures: bool,

    /// Log process CPU and memory usage at every refresh
    #[arg(long)]
    pub monitor: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Command-line flags win over file and environment values.
    pub fn apply_overrides(&self, settings: &mut Settings) {
        if self.no_trading_cards {
            settings.filter_trading_cards = false;
        }
        if let Some(max_games) = self.max_games {
            settings.max_games_to_idle = max_games;
        }
        if self.no_cache {
            settings.enable_card_cache = false;
        }
        if let Some(max_checks) = self.max_checks {
            settings.max_checks = Some(max_checks);
        }
        if self.skip_failures {
            settings.skip_failures = true;
        }
        if self.keep_completed_drops {
            settings.filter_completed_card_drops = false;
        }
        if self.verbose {
            settings.log_level = "DEBUG".to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_flags() {
        let args = CliArgs::parse_from([
            "steam-idle-bot",
            "--dry-run",
            "--no-trading-cards",
            "--keep-completed-drops",
            "--max-games",
            "10",
            "--config",
            "custom.toml",
            "--no-cache",
            "--max-checks",
            "50",
            "--skip-failures",
        ]);

        assert!(args.dry_run);
        assert!(args.no_trading_cards);
        assert!(args.keep_completed_drops);
        assert_eq!(args.max_games, Some(10));
        assert_eq!(args.config, Some(PathBuf::from("custom.toml")));
        assert!(args.no_cache);
        assert_eq!(args.max_checks, Some(50));
        assert!(args.skip_failures);
    }

    #[test]
    fn test_overrides_apply_to_settings() {
        let args = CliArgs::parse_from([
            "steam-idle-bot",
            "--no-trading-cards",
            "--keep-completed-drops",
            "--max-games",
            "4",
            "--no-cache",
            "--max-checks",
            "7",
            "--skip-failures",
        ]);
        let mut settings = Settings::default();

        args.apply_overrides(&mut settings);

        assert!(!settings.filter_trading_cards);
        assert!(!settings.filter_completed_card_drops);
        assert_eq!(settings.max_games_to_idle, 4);
        assert!(!settings.enable_card_cache);
        assert_eq!(settings.max_checks, Some(7));
        assert!(settings.skip_failures);
    }

    #[test]
    fn test_no_flags_keep_settings() {
        let args = CliArgs::parse_from(["steam-idle-bot"]);
        let mut settings = Settings::default();
        args.apply_overrides(&mut settings);

        assert!(settings.filter_trading_cards);
        assert!(settings.enable_card_cache);
        assert_eq!(settings.max_games_to_idle, 30);
        assert_eq!(settings.max_checks, None);
    }
}
