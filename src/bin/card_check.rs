use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use steam_idle_bot::adapters::{HttpSession, TradingCardDetector};
use steam_idle_bot::domain::model::AppId;
use steam_idle_bot::utils::logger;
use steam_idle_bot::utils::validation::Validate;
use steam_idle_bot::Settings;

/// 查詢指定遊戲是否支援交換卡片
#[derive(Debug, Parser)]
#[command(name = "card-check")]
#[command(about = "Check trading-card support for Steam app ids")]
struct Args {
    /// Steam app ids to check
    #[arg(required = true, value_name = "APPID")]
    app_ids: Vec<AppId>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Do not read or write the on-disk cache
    #[arg(long)]
    no_cache: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logger::init_tool_logger(args.verbose);

    let mut settings =
        Settings::load(args.config.as_deref()).context("failed to load configuration")?;
    if args.no_cache {
        settings.enable_card_cache = false;
    }
    settings.validate().context("invalid configuration")?;

    let http = HttpSession::from_settings(&settings).context("failed to build HTTP client")?;
    let detector = TradingCardDetector::from_settings(&settings, http);

    println!("🃏 Checking {} games", args.app_ids.len());
    for (i, &app_id) in args.app_ids.iter().enumerate() {
        match detector.has_trading_cards(app_id).await {
            Ok(true) => println!("  ✅ {}: trading cards", app_id),
            Ok(false) => println!("  ➖ {}: no trading cards", app_id),
            Err(e) => println!("  ❌ {}: {}", app_id, e.user_friendly_message()),
        }
        if i + 1 < args.app_ids.len() {
            tokio::time::sleep(settings.rate_limit_delay()).await;
        }
    }
    detector.persist_cache();

    let stats = detector.cache_stats();
    println!(
        "📦 Cache: {} entries ({} with cards, {} without)",
        stats.cached_games, stats.games_with_cards, stats.games_without_cards
    );
    Ok(())
}
