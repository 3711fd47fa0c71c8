use clap::Parser;
use std::sync::Arc;
use steam_idle_bot::adapters::{HttpSession, ProcessIdler};
use steam_idle_bot::core::{GameManager, IdleBot};
use steam_idle_bot::utils::error::{BotError, Result};
use steam_idle_bot::utils::monitor::ProcessMonitor;
use steam_idle_bot::utils::{logger, validation::Validate};
use steam_idle_bot::{CliArgs, Settings};

async fn run(args: &CliArgs, settings: Settings) -> Result<()> {
    let selector = Arc::new(GameManager::from_settings(&settings)?);
    let client = ProcessIdler::new(settings.clone(), HttpSession::from_settings(&settings)?);

    let monitor = ProcessMonitor::new(args.monitor);
    if monitor.is_enabled() {
        tracing::info!("🔍 System monitoring enabled");
    }

    let mut bot = IdleBot::new(settings, client, selector).with_monitor(monitor);
    bot.run(args.dry_run, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await
}

fn load_settings(args: &CliArgs) -> Result<Settings> {
    let mut settings = Settings::load(args.config.as_deref())?;
    args.apply_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn report_failure(e: &BotError) -> i32 {
    tracing::error!(
        "❌ Steam Idle Bot failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());

    // 依錯誤嚴重程度決定退出碼，Low 視為正常結束
    e.severity().exit_code()
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ Configuration validation failed: {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(e.severity().exit_code().max(1));
        }
    };

    if let Err(e) = logger::init_cli_logger(
        &settings.log_level,
        args.verbose,
        settings.log_file.as_deref(),
        settings.log_json,
    ) {
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(e.severity().exit_code());
    }
    tracing::debug!("CLI args: {:?}", args);

    match run(&args, settings).await {
        Ok(()) => {}
        Err(e) => {
            let exit_code = report_failure(&e);
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }
}
