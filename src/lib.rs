pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliArgs;
pub use config::{Settings, SteamEndpoints};

pub use adapters::{
    BadgeService, CardCache, CardDropChecker, HttpSession, ProcessIdler, SteamLibrary,
    TradingCardDetector,
};
pub use core::{GameManager, IdleBot};
pub use utils::error::{BotError, Result};
