// Adapters layer: concrete implementations of the domain ports against Steam
// (store, Web API, community site) and the local idle helper.

pub mod badges;
pub mod card_cache;
pub mod card_drops;
pub mod http;
pub mod idler;
pub mod library;
pub mod trading_cards;

pub use badges::BadgeService;
pub use card_cache::CardCache;
pub use card_drops::CardDropChecker;
pub use http::{HttpSession, RetryPolicy};
pub use idler::ProcessIdler;
pub use library::SteamLibrary;
pub use trading_cards::TradingCardDetector;
