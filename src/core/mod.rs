pub mod bot;
pub mod games;

pub use bot::IdleBot;
pub use games::GameManager;

pub use crate::domain::model::{AppId, FilteringReport};
pub use crate::domain::ports::{GameSelector, SteamClient};
pub use crate::utils::error::Result;
