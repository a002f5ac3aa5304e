// Core modules
pub mod api;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod settings;
pub mod strategy;

// Re-export commonly used types
pub use api::{RequestLimiter, Venue};
pub use error::BotError;
pub use execution::{Position, Trader};
pub use indicators::IndicatorStore;
pub use models::*;
pub use settings::Settings;
pub use strategy::{Decision, Strategy, StrategyParams};

// Error handling
pub type Result<T> = std::result::Result<T, BotError>;
