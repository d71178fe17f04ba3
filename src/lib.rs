#![deny(unreachable_pub)]

pub mod bot;
pub mod config;
pub mod errors;
pub mod grid;
pub mod market;
pub mod numeric;
pub mod retry;
pub mod venue;

pub use config::{ConfigError, Credentials, LogConfig, RunMode, Settings};
pub use errors::{BotError, BotResult};
pub use grid::{CycleOutcome, Direction, EngineConfig, GridEngine};
pub use retry::RetryPolicy;
pub use venue::{MarginVenue, SimVenue, SimVenueConfig, TradingPair};
