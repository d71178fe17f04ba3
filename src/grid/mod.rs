//! Grid trading engine: cycle state machine, pool normalization and the
//! types shared between them.

pub mod config;
pub mod engine;
pub mod pool;
pub mod types;

pub use config::EngineConfig;
pub use engine::GridEngine;
pub use pool::PoolNormalizer;
pub use types::{CycleOutcome, CycleState, Direction, OrderLock, PoolSnapshot};
