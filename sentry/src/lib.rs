//! Autonomous per-pair trading daemon: signal evaluation, confirmation
//! and cooldown gating, order execution, and reconciliation (spec §1).

pub mod bot_evaluator;
pub mod candle_cache;
pub mod config;
pub mod confirmation;
pub mod control;
pub mod daemon;
pub mod error;
pub mod ticker_router;

pub use bot_evaluator::{BotEvaluator, BotEvaluatorConfig, BotStatusSnapshot};
pub use confirmation::{BlockingReason, Confirmation, Intent};
pub use control::{ControlRequest, ControlResponse};
pub use daemon::Daemon;
pub use error::{validate_bot_config, BotConfigError, SentryError};
pub use ticker_router::TickerRouter;
