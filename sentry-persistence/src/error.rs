use thiserror::Error;

/// Errors from the durable store (spec §6 Persistence interface).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PersistenceError {
    #[error("bot {0} not found")]
    BotNotFound(i64),
    #[error("bot {0} already exists")]
    BotAlreadyExists(i64),
    #[error("trade record {0} not found")]
    TradeNotFound(i64),
    #[error("trade record {id} is already terminal ({status}) and cannot be transitioned")]
    TradeAlreadyTerminal { id: i64, status: &'static str },
}
