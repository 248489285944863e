//! Order placement, balance caching, and the exchange boundary (spec
//! §4.A, §4.B, §4.D, §4.H).

pub mod account_cache;
pub mod balance;
pub mod client;
pub mod error;
pub mod fill_store;
pub mod order;
pub mod simulated;
pub mod trade_executor;

pub use account_cache::AccountCache;
pub use balance::{AccountBalance, CachedBalance};
pub use client::{
    ExchangeClient, ExchangeOrderId, ExchangeOrderStatus, OrderSize, OrderStatusResponse,
    SubmitMarketOrder, TickerStream,
};
pub use error::{ExchangeError, OrderTrackerError};
pub use fill_store::{Fill, FillStore};
pub use order::{OrderTracker, ReconciliationHealth, TradeRecord, TradeStatus};
pub use simulated::{SimulatedExchange, SimulatedMarket};
pub use trade_executor::{DropReason, ExecutionOutcome, OrderIntent, TradeExecutor};
