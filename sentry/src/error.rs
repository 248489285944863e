use thiserror::Error;

/// Raised when a bot's persisted configuration fails validation (spec
/// §7 "Configuration error"). A bot failing validation cannot
/// transition to `RUNNING`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BotConfigError {
    #[error("signal configuration invalid: {0}")]
    InvalidSignals(#[from] sentry_ta::SignalConfigError),
    #[error("position_size_usd must be positive, got {0}")]
    NonPositiveNotional(rust_decimal::Decimal),
}

/// Top-level error aggregate for `sentryd` (spec §7, §12).
#[derive(Debug, Error)]
pub enum SentryError {
    #[error(transparent)]
    Config(#[from] BotConfigError),
    #[error(transparent)]
    Persistence(#[from] sentry_persistence::PersistenceError),
    #[error(transparent)]
    Exchange(#[from] sentry_execution::ExchangeError),
    #[error("invariant violation: {0}")]
    Invariant(#[from] sentry_execution::OrderTrackerError),
    #[error("config file error: {0}")]
    ConfigFile(#[from] std::io::Error),
    #[error("config file is not valid JSON: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Validate a bot's config before it is allowed to become `RUNNING`
/// (spec §3 invariant, §7).
pub fn validate_bot_config(config: &sentry_persistence::BotConfig) -> Result<(), BotConfigError> {
    sentry_ta::validate_signals(&config.signals)?;
    if config.envelope.position_size_usd <= rust_decimal::Decimal::ZERO {
        return Err(BotConfigError::NonPositiveNotional(config.envelope.position_size_usd));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sentry_persistence::TradeEnvelope;

    fn envelope(position_size_usd: rust_decimal::Decimal) -> TradeEnvelope {
        TradeEnvelope {
            position_size_usd,
            confirmation_minutes: 5,
            cooldown_minutes: 15,
            skip_signals_on_low_balance: true,
            min_price_step_pct: None,
        }
    }

    #[test]
    fn rejects_non_positive_notional() {
        let config = sentry_persistence::BotConfig {
            signals: vec![sentry_ta::SignalConfig {
                kind: sentry_ta::SignalKind::Rsi(sentry_ta::RsiParams {
                    period: 14,
                    buy_threshold: dec!(30),
                    sell_threshold: dec!(70),
                }),
                weight: rust_decimal::Decimal::ONE,
            }],
            envelope: envelope(dec!(0)),
        };
        assert!(matches!(
            validate_bot_config(&config),
            Err(BotConfigError::NonPositiveNotional(_))
        ));
    }
}
