//! Unix-domain control socket: the one channel by which `sentryd bots
//! start`/`stop` (a separate process invocation) reaches a running
//! `sentryd run` daemon (spec §6 "start/stop a bot by id" against the
//! live process, not just its seed config). One newline-delimited JSON
//! request per connection, one newline-delimited JSON response back.

use crate::daemon::Daemon;
use sentry_execution::ExchangeClient;
use sentry_persistence::Persistence;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Serialize, Deserialize)]
pub enum ControlRequest {
    StartBot { id: i64 },
    StopBot { id: i64 },
}

#[derive(Debug, Serialize, Deserialize)]
pub enum ControlResponse {
    Ok,
    Err { message: String },
}

/// Bind `socket_path`, discarding a stale socket file left behind by a
/// prior process, and serve requests until the process exits. Returns
/// the listener task's handle so the caller can track it alongside its
/// other background work.
pub fn serve<C, P>(daemon: Arc<Daemon<C, P>>, socket_path: PathBuf) -> JoinHandle<()>
where
    C: ExchangeClient + 'static,
    P: Persistence + 'static,
{
    tokio::spawn(async move {
        if socket_path.exists() {
            if let Err(err) = std::fs::remove_file(&socket_path) {
                error!(error = %err, path = %socket_path.display(), "failed to remove stale control socket");
                return;
            }
        }
        let listener = match UnixListener::bind(&socket_path) {
            Ok(listener) => listener,
            Err(err) => {
                error!(error = %err, path = %socket_path.display(), "failed to bind control socket");
                return;
            }
        };
        info!(path = %socket_path.display(), "control socket listening");
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(err) => {
                    warn!(error = %err, "control socket accept failed");
                    continue;
                }
            };
            let daemon = daemon.clone();
            tokio::spawn(async move {
                if let Err(err) = handle_connection(daemon, stream).await {
                    warn!(error = %err, "control connection failed");
                }
            });
        }
    })
}

async fn handle_connection<C, P>(daemon: Arc<Daemon<C, P>>, stream: UnixStream) -> std::io::Result<()>
where
    C: ExchangeClient + 'static,
    P: Persistence + 'static,
{
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let Some(line) = lines.next_line().await? else {
        return Ok(());
    };
    let response = match serde_json::from_str::<ControlRequest>(&line) {
        Ok(ControlRequest::StartBot { id }) => match daemon.start_bot(id).await {
            Ok(()) => ControlResponse::Ok,
            Err(err) => ControlResponse::Err { message: err.to_string() },
        },
        Ok(ControlRequest::StopBot { id }) => match daemon.stop_bot(id).await {
            Ok(()) => ControlResponse::Ok,
            Err(err) => ControlResponse::Err { message: err.to_string() },
        },
        Err(err) => ControlResponse::Err { message: format!("malformed control request: {err}") },
    };
    let payload = serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"Err":{"message":"failed to encode response"}}"#.to_string());
    writer.write_all(payload.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    Ok(())
}

/// Send a single request to a running daemon's control socket and wait
/// for its response. Used by the CLI's `bots start`/`bots stop`.
pub async fn send_request(socket_path: &Path, request: &ControlRequest) -> std::io::Result<ControlResponse> {
    let stream = UnixStream::connect(socket_path).await.map_err(|err| {
        std::io::Error::new(
            err.kind(),
            format!("could not reach daemon control socket at {}: {err}", socket_path.display()),
        )
    })?;
    let (reader, mut writer) = stream.into_split();
    let payload = serde_json::to_string(request).expect("ControlRequest always serializes");
    writer.write_all(payload.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    let mut lines = BufReader::new(reader).lines();
    match lines.next_line().await? {
        Some(line) => serde_json::from_str(&line).map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err)),
        None => Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "daemon closed the control connection without responding",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentry_execution::{AccountCache, AccountBalance, ExchangeError, ExchangeOrderId, OrderStatusResponse, OrderTracker, SubmitMarketOrder, TickerStream};
    use sentry_instrument::{Candle, CandleInterval, Pair};
    use sentry_persistence::{Bot, BotConfig, BotStatus, InMemoryPersistence, TradeEnvelope};
    use std::collections::HashMap;
    use std::time::Duration;

    struct DeadClient;

    #[async_trait::async_trait]
    impl ExchangeClient for DeadClient {
        async fn subscribe(&self, _pairs: &[Pair]) -> Result<TickerStream, ExchangeError> {
            unimplemented!()
        }
        async fn health(&self) -> bool {
            true
        }
        async fn get_candles(&self, _pair: &Pair, _interval: CandleInterval, _limit: usize) -> Result<Vec<Candle>, ExchangeError> {
            Ok(vec![])
        }
        async fn list_balances(&self) -> Result<HashMap<String, AccountBalance>, ExchangeError> {
            Ok(HashMap::new())
        }
        async fn submit_market_order(&self, _order: SubmitMarketOrder) -> Result<ExchangeOrderId, ExchangeError> {
            unimplemented!()
        }
        async fn get_order(&self, _id: &ExchangeOrderId) -> Result<OrderStatusResponse, ExchangeError> {
            unimplemented!()
        }
    }

    fn bot(id: i64) -> Bot {
        Bot {
            id,
            name: "test bot".to_string(),
            pair: Pair::from("BTC-USD"),
            status: BotStatus::Stopped,
            config: BotConfig {
                signals: vec![],
                envelope: TradeEnvelope {
                    position_size_usd: rust_decimal::Decimal::from(10),
                    confirmation_minutes: 5,
                    cooldown_minutes: 15,
                    skip_signals_on_low_balance: true,
                    min_price_step_pct: None,
                },
            },
        }
    }

    #[tokio::test]
    async fn round_trips_start_and_stop_over_the_socket() {
        let client = Arc::new(DeadClient);
        let persistence = Arc::new(InMemoryPersistence::new());
        persistence.create_bot(bot(1)).await.unwrap();
        let account_cache = Arc::new(AccountCache::new(client.clone(), Duration::from_secs(60), Duration::from_secs(300)));
        let tracker = Arc::new(OrderTracker::new(Duration::from_secs(600), Duration::from_secs(1800)));
        let daemon = Arc::new(Daemon::new(client, persistence.clone(), account_cache, tracker, 16, CandleInterval::OneMinute));

        let dir = std::env::temp_dir().join(format!("sentryd-control-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let socket_path = dir.join("control.sock");
        let _handle = serve(daemon.clone(), socket_path.clone());
        // Give the listener a moment to bind.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let response = send_request(&socket_path, &ControlRequest::StartBot { id: 1 }).await.unwrap();
        assert!(matches!(response, ControlResponse::Ok));
        assert_eq!(persistence.get_bot(1).await.unwrap().status, BotStatus::Running);

        let response = send_request(&socket_path, &ControlRequest::StopBot { id: 1 }).await.unwrap();
        assert!(matches!(response, ControlResponse::Ok));
        assert_eq!(persistence.get_bot(1).await.unwrap().status, BotStatus::Stopped);

        let response = send_request(&socket_path, &ControlRequest::StartBot { id: 99 }).await.unwrap();
        assert!(matches!(response, ControlResponse::Err { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
