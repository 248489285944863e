use clap::{Parser, Subcommand};
use sentry::config::Config;
use sentry::control::{send_request, serve as serve_control_socket, ControlRequest, ControlResponse};
use sentry::daemon::Daemon;
use sentry::error::validate_bot_config;
use sentry_execution::{AccountCache, OrderTracker, SimulatedExchange, SimulatedMarket};
use sentry_instrument::CandleInterval;
use sentry_persistence::{InMemoryPersistence, Persistence};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tracing::{error, info};

/// Autonomous per-pair trading daemon.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Log level, overridden by `RUST_LOG` if set.
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Tee logs to this file in addition to stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon: ticker ingest, bot workers, reconciler, account
    /// cache refresher. Blocks until SIGINT/SIGTERM.
    Run {
        #[arg(long)]
        config: PathBuf,
    },
    /// Bot lifecycle inspection, seeded from `--config`'s `bots` list.
    Bots {
        #[command(subcommand)]
        action: BotsAction,
        #[arg(long)]
        config: PathBuf,
    },
    /// Run a single reconciliation sweep over the config-seeded bots
    /// and exit.
    Reconcile {
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum BotsAction {
    List,
    Start { id: i64 },
    Stop { id: i64 },
}

fn init_logging(level: &str, log_file: Option<&PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let registry = tracing_subscriber::registry().with(filter);
    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            let file = std::sync::Mutex::new(file);
            registry
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(fmt::layer().json().with_writer(file))
                .init();
        }
        None => {
            registry.with(fmt::layer().with_target(false)).init();
        }
    }
    Ok(())
}

async fn seed_persistence(config: &Config) -> Result<InMemoryPersistence, i32> {
    let persistence = InMemoryPersistence::new();
    for bot in &config.bots {
        if let Err(err) = validate_bot_config(&bot.config) {
            error!(bot_id = bot.id, error = %err, "bot config failed validation");
            return Err(1);
        }
        if let Err(err) = persistence.create_bot(bot.clone()).await {
            error!(bot_id = bot.id, error = %err, "failed to seed bot");
            return Err(1);
        }
    }
    Ok(persistence)
}

fn build_simulated_client(config: &Config) -> Arc<SimulatedExchange> {
    let refill_per_sec = config.ratelimit.refill_per_sec.max(1);
    let interval = Duration::from_secs_f64(config.ratelimit.burst as f64 / refill_per_sec as f64);
    let rate_limiter = sentry_integration::rate_limit::RateLimiter::new(config.ratelimit.burst, interval);
    Arc::new(SimulatedExchange::with_rate_limiter(SimulatedMarket::default(), rate_limiter))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = init_logging(&cli.log_level, cli.log_file.as_ref()) {
        eprintln!("failed to initialize logging: {err}");
        std::process::exit(1);
    }

    let code = run(cli).await;
    std::process::exit(code);
}

async fn run(cli: Cli) -> i32 {
    match cli.command {
        Command::Run { config } => run_daemon(config).await,
        Command::Bots { action, config } => run_bots(action, config).await,
        Command::Reconcile { config } => run_reconcile(config).await,
    }
}

async fn run_daemon(config_path: PathBuf) -> i32 {
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load config");
            return 1;
        }
    };

    let persistence = match seed_persistence(&config).await {
        Ok(p) => Arc::new(p),
        Err(code) => return code,
    };

    let client = build_simulated_client(&config);
    let account_cache = Arc::new(AccountCache::new(
        client.clone(),
        Duration::from_secs(config.accounts.cache_ttl_seconds),
        Duration::from_secs(config.accounts.hard_stale_seconds),
    ));
    let tracker = Arc::new(OrderTracker::new(
        Duration::from_secs((config.reconciler.warning_minutes * 60) as u64),
        Duration::from_secs((config.reconciler.critical_minutes * 60) as u64),
    ));

    let daemon = Arc::new(Daemon::new(
        client,
        persistence,
        account_cache,
        tracker,
        sentry::ticker_router::DEFAULT_QUEUE_CAPACITY,
        CandleInterval::OneMinute,
    ));
    daemon.start().await;
    serve_control_socket(daemon.clone(), config.control_socket.clone());
    info!(socket = %config.control_socket.display(), "sentryd running, awaiting shutdown signal");

    spawn_reload_on_sighup(daemon.clone(), config_path);

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => error!(error = %err, "failed to listen for shutdown signal"),
    }
    daemon.shutdown().await;
    0
}

/// Re-read the config file on every SIGHUP and hot-swap each currently
/// running bot's config (spec §13).
fn spawn_reload_on_sighup<C, P>(daemon: Arc<Daemon<C, P>>, config_path: PathBuf)
where
    C: sentry_execution::ExchangeClient + 'static,
    P: Persistence + 'static,
{
    tokio::spawn(async move {
        let mut sighup = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
            Ok(signal) => signal,
            Err(err) => {
                error!(error = %err, "failed to install SIGHUP handler");
                return;
            }
        };
        loop {
            sighup.recv().await;
            info!("SIGHUP received, reloading config");
            let config = match Config::load(&config_path) {
                Ok(config) => config,
                Err(err) => {
                    error!(error = %err, "config reload failed, keeping previous config");
                    continue;
                }
            };
            for bot in &config.bots {
                if let Err(err) = validate_bot_config(&bot.config) {
                    error!(bot_id = bot.id, error = %err, "reloaded bot config failed validation, skipping");
                    continue;
                }
                daemon
                    .reload_bot_config(sentry::BotEvaluatorConfig {
                        bot_id: bot.id,
                        pair: bot.pair.clone(),
                        signals: bot.config.signals.clone(),
                        envelope: bot.config.envelope.clone(),
                    })
                    .await;
            }
        }
    });
}

async fn run_bots(action: BotsAction, config_path: PathBuf) -> i32 {
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load config");
            return 1;
        }
    };

    match action {
        BotsAction::List => {
            // Listing is a read of the config-seeded roster; it does not
            // need a running daemon.
            let persistence = match seed_persistence(&config).await {
                Ok(p) => p,
                Err(code) => return code,
            };
            for bot in persistence.list_bots().await {
                println!("{}\t{}\t{}\t{:?}", bot.id, bot.name, bot.pair.as_str(), bot.status);
            }
            0
        }
        BotsAction::Start { id } => send_lifecycle_request(&config, ControlRequest::StartBot { id }, id, "started").await,
        BotsAction::Stop { id } => send_lifecycle_request(&config, ControlRequest::StopBot { id }, id, "stopped").await,
    }
}

/// Start/stop mutate a *running* daemon's live state, so unlike `list`
/// they must go over the control socket rather than a throwaway,
/// disconnected `InMemoryPersistence` (spec §6).
async fn send_lifecycle_request(config: &Config, request: ControlRequest, id: i64, verb: &str) -> i32 {
    match send_request(&config.control_socket, &request).await {
        Ok(ControlResponse::Ok) => {
            println!("bot {id} {verb}");
            0
        }
        Ok(ControlResponse::Err { message }) => {
            eprintln!("{message}");
            1
        }
        Err(err) => {
            eprintln!("{err}");
            1
        }
    }
}

async fn run_reconcile(config_path: PathBuf) -> i32 {
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load config");
            return 1;
        }
    };
    let tracker = OrderTracker::new(
        Duration::from_secs((config.reconciler.warning_minutes * 60) as u64),
        Duration::from_secs((config.reconciler.critical_minutes * 60) as u64),
    );
    let now = chrono::Utc::now();
    let stale = tracker.pending_older_than(chrono::Duration::minutes(config.reconciler.warning_minutes), now);
    println!("{} pending trade(s) older than {} minute(s)", stale.len(), config.reconciler.warning_minutes);
    for record in &stale {
        println!(
            "trade {} bot {} pair {} notional {}",
            record.id, record.bot_id, record.pair.as_str(), record.submitted_notional_usd
        );
    }
    0
}
