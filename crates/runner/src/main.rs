use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use helm_gateway::{FeedConfig, HyperliquidTransport};
use helm_market_data::{MarketDataSynchronizer, SynchronizerConfig};
use helm_runner::{Control, DecisionLoop, HandlerResult, LoopConfig, Tick};
use helm_supervisor::{
    ChannelObserver, DirectoryResolver, ProcessSupervisor, SupervisorConfig, SupervisorEvent,
};
use log::{info, warn};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

#[derive(Parser)]
#[command(author, version, about = "Helm - strategy worker supervisor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start workers and supervise them until Ctrl-C
    Run {
        /// Supervisor config file (defaults apply when omitted)
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// Worker config keys (file names in the config dir)
        keys: Vec<String>,
        /// Start every discovered config with a recognizable strategy
        #[arg(long)]
        all: bool,
    },
    /// List worker configs and their detected strategy
    List {
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
    /// Stream one coin's market data through a decision loop that only logs
    Watch {
        #[arg(long)]
        coin: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        testnet: bool,
        #[arg(long, default_value_t = 30)]
        fallback_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { config, keys, all } => run(config, keys, all).await,
        Command::List { config } => list(config),
        Command::Watch {
            coin,
            user,
            testnet,
            fallback_secs,
        } => watch(coin, user, testnet, fallback_secs).await,
    }
}

fn load_supervisor_config(path: Option<PathBuf>) -> Result<SupervisorConfig> {
    match path {
        Some(path) => helm_supervisor::load_config(&path)
            .with_context(|| format!("loading supervisor config {}", path.display())),
        None => Ok(SupervisorConfig::default()),
    }
}

async fn run(config: Option<PathBuf>, mut keys: Vec<String>, all: bool) -> Result<()> {
    let config = load_supervisor_config(config)?;
    let resolver = DirectoryResolver::from_config(&config);

    if all {
        for found in resolver.discover()? {
            match found.strategy {
                Some(_) => keys.push(found.key.as_str().to_string()),
                None => warn!("[{}] Skipping config with unknown strategy", found.key),
            }
        }
    }
    if keys.is_empty() {
        bail!("no workers to start; pass config keys or --all");
    }

    let (observer, events) = ChannelObserver::new();
    let supervisor = Arc::new(
        ProcessSupervisor::builder(config, Arc::new(resolver))
            .observer(Arc::new(observer))
            .build(),
    );

    // Ends once the supervisor, and with it the observer, is dropped
    let printer = thread::Builder::new()
        .name("event-printer".to_string())
        .spawn(move || {
            for event in events {
                match event {
                    SupervisorEvent::Log { key, line } => info!("[{}] {}", key, line),
                    SupervisorEvent::Status { key, state, pid } => {
                        info!("[{}] -> {} (PID {})", key, state, pid)
                    }
                }
            }
        })?;

    let starter = Arc::clone(&supervisor);
    let started = tokio::task::spawn_blocking(move || {
        keys.iter()
            .filter(|key| match starter.start(key) {
                Ok(_) => true,
                Err(e) => {
                    warn!("[{}] {}", key, e);
                    false
                }
            })
            .count()
    })
    .await?;
    info!("{} worker(s) running; Ctrl-C to stop", started);

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    let stopper = Arc::clone(&supervisor);
    let report = tokio::task::spawn_blocking(move || stopper.stop_all()).await?;
    for (key, result) in &report.results {
        if let Err(e) = result {
            warn!("[{}] {}", key, e);
        }
    }

    drop(supervisor);
    let _ = printer.join();
    Ok(())
}

fn list(config: Option<PathBuf>) -> Result<()> {
    let config = load_supervisor_config(config)?;
    let resolver = DirectoryResolver::from_config(&config);
    for found in resolver.discover()? {
        let strategy = found
            .strategy
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!("{:<40} {}", found.key, strategy);
    }
    Ok(())
}

async fn watch(coin: String, user: String, testnet: bool, fallback_secs: u64) -> Result<()> {
    let feed = if testnet {
        FeedConfig::testnet()
    } else {
        FeedConfig::default()
    };
    let sync = Arc::new(MarketDataSynchronizer::new(
        SynchronizerConfig::new(coin, user),
        Arc::new(HyperliquidTransport::new(feed)),
    ));
    let decision_loop = DecisionLoop::new(
        Arc::clone(&sync),
        LoopConfig {
            fallback_check_ms: fallback_secs * 1_000,
            ..Default::default()
        },
    );
    let stop = decision_loop.stop_handle();

    let mut worker = tokio::task::spawn_blocking(move || {
        decision_loop.synchronizer().start()?;
        let mut net_notional = Decimal::ZERO;
        let mut handler = |tick: &Tick, sync: &MarketDataSynchronizer| -> HandlerResult {
            if let Some(book) = sync.orderbook() {
                info!(
                    "[{}] #{} {}: bid {} / ask {} (mid {}, {} bps)",
                    book.coin,
                    tick.iteration,
                    tick.trigger,
                    book.best_bid,
                    book.best_ask,
                    book.mid,
                    book.spread_bps.round_dp(2)
                );
            }
            for fill in sync.take_fills() {
                net_notional += fill.signed_notional();
                info!(
                    "[{}] Fill {:?} {} @ {} (net notional {})",
                    fill.coin, fill.side, fill.size, fill.price, net_notional
                );
            }
            Ok(Control::Continue)
        };
        let summary = decision_loop.run(&mut handler);
        decision_loop.synchronizer().stop();
        anyhow::Ok(summary)
    });

    let summary = tokio::select! {
        result = &mut worker => result??,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Stopping after the current iteration");
            stop.stop();
            worker.await??
        }
    };
    info!(
        "Iterations: {}, reconnects: {}, errors: {}",
        summary.iterations,
        summary.reconnects,
        sync.error_count()
    );
    Ok(())
}
