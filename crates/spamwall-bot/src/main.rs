//! spamwall bot
//!
//! Chat spam-defense engine. The chat transport feeds it one JSON event per
//! line on stdin and reads one JSON outcome per line from stdout.

use anyhow::Result;
use clap::{Parser, Subcommand};
use spamwall_core::ScopeId;
use spamwall_store::StateStore;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};

mod config;
mod service;

use config::BotConfig;
use service::{BotEvent, BotOutcome, SpamService};

#[derive(Parser, Debug)]
#[command(name = "spamwall-bot")]
#[command(about = "Chat spam-defense engine", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: String,

    /// Store snapshot path
    #[arg(short, long, global = true)]
    snapshot: Option<PathBuf>,

    /// Extra tokenizer dictionary
    #[arg(long, global = true)]
    user_dict: Option<PathBuf>,

    /// Train confident spam immediately instead of waiting for the batch
    #[arg(long, global = true)]
    inline_training: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON
    #[arg(long, env = "SPAMWALL_JSON_LOGS", global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process events from stdin until EOF or a shutdown signal (default)
    Run,

    /// Print the tokens of a text
    Tokenize { text: String },

    /// Train from a JSON-lines file of labelled examples
    Import { file: PathBuf },

    /// Recompute a scope from its examples
    Rebuild {
        #[arg(allow_negative_numbers = true)]
        scope: i64,
    },

    /// Show a scope's counts and top tokens, or list every scope
    Stats {
        #[arg(allow_negative_numbers = true)]
        scope: Option<i64>,

        #[arg(short, long, default_value = "10")]
        top: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.json_logs);
    describe_metrics();

    let config = BotConfig::load(&cli.config, &cli)?;
    info!("Configuration loaded from {}", cli.config);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Tokenize { text } => {
            let service = SpamService::new(config, Default::default())?;
            let tokenizer = &service.engine().tokenizer;
            println!("{}", tokenizer.normalize(&text));
            println!("{}", serde_json::to_string(&tokenizer.tokenize(&text))?);
            Ok(())
        }
        Command::Import { file } => {
            let mut service = SpamService::open(config)?;
            let reader = std::io::BufReader::new(std::fs::File::open(&file)?);
            let imported = service.import(reader).await?;
            service.run_pending_jobs().await;
            service.save_snapshot()?;
            println!("imported {} examples from {}", imported, file.display());
            Ok(())
        }
        Command::Rebuild { scope } => {
            let service = SpamService::open(config)?;
            let state = service.engine().classifier.rebuild(ScopeId(scope)).await?;
            service.save_snapshot()?;
            println!(
                "scope {}: {} spam / {} ham messages, {} tokens",
                state.scope,
                state.total_spam_messages,
                state.total_ham_messages,
                state.distinct_vocabulary()
            );
            Ok(())
        }
        Command::Stats { scope: None, .. } => {
            let service = SpamService::open(config)?;
            for state in service.store().list_states().await? {
                println!(
                    "{}\t{}\t{}\t{} spam / {} ham",
                    state.scope,
                    state.target,
                    state.display_name,
                    state.total_spam_messages,
                    state.total_ham_messages
                );
            }
            Ok(())
        }
        Command::Stats {
            scope: Some(scope),
            top,
        } => {
            let service = SpamService::open(config)?;
            let Some(state) = service.engine().classifier.state(ScopeId(scope)).await? else {
                println!("scope {} has no classifier yet", scope);
                return Ok(());
            };
            println!(
                "{} ({}, {}): {} spam / {} ham messages, {} tokens",
                state.scope,
                state.display_name,
                state.target,
                state.total_spam_messages,
                state.total_ham_messages,
                state.distinct_vocabulary()
            );
            for (label, words) in [
                ("spam", state.top_spam_words(top)),
                ("ham", state.top_ham_words(top)),
            ] {
                let words: Vec<String> = words
                    .into_iter()
                    .map(|(word, count)| format!("{}:{}", word, count))
                    .collect();
                println!("  top {}: {}", label, words.join(" "));
            }
            Ok(())
        }
    }
}

/// Event loop: stdin events in, stdout outcomes out
async fn run(config: BotConfig) -> Result<()> {
    let save_interval = config.snapshot.save_interval();
    let mut service = SpamService::open(config)?;
    let background = service.start_background();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut save_tick = save_interval.map(tokio::time::interval);
    if let Some(tick) = save_tick.as_mut() {
        tick.tick().await;
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!("Reading events from stdin");
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                warn!("Shutdown signal received, stopping...");
                break;
            }
            Some(_) = next_tick(&mut save_tick) => {
                if let Err(e) = service.save_snapshot() {
                    warn!("Periodic snapshot failed: {:#}", e);
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let outcome = match serde_json::from_str::<BotEvent>(&line) {
                    Ok(event) => service.handle(event).await,
                    Err(e) => {
                        warn!("Malformed event: {}", e);
                        BotOutcome::Error {
                            message: format!("malformed event: {}", e),
                        }
                    }
                };

                let mut stdout = std::io::stdout().lock();
                serde_json::to_writer(&mut stdout, &outcome)?;
                writeln!(stdout)?;
                stdout.flush()?;
            }
        }
    }

    if let Some(background) = background {
        background.shutdown().await;
    }
    service.save_snapshot()?;
    info!("Shutdown complete");
    Ok(())
}

/// Next periodic tick, or never when periodic saves are off
async fn next_tick(interval: &mut Option<tokio::time::Interval>) -> Option<tokio::time::Instant> {
    match interval {
        Some(interval) => Some(interval.tick().await),
        None => std::future::pending().await,
    }
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging. Logs go to stderr; stdout carries outcomes.
fn init_tracing(verbose: bool, json: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("spamwall=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spamwall=info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Register metric descriptions with whatever recorder is installed
fn describe_metrics() {
    metrics::describe_counter!(
        "spamwall_detections_total",
        "Messages judged, by deciding stage"
    );
    metrics::describe_histogram!(
        "spamwall_classify_latency_us",
        metrics::Unit::Microseconds,
        "Naive Bayes classification latency in microseconds"
    );
    metrics::describe_counter!("spamwall_examples_trained_total", "Examples folded into a classifier");
    metrics::describe_counter!("spamwall_rebuilds_total", "Scope rebuilds from the example log");
    metrics::describe_counter!("spamwall_batch_flushes_total", "Debounced batches submitted as jobs");
    metrics::describe_counter!("spamwall_jobs_total", "Background jobs run, by job and outcome");
    metrics::describe_counter!("spamwall_bans_total", "Senders banned after repeated spam");
}
