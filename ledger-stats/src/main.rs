// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{env, path::PathBuf, process, str::FromStr, time::Duration};

use config::ConfigError;
use core_types::{config::AppConfig, RefreshMode};
use ledger_stats_service::{LedgerStatsHandle, LedgerStatsService};
use log::{info, LevelFilter, ParseLevelError};
use simple_logger::SimpleLogger;
use thiserror::Error;

const SUMMARY_LOG_INTERVAL_SECS: u64 = 30;

fn main() {
    if let Err(err) = run() {
        eprintln!("ledger-stats failed: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    let args = parse_args()?;
    let mut config = match &args.config_path {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if let Some(mode) = args.mode {
        config.refresh.default_mode = mode;
    }

    let level = LevelFilter::from_str(&config.log_level)
        .map_err(|err: ParseLevelError| AppError::LogLevel(config.log_level.clone(), err))?;
    SimpleLogger::new()
        .with_level(level)
        .init()
        .map_err(|err| AppError::Logger(err.to_string()))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(AppError::Runtime)?;
    runtime.block_on(serve(config))
}

async fn serve(config: AppConfig) -> Result<(), AppError> {
    let service = LedgerStatsService::new(&config);
    let handle = service.handle();
    info!(
        "ledger-stats starting in {} mode (active network: {})",
        service.mode(),
        service.active_network().label()
    );
    service.start();

    let mut ticker = tokio::time::interval(Duration::from_secs(SUMMARY_LOG_INTERVAL_SECS));
    ticker.tick().await;
    let shutdown = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => break signal,
            _ = ticker.tick() => log_summary(&handle),
        }
    };

    service.shutdown();
    log_summary(&handle);
    info!("ledger-stats stopped");
    shutdown.map_err(AppError::Signal)
}

fn log_summary(handle: &LedgerStatsHandle) {
    for (network, snapshot) in handle.snapshots() {
        match snapshot {
            Some(snapshot) => info!(
                "[{}] {} transactions over ledgers {}; top result {}, top type {} ({} mode, {})",
                snapshot.network_label,
                snapshot.total_transactions(),
                snapshot.ledger_range,
                snapshot.stats.most_common_result_code.as_deref().unwrap_or("-"),
                snapshot
                    .stats
                    .most_common_transaction_type
                    .as_deref()
                    .unwrap_or("-"),
                snapshot.mode,
                snapshot.timestamp.format("%H:%M:%S")
            ),
            None => match handle.last_error_for(network) {
                Some(error) => info!("[{}] no snapshot yet; last error: {error}", network.label()),
                None => info!("[{}] no snapshot yet", network.label()),
            },
        }
    }
    let metrics = handle.metrics();
    let status = handle.status();
    let states = status
        .networks
        .iter()
        .map(|(network, net)| format!("{} {:?}", network.short_name(), net.state))
        .collect::<Vec<_>>()
        .join(", ");
    info!(
        "status {:?} ({states}): {} fetches ok, {} failed, {} ledgers dropped, {} ledger closes",
        status.overall,
        metrics.fetches_succeeded,
        metrics.fetches_failed,
        metrics.ledgers_dropped,
        metrics.ledger_closes
    );
}

struct Args {
    mode: Option<RefreshMode>,
    config_path: Option<PathBuf>,
}

fn parse_args() -> Result<Args, AppError> {
    let mut args = env::args().skip(1);
    let mode = args
        .next()
        .map(|arg| RefreshMode::from_str(&arg).map_err(|_| AppError::Usage))
        .transpose()?;
    let config_path = args.next().map(PathBuf::from);
    if args.next().is_some() {
        return Err(AppError::Usage);
    }
    Ok(Args { mode, config_path })
}

#[derive(Debug, Error)]
enum AppError {
    #[error("usage: ledger-stats [live|historical] [config.toml]")]
    Usage,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid log level {0:?}: {1}")]
    LogLevel(String, ParseLevelError),
    #[error("failed to install logger: {0}")]
    Logger(String),
    #[error("failed to start runtime: {0}")]
    Runtime(std::io::Error),
    #[error("failed while waiting for shutdown signal: {0}")]
    Signal(std::io::Error),
}
