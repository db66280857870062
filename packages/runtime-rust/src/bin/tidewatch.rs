//! Tidewatch demo runner.
//!
//! Starts a coordinator against the in-process operation cache, optionally
//! replays recorded cache notifications through it, connects the push
//! channel when a user id is given, and logs every loading change and
//! notification until Ctrl-C.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use tidewatch_core::{CacheNotification, OperationKind};
use tidewatch_runtime::push::{EnvCredentials, WsTransport};
use tidewatch_runtime::{
    load_invalidation_config, Coordinator, CoordinatorConfig, InvalidationConfig,
    LocalOperationCache, NotificationId, NotificationStore, PushConfig, ReleaseMode,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReleaseArg {
    Contributed,
    Merge,
}

impl From<ReleaseArg> for ReleaseMode {
    fn from(arg: ReleaseArg) -> Self {
        match arg {
            ReleaseArg::Contributed => Self::Contributed,
            ReleaseArg::Merge => Self::Merge,
        }
    }
}

/// Tidewatch - operation lifecycle coordinator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// STOMP-over-WebSocket endpoint of the push channel
    #[arg(long, env = "TIDEWATCH_PUSH_URL", default_value = "ws://localhost:39857/ws-notifications/websocket")]
    push_url: String,

    /// User whose notification topic to subscribe to; no push channel when absent
    #[arg(long, env = "TIDEWATCH_USER_ID")]
    user_id: Option<String>,

    /// Environment variable holding the bearer token, re-read on every reconnect
    #[arg(long, default_value = "TIDEWATCH_TOKEN")]
    token_env: String,

    /// JSON file mapping write domains to read-key prefixes
    #[arg(long, env = "TIDEWATCH_INVALIDATION_CONFIG")]
    invalidation_config: Option<PathBuf>,

    /// JSON-lines file of `{"kind": "read"|"write", "notification": {...}}` to replay
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Delay before each push reconnect attempt
    #[arg(long, default_value_t = 5000)]
    reconnect_delay_ms: u64,

    /// Lifetime of non-error notifications
    #[arg(long, default_value_t = 5000)]
    notification_ttl_ms: u64,

    /// What unregistering a notification registration releases
    #[arg(long, value_enum, default_value_t = ReleaseArg::Contributed)]
    release_mode: ReleaseArg,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Log level for tidewatch crates when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Deserialize)]
struct ReplayLine {
    kind: OperationKind,
    notification: CacheNotification,
}

fn init_tracing(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tidewatch={}", args.log_level)));
    let registry = tracing_subscriber::registry().with(filter);
    match args.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

fn coordinator_config(args: &Args) -> CoordinatorConfig {
    CoordinatorConfig {
        notification_ttl: Duration::from_millis(args.notification_ttl_ms),
        release_mode: args.release_mode.into(),
        push: PushConfig {
            url: args.push_url.clone(),
            reconnect_delay: Duration::from_millis(args.reconnect_delay_ms),
            ..PushConfig::default()
        },
    }
}

fn replay(cache: &LocalOperationCache, path: &Path) -> Result<usize> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read replay file {}", path.display()))?;
    let mut emitted = 0;
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry: ReplayLine = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid replay line", path.display(), index + 1))?;
        if cache.emit_raw(entry.kind, entry.notification) {
            emitted += 1;
        }
    }
    Ok(emitted)
}

fn log_notifications(store: NotificationStore) {
    let mut changes = store.subscribe();
    tokio::spawn(async move {
        let mut seen: HashSet<NotificationId> = HashSet::new();
        while changes.changed().await.is_ok() {
            let current = changes.borrow_and_update().clone();
            for notification in &current {
                if seen.insert(notification.id) {
                    tracing::info!(
                        id = %notification.id,
                        severity = %notification.severity,
                        message = %notification.message,
                        "notification"
                    );
                }
            }
            seen.retain(|id| current.iter().any(|n| n.id == *id));
        }
    });
}

fn log_loading(coordinator: &Coordinator) {
    let mut changes = coordinator.loading().subscribe();
    tokio::spawn(async move {
        let mut last = *changes.borrow_and_update();
        while changes.changed().await.is_ok() {
            let loading = *changes.borrow_and_update();
            if loading != last {
                tracing::info!(loading, "loading changed");
                last = loading;
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting tidewatch");

    let invalidation = match &args.invalidation_config {
        Some(path) => load_invalidation_config(path)?,
        None => InvalidationConfig::new(),
    };

    let cache = Arc::new(LocalOperationCache::new());
    let coordinator = Coordinator::new(coordinator_config(&args), cache.clone(), cache.clone());
    coordinator.attach_observers(
        cache.registry(OperationKind::Read),
        cache.registry(OperationKind::Write),
        invalidation,
    );
    log_loading(&coordinator);
    log_notifications(coordinator.notifications().clone());

    if let Some(path) = &args.replay {
        let emitted = replay(&cache, path)?;
        let invalidations = cache.take_invalidations();
        tracing::info!(emitted, invalidations = invalidations.len(), "replay finished");
    }

    if let Some(user_id) = &args.user_id {
        coordinator
            .connect_push(
                user_id,
                Arc::new(WsTransport),
                Arc::new(EnvCredentials::new(args.token_env.clone())),
            )
            .await;
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("shutdown requested");
    coordinator.shutdown().await;
    Ok(())
}
