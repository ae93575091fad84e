//! `chanwatchd` — the topic-keeper notification bus composition root.
//!
//! Wires the persistent store, the two HTTP collaborators, the dispatcher
//! worker pool, every platform adapter, and the sender loop together, then
//! runs until `SIGINT`/`SIGTERM`, draining in the order spec §5 describes:
//! adapters stop accepting new events, dispatcher workers drain their
//! shards, then the sender drains the delivery queue.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::info;

use chanwatch::adapters::{mattermost, telegram, vk};
use chanwatch::config::ChanwatchConfig;
use chanwatch::dispatcher::{Dispatcher, DispatcherConfig};
use chanwatch::event::Platform;
use chanwatch::matcher::MatcherClient;
use chanwatch::sender;
use chanwatch::store::{apply_schema, SqliteStore, Store};
use chanwatch::summarizer::SummarizerClient;
use chanwatch::transport::{MattermostTransport, TelegramTransport, Transport};

/// The default model name used against the summarizer collaborator.
const SUMMARIZER_MODEL: &str = "gpt-4o-mini";

/// VK steady-state poll interval. Distinct from the partition-refresh
/// interval: groups are polled far more often than the watch-list is
/// re-sharded (spec §4.4).
const VK_POLL_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Parser)]
#[command(name = "chanwatchd", about = "Topic-keeper notification bus")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the ingestion/dispatch/delivery pipeline until shut down.
    Run,
    /// Apply the store's schema and exit, without starting any adapter.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ChanwatchConfig::load().context("failed to load configuration")?;

    match cli.command {
        Command::Migrate => run_migrate(&config).await,
        Command::Run => run(config).await,
    }
}

async fn run_migrate(config: &ChanwatchConfig) -> Result<()> {
    chanwatch::logging::init_cli();
    info!(connection = %config.store.connection_string, "applying store schema");
    let options: sqlx::sqlite::SqliteConnectOptions = config
        .store
        .connection_string
        .parse()
        .context("failed to parse store connection string")?;
    let db = sqlx::sqlite::SqlitePoolOptions::new()
        .connect_with(options.create_if_missing(true))
        .await
        .context("failed to connect to store")?;
    apply_schema(&db).await.context("failed to apply schema")?;
    info!("schema applied");
    Ok(())
}

async fn run(config: ChanwatchConfig) -> Result<()> {
    let _logging_guard = chanwatch::logging::init_production(&PathBuf::from("logs"))
        .context("failed to initialize logging")?;
    info!("chanwatchd starting");

    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::connect(&config.store.connection_string)
            .await
            .context("failed to connect to store")?,
    );

    let http_timeout = Duration::from_secs(config.tuning.http_timeout_secs);
    let matcher = Arc::new(MatcherClient::new(
        config.collaborators.matcher_url.clone(),
        http_timeout,
    ));
    let summarizer = if config.summarizer_enabled() {
        Some(Arc::new(SummarizerClient::new(
            "https://api.openai.com".to_string(),
            SUMMARIZER_MODEL,
            Duration::from_secs(config.tuning.summarizer_timeout_secs),
        )))
    } else {
        info!("no summarizer API key configured, falling back to truncation for every event");
        None
    };

    let (delivery_tx, delivery_rx) = mpsc::channel(config.tuning.queue_capacity);
    let dispatcher = Arc::new(Dispatcher::spawn(DispatcherConfig {
        n_work: config.tuning.n_work,
        queue_capacity: config.tuning.queue_capacity,
        store: Arc::clone(&store),
        matcher,
        summarizer,
        summary_len: config.tuning.summary_len,
        cooldown_secs: i64::try_from(config.tuning.cooldown_secs).unwrap_or(i64::MAX),
        delivery_tx,
    }));

    let mut transports: HashMap<Platform, Arc<dyn Transport>> = HashMap::new();
    if let Some(token) = &config.credentials.telegram_bot_token {
        transports.insert(
            Platform::Telegram,
            Arc::new(TelegramTransport::new(token.clone())) as Arc<dyn Transport>,
        );
    }
    if !config.collaborators.mattermost_team.is_empty() {
        if let Some(token) = &config.credentials.mattermost_token {
            transports.insert(
                Platform::Mattermost,
                Arc::new(MattermostTransport::new(
                    config.collaborators.mattermost_server_url.clone(),
                    token.clone(),
                )) as Arc<dyn Transport>,
            );
        }
    }
    let sender_handle = sender::spawn(delivery_rx, Arc::clone(&store), transports);

    let (telegram_shutdown_tx, telegram_shutdown_rx) = watch::channel(false);
    let telegram_handle = config.credentials.telegram_bot_token.clone().map(|bot_token| {
        let store = Arc::clone(&store);
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(telegram::run(
            telegram::TelegramConfig {
                bot_token,
                poll_timeout_secs: 30,
            },
            store,
            dispatcher,
            telegram_shutdown_rx,
        ))
    });

    let mattermost_handle = config.credentials.mattermost_token.clone().map(|token| {
        mattermost::spawn(
            mattermost::MattermostConfig {
                server_url: config.collaborators.mattermost_server_url.clone(),
                team: config.collaborators.mattermost_team.clone(),
                token,
            },
            Arc::clone(&dispatcher),
        )
    });

    let vk_adapter = config.credentials.vk_token.clone().map(|token| {
        let api = Arc::new(vk::VkApiClient::new(
            config.collaborators.vk_api_url.clone(),
            token,
            http_timeout,
        ));
        vk::spawn(
            Arc::clone(&store),
            api,
            Arc::clone(&dispatcher),
            config.tuning.n_vk,
            config.tuning.n_vk_hist,
            Duration::from_secs(config.tuning.t_refresh_secs),
            VK_POLL_INTERVAL,
        )
    });

    info!("chanwatchd running, press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to install ctrl-c handler")?;
    info!("shutdown signal received, draining");

    let _ = telegram_shutdown_tx.send(true);
    if let Some(handle) = telegram_handle {
        let _ = handle.await;
    }
    if let Some(handle) = mattermost_handle {
        handle.abort();
        let _ = handle.await;
    }
    if let Some(adapter) = vk_adapter {
        adapter.shutdown().await;
    }

    match Arc::try_unwrap(dispatcher) {
        Ok(dispatcher) => dispatcher.shutdown().await,
        Err(dispatcher) => {
            tracing::warn!("dispatcher still has outstanding references at shutdown, skipping drain");
            drop(dispatcher);
        }
    }
    drop(store);
    sender_handle.await.context("sender task panicked")?;

    info!("chanwatchd stopped");
    Ok(())
}
