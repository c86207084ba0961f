//! stage-send - Background daemon for scheduled publishing
//!
//! Arms a timer for every scheduled target, publishes when timers fire,
//! and runs a catch-up poll that picks up targets whose fire time passed
//! while the daemon was down.

use clap::Parser;
use libstagecast::config::{Config, Secrets};
use libstagecast::db::Database;
use libstagecast::logging::{LogFormat, LoggingConfig};
use libstagecast::notify::{LogNotifier, Notifier, WebhookNotifier};
use libstagecast::orchestrator::{OrchestratorConfig, PublishOrchestrator};
use libstagecast::platforms::bluesky::BlueskyClient;
use libstagecast::platforms::mastodon::MastodonClient;
use libstagecast::platforms::PlatformClient;
use libstagecast::publisher::PublishAttemptExecutor;
use libstagecast::refresher::{RetryPolicy, TokenRefresher};
use libstagecast::scheduler::{JobPayload, TokioJobScheduler};
use libstagecast::service::StagecastService;
use libstagecast::types::Platform;
use libstagecast::vault::Vault;
use libstagecast::{Result, StagecastError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "stage-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled publishing")]
#[command(long_about = "\
stage-send - Background daemon for scheduled publishing

DESCRIPTION:
    stage-send is a long-running daemon that publishes scheduled content
    at the right time. It arms a timer per pending target at startup,
    refreshes expired credentials before each publish, retries transient
    failures with backoff, and sends a notification when a target fails
    for good.

    A catch-up poll runs between timer fires so targets that came due
    while the daemon was down are still published, and recurring queues
    produce their next occurrence.

USAGE:
    # Run in foreground (logs to stderr)
    stage-send

    # Run with custom poll interval
    stage-send --poll-interval 30

    # Enable verbose logging
    stage-send --verbose

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown

CONFIGURATION:
    Configuration file: ~/.config/stagecast/config.toml
    Database location: ~/.local/share/stagecast/items.db

    Secrets come from the environment:
    STAGECAST_ENCRYPTION_KEY         base64 32-byte key (required)
    STAGECAST_MASTODON_CLIENT_ID     OAuth client id
    STAGECAST_MASTODON_CLIENT_SECRET OAuth client secret
    STAGECAST_BLUESKY_CLIENT_ID      OAuth client id
    STAGECAST_BLUESKY_CLIENT_SECRET  OAuth client secret
    STAGECAST_WEBHOOK_TOKEN          chat-bot token for failure notices

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Re-authorization required
    3 - Invalid input
")]
struct Cli {
    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    #[arg(help = "How often to run the catch-up poll (default: 60)")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,

    /// Run one catch-up pass and exit (for testing)
    #[arg(long, hide = true)]
    #[arg(help = "Process due targets once and exit (for testing)")]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("stage-send: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let secrets = Arc::new(Secrets::from_env()?);
    let vault = Arc::new(Vault::from_base64_key(&secrets.encryption_key)?);
    let db = Database::new(&config.database.path).await?;

    info!("stage-send daemon starting");

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let poll_interval = cli
        .poll_interval
        .unwrap_or(config.scheduling.poll_interval);
    info!("Poll interval: {}s", poll_interval);

    let (tx, mut rx) = mpsc::channel::<JobPayload>(64);
    let scheduler = Arc::new(TokioJobScheduler::new(tx.clone()));
    let config = Arc::new(config);

    let clients = build_clients(&config);
    if clients.is_empty() {
        return Err(StagecastError::InvalidInput(
            "no platform is enabled in the configuration".to_string(),
        ));
    }

    let refresher = Arc::new(TokenRefresher::new(
        db.clone(),
        Arc::clone(&vault),
        Arc::clone(&config),
        Arc::clone(&secrets),
        RetryPolicy::default(),
    ));
    let executor = PublishAttemptExecutor::new(db.clone(), vault, refresher, clients);
    let notifier = build_notifier(&config, &secrets);
    let orchestrator = Arc::new(PublishOrchestrator::new(
        db.clone(),
        executor,
        scheduler.clone(),
        notifier,
        OrchestratorConfig::default(),
    ));

    let service = StagecastService::from_parts(db.clone(), Arc::clone(&config), scheduler);

    // A previous run may have died between claiming a target and
    // recording its outcome; requeue those before re-arming
    let stranded = db.reset_stale_publishing().await?;
    if stranded > 0 {
        info!("Requeued {} target(s) stranded mid-publish", stranded);
    }

    // Re-arm every pending target; stale handles from a previous run are
    // overwritten
    let pending = db.pending_targets().await?;
    info!("Re-arming {} pending target(s)", pending.len());
    for target in &pending {
        service.scheduling().arm(target).await?;
    }

    if cli.once {
        catch_up(&db, &service, &orchestrator).await?;
        info!("stage-send: processed due targets once, exiting");
        return Ok(());
    }

    // Worker: one fire at a time, in arrival order
    let worker_orchestrator = Arc::clone(&orchestrator);
    let worker = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if let Err(e) = worker_orchestrator
                .handle_fire(&payload.item_id, payload.platform)
                .await
            {
                error!(
                    item_id = %payload.item_id,
                    platform = %payload.platform,
                    "fire handling failed: {}",
                    e
                );
            }
        }
    });

    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping daemon loop");
            break;
        }

        if let Err(e) = catch_up(&db, &service, &orchestrator).await {
            error!("Catch-up poll failed: {}", e);
        }

        // Sleep until next poll, checking for shutdown every second
        for _ in 0..poll_interval {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }

    worker.abort();
    info!("stage-send daemon stopped");
    Ok(())
}

/// Platform clients for every enabled platform
fn build_clients(config: &Config) -> HashMap<Platform, Arc<dyn PlatformClient>> {
    let mut clients: HashMap<Platform, Arc<dyn PlatformClient>> = HashMap::new();
    if let Some(mastodon) = config.platform(Platform::Mastodon) {
        clients.insert(
            Platform::Mastodon,
            Arc::new(MastodonClient::new(mastodon.api_base.clone())),
        );
    }
    if let Some(bluesky) = config.platform(Platform::Bluesky) {
        clients.insert(
            Platform::Bluesky,
            Arc::new(BlueskyClient::new(bluesky.api_base.clone())),
        );
    }
    clients
}

/// Webhook notifier when configured, log-only fallback otherwise
fn build_notifier(config: &Config, secrets: &Secrets) -> Arc<dyn Notifier> {
    match (&config.notifier, &secrets.webhook_token) {
        (Some(notifier), Some(token)) => Arc::new(WebhookNotifier::new(
            notifier.api_base.clone(),
            notifier.chat_id.clone(),
            token.clone(),
        )),
        _ => {
            info!("No webhook configured, failure notices go to the log");
            Arc::new(LogNotifier::new())
        }
    }
}

/// One catch-up pass: fire overdue unarmed targets and advance recurring
/// queues
async fn catch_up(
    db: &Database,
    service: &StagecastService,
    orchestrator: &PublishOrchestrator,
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();

    let due = db.due_unarmed_targets(now).await?;
    if !due.is_empty() {
        info!("Found {} overdue target(s)", due.len());
    }
    for target in due {
        orchestrator
            .handle_fire(&target.item_id, target.platform)
            .await?;
    }

    let fired = service.scheduling().process_due_recurring(now).await?;
    if fired > 0 {
        info!("Advanced {} recurring queue(s)", fired);
    }

    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) {
    let format = std::env::var("STAGECAST_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LogFormat::Text);
    let level = std::env::var("STAGECAST_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    LoggingConfig::new(format, level, verbose).init();
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| StagecastError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    let shutdown_clone = shutdown.clone();
    std::thread::spawn(move || {
        for sig in signals.forever() {
            match sig {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, stopping gracefully...");
                    shutdown_clone.store(true, Ordering::Relaxed);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(())
}
