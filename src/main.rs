// This is the entry point of the group moderation bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic): config store, rule checkers,
//   moderation pipeline, AI queue
// - `infra/` = Implementations of core traits (YAML config file, OneBot HTTP
//   API, AI providers)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Poll monitored groups and feed messages through the pipeline
// 4. Send the periodic ranking report and shut down cleanly on Ctrl-C

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::ai::{load_prompt, AiService};
use crate::core::config::ConfigStore;
use crate::core::moderation::{
    render_ranking, AdminCommands, AdminNotifier, AiModerationQueue, ChatBackend,
    IngestionDedup, MessageDispatcher, ModerationService, ViolationHandler, ViolationStats,
};
use crate::core::policy::{MonitorGroups, PolicyEngine};
use crate::infra::ai::create_provider;
use crate::infra::config::{apply_env_overrides, config_path, YamlFileSource};
use crate::infra::onebot::OneBotHttpClient;
use anyhow::Context;
use chrono::{Local, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Back-off after a failed poll round.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    let source = YamlFileSource::new(config_path());
    let path = source.path().display().to_string();
    let store = Arc::new(
        ConfigStore::open(source).with_context(|| format!("Failed to load config from {}", path))?,
    );

    // Connection settings are read once at startup; policy sections hot-reload.
    let mut settings = (*store.get().config).clone();
    apply_env_overrides(&mut settings);

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let backend: Arc<dyn ChatBackend> = Arc::new(
        OneBotHttpClient::new(&settings.bot.http_url, &settings.bot.token)
            .context("Failed to create OneBot HTTP client")?,
    );

    // AI Service
    let (provider, ai_config) =
        create_provider(&settings.ai).context("Failed to create AI provider")?;
    let system_prompt = load_prompt(
        settings.ai.prompt_dir.as_deref().map(Path::new),
        settings.ai.prompt_file.as_deref().map(Path::new),
    );
    let ai_service = Arc::new(AiService::new(
        provider,
        system_prompt,
        ai_config,
        settings.ai.max_history,
    ));
    match ai_service.warm_up().await {
        Ok(()) => tracing::info!("AI service ready"),
        Err(e) => tracing::warn!("AI warm-up failed, judgments may fail open: {}", e),
    }

    let stats = Arc::new(ViolationStats::new());
    let notifier = Arc::new(AdminNotifier::new(Arc::clone(&backend), Arc::clone(&store)));
    let handler = Arc::new(ViolationHandler::new(
        Arc::clone(&backend),
        Arc::clone(&stats),
        Arc::clone(&notifier),
    ));
    let queue = Arc::new(AiModerationQueue::start(ai_service, Arc::clone(&handler)));

    let monitor = Arc::new(MonitorGroups::new(Arc::clone(&store)));
    let policy = Arc::new(PolicyEngine::new(Arc::clone(&store)));
    let commands = Arc::new(AdminCommands::new(
        Arc::clone(&policy),
        Arc::clone(&monitor),
        Arc::clone(&notifier),
        Arc::clone(&backend),
    ));
    let service = Arc::new(
        ModerationService::new(
            Arc::clone(&store),
            Arc::clone(&monitor),
            policy,
            Arc::clone(&backend),
            handler,
            Arc::clone(&queue),
        )
        .with_admin_commands(commands),
    );
    let dispatcher = MessageDispatcher::new(settings.workers.max_concurrent_messages);

    tracing::info!(
        groups = ?monitor.groups(),
        config = %path,
        http_url = %settings.bot.http_url,
        "Group guard started"
    );

    // ========================================================================
    // BACKGROUND TASKS
    // ========================================================================

    let ranking_task = tokio::spawn(ranking_loop(
        Arc::clone(&store),
        Arc::clone(&stats),
        Arc::clone(&notifier),
    ));

    tokio::select! {
        _ = poll_loop(&store, &monitor, &backend, &service, &dispatcher) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
            }
            tracing::info!("Shutdown requested");
        }
    }

    // ========================================================================
    // SHUTDOWN
    // ========================================================================

    ranking_task.abort();
    tracing::info!(in_flight = dispatcher.in_flight(), "Waiting for message workers");
    dispatcher.drain().await;
    tracing::info!(pending = queue.pending(), "Draining AI queue");
    queue.shutdown();
    queue.join().await;
    tracing::info!("Group guard stopped");
    Ok(())
}

/// Poll every monitored group's recent history and dispatch unseen messages,
/// oldest first.
async fn poll_loop(
    store: &ConfigStore,
    monitor: &MonitorGroups,
    backend: &Arc<dyn ChatBackend>,
    service: &Arc<ModerationService>,
    dispatcher: &MessageDispatcher,
) {
    let mut dedup = IngestionDedup::default();

    loop {
        let snapshot = store.get();
        let bot = &snapshot.config.bot;
        let mut failed = false;

        for group_id in monitor.groups() {
            let events = match backend.get_group_messages(group_id, bot.history_count).await {
                Ok(events) => events,
                Err(e) => {
                    tracing::warn!(group_id, "Polling failed: {}", e);
                    failed = true;
                    continue;
                }
            };

            let now = Utc::now().timestamp();
            for event in events {
                let Some(message_id) = event.message_id else {
                    continue;
                };
                if !dedup.accept(message_id, event.time, now) {
                    continue;
                }

                let service = Arc::clone(service);
                dispatcher
                    .dispatch(async move {
                        service.handle_event(event).await;
                    })
                    .await;
            }
        }

        let wait = if failed {
            POLL_RETRY_DELAY
        } else {
            Duration::from_secs(bot.polling_interval_secs.max(1))
        };
        sleep(wait).await;
    }
}

/// Send the violation leaderboard to admins now and then every interval.
async fn ranking_loop(
    store: Arc<ConfigStore>,
    stats: Arc<ViolationStats>,
    notifier: Arc<AdminNotifier>,
) {
    loop {
        let report = store.snapshot().config.report.clone();
        let text = render_ranking(&stats.top(report.ranking_top_n), Local::now());
        let delivered = notifier.send_ranking(&text).await;
        tracing::info!(delivered, "Ranking report sent");

        sleep(Duration::from_secs(report.ranking_interval_secs.max(60))).await;
    }
}
