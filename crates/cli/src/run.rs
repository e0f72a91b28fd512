//! Process wiring for `lorebot run`.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use {
    anyhow::{Context, bail},
    axum::{
        Router,
        extract::State,
        http::header,
        response::IntoResponse,
        routing::get,
    },
    lorebot_config::LorebotConfig,
    lorebot_dialogs::{
        Dispatcher, UserLanes,
        i18n::{BuiltinLocalizer, Localizer},
        memory::MemoryStore,
        render::Renderer,
        store::Stores,
    },
    lorebot_metrics::{MetricsHandle, MetricsRecorderConfig},
    lorebot_render::HtmlRenderer,
    lorebot_store::SqliteStore,
    lorebot_telegram::TelegramAccountConfig,
    tokio::{net::TcpListener, task::JoinSet},
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

use crate::db_commands;

const LANE_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn run(config: LorebotConfig, data_dir: PathBuf, ephemeral: bool) -> anyhow::Result<()> {
    if config.channels.telegram.is_empty() {
        bail!("no telegram account configured (add [channels.telegram.<id>])");
    }
    let cancel = CancellationToken::new();

    let metrics = lorebot_metrics::init_metrics(MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        global_labels: Vec::new(),
    })?;
    if config.metrics.enabled {
        let listener = TcpListener::bind(&config.metrics.listen)
            .await
            .with_context(|| format!("binding metrics endpoint {}", config.metrics.listen))?;
        info!(listen = %config.metrics.listen, "metrics endpoint listening");
        tokio::spawn(serve_metrics(listener, metrics, cancel.child_token()));
    }

    let stores = open_stores(&config, &data_dir, ephemeral).await?;
    let renderer: Arc<dyn Renderer> = Arc::new(HtmlRenderer::new());
    let localizer: Arc<dyn Localizer> = Arc::new(BuiltinLocalizer::from_config(&config.locale));
    let sessions = &config.sessions;

    let mut account_ids: Vec<&String> = config.channels.telegram.keys().collect();
    account_ids.sort();

    let mut pollers = JoinSet::new();
    let mut sweepers = Vec::new();
    let mut all_lanes = Vec::new();
    for account_id in account_ids {
        let value = &config.channels.telegram[account_id];
        let account = TelegramAccountConfig::from_value(account_id, value)?;
        let connection = lorebot_telegram::connect(account_id, account).await?;

        let dispatcher = Arc::new(
            Dispatcher::new(stores.clone(), Arc::clone(&renderer), connection.outbound())
                .with_access(config.access.clone())
                .with_localizer(Arc::clone(&localizer))
                .with_search(config.search.clone()),
        );
        let menu = dispatcher.command_menu(Some(&config.locale.default_language));
        lorebot_telegram::register_commands(&connection.bot, account_id, &menu).await;

        if sessions.idle_timeout_secs > 0 {
            sweepers.push(dispatcher.spawn_sweeper(
                Duration::from_secs(sessions.sweep_interval_secs.max(1)),
                Duration::from_secs(sessions.idle_timeout_secs),
                cancel.child_token(),
            ));
        }

        let lanes = Arc::new(UserLanes::new(
            dispatcher,
            Duration::from_secs(sessions.lane_idle_secs),
            cancel.child_token(),
        ));
        all_lanes.push(Arc::clone(&lanes));

        let state = Arc::new(connection.into_state(lanes));
        let poller = lorebot_telegram::spawn_polling(state, cancel.child_token());
        let id = account_id.clone();
        pollers.spawn(async move { (id, poller.await) });
    }

    info!(accounts = pollers.len(), ephemeral, "lorebot running");

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("shutdown requested");
                break;
            }
            finished = pollers.join_next() => match finished {
                Some(Ok((account_id, Ok(Ok(()))))) => info!(account_id, "polling stopped"),
                Some(Ok((account_id, Ok(Err(e))))) => {
                    error!(account_id, error = %e, "polling ended");
                },
                Some(Ok((account_id, Err(e)))) => {
                    error!(account_id, error = %e, "polling task failed");
                },
                Some(Err(e)) => error!(error = %e, "polling supervisor failed"),
                None => {
                    warn!("no telegram account is polling, exiting");
                    break;
                },
            },
        }
    }

    cancel.cancel();
    while pollers.join_next().await.is_some() {}
    for lanes in &all_lanes {
        lanes.shutdown(LANE_DRAIN_TIMEOUT).await;
    }
    for sweeper in sweepers {
        if let Err(e) = sweeper.await {
            warn!(error = %e, "session sweeper failed");
        }
    }
    info!("lorebot stopped");
    Ok(())
}

async fn open_stores(
    config: &LorebotConfig,
    data_dir: &Path,
    ephemeral: bool,
) -> anyhow::Result<Stores> {
    if ephemeral {
        warn!("ephemeral mode: topics and entries are kept in memory only");
        return Ok(Stores::from_backend(Arc::new(MemoryStore::new())));
    }
    let url = db_commands::database_url(config, data_dir)?;
    let pool = lorebot_store::connect(&url)
        .await
        .with_context(|| format!("opening database {url}"))?;
    lorebot_store::run_migrations(&pool).await?;
    info!(url, "database ready");
    Ok(Stores::from_backend(Arc::new(SqliteStore::new(pool))))
}

fn metrics_router(handle: MetricsHandle) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(handle)
}

async fn metrics_handler(State(handle): State<MetricsHandle>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}

async fn serve_metrics(listener: TcpListener, handle: MetricsHandle, cancel: CancellationToken) {
    let server = axum::serve(listener, metrics_router(handle))
        .with_graceful_shutdown(async move { cancel.cancelled().await });
    if let Err(e) = server.await {
        error!(error = %e, "metrics endpoint failed");
    }
}
