use std::{convert::Infallible, io, sync::Arc, thread, time::Duration};

use anyhow::Context;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::broadcast;
use tokio_stream::{StreamExt, wrappers::BroadcastStream};

use creatives_core::OwnerId;
use creatives_events::{InMemoryEventBus, StatusEvent, Subscription};
use creatives_infra::{
    CreativeServices, OrchestratorConfig, ServiceDeps, SharedNotifier,
    dispatch::{HttpDispatcher, JobDispatcher, NoopDispatcher},
    jobs::{InMemoryJobStore, JobStore},
    postgres::{PostgresJobStore, PostgresRequestStore, ensure_schema},
    requests::{InMemoryRequestStore, RequestStore},
    workers::{StatusWatcher, WatcherConfig, WorkerHandle},
};

/// Realtime message broadcast via SSE.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub owner_id: OwnerId,
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Everything the handlers need, shared behind an `Arc`.
pub struct AppServices {
    pub creatives: CreativeServices,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
    _watcher: WorkerHandle,
}

impl AppServices {
    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }
}

pub async fn build_services(config: &OrchestratorConfig) -> anyhow::Result<AppServices> {
    let (jobs, requests) = build_stores(config).await?;
    let dispatcher = build_dispatcher(config)?;
    let notifier: SharedNotifier = Arc::new(InMemoryEventBus::<StatusEvent>::new());

    let creatives = CreativeServices::new(ServiceDeps::new(jobs, requests, dispatcher, notifier));

    let (realtime_tx, _) = broadcast::channel(config.realtime_buffer);
    spawn_realtime_bridge(creatives.notifier().subscribe(), realtime_tx.clone())
        .context("failed to spawn realtime bridge thread")?;

    let watcher = StatusWatcher::spawn(
        creatives.clone(),
        tokio::runtime::Handle::current(),
        WatcherConfig {
            scan_every: config.scan_every,
            ..WatcherConfig::default()
        },
    )
    .context("failed to spawn status watcher thread")?;

    Ok(AppServices {
        creatives,
        realtime_tx,
        _watcher: watcher,
    })
}

async fn build_stores(
    config: &OrchestratorConfig,
) -> anyhow::Result<(Arc<dyn JobStore>, Arc<dyn RequestStore>)> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::info!("using in-memory stores");
        return Ok((InMemoryJobStore::arc(), InMemoryRequestStore::arc()));
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("failed to connect to DATABASE_URL")?;
    ensure_schema(&pool)
        .await
        .context("failed to prepare creative tables")?;

    tracing::info!("using postgres stores");
    Ok((
        Arc::new(PostgresJobStore::new(pool.clone())),
        Arc::new(PostgresRequestStore::new(pool)),
    ))
}

fn build_dispatcher(config: &OrchestratorConfig) -> anyhow::Result<Arc<dyn JobDispatcher>> {
    match &config.worker_trigger_url {
        Some(url) => {
            tracing::info!(trigger_url = %url, "signalling image worker over http");
            let dispatcher = HttpDispatcher::new(
                url.clone(),
                config.worker_trigger_token.clone(),
                config.dispatch_timeout,
            )?;
            Ok(Arc::new(dispatcher))
        }
        None => {
            tracing::warn!("WORKER_TRIGGER_URL not set; jobs wait for the worker to poll");
            Ok(Arc::new(NoopDispatcher))
        }
    }
}

/// Forward bus events to the SSE broadcast channel (lossy, no backpressure on the core).
fn spawn_realtime_bridge(
    sub: Subscription<StatusEvent>,
    tx: broadcast::Sender<RealtimeMessage>,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("realtime-bridge".to_string())
        .spawn(move || {
            while let Ok(event) = sub.recv() {
                let payload = match serde_json::to_value(&event) {
                    Ok(payload) => payload,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to serialize status event");
                        continue;
                    }
                };
                let _ = tx.send(RealtimeMessage {
                    owner_id: event.owner_id(),
                    topic: event.topic().to_string(),
                    payload,
                });
            }
        })
}

pub fn owner_sse_stream(
    services: Arc<AppServices>,
    owner_id: OwnerId,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(m) if m.owner_id == owner_id => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
