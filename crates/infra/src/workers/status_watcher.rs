use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use creatives_core::OwnerId;
use creatives_events::{StatusEvent, Subscription};

use super::WorkerHandle;
use crate::orchestration::CreativeServices;

/// Tuning for the [`StatusWatcher`].
#[derive(Debug, Clone, Copy)]
pub struct WatcherConfig {
    /// Run a consistency sweep after this many job status events per owner.
    pub scan_every: usize,
    /// How long the loop blocks on the subscription before checking for shutdown.
    pub tick: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            scan_every: 10,
            tick: Duration::from_millis(250),
        }
    }
}

/// Keeps aggregate statuses fresh from live job status events.
///
/// - every `JobStatusChanged` for a request spawns an idempotent recompute
/// - every `scan_every`-th event for an owner spawns a consistency sweep
/// - at most one sweep per owner runs at a time; triggers arriving while one
///   is in flight are dropped
///
/// Each piece of work runs in its own task on `runtime`, so a slow store never
/// blocks the subscription.
#[derive(Debug)]
pub struct StatusWatcher;

impl StatusWatcher {
    pub fn spawn(
        services: CreativeServices,
        runtime: Handle,
        config: WatcherConfig,
    ) -> io::Result<WorkerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = services.notifier().subscribe();

        let state = WatcherState {
            services,
            runtime,
            scan_every: config.scan_every.max(1),
            counts: HashMap::new(),
            scans_in_flight: Arc::new(Mutex::new(HashSet::new())),
        };

        let join = thread::Builder::new()
            .name("status-watcher".to_string())
            .spawn(move || watch_loop(sub, shutdown_rx, config.tick, state))?;

        Ok(WorkerHandle::new(shutdown_tx, join))
    }
}

struct WatcherState {
    services: CreativeServices,
    runtime: Handle,
    scan_every: usize,
    counts: HashMap<OwnerId, usize>,
    scans_in_flight: Arc<Mutex<HashSet<OwnerId>>>,
}

fn watch_loop(
    sub: Subscription<StatusEvent>,
    shutdown_rx: mpsc::Receiver<()>,
    tick: Duration,
    mut state: WatcherState,
) {
    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(event) => state.handle(event),
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

impl WatcherState {
    fn handle(&mut self, event: StatusEvent) {
        // Request events are our own output.
        let StatusEvent::JobStatusChanged {
            owner_id,
            request_id,
            ..
        } = event
        else {
            return;
        };

        if let Some(request_id) = request_id {
            let aggregator = self.services.aggregator.clone();
            self.runtime.spawn(async move {
                if let Err(err) = aggregator.recompute(owner_id, request_id).await {
                    warn!(owner_id = %owner_id, request_id = %request_id, error = %err, "watcher recompute failed");
                }
            });
        }

        let count = self.counts.entry(owner_id).or_insert(0);
        *count += 1;
        if *count >= self.scan_every {
            self.counts.remove(&owner_id);
            self.trigger_scan(owner_id);
        }
    }

    fn trigger_scan(&self, owner_id: OwnerId) {
        let Some(guard) = InFlight::claim(&self.scans_in_flight, owner_id) else {
            debug!(owner_id = %owner_id, "sweep already running; trigger dropped");
            return;
        };

        let scanner = self.services.scanner.clone();
        self.runtime.spawn(async move {
            let _guard = guard;
            if let Err(err) = scanner.scan_and_fix(owner_id).await {
                warn!(owner_id = %owner_id, error = %err, "automatic consistency scan failed");
            }
        });
    }
}

/// Marks an owner's sweep as running until dropped.
struct InFlight {
    set: Arc<Mutex<HashSet<OwnerId>>>,
    owner_id: OwnerId,
}

impl InFlight {
    fn claim(set: &Arc<Mutex<HashSet<OwnerId>>>, owner_id: OwnerId) -> Option<Self> {
        let mut running = set.lock().ok()?;
        if !running.insert(owner_id) {
            return None;
        }
        Some(Self {
            set: Arc::clone(set),
            owner_id,
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Ok(mut running) = self.set.lock() {
            running.remove(&self.owner_id);
        }
    }
}
