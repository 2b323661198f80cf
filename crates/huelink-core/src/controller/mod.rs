// ── Command controller ──
//
// Owns the inbound command queue and the per-device worker pool. A
// worker is created on the first command for a device and garbage
// collected once the device leaves the registry.

mod worker;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ControllerSettings;
use crate::error::CoreError;
use crate::message::PendingCommand;
use crate::registry::DeviceRegistry;
use crate::service::Services;
use crate::transport::Transport;

use self::worker::{WorkerContext, WorkerHandle};

// ── Controller ───────────────────────────────────────────────────────

/// Cheaply cloneable handle to the command dispatcher.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    ctx: WorkerContext,
    settings: ControllerSettings,
    command_tx: mpsc::UnboundedSender<PendingCommand>,
    command_rx: Mutex<Option<mpsc::UnboundedReceiver<PendingCommand>>>,
    cancel: CancellationToken,
}

impl Controller {
    /// Create a controller. Does not start dispatching; call
    /// [`start()`](Self::start).
    pub fn new(
        registry: Arc<DeviceRegistry>,
        services: Arc<Services>,
        transport: Arc<dyn Transport>,
        settings: ControllerSettings,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ControllerInner {
                ctx: WorkerContext {
                    registry,
                    services,
                    transport,
                    timeout: settings.worker_timeout,
                },
                settings,
                command_tx,
                command_rx: Mutex::new(Some(command_rx)),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Sender side of the inbound queue, handed to the router.
    pub fn command_sender(&self) -> mpsc::UnboundedSender<PendingCommand> {
        self.inner.command_tx.clone()
    }

    pub fn put_command(&self, command: PendingCommand) -> Result<(), CoreError> {
        self.inner
            .command_tx
            .send(command)
            .map_err(|_| CoreError::QueueClosed)
    }

    /// Spawn the dispatch task. Fails if already started.
    pub async fn start(&self) -> Result<JoinHandle<()>, CoreError> {
        let rx = self
            .inner
            .command_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| CoreError::Internal("controller already started".into()))?;
        info!("command controller started");
        Ok(tokio::spawn(dispatch_task(self.clone(), rx)))
    }

    /// Stop dispatching and signal every worker.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }
}

// ── Dispatch ─────────────────────────────────────────────────────────

async fn dispatch_task(controller: Controller, mut rx: mpsc::UnboundedReceiver<PendingCommand>) {
    let inner = &controller.inner;
    let mut pool = WorkerPool::new(inner.ctx.clone(), inner.cancel.child_token());
    let mut last_gc = Instant::now();

    loop {
        let next = tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            next = tokio::time::timeout(inner.settings.command_timeout, rx.recv()) => next,
        };
        match next {
            Ok(Some(command)) => pool.dispatch(command),
            Ok(None) => break,
            Err(_) => {
                if last_gc.elapsed() > inner.settings.gc_interval {
                    pool.collect_garbage();
                    last_gc = Instant::now();
                }
            }
        }
    }

    pool.stop_all();
    debug!("command controller stopped");
}

// ── Worker pool ──────────────────────────────────────────────────────

pub(crate) struct WorkerPool {
    ctx: WorkerContext,
    workers: HashMap<String, WorkerHandle>,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub(crate) fn new(ctx: WorkerContext, cancel: CancellationToken) -> Self {
        Self {
            ctx,
            workers: HashMap::new(),
            cancel,
        }
    }

    /// Route a command to its device worker, creating it on first use.
    /// Commands for devices not in the registry are dropped.
    pub(crate) fn dispatch(&mut self, command: PendingCommand) {
        if !self.ctx.registry.contains(&command.device_id) {
            error!(device_id = %command.device_id, "command for unknown device, dropping");
            return;
        }

        let device_id = command.device_id.clone();
        let worker = self.ensure_worker(&device_id);
        if let Err(e) = worker.send(command) {
            error!(device_id = %device_id, error = %e, "worker queue closed, dropping command");
        }
    }

    fn ensure_worker(&mut self, device_id: &str) -> &WorkerHandle {
        self.workers
            .entry(device_id.to_owned())
            .or_insert_with(|| {
                debug!(device_id, "creating worker");
                WorkerHandle::spawn(
                    device_id.to_owned(),
                    self.ctx.clone(),
                    self.cancel.child_token(),
                )
            })
    }

    /// Stop workers whose device is no longer registered. Returns their ids.
    pub(crate) fn collect_garbage(&mut self) -> BTreeSet<String> {
        let registered = self.ctx.registry.ids();
        let garbage: BTreeSet<String> = self
            .workers
            .keys()
            .filter(|id| !registered.contains(*id))
            .cloned()
            .collect();

        for id in &garbage {
            if let Some(worker) = self.workers.remove(id) {
                drop(worker.stop());
                debug!(device_id = %id, "stopped worker");
            }
        }
        if !garbage.is_empty() {
            info!(count = garbage.len(), "collected idle workers");
        }
        garbage
    }

    pub(crate) fn stop_all(&mut self) {
        for (_, worker) in self.workers.drain() {
            drop(worker.stop());
        }
    }

    #[cfg(test)]
    fn worker_ids(&self) -> BTreeSet<String> {
        self.workers.keys().cloned().collect()
    }
}
