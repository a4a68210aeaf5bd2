//! The coordinator: one worker that owns all entity groups and drives them
//! toward their desired state.
//!
//! ```text
//! IDLE -> MERGING -> PLANNING -> EXECUTING -> IDLE (or WAITING)
//! ```
//!
//! Providers talk to the worker through a [`CoordinatorHandle`]. Intake is
//! an unbounded channel: registering validates the resource on the
//! caller's thread, enqueues it and fires the retry signal. Only the worker
//! ever mutates groups.

use crate::backend::BackendRegistry;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::factory::{self, PlanContext};
use crate::group::Merge;
use crate::listener::{InstallationEvent, InstallationListener, NullListener};
use crate::registry::ResourceRegistry;
use crate::resource::GroupKey;
use crate::signal::RetrySignal;
use crate::state::InstallationState;
use crate::task::{Task, TaskOp, TaskSequence};
use futures::FutureExt;
use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tend_schema::{
    ActiveTags, InstallableResource, ResourceKind, ResourceSpec, ResourceState, ResourceUrl,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Messages from providers to the worker.
#[derive(Debug)]
enum Intake {
    Register(Box<InstallableResource>),
    Unregister(ResourceUrl),
    SetTags(ActiveTags),
}

/// Counts from one pass of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Intake messages merged.
    pub merged: usize,
    /// Tasks attempted.
    pub executed: usize,
    pub failed: usize,
    /// Groups or tasks put off because their kind has no backend.
    pub deferred: usize,
    pub planning_failures: usize,
    /// Groups left dirty for the next cycle.
    pub pending: usize,
}

impl CycleReport {
    pub fn succeeded(&self) -> usize {
        self.executed - self.failed
    }

    /// Planning failed somewhere; the loop backs off.
    pub fn faulted(&self) -> bool {
        self.planning_failures > 0
    }
}

enum Planned {
    Tasks(Vec<Task>),
    Deferred,
    Failed,
}

enum Executed {
    Done { replan: bool },
    Failed,
    Deferred,
    Skipped,
}

pub struct Coordinator {
    config: EngineConfig,
    registry: ResourceRegistry,
    backends: Arc<BackendRegistry>,
    intake: mpsc::UnboundedReceiver<Intake>,
    listener: Arc<dyn InstallationListener>,
    state: watch::Sender<InstallationState>,
    signal: RetrySignal,
    shutdown: CancellationToken,
    sequence: TaskSequence,
    merged: u64,
    cycle: u64,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("cycle", &self.cycle)
            .field("groups", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Create the worker and a handle for providers. The worker does
    /// nothing until [`run`](Self::run) or [`run_cycle`](Self::run_cycle)
    /// is called.
    pub fn new(config: EngineConfig, backends: Arc<BackendRegistry>) -> (Self, CoordinatorHandle) {
        let (intake_tx, intake_rx) = mpsc::unbounded_channel();
        let registry = ResourceRegistry::new(config.tags.clone());
        let (state_tx, state_rx) = watch::channel(InstallationState {
            tags: registry.tags().clone(),
            ..InstallationState::default()
        });
        let signal = backends.signal().clone();
        let shutdown = CancellationToken::new();

        let handle = CoordinatorHandle {
            intake: intake_tx,
            signal: signal.clone(),
            state: state_rx,
            shutdown: shutdown.clone(),
            submitted: Arc::new(AtomicU64::new(0)),
        };
        let coordinator = Self {
            config,
            registry,
            backends,
            intake: intake_rx,
            listener: Arc::new(NullListener),
            state: state_tx,
            signal,
            shutdown,
            sequence: TaskSequence::default(),
            merged: 0,
            cycle: 0,
        };
        (coordinator, handle)
    }

    pub fn with_listener(mut self, listener: Arc<dyn InstallationListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run cycles until the handle asks for shutdown.
    ///
    /// Runs again at once while cycles make progress with work left over.
    /// Otherwise waits for the retry signal or the idle timeout, or for the
    /// error backoff after a cycle whose planning failed or that panicked.
    pub async fn run(mut self) {
        tracing::info!("Coordinator started");
        while !self.shutdown.is_cancelled() {
            let outcome = AssertUnwindSafe(self.run_cycle()).catch_unwind().await;
            // A panicked cycle sits out the whole backoff; new intake does
            // not cut it short.
            let (wait, wakeable) = match outcome {
                Ok(report) if report.faulted() => {
                    tracing::error!(
                        "Planning failed for {} group(s), backing off",
                        report.planning_failures
                    );
                    (self.config.error_backoff(), true)
                }
                Ok(report) if report.pending > 0 && report.succeeded() > 0 => continue,
                Ok(_) => (self.config.idle_timeout(), true),
                Err(panic) => {
                    tracing::error!(
                        "Cycle {} aborted: {}, backing off",
                        self.cycle,
                        panic_message(panic.as_ref())
                    );
                    self.recover();
                    (self.config.error_backoff(), false)
                }
            };

            self.listener.on_event(&InstallationEvent::Suspended);
            tracing::debug!("Coordinator idle for up to {wait:?}");
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = self.signal.notified(), if wakeable => {}
                () = tokio::time::sleep(wait) => {}
            }
        }
        tracing::info!("Coordinator stopped");
    }

    /// After an aborted cycle nothing is known about which groups were
    /// settled, so every group is planned again.
    fn recover(&mut self) {
        for kind in ResourceKind::ALL {
            self.registry.mark_kind_dirty(kind);
        }
        self.publish();
    }

    /// One full pass: merge intake, plan dirty groups, execute their tasks.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle += 1;
        let mut report = CycleReport {
            merged: self.merge(),
            ..CycleReport::default()
        };

        let dirty = self.registry.take_dirty();
        tracing::debug!(
            "Cycle {}: merged {}, planning {} group(s)",
            self.cycle,
            report.merged,
            dirty.len()
        );

        let mut retry = BTreeSet::new();
        let mut pending = BTreeSet::new();
        for key in dirty {
            match self.plan(&key).await {
                Planned::Tasks(tasks) => pending.extend(tasks),
                Planned::Deferred => {
                    report.deferred += 1;
                    retry.insert(key);
                }
                Planned::Failed => {
                    report.planning_failures += 1;
                    retry.insert(key);
                }
            }
        }

        if !pending.is_empty() {
            self.listener.on_event(&InstallationEvent::Started);
        }

        let mut follow_ups: HashMap<GroupKey, usize> = HashMap::new();
        while let Some(task) = pending.pop_first() {
            match self.execute(&task).await {
                Executed::Done { replan } => {
                    report.executed += 1;
                    if !replan {
                        continue;
                    }
                    let count = follow_ups.entry(task.key.clone()).or_default();
                    *count += 1;
                    if *count > self.config.max_follow_ups {
                        tracing::warn!("{} still unsettled, leaving it for the next cycle", task.key);
                        retry.insert(task.key);
                        continue;
                    }
                    pending.retain(|t| t.key != task.key);
                    match self.plan(&task.key).await {
                        Planned::Tasks(tasks) => pending.extend(tasks),
                        Planned::Deferred => {
                            report.deferred += 1;
                            retry.insert(task.key);
                        }
                        Planned::Failed => {
                            report.planning_failures += 1;
                            retry.insert(task.key);
                        }
                    }
                }
                Executed::Failed => {
                    report.executed += 1;
                    report.failed += 1;
                    retry.insert(task.key);
                }
                Executed::Deferred => {
                    report.deferred += 1;
                    retry.insert(task.key);
                }
                Executed::Skipped => {}
            }
        }

        let purged = self.registry.purge_empty();
        if purged > 0 {
            tracing::debug!("Purged {purged} empty group(s)");
        }
        for key in retry {
            self.registry.mark_dirty(key);
        }
        report.pending = self.registry.dirty_count();
        self.publish();
        report
    }

    /// Drain the intake queue into the registry.
    fn merge(&mut self) -> usize {
        let mut count = 0;
        while let Ok(message) = self.intake.try_recv() {
            count += 1;
            match message {
                Intake::Register(resource) => {
                    let url = resource.url.clone();
                    match self.registry.add_or_update(*resource) {
                        Merge::Unchanged => tracing::debug!("{url} unchanged"),
                        merge => tracing::debug!("{url} merged ({merge:?})"),
                    }
                }
                Intake::Unregister(url) => {
                    if !self.registry.remove(&url) {
                        tracing::debug!("Ignoring withdrawal of unknown {url}");
                    }
                }
                Intake::SetTags(tags) => {
                    tracing::info!("Active tags: [{tags}]");
                    self.registry.set_tags(tags);
                }
            }
        }
        for snapshot in self.registry.take_transitions() {
            self.listener.on_event(&InstallationEvent::Processed(snapshot));
        }
        for kind in self.backends.take_newly_available() {
            self.registry.mark_kind_dirty(kind);
        }
        self.merged += count as u64;
        count
    }

    async fn plan(&mut self, key: &GroupKey) -> Planned {
        let Some(backend) = self.backends.get(key.kind) else {
            tracing::debug!("No backend for {}, deferring {key}", key.kind);
            return Planned::Deferred;
        };
        let tags = self.registry.tags().clone();
        let Some(group) = self.registry.group_mut(key) else {
            return Planned::Tasks(Vec::new());
        };

        let mut ctx = PlanContext {
            tags: &tags,
            config: &self.config,
            sequence: &mut self.sequence,
        };
        match factory::observe_and_plan(group.ordered(&tags), backend.as_ref(), &mut ctx).await {
            Ok(tasks) => Planned::Tasks(tasks),
            Err(e) => {
                tracing::warn!("Skipping {key} this cycle: {e}");
                Planned::Failed
            }
        }
    }

    async fn execute(&mut self, task: &Task) -> Executed {
        let Some(resource) = self.registry.resource(&task.key, &task.url) else {
            return Executed::Skipped;
        };

        let result = if task.op.touches_runtime() {
            let Some(backend) = self.backends.get(task.key.kind) else {
                return Executed::Deferred;
            };
            match task.op {
                TaskOp::Install => backend.install(resource).await,
                TaskOp::Update => backend.update(resource).await,
                _ => backend.remove(&resource.entity).await,
            }
        } else {
            Ok(())
        };

        let Some(group) = self.registry.group_mut(&task.key) else {
            return Executed::Skipped;
        };
        let Some(resource) = group.get_mut(&task.url) else {
            return Executed::Skipped;
        };

        match result {
            Ok(()) => {
                let state = match task.op {
                    TaskOp::Install | TaskOp::Update => ResourceState::Installed,
                    TaskOp::Remove { target } | TaskOp::ChangeState(target) => target,
                };
                resource.set_state(state);
                match state {
                    ResourceState::Installed => resource.set_applied(true),
                    ResourceState::Ignored | ResourceState::Uninstalled => {
                        resource.set_applied(false);
                    }
                    _ => {}
                }
                let snapshot = resource.snapshot();
                tracing::info!("{task}: {state}");

                if state.is_terminal() {
                    self.registry.purge(&task.key, &task.url);
                }
                self.listener
                    .on_event(&InstallationEvent::Processed(snapshot));

                Executed::Done {
                    replan: matches!(task.op, TaskOp::Remove { .. }) || state.is_terminal(),
                }
            }
            Err(e) => {
                tracing::warn!("{task} failed: {e}");
                resource.fail(e.to_string());
                let snapshot = resource.snapshot();
                self.listener
                    .on_event(&InstallationEvent::Processed(snapshot));
                Executed::Failed
            }
        }
    }

    fn publish(&mut self) {
        let mut state = self.registry.snapshot();
        state.cycle = self.cycle;
        state.merged = self.merged;
        self.state.send_replace(state);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Provider-side access to a coordinator. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    intake: mpsc::UnboundedSender<Intake>,
    signal: RetrySignal,
    state: watch::Receiver<InstallationState>,
    shutdown: CancellationToken,
    submitted: Arc<AtomicU64>,
}

impl CoordinatorHandle {
    /// Validate and enqueue a resource. Registering the same url again
    /// replaces it; registering identical content is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Registration`] for a malformed resource and
    /// [`EngineError::WorkerGone`] if the coordinator has been dropped.
    pub fn register(&self, spec: ResourceSpec) -> Result<(), EngineError> {
        let resource = spec.validate()?;
        self.send(Intake::Register(Box::new(resource)))
    }

    /// Withdraw a resource. Unknown urls are ignored by the worker.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::WorkerGone`] if the coordinator has been dropped.
    pub fn unregister(&self, url: impl Into<ResourceUrl>) -> Result<(), EngineError> {
        self.send(Intake::Unregister(url.into()))
    }

    /// Replace the active environment tags.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::WorkerGone`] if the coordinator has been dropped.
    pub fn set_active_tags(&self, tags: ActiveTags) -> Result<(), EngineError> {
        self.send(Intake::SetTags(tags))
    }

    fn send(&self, message: Intake) -> Result<(), EngineError> {
        self.submitted.fetch_add(1, Ordering::SeqCst);
        self.intake
            .send(message)
            .map_err(|_| EngineError::WorkerGone)?;
        self.signal.fire();
        Ok(())
    }

    /// Request an out-of-cycle pass.
    pub fn wake(&self) {
        self.signal.fire();
    }

    /// The state published after the last cycle.
    pub fn state(&self) -> InstallationState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<InstallationState> {
        self.state.clone()
    }

    /// Wait until everything submitted through this handle's family has
    /// been merged and no group has work left.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::WorkerGone`] if the coordinator stops first.
    pub async fn converged(&self) -> Result<InstallationState, EngineError> {
        let target = self.submitted.load(Ordering::SeqCst);
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(|s| s.cycle > 0 && s.merged >= target && s.is_converged())
            .await
            .map_err(|_| EngineError::WorkerGone)?;
        Ok(state.clone())
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
