//! Phase engine orchestration.
//!
//! The [`PhaseEngine`] drives a [`Workflow`] against a [`PageAdapter`]. The
//! active phase is polled on a fixed period; each tick runs every step of
//! the phase in order. An `Advance` step ends polling and schedules the
//! next phase after the settle delay; a `Finish` step ends the run.
//!
//! At most one timer (the repeating poll or the one-shot settle delay) is
//! held at any time. Installing a timer cancels and aborts the previous one
//! under the same lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::PhaseError;
use crate::generation::TextGenerator;
use crate::observability::metrics;
use crate::observability::{Event, EventEmitter};
use crate::page::PageAdapter;

use super::state::{EngineState, InjectionTicket};
use super::step::StepOutcome;
use super::workflow::{PhaseId, Workflow};

/// Smallest period handed to `tokio::time::interval`, which rejects zero.
const MIN_TICK: Duration = Duration::from_millis(1);

// ============================================================================
// Status
// ============================================================================

/// Externally observable engine status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    /// Not started (or reset)
    Idle,
    /// Polling the named phase
    Polling(PhaseId),
    /// Waiting out the settle delay before the named phase
    Settling(PhaseId),
    /// The final step fired
    Finished,
    /// A phase exceeded its tick budget
    Stalled(PhaseError),
    /// Terminated before finishing
    Stopped,
}

impl EngineStatus {
    /// Whether no further progress will happen without a new `start`.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        matches!(self, Self::Finished | Self::Stalled(_) | Self::Stopped)
    }
}

// ============================================================================
// Timer slot
// ============================================================================

/// The single active timer.
struct TimerSlot {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl TimerSlot {
    fn cancel(self) {
        self.token.cancel();
        self.handle.abort();
    }
}

/// Decrements the live-timer count when a timer future is dropped.
struct LiveTimer(Arc<AtomicUsize>);

impl LiveTimer {
    fn new(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(count))
    }
}

impl Drop for LiveTimer {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Result of one tick.
enum TickFlow {
    Continue,
    Advance(PhaseId),
    Finish,
    Stalled(u32),
    Cancelled,
}

// ============================================================================
// Engine
// ============================================================================

/// Timer-driven phase state machine.
///
/// Methods that schedule timers take `self: &Arc<Self>` because the timer
/// tasks hold a reference back to the engine.
pub struct PhaseEngine {
    workflow: Workflow,
    page: Arc<dyn PageAdapter>,
    generator: Arc<dyn TextGenerator>,
    config: EngineConfig,
    state: EngineState,
    timer: std::sync::Mutex<Option<TimerSlot>>,
    live_timers: Arc<AtomicUsize>,
    status: watch::Sender<EngineStatus>,
    events: Arc<EventEmitter>,
    run_id: std::sync::Mutex<String>,
}

impl PhaseEngine {
    /// Creates an idle engine for a run about `task`.
    #[must_use]
    pub fn new(
        workflow: Workflow,
        page: Arc<dyn PageAdapter>,
        generator: Arc<dyn TextGenerator>,
        config: EngineConfig,
        task: impl Into<String>,
    ) -> Self {
        let (status, _) = watch::channel(EngineStatus::Idle);
        Self {
            workflow,
            page,
            generator,
            config,
            state: EngineState::new(task),
            timer: std::sync::Mutex::new(None),
            live_timers: Arc::new(AtomicUsize::new(0)),
            status,
            events: Arc::new(EventEmitter::noop()),
            run_id: std::sync::Mutex::new(uuid::Uuid::new_v4().to_string()),
        }
    }

    /// Sends lifecycle events to `events`.
    #[must_use]
    pub fn with_events(mut self, events: Arc<EventEmitter>) -> Self {
        self.events = events;
        self
    }

    // ------------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------------

    /// Begins polling `phase`, cancelling any active timer first.
    ///
    /// Any phase may be started directly, which resumes a half-finished
    /// form.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::UnknownPhase`] if `phase` is not in the workflow.
    pub fn start(self: &Arc<Self>, phase: &str) -> Result<(), PhaseError> {
        let index = self.workflow.index_of(phase)?;
        let fresh = {
            let status = self.status.borrow();
            matches!(*status, EngineStatus::Idle) || status.is_final()
        };
        if fresh {
            info!(run_id = %self.run_id(), phase, "engine started");
            self.events.emit(Event::EngineStarted {
                timestamp: Utc::now(),
                run_id: self.run_id(),
                phase: phase.to_string(),
            });
        }
        self.enter_phase(index, None);
        Ok(())
    }

    /// Stops polling and starts `phase` after `delay`.
    ///
    /// The delay passes through the configured overrides.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::UnknownPhase`] for an unknown phase and
    /// [`PhaseError::Backward`] if `phase` is not after the current one.
    pub fn advance_after(self: &Arc<Self>, phase: &str, delay: Duration) -> Result<(), PhaseError> {
        self.schedule_advance(phase, delay, None)
    }

    /// Cancels any active timer. Idempotent.
    ///
    /// A run that had not reached a final status becomes `Stopped`.
    pub fn terminate(&self) {
        let stopped = {
            let mut slot = self.lock_timer();
            if let Some(old) = slot.take() {
                old.cancel();
            }
            self.status.send_if_modified(|status| {
                if status.is_final() || matches!(status, EngineStatus::Idle) {
                    false
                } else {
                    *status = EngineStatus::Stopped;
                    true
                }
            })
        };
        if stopped {
            info!(run_id = %self.run_id(), "engine stopped");
            self.emit_terminated("stopped");
        }
    }

    /// Terminates, clears all flags and counters, and prepares a new run
    /// about `task`. Generation responses still in flight are discarded.
    pub fn reset(&self, task: impl Into<String>) {
        self.terminate();
        let epoch = self.state.reset(task);
        *self
            .run_id
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = uuid::Uuid::new_v4().to_string();
        self.status.send_replace(EngineStatus::Idle);
        debug!(epoch, "engine reset");
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// Name of the active phase.
    #[must_use]
    pub fn current_phase(&self) -> Option<PhaseId> {
        self.state
            .current_phase()
            .and_then(|i| self.workflow.get(i))
            .map(|p| p.id.clone())
    }

    /// Number of timer tasks currently alive (never more than one once
    /// cancelled timers have been dropped by the runtime).
    #[must_use]
    pub fn active_timer_count(&self) -> usize {
        self.live_timers.load(Ordering::SeqCst)
    }

    /// Whether a timer is installed.
    #[must_use]
    pub fn has_timer(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_some()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    /// Subscribes to status changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status.subscribe()
    }

    /// Run state (injection flag, counters, epoch).
    #[must_use]
    pub const fn state(&self) -> &EngineState {
        &self.state
    }

    /// Identifier of the current run.
    #[must_use]
    pub fn run_id(&self) -> String {
        self.run_id
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Waits for a final status.
    ///
    /// # Errors
    ///
    /// Returns the [`PhaseError::Stalled`] that ended the run, or
    /// [`PhaseError::Stopped`] if the engine was terminated first.
    pub async fn wait(&self) -> Result<(), PhaseError> {
        let mut rx = self.status.subscribe();
        let status = rx
            .wait_for(EngineStatus::is_final)
            .await
            .map(|s| s.clone())
            .unwrap_or(EngineStatus::Stopped);
        match status {
            EngineStatus::Finished => Ok(()),
            EngineStatus::Stalled(err) => Err(err),
            _ => Err(PhaseError::Stopped {
                phase: self
                    .current_phase()
                    .map_or_else(|| "<none>".to_string(), |p| p.to_string()),
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn delay(&self, delay: Duration) -> Duration {
        self.config.delay_overrides.apply(delay)
    }

    fn phase_name(&self, index: usize) -> &str {
        self.workflow.get(index).map_or("<none>", |p| p.id.as_str())
    }

    fn lock_timer(&self) -> std::sync::MutexGuard<'_, Option<TimerSlot>> {
        self.timer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Validates the transition and installs the settle timer.
    ///
    /// `owner` is the token of the timer asking for the change, if any. The
    /// slot lock is held from the owner check until the new timer and
    /// status are in place, so a timer cancelled by `terminate()` can never
    /// install a successor and status updates cannot overtake each other.
    fn schedule_advance(
        self: &Arc<Self>,
        phase: &str,
        delay: Duration,
        owner: Option<&CancellationToken>,
    ) -> Result<(), PhaseError> {
        let target = self.workflow.index_of(phase)?;
        if let Some(current) = self.state.current_phase() {
            if target <= current {
                return Err(PhaseError::Backward {
                    from: self.phase_name(current).to_string(),
                    to: phase.to_string(),
                });
            }
        }
        let delay = self.delay(delay);

        let mut slot = self.lock_timer();
        if owner.is_some_and(CancellationToken::is_cancelled) {
            return Ok(());
        }
        if let Some(old) = slot.take() {
            old.cancel();
        }
        debug!(next = phase, ?delay, "settling before next phase");
        self.status
            .send_replace(EngineStatus::Settling(PhaseId::new(phase)));

        let token = CancellationToken::new();
        let engine = Arc::clone(self);
        let own = token.clone();
        let handle = tokio::spawn(async move {
            let _live = LiveTimer::new(&engine.live_timers);
            tokio::select! {
                () = own.cancelled() => {}
                () = tokio::time::sleep(delay) => engine.enter_phase(target, Some(&own)),
            }
        });
        *slot = Some(TimerSlot { token, handle });
        Ok(())
    }

    /// Makes `index` the active phase and starts polling it.
    fn enter_phase(self: &Arc<Self>, index: usize, owner: Option<&CancellationToken>) {
        let mut slot = self.lock_timer();
        if owner.is_some_and(CancellationToken::is_cancelled) {
            return;
        }
        if let Some(old) = slot.take() {
            old.cancel();
        }

        let name = self.phase_name(index).to_string();
        let previous = self.state.enter_phase(index);
        let previous_name = previous.map(|p| self.phase_name(p).to_string());
        if let Some(prev) = &previous_name {
            metrics::record_phase_transition(prev, &name);
        }
        metrics::set_current_phase(&name, previous_name.as_deref());
        info!(phase = %name, index, "entering phase");
        self.events.emit(Event::PhaseEntered {
            timestamp: Utc::now(),
            phase_name: name.clone(),
            phase_index: index,
        });
        self.status
            .send_replace(EngineStatus::Polling(PhaseId::new(name)));

        let period = self.delay(self.config.tick_interval).max(MIN_TICK);
        let token = CancellationToken::new();
        let engine = Arc::clone(self);
        let own = token.clone();
        let handle = tokio::spawn(async move {
            let _live = LiveTimer::new(&engine.live_timers);
            engine.poll(index, period, own).await;
        });
        *slot = Some(TimerSlot { token, handle });
    }

    /// Poll loop of one phase.
    async fn poll(self: Arc<Self>, index: usize, period: Duration, token: CancellationToken) {
        // First tick one period after entry
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = token.cancelled() => {
                    debug!(phase = self.phase_name(index), "polling cancelled");
                    return;
                }
                _ = interval.tick() => {}
            }

            match self.tick(index, &token).await {
                TickFlow::Continue => {}
                TickFlow::Cancelled => return,
                TickFlow::Advance(next) => {
                    if let Err(e) =
                        self.schedule_advance(next.as_str(), self.config.settle_delay, Some(&token))
                    {
                        error!(error = %e, "workflow transition rejected");
                        self.terminate();
                    }
                    return;
                }
                TickFlow::Finish => {
                    self.finish(index, &token);
                    return;
                }
                TickFlow::Stalled(ticks) => {
                    self.stall(index, ticks, &token);
                    return;
                }
            }
        }
    }

    /// Runs every step of the phase once.
    async fn tick(self: &Arc<Self>, index: usize, token: &CancellationToken) -> TickFlow {
        let Some(phase) = self.workflow.get(index) else {
            return TickFlow::Cancelled;
        };
        let name = phase.id.as_str();

        let ticks = self.state.record_tick();
        metrics::record_tick(name);
        let budget = self.config.max_ticks_per_phase;
        if budget > 0 && ticks > budget {
            return TickFlow::Stalled(budget);
        }

        for step in &phase.steps {
            if token.is_cancelled() {
                return TickFlow::Cancelled;
            }
            match step.perform(self.page.as_ref(), &self.state).await {
                StepOutcome::Skipped => {}
                StepOutcome::Fired => {
                    debug!(phase = name, step = %step.label(), "step fired");
                    metrics::record_step_fired(name, &step.label());
                }
                StepOutcome::Inject(_) => {
                    if let Some(ticket) = self.state.try_begin_injection() {
                        metrics::record_step_fired(name, &step.label());
                        self.spawn_injection(ticket);
                    }
                }
                StepOutcome::Advance(next) => {
                    metrics::record_step_fired(name, &step.label());
                    return TickFlow::Advance(next);
                }
                StepOutcome::Finish => {
                    metrics::record_step_fired(name, &step.label());
                    return TickFlow::Finish;
                }
            }
        }
        TickFlow::Continue
    }

    /// Requests generated text and writes it once it arrives. Polling keeps
    /// ticking meanwhile.
    fn spawn_injection(self: &Arc<Self>, ticket: InjectionTicket) {
        let engine = Arc::clone(self);
        let task = self.state.task();
        debug!(epoch = ticket.epoch(), "requesting generated text");
        tokio::spawn(async move {
            let text = engine.generator.generate(&task).await;
            engine.inject(ticket, &text).await;
        });
    }

    async fn inject(&self, ticket: InjectionTicket, text: &str) {
        if !self.state.is_live(ticket) {
            debug!(epoch = ticket.epoch(), "discarding generated text from an earlier run");
            return;
        }
        let Some(target) = self.page.find_text_target().await else {
            warn!("text target disappeared before the generated text arrived");
            self.state.abandon_injection(ticket);
            return;
        };
        match self.page.write_text(target, text).await {
            Ok(()) => {
                if self.state.complete_injection(ticket) {
                    info!(chars = text.chars().count(), target = target.kind.as_str(), "generated text written");
                    self.events.emit(Event::TextInjected {
                        timestamp: Utc::now(),
                        chars: text.chars().count(),
                        target: target.kind.as_str().to_string(),
                    });
                }
            }
            Err(e) => {
                warn!(error = %e, "writing generated text failed; will retry");
                self.state.abandon_injection(ticket);
            }
        }
    }

    /// Takes the slot down on behalf of `owner` and publishes a final
    /// status. Returns `false` if `owner` was already cancelled.
    fn conclude(&self, owner: &CancellationToken, status: EngineStatus) -> bool {
        let mut slot = self.lock_timer();
        if owner.is_cancelled() {
            return false;
        }
        if let Some(old) = slot.take() {
            old.cancel();
        }
        self.status.send_replace(status);
        true
    }

    fn finish(&self, index: usize, owner: &CancellationToken) {
        if self.conclude(owner, EngineStatus::Finished) {
            info!(run_id = %self.run_id(), phase = self.phase_name(index), "workflow finished");
            self.emit_terminated("finished");
        }
    }

    fn stall(&self, index: usize, ticks: u32, owner: &CancellationToken) {
        let phase = self.phase_name(index).to_string();
        let err = PhaseError::Stalled {
            phase: phase.clone(),
            ticks,
            elapsed: self.state.phase_elapsed(),
        };
        if !self.conclude(owner, EngineStatus::Stalled(err)) {
            return;
        }
        warn!(phase = %phase, ticks, "phase stalled");
        metrics::record_stall(&phase);
        self.events.emit(Event::PhaseStalled {
            timestamp: Utc::now(),
            phase_name: phase,
            ticks,
        });
        self.emit_terminated("stalled");
    }

    fn emit_terminated(&self, reason: &str) {
        self.events.emit(Event::EngineTerminated {
            timestamp: Utc::now(),
            run_id: self.run_id(),
            reason: reason.to_string(),
        });
    }
}

impl std::fmt::Debug for PhaseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseEngine")
            .field("phases", &self.workflow.len())
            .field("current_phase", &self.current_phase())
            .field("status", &self.status())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
