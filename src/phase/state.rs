//! Engine run state.
//!
//! Lock-free atomics for everything a tick reads, so step evaluation never
//! contends with the injection task or with `reset()`.
//!
//! The text injection state and the generation epoch share one `AtomicU64`
//! (`epoch << 2 | state`). A single compare-and-exchange therefore checks
//! both "still pending" and "no reset happened since the request began".

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use tokio::time::Instant;

/// Sentinel for "no phase active".
const NO_PHASE: usize = usize::MAX;

const STATE_BITS: u64 = 2;
const STATE_MASK: u64 = 0b11;

/// Progress of the one-time text injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionState {
    /// No text requested yet
    Idle,
    /// Generation in flight
    Pending,
    /// Text written into the page
    Written,
}

impl InjectionState {
    const fn bits(self) -> u64 {
        match self {
            Self::Idle => 0,
            Self::Pending => 1,
            Self::Written => 2,
        }
    }

    const fn from_bits(bits: u64) -> Self {
        match bits & STATE_MASK {
            1 => Self::Pending,
            2 => Self::Written,
            _ => Self::Idle,
        }
    }
}

const fn pack(epoch: u64, state: InjectionState) -> u64 {
    (epoch << STATE_BITS) | state.bits()
}

/// Proof that the caller won the `Idle -> Pending` race for an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct InjectionTicket {
    epoch: u64,
}

impl InjectionTicket {
    /// Epoch the request belongs to.
    #[must_use]
    pub const fn epoch(self) -> u64 {
        self.epoch
    }
}

/// Mutable state of one engine run.
pub struct EngineState {
    /// Packed generation epoch and [`InjectionState`]
    injection: AtomicU64,
    /// Completion clicks performed so far in the final phase
    completions: AtomicU32,
    /// Ticks executed in the current phase
    ticks: AtomicU32,
    /// Index of the active phase, or [`NO_PHASE`]
    current_phase: AtomicUsize,
    /// When the current phase started polling
    phase_entered_at: Mutex<Instant>,
    /// Work description the generated text is about
    task: Mutex<String>,
}

impl EngineState {
    /// Creates state for a run about `task`.
    #[must_use]
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            injection: AtomicU64::new(pack(0, InjectionState::Idle)),
            completions: AtomicU32::new(0),
            ticks: AtomicU32::new(0),
            current_phase: AtomicUsize::new(NO_PHASE),
            phase_entered_at: Mutex::new(Instant::now()),
            task: Mutex::new(task.into()),
        }
    }

    // ------------------------------------------------------------------------
    // Text injection
    // ------------------------------------------------------------------------

    /// Current injection state.
    #[must_use]
    pub fn injection(&self) -> InjectionState {
        InjectionState::from_bits(self.injection.load(Ordering::SeqCst))
    }

    /// Current generation epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.injection.load(Ordering::SeqCst) >> STATE_BITS
    }

    /// Moves `Idle -> Pending`.
    ///
    /// Returns `None` when a request is already in flight or the text was
    /// already written; exactly one caller per epoch gets a ticket.
    pub fn try_begin_injection(&self) -> Option<InjectionTicket> {
        let current = self.injection.load(Ordering::SeqCst);
        if InjectionState::from_bits(current) != InjectionState::Idle {
            return None;
        }
        let epoch = current >> STATE_BITS;
        self.injection
            .compare_exchange(
                current,
                pack(epoch, InjectionState::Pending),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .ok()
            .map(|_| InjectionTicket { epoch })
    }

    /// Whether `ticket` is still the live request.
    #[must_use]
    pub fn is_live(&self, ticket: InjectionTicket) -> bool {
        self.injection.load(Ordering::SeqCst) == pack(ticket.epoch, InjectionState::Pending)
    }

    /// Moves `Pending -> Written` for `ticket`'s epoch.
    ///
    /// Returns `false` if a reset intervened.
    pub fn complete_injection(&self, ticket: InjectionTicket) -> bool {
        self.transition(ticket, InjectionState::Written)
    }

    /// Moves `Pending -> Idle` so a later tick can retry.
    ///
    /// Returns `false` if a reset intervened.
    pub fn abandon_injection(&self, ticket: InjectionTicket) -> bool {
        self.transition(ticket, InjectionState::Idle)
    }

    fn transition(&self, ticket: InjectionTicket, to: InjectionState) -> bool {
        self.injection
            .compare_exchange(
                pack(ticket.epoch, InjectionState::Pending),
                pack(ticket.epoch, to),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    // ------------------------------------------------------------------------
    // Counters
    // ------------------------------------------------------------------------

    /// Completion clicks performed so far.
    #[must_use]
    pub fn completions(&self) -> u32 {
        self.completions.load(Ordering::SeqCst)
    }

    /// Records a completion click if the counter still equals `expected`.
    ///
    /// Returns `true` when this call advanced the counter.
    pub fn advance_completions(&self, expected: u32) -> bool {
        self.completions
            .compare_exchange(
                expected,
                expected.saturating_add(1),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Records one tick and returns the tick number within the phase.
    pub fn record_tick(&self) -> u32 {
        self.ticks.fetch_add(1, Ordering::SeqCst).saturating_add(1)
    }

    /// Ticks executed in the current phase.
    #[must_use]
    pub fn ticks(&self) -> u32 {
        self.ticks.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------------
    // Phase bookkeeping
    // ------------------------------------------------------------------------

    /// Index of the active phase.
    #[must_use]
    pub fn current_phase(&self) -> Option<usize> {
        match self.current_phase.load(Ordering::SeqCst) {
            NO_PHASE => None,
            index => Some(index),
        }
    }

    /// Marks `index` as the active phase, resetting the tick count and the
    /// entry timestamp. Returns the previously active phase.
    pub fn enter_phase(&self, index: usize) -> Option<usize> {
        self.ticks.store(0, Ordering::SeqCst);
        *self
            .phase_entered_at
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Instant::now();
        match self.current_phase.swap(index, Ordering::SeqCst) {
            NO_PHASE => None,
            prev => Some(prev),
        }
    }

    /// Time since the current phase started polling.
    #[must_use]
    pub fn phase_elapsed(&self) -> std::time::Duration {
        self.phase_entered_at
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .elapsed()
    }

    /// Work description for this run.
    #[must_use]
    pub fn task(&self) -> String {
        self.task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Clears all flags and counters, bumps the generation epoch and sets a
    /// new task. Returns the new epoch.
    pub fn reset(&self, task: impl Into<String>) -> u64 {
        *self
            .task
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = task.into();
        self.completions.store(0, Ordering::SeqCst);
        self.ticks.store(0, Ordering::SeqCst);
        self.current_phase.store(NO_PHASE, Ordering::SeqCst);

        let mut next = 0;
        // fetch_update only fails when the closure returns None
        let _ = self
            .injection
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |packed| {
                next = (packed >> STATE_BITS).wrapping_add(1) & (u64::MAX >> STATE_BITS);
                Some(pack(next, InjectionState::Idle))
            });
        next
    }
}

impl std::fmt::Debug for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineState")
            .field("injection", &self.injection())
            .field("epoch", &self.epoch())
            .field("completions", &self.completions())
            .field("ticks", &self.ticks())
            .field("current_phase", &self.current_phase())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn injection_is_write_once() {
        let state = EngineState::new("task");
        let ticket = state.try_begin_injection().unwrap();
        assert_eq!(state.injection(), InjectionState::Pending);
        assert!(state.try_begin_injection().is_none());

        assert!(state.complete_injection(ticket));
        assert_eq!(state.injection(), InjectionState::Written);
        assert!(state.try_begin_injection().is_none());
    }

    #[test]
    fn abandoned_injection_can_retry() {
        let state = EngineState::new("task");
        let ticket = state.try_begin_injection().unwrap();
        assert!(state.abandon_injection(ticket));
        assert_eq!(state.injection(), InjectionState::Idle);
        assert!(state.try_begin_injection().is_some());
    }

    #[test]
    fn reset_invalidates_in_flight_ticket() {
        let state = EngineState::new("old");
        let stale = state.try_begin_injection().unwrap();

        let epoch = state.reset("new");
        assert_eq!(epoch, stale.epoch() + 1);
        assert_eq!(state.task(), "new");
        assert!(!state.is_live(stale));

        // A new request starts in the new epoch; the stale one cannot finish it
        let fresh = state.try_begin_injection().unwrap();
        assert!(!state.complete_injection(stale));
        assert_eq!(state.injection(), InjectionState::Pending);
        assert!(state.complete_injection(fresh));
    }

    #[test]
    fn completion_counter_gates_on_expected_value() {
        let state = EngineState::new("task");
        assert!(!state.advance_completions(1));
        assert!(state.advance_completions(0));
        assert!(!state.advance_completions(0));
        assert!(state.advance_completions(1));
        assert_eq!(state.completions(), 2);
    }

    #[test]
    fn enter_phase_resets_ticks() {
        let state = EngineState::new("task");
        assert_eq!(state.enter_phase(0), None);
        state.record_tick();
        state.record_tick();
        assert_eq!(state.ticks(), 2);
        assert_eq!(state.enter_phase(1), Some(0));
        assert_eq!(state.ticks(), 0);
        assert_eq!(state.current_phase(), Some(1));
    }

    #[test]
    fn concurrent_begin_yields_one_ticket() {
        let state = Arc::new(EngineState::new("task"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let s = Arc::clone(&state);
                std::thread::spawn(move || s.try_begin_injection().is_some())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
