//! Phase engine
//!
//! Drives the retrospective form through its phases. Each phase is polled
//! on a fixed period until one of its steps triggers a transition.
//!
//! # Architecture
//!
//! - [`EngineState`]: lock-free run state (injection flag, counters, epoch)
//! - [`Step`]: declarative condition/action pairs evaluated every tick
//! - [`Workflow`]: the ordered phases and their steps
//! - [`PhaseEngine`]: timer management, transitions, text injection

pub mod engine;
pub mod state;
pub mod step;
pub mod workflow;

pub use engine::{EngineStatus, PhaseEngine};
pub use state::{EngineState, InjectionState};
pub use step::{Step, StepOutcome};
pub use workflow::{PhaseId, PhaseSpec, Workflow};
