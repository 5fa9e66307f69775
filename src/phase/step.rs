//! Declarative phase steps.
//!
//! Every step pairs a condition (a control is present, the counter has a
//! given value, ...) with an action. Conditions are level-triggered: a step
//! whose condition does not hold is skipped silently and re-evaluated on the
//! next tick.

use tracing::debug;

use crate::page::{Control, PageAdapter, TextTarget};

use super::state::{EngineState, InjectionState};
use super::workflow::PhaseId;

/// One step of a phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Click the control if it is present.
    Click(Control),
    /// Click `primary` if present, otherwise `fallback` if present.
    ClickPreferring {
        /// Preferred control
        primary: Control,
        /// Used only when `primary` is absent
        fallback: Control,
    },
    /// Move every slider on the screen to its maximum.
    SlideAllToEnd,
    /// Click the control only while the completion counter equals `at`;
    /// a successful click increments the counter.
    ClickCounted {
        /// Control to click
        control: Control,
        /// Required counter value
        at: u32,
    },
    /// Request generated text once and write it into the text target.
    WriteText,
    /// Click the control, then leave for `next` after the settle delay.
    Advance {
        /// Control that ends the phase
        control: Control,
        /// Phase to continue with
        next: PhaseId,
    },
    /// Click the control and end the run.
    Finish {
        /// Control that ends the workflow
        control: Control,
    },
}

/// What evaluating a step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Condition did not hold
    Skipped,
    /// Action ran
    Fired,
    /// Text should be requested for this target
    Inject(TextTarget),
    /// Phase exit: move on to the given phase
    Advance(PhaseId),
    /// Workflow end reached
    Finish,
}

impl Step {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Click(c) => format!("click:{c}"),
            Self::ClickPreferring { primary, .. } => format!("click_preferring:{primary}"),
            Self::SlideAllToEnd => "slide_all_to_end".to_string(),
            Self::ClickCounted { control, at } => format!("click_counted:{control}@{at}"),
            Self::WriteText => "write_text".to_string(),
            Self::Advance { control, .. } => format!("advance:{control}"),
            Self::Finish { control } => format!("finish:{control}"),
        }
    }

    /// Evaluates the step once against the page.
    ///
    /// Page errors between query and action (the element re-rendered away)
    /// count as "condition did not hold".
    pub async fn perform(&self, page: &dyn PageAdapter, state: &EngineState) -> StepOutcome {
        match self {
            Self::Click(control) => click(page, control).await.into(),
            Self::ClickPreferring { primary, fallback } => {
                if click(page, primary).await || click(page, fallback).await {
                    StepOutcome::Fired
                } else {
                    StepOutcome::Skipped
                }
            }
            Self::SlideAllToEnd => {
                let mut moved = false;
                for slider in page.sliders().await {
                    match page.slide_to_end(slider).await {
                        Ok(()) => moved = true,
                        Err(e) => debug!(error = %e, "slider vanished"),
                    }
                }
                moved.into()
            }
            Self::ClickCounted { control, at } => {
                if state.completions() != *at {
                    return StepOutcome::Skipped;
                }
                if click(page, control).await {
                    state.advance_completions(*at);
                    StepOutcome::Fired
                } else {
                    StepOutcome::Skipped
                }
            }
            Self::WriteText => {
                if state.injection() != InjectionState::Idle || state.task().trim().is_empty() {
                    return StepOutcome::Skipped;
                }
                page.find_text_target()
                    .await
                    .map_or(StepOutcome::Skipped, StepOutcome::Inject)
            }
            Self::Advance { control, next } => {
                if click(page, control).await {
                    StepOutcome::Advance(next.clone())
                } else {
                    StepOutcome::Skipped
                }
            }
            Self::Finish { control } => {
                if click(page, control).await {
                    StepOutcome::Finish
                } else {
                    StepOutcome::Skipped
                }
            }
        }
    }
}

impl From<bool> for StepOutcome {
    fn from(fired: bool) -> Self {
        if fired { Self::Fired } else { Self::Skipped }
    }
}

/// Finds and clicks `control`; `true` if the click landed.
async fn click(page: &dyn PageAdapter, control: &Control) -> bool {
    let Some(element) = page.find(control).await else {
        return false;
    };
    match page.click(element).await {
        Ok(()) => true,
        Err(e) => {
            debug!(control = %control, error = %e, "click did not land");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::DelayOverrides;
    use crate::page::simulated::{Button, Gate, Screen};
    use crate::page::{SimulatedPage, TextTargetKind};

    fn page(screens: Vec<Screen>) -> SimulatedPage {
        SimulatedPage::new(screens, Duration::ZERO, &DelayOverrides::default())
    }

    #[tokio::test]
    async fn click_skips_missing_control() {
        let page = page(vec![Screen::new("empty", vec![])]);
        let state = EngineState::new("task");
        let outcome = Step::Click(Control::Skip).perform(&page, &state).await;
        assert_eq!(outcome, StepOutcome::Skipped);
    }

    #[tokio::test]
    async fn click_preferring_falls_back() {
        let page = page(vec![
            Screen::new("offer", vec![Button::next(Control::Later, Gate::Always)]),
            Screen::new("done", vec![]),
        ]);
        let state = EngineState::new("task");
        let step = Step::ClickPreferring {
            primary: Control::ShareBesideLater,
            fallback: Control::Later,
        };
        assert_eq!(step.perform(&page, &state).await, StepOutcome::Fired);
        assert_eq!(page.clicks(), vec![Control::Later]);
    }

    #[tokio::test]
    async fn click_counted_waits_for_its_turn() {
        let page = page(vec![Screen::new(
            "wrap-up",
            vec![Button::next(Control::CompleteInThread, Gate::Always)],
        )]);
        let state = EngineState::new("task");
        let step = Step::ClickCounted {
            control: Control::CompleteInThread,
            at: 1,
        };

        assert_eq!(step.perform(&page, &state).await, StepOutcome::Skipped);
        assert!(page.clicks().is_empty());

        assert!(state.advance_completions(0));
        assert_eq!(step.perform(&page, &state).await, StepOutcome::Fired);
        assert_eq!(state.completions(), 2);
    }

    #[tokio::test]
    async fn write_text_requires_task_and_target() {
        let page = page(vec![
            Screen::new("writing", vec![]).with_text_targets(vec![TextTargetKind::TextArea]),
        ]);

        let empty = EngineState::new("   ");
        assert_eq!(Step::WriteText.perform(&page, &empty).await, StepOutcome::Skipped);

        let state = EngineState::new("release");
        assert!(matches!(
            Step::WriteText.perform(&page, &state).await,
            StepOutcome::Inject(t) if t.kind == TextTargetKind::TextArea
        ));

        let _ticket = state.try_begin_injection().unwrap();
        assert_eq!(Step::WriteText.perform(&page, &state).await, StepOutcome::Skipped);
    }

    #[tokio::test]
    async fn advance_reports_next_phase() {
        let page = page(vec![
            Screen::new("a", vec![Button::next(Control::Confirm, Gate::Always)]),
            Screen::new("b", vec![]),
        ]);
        let state = EngineState::new("task");
        let step = Step::Advance {
            control: Control::Confirm,
            next: PhaseId::new("phase2"),
        };
        assert_eq!(
            step.perform(&page, &state).await,
            StepOutcome::Advance(PhaseId::new("phase2"))
        );
    }

    #[tokio::test]
    async fn slide_all_to_end_without_sliders_is_skipped() {
        let page = page(vec![Screen::new("flat", vec![])]);
        let state = EngineState::new("task");
        assert_eq!(Step::SlideAllToEnd.perform(&page, &state).await, StepOutcome::Skipped);
    }

    #[test]
    fn labels_are_descriptive() {
        assert_eq!(Step::Click(Control::Skip).label(), "click:skip");
        assert_eq!(
            Step::ClickCounted {
                control: Control::Complete,
                at: 0
            }
            .label(),
            "click_counted:complete@0"
        );
    }
}
