//! In-process simulation of the retrospective form.
//!
//! The page is a list of [`Screen`]s. Clicking a navigating button hides the
//! current screen immediately and reveals the next one only after the render
//! delay, which is what makes the engine's level-triggered polling necessary.
//! Used by `retrodrive run` for dry runs and by the test suite.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::{DelayOverrides, FormAnswers};
use crate::error::PageError;

use super::{Control, ElementHandle, InputEvent, PageAdapter, TextTarget, TextTargetKind};

// ============================================================================
// Screen model
// ============================================================================

/// When a button becomes actionable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Always enabled
    Always,
    /// Enabled once any selectable button on the screen was selected
    SelectionMade,
    /// Enabled once every slider on the screen is at its end
    SlidersAtEnd,
    /// Enabled once the page model holds non-empty text
    TextCommitted,
}

/// What a click does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Toggle on; the button is no longer offered afterwards
    Select,
    /// Render the next screen
    Next,
    /// Render the screen at the given index
    Goto(usize),
}

/// A button on a screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    /// Capability the button answers to
    pub control: Control,
    /// Enablement rule
    pub gate: Gate,
    /// Click behavior
    pub effect: Effect,
}

impl Button {
    /// A selectable option.
    #[must_use]
    pub const fn select(control: Control) -> Self {
        Self {
            control,
            gate: Gate::Always,
            effect: Effect::Select,
        }
    }

    /// A button that moves to the next screen once `gate` holds.
    #[must_use]
    pub const fn next(control: Control, gate: Gate) -> Self {
        Self {
            control,
            gate,
            effect: Effect::Next,
        }
    }
}

/// One rendered state of the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screen {
    /// Name for logs and assertions
    pub name: &'static str,
    /// Buttons in document order
    pub buttons: Vec<Button>,
    /// Number of sliders
    pub sliders: usize,
    /// Text-capable elements in document order
    pub text_targets: Vec<TextTargetKind>,
}

impl Screen {
    /// A screen with only buttons.
    #[must_use]
    pub const fn new(name: &'static str, buttons: Vec<Button>) -> Self {
        Self {
            name,
            buttons,
            sliders: 0,
            text_targets: Vec::new(),
        }
    }

    /// Adds sliders.
    #[must_use]
    pub const fn with_sliders(mut self, count: usize) -> Self {
        self.sliders = count;
        self
    }

    /// Adds text-capable elements.
    #[must_use]
    pub fn with_text_targets(mut self, kinds: Vec<TextTargetKind>) -> Self {
        self.text_targets = kinds;
        self
    }
}

// Element ids encode screen and slot so handles from an old screen are
// recognizably stale.
const SCREEN_STRIDE: u64 = 10_000;
const SLIDER_BASE: u64 = 5_000;
const TEXT_BASE: u64 = 9_000;

fn button_id(screen: usize, index: usize) -> u64 {
    screen as u64 * SCREEN_STRIDE + index as u64
}

fn slider_id(screen: usize, index: usize) -> u64 {
    screen as u64 * SCREEN_STRIDE + SLIDER_BASE + index as u64
}

fn text_id(screen: usize, index: usize) -> u64 {
    screen as u64 * SCREEN_STRIDE + TEXT_BASE + index as u64
}

// ============================================================================
// Page state
// ============================================================================

#[derive(Debug)]
struct SimState {
    screen: usize,
    visible_at: Instant,
    finished: bool,
    selected: HashSet<u64>,
    sliders_at_end: HashSet<u64>,
    displayed_text: String,
    model_text: String,
    clicks: Vec<Control>,
    events: Vec<(u64, InputEvent)>,
    set_text_calls: usize,
}

/// Simulated page implementing [`PageAdapter`].
#[derive(Debug)]
pub struct SimulatedPage {
    screens: Vec<Screen>,
    render_delay: Duration,
    // std::sync::Mutex: never held across an await point.
    state: std::sync::Mutex<SimState>,
}

impl SimulatedPage {
    /// Creates a page from explicit screens.
    ///
    /// `render_delay` passes through `overrides` first, the same way the
    /// engine resolves its own delays.
    #[must_use]
    pub fn new(screens: Vec<Screen>, render_delay: Duration, overrides: &DelayOverrides) -> Self {
        let finished = screens.is_empty();
        Self {
            screens,
            render_delay: overrides.apply(render_delay),
            state: std::sync::Mutex::new(SimState {
                screen: 0,
                visible_at: Instant::now(),
                finished,
                selected: HashSet::new(),
                sliders_at_end: HashSet::new(),
                displayed_text: String::new(),
                model_text: String::new(),
                clicks: Vec::new(),
                events: Vec::new(),
                set_text_calls: 0,
            }),
        }
    }

    /// The retrospective form: survey, mood, target, format, writing and
    /// the share/complete sequence.
    #[must_use]
    pub fn retrospective_form(
        answers: &FormAnswers,
        render_delay: Duration,
        overrides: &DelayOverrides,
    ) -> Self {
        Self::new(retrospective_screens(answers), render_delay, overrides)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        // A poisoned lock means a test panicked mid-update; the state is
        // still usable for inspection.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Controls clicked so far, in order.
    #[must_use]
    pub fn clicks(&self) -> Vec<Control> {
        self.lock().clicks.clone()
    }

    /// Text the page's own model holds (updated by `input` events).
    #[must_use]
    pub fn model_text(&self) -> String {
        self.lock().model_text.clone()
    }

    /// Text currently displayed in the text target.
    #[must_use]
    pub fn displayed_text(&self) -> String {
        self.lock().displayed_text.clone()
    }

    /// Events dispatched so far.
    #[must_use]
    pub fn events(&self) -> Vec<InputEvent> {
        self.lock().events.iter().map(|(_, e)| *e).collect()
    }

    /// Number of `set_text` calls.
    #[must_use]
    pub fn set_text_calls(&self) -> usize {
        self.lock().set_text_calls
    }

    /// Whether the last screen was left.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// Name of the current screen, or `"finished"`.
    #[must_use]
    pub fn screen_name(&self) -> &'static str {
        let state = self.lock();
        if state.finished {
            return "finished";
        }
        self.screens[state.screen].name
    }

    /// Index of the visible screen, or `None` while rendering or finished.
    fn visible_screen(&self, state: &SimState) -> Option<usize> {
        (!state.finished && Instant::now() >= state.visible_at).then_some(state.screen)
    }

    fn gate_holds(&self, state: &SimState, screen: usize, gate: Gate) -> bool {
        match gate {
            Gate::Always => true,
            Gate::SelectionMade => self.screens[screen]
                .buttons
                .iter()
                .enumerate()
                .any(|(i, _)| state.selected.contains(&button_id(screen, i))),
            Gate::SlidersAtEnd => (0..self.screens[screen].sliders)
                .all(|i| state.sliders_at_end.contains(&slider_id(screen, i))),
            Gate::TextCommitted => !state.model_text.trim().is_empty(),
        }
    }

    fn navigate(&self, state: &mut SimState, to: usize) {
        if to >= self.screens.len() {
            debug!("simulated form finished");
            state.finished = true;
            return;
        }
        debug!(from = self.screens[state.screen].name, to = self.screens[to].name, "simulated navigation");
        state.screen = to;
        state.visible_at = Instant::now() + self.render_delay;
    }
}

#[async_trait]
impl PageAdapter for SimulatedPage {
    async fn find(&self, control: &Control) -> Option<ElementHandle> {
        let state = self.lock();
        let screen = self.visible_screen(&state)?;
        self.screens[screen]
            .buttons
            .iter()
            .enumerate()
            .find(|(i, b)| {
                let id = button_id(screen, *i);
                &b.control == control
                    && !state.selected.contains(&id)
                    && self.gate_holds(&state, screen, b.gate)
            })
            .map(|(i, _)| ElementHandle(button_id(screen, i)))
    }

    async fn click(&self, element: ElementHandle) -> Result<(), PageError> {
        let mut state = self.lock();
        let screen = self
            .visible_screen(&state)
            .ok_or(PageError::Detached(element.0))?;
        let index = element
            .0
            .checked_sub(screen as u64 * SCREEN_STRIDE)
            .and_then(|i| usize::try_from(i).ok())
            .filter(|i| *i < self.screens[screen].buttons.len())
            .ok_or(PageError::Detached(element.0))?;
        let button = &self.screens[screen].buttons[index];

        if !self.gate_holds(&state, screen, button.gate) {
            return Err(PageError::Rejected {
                id: element.0,
                action: "click",
                reason: "disabled".to_string(),
            });
        }

        trace!(control = %button.control, "simulated click");
        state.clicks.push(button.control.clone());
        match button.effect {
            Effect::Select => {
                state.selected.insert(element.0);
            }
            Effect::Next => self.navigate(&mut state, screen + 1),
            Effect::Goto(to) => self.navigate(&mut state, to),
        }
        Ok(())
    }

    async fn sliders(&self) -> Vec<ElementHandle> {
        let state = self.lock();
        let Some(screen) = self.visible_screen(&state) else {
            return Vec::new();
        };
        (0..self.screens[screen].sliders)
            .map(|i| ElementHandle(slider_id(screen, i)))
            .collect()
    }

    async fn slide_to_end(&self, slider: ElementHandle) -> Result<(), PageError> {
        let mut state = self.lock();
        let screen = self
            .visible_screen(&state)
            .ok_or(PageError::Detached(slider.0))?;
        let known = (0..self.screens[screen].sliders).any(|i| slider_id(screen, i) == slider.0);
        if !known {
            return Err(PageError::Detached(slider.0));
        }
        state.sliders_at_end.insert(slider.0);
        Ok(())
    }

    async fn text_targets(&self) -> Vec<TextTarget> {
        let state = self.lock();
        let Some(screen) = self.visible_screen(&state) else {
            return Vec::new();
        };
        self.screens[screen]
            .text_targets
            .iter()
            .enumerate()
            .map(|(i, kind)| TextTarget {
                element: ElementHandle(text_id(screen, i)),
                kind: *kind,
            })
            .collect()
    }

    async fn set_text(&self, target: TextTarget, text: &str) -> Result<(), PageError> {
        let mut state = self.lock();
        let screen = self
            .visible_screen(&state)
            .ok_or(PageError::Detached(target.element.0))?;
        let known = (0..self.screens[screen].text_targets.len())
            .any(|i| text_id(screen, i) == target.element.0);
        if !known {
            return Err(PageError::Detached(target.element.0));
        }
        state.set_text_calls += 1;
        state.displayed_text = text.to_string();
        Ok(())
    }

    async fn dispatch(&self, element: ElementHandle, event: InputEvent) -> Result<(), PageError> {
        let mut state = self.lock();
        if state.finished {
            return Err(PageError::Detached(element.0));
        }
        state.events.push((element.0, event));
        // The host page syncs its model from the field on `input`
        if event == InputEvent::Input {
            state.model_text = state.displayed_text.clone();
        }
        Ok(())
    }
}

// ============================================================================
// The retrospective form
// ============================================================================

/// Index of the "share offer" screen's skip target (the final screen).
const FINAL_SCREEN: usize = 10;

fn retrospective_screens(answers: &FormAnswers) -> Vec<Screen> {
    let mut survey: Vec<Button> = answers
        .keywords
        .iter()
        .map(|k| Button::select(Control::Keyword(k.clone())))
        .collect();
    survey.extend((1..=10).map(|s| Button::select(Control::Score(s))));
    survey.push(Button::next(Control::Confirm, Gate::SelectionMade));

    vec![
        Screen::new("survey", survey),
        Screen::new(
            "mood",
            vec![
                Button::select(Control::Feeling(answers.feeling.clone())),
                Button::select(Control::Satisfaction(answers.satisfaction.clone())),
                Button::next(Control::Confirm, Gate::SlidersAtEnd),
            ],
        )
        .with_sliders(2),
        Screen::new(
            "target",
            vec![
                Button::select(Control::LatestConversation),
                Button::next(Control::Confirm, Gate::SelectionMade),
            ],
        ),
        Screen::new(
            "format",
            vec![
                Button::select(Control::FreeFormat),
                Button::next(Control::Confirm, Gate::SelectionMade),
            ],
        ),
        Screen::new(
            "writing",
            vec![Button::next(Control::Complete, Gate::TextCommitted)],
        )
        .with_text_targets(vec![TextTargetKind::TextInput, TextTargetKind::TextArea]),
        Screen::new("follow-up", vec![Button::next(Control::Skip, Gate::Always)]),
        Screen::new(
            "wrap-up",
            vec![Button::next(Control::CompleteInThread, Gate::Always)],
        ),
        Screen::new(
            "share-offer",
            vec![
                Button::next(Control::ShareBesideLater, Gate::Always),
                Button {
                    control: Control::Later,
                    gate: Gate::Always,
                    effect: Effect::Goto(FINAL_SCREEN),
                },
            ],
        ),
        Screen::new(
            "recipients",
            vec![
                Button::select(Control::LoadPreviousRecipients),
                Button::next(Control::Share, Gate::SelectionMade),
            ],
        ),
        Screen::new(
            "share-confirm",
            vec![Button::next(Control::ConfirmInThread, Gate::Always)],
        ),
        Screen::new(
            "final",
            vec![Button::next(Control::FinalComplete, Gate::Always)],
        ),
    ]
}
