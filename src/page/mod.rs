//! Page adapter interface.
//!
//! The phase engine never sees markup. It asks a [`PageAdapter`] for
//! capability-named controls ("the enabled confirm button", "the latest
//! text target") and performs actions on the handles it gets back.
//! Mapping a [`Control`] onto a concrete page is entirely the adapter's job.
//!
//! A missing element is not an error: queries return `None` and the step
//! that asked is skipped until a later tick.

pub mod simulated;

use async_trait::async_trait;

use crate::error::PageError;

pub use simulated::SimulatedPage;

/// A capability the workflow can ask the page for.
///
/// Adapters only report a control when it is present *and* actionable
/// (rendered, enabled, not already selected).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Control {
    /// Enabled confirmation button of the current screen
    Confirm,
    /// Unselected keyword chip with the given label
    Keyword(String),
    /// Score button for the given value
    Score(u8),
    /// Feeling option with the given label
    Feeling(String),
    /// Satisfaction option with the given label
    Satisfaction(String),
    /// Most recent conversation entry in the thread
    LatestConversation,
    /// Free-format answer option
    FreeFormat,
    /// "Skip this question" button in the latest thread item
    Skip,
    /// "Complete" button anywhere on the page
    Complete,
    /// "Complete" button scoped to the latest thread item
    CompleteInThread,
    /// Share button sitting in the same group as the "later" button
    ShareBesideLater,
    /// "Do it later" button in the latest thread item
    Later,
    /// Button that loads the previous share recipients
    LoadPreviousRecipients,
    /// Share button in the latest thread item
    Share,
    /// Confirmation button in the latest thread item
    ConfirmInThread,
    /// Final "complete" button (with icon) that ends the workflow
    FinalComplete,
}

impl std::fmt::Display for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Confirm => f.write_str("confirm"),
            Self::Keyword(k) => write!(f, "keyword({k})"),
            Self::Score(s) => write!(f, "score({s})"),
            Self::Feeling(v) => write!(f, "feeling({v})"),
            Self::Satisfaction(v) => write!(f, "satisfaction({v})"),
            Self::LatestConversation => f.write_str("latest_conversation"),
            Self::FreeFormat => f.write_str("free_format"),
            Self::Skip => f.write_str("skip"),
            Self::Complete => f.write_str("complete"),
            Self::CompleteInThread => f.write_str("complete_in_thread"),
            Self::ShareBesideLater => f.write_str("share_beside_later"),
            Self::Later => f.write_str("later"),
            Self::LoadPreviousRecipients => f.write_str("load_previous_recipients"),
            Self::Share => f.write_str("share"),
            Self::ConfirmInThread => f.write_str("confirm_in_thread"),
            Self::FinalComplete => f.write_str("final_complete"),
        }
    }
}

/// Opaque reference to an element, valid until the page re-renders it away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub u64);

/// Kind of element that can receive free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextTargetKind {
    /// Multi-line form field
    TextArea,
    /// Element with `contenteditable="true"`
    ContentEditable,
    /// Single-line text input
    TextInput,
}

impl TextTargetKind {
    /// Preference order when several kinds are present (lower wins).
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::TextArea => 0,
            Self::ContentEditable => 1,
            Self::TextInput => 2,
        }
    }

    /// Events a host page listens for after a programmatic value change.
    ///
    /// Form fields get both `input` and `change`; editable regions only
    /// fire `input`.
    #[must_use]
    pub const fn events(self) -> &'static [InputEvent] {
        match self {
            Self::TextArea | Self::TextInput => &[InputEvent::Input, InputEvent::Change],
            Self::ContentEditable => &[InputEvent::Input],
        }
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TextArea => "textarea",
            Self::ContentEditable => "contenteditable",
            Self::TextInput => "text_input",
        }
    }
}

/// An element that can receive generated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextTarget {
    /// Element handle
    pub element: ElementHandle,
    /// What kind of element it is
    pub kind: TextTargetKind,
}

/// Synthetic event dispatched on an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputEvent {
    /// `input` (bubbling)
    Input,
    /// `change` (bubbling)
    Change,
}

/// Picks the text target the workflow writes into.
///
/// The last textarea wins; otherwise the last editable region; otherwise
/// the last single-line text input. `targets` is in document order.
#[must_use]
pub fn pick_text_target(targets: &[TextTarget]) -> Option<TextTarget> {
    targets
        .iter()
        .rev()
        .min_by_key(|t| t.kind.priority())
        .copied()
}

/// Capability-named view of the page being automated.
///
/// Implementations must be cheap to query repeatedly: the engine asks on
/// every tick.
#[async_trait]
pub trait PageAdapter: Send + Sync {
    /// Returns the control if it is currently present and actionable.
    async fn find(&self, control: &Control) -> Option<ElementHandle>;

    /// Clicks an element.
    ///
    /// # Errors
    ///
    /// Returns [`PageError`] if the element vanished or refused the click.
    async fn click(&self, element: ElementHandle) -> Result<(), PageError>;

    /// Returns every slider on the current screen.
    async fn sliders(&self) -> Vec<ElementHandle>;

    /// Focuses a slider and moves it to its maximum (the `End` key).
    ///
    /// # Errors
    ///
    /// Returns [`PageError`] if the slider vanished.
    async fn slide_to_end(&self, slider: ElementHandle) -> Result<(), PageError>;

    /// Returns every element that can receive text, in document order.
    async fn text_targets(&self) -> Vec<TextTarget>;

    /// Sets the element's value (or text content) without firing events.
    ///
    /// # Errors
    ///
    /// Returns [`PageError`] if the element vanished or is read-only.
    async fn set_text(&self, target: TextTarget, text: &str) -> Result<(), PageError>;

    /// Dispatches a bubbling synthetic event on the element.
    ///
    /// # Errors
    ///
    /// Returns [`PageError`] if the element vanished.
    async fn dispatch(&self, element: ElementHandle, event: InputEvent) -> Result<(), PageError>;

    /// Shorthand for the current screen's confirmation button.
    async fn find_confirm_button(&self) -> Option<ElementHandle> {
        self.find(&Control::Confirm).await
    }

    /// The element generated text should go into, if any.
    async fn find_text_target(&self) -> Option<TextTarget> {
        pick_text_target(&self.text_targets().await)
    }

    /// Sets text and fires the events the host page listens for, so its
    /// internal model matches what is displayed.
    ///
    /// # Errors
    ///
    /// Propagates the first [`PageError`] from setting or dispatching.
    async fn write_text(&self, target: TextTarget, text: &str) -> Result<(), PageError> {
        self.set_text(target, text).await?;
        for event in target.kind.events() {
            self.dispatch(target.element, *event).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: u64, kind: TextTargetKind) -> TextTarget {
        TextTarget {
            element: ElementHandle(id),
            kind,
        }
    }

    #[test]
    fn last_textarea_wins_over_everything() {
        let targets = [
            target(1, TextTargetKind::TextInput),
            target(2, TextTargetKind::TextArea),
            target(3, TextTargetKind::ContentEditable),
            target(4, TextTargetKind::TextArea),
            target(5, TextTargetKind::TextInput),
        ];
        assert_eq!(pick_text_target(&targets), Some(target(4, TextTargetKind::TextArea)));
    }

    #[test]
    fn editable_region_beats_text_input() {
        let targets = [
            target(1, TextTargetKind::ContentEditable),
            target(2, TextTargetKind::ContentEditable),
            target(3, TextTargetKind::TextInput),
        ];
        assert_eq!(
            pick_text_target(&targets),
            Some(target(2, TextTargetKind::ContentEditable))
        );
    }

    #[test]
    fn no_targets_yields_none() {
        assert_eq!(pick_text_target(&[]), None);
    }

    #[test]
    fn form_fields_fire_input_and_change() {
        assert_eq!(
            TextTargetKind::TextArea.events(),
            &[InputEvent::Input, InputEvent::Change]
        );
        assert_eq!(TextTargetKind::ContentEditable.events(), &[InputEvent::Input]);
    }

    #[test]
    fn control_display_is_stable() {
        assert_eq!(Control::Keyword("목적중심".into()).to_string(), "keyword(목적중심)");
        assert_eq!(Control::FinalComplete.to_string(), "final_complete");
    }
}
