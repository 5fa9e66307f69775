//! Workflow definition.
//!
//! A [`Workflow`] is a strictly ordered list of phases. Construction checks
//! that every `Advance` step points at a later phase, so transitions the
//! engine drives on its own are always forward.

use crate::config::FormAnswers;
use crate::error::PhaseError;
use crate::page::Control;

use super::step::Step;

/// Phase name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhaseId(String);

impl PhaseId {
    /// Creates a phase id.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named phase and the steps each of its ticks runs, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseSpec {
    /// Phase name
    pub id: PhaseId,
    /// Steps run on every tick
    pub steps: Vec<Step>,
}

impl PhaseSpec {
    /// Creates a phase.
    #[must_use]
    pub fn new(id: &str, steps: Vec<Step>) -> Self {
        Self {
            id: PhaseId::new(id),
            steps,
        }
    }
}

/// Ordered set of phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workflow {
    phases: Vec<PhaseSpec>,
}

impl Workflow {
    /// Builds a workflow.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::EmptyWorkflow`] for an empty list,
    /// [`PhaseError::UnknownPhase`] when an `Advance` step names a phase
    /// that does not exist, and [`PhaseError::Backward`] when it names the
    /// same or an earlier phase.
    pub fn new(phases: Vec<PhaseSpec>) -> Result<Self, PhaseError> {
        if phases.is_empty() {
            return Err(PhaseError::EmptyWorkflow);
        }
        let workflow = Self { phases };
        for (index, phase) in workflow.phases.iter().enumerate() {
            for step in &phase.steps {
                if let Step::Advance { next, .. } = step {
                    let target = workflow.index_of(next.as_str())?;
                    if target <= index {
                        return Err(PhaseError::Backward {
                            from: phase.id.to_string(),
                            to: next.to_string(),
                        });
                    }
                }
            }
        }
        Ok(workflow)
    }

    /// The retrospective form workflow.
    ///
    /// Five phases: survey, mood, target, format, and the writing/sharing
    /// sequence that ends on the final complete button.
    #[must_use]
    pub fn retrospective(answers: &FormAnswers) -> Self {
        let mut survey: Vec<Step> = answers
            .keywords
            .iter()
            .map(|k| Step::Click(Control::Keyword(k.clone())))
            .collect();
        survey.push(Step::Click(Control::Score(answers.score)));
        survey.push(advance("phase2"));

        let phases = vec![
            PhaseSpec::new("phase1", survey),
            PhaseSpec::new(
                "phase2",
                vec![
                    Step::Click(Control::Feeling(answers.feeling.clone())),
                    Step::Click(Control::Satisfaction(answers.satisfaction.clone())),
                    Step::SlideAllToEnd,
                    advance("phase3"),
                ],
            ),
            PhaseSpec::new(
                "phase3",
                vec![Step::Click(Control::LatestConversation), advance("phase4")],
            ),
            PhaseSpec::new(
                "phase4",
                vec![Step::Click(Control::FreeFormat), advance("phase5")],
            ),
            PhaseSpec::new(
                "phase5",
                vec![
                    Step::WriteText,
                    Step::Click(Control::Skip),
                    Step::ClickCounted {
                        control: Control::CompleteInThread,
                        at: 1,
                    },
                    Step::ClickCounted {
                        control: Control::Complete,
                        at: 0,
                    },
                    Step::ClickPreferring {
                        primary: Control::ShareBesideLater,
                        fallback: Control::Later,
                    },
                    Step::Click(Control::LoadPreviousRecipients),
                    Step::Click(Control::Share),
                    Step::Click(Control::ConfirmInThread),
                    Step::Finish {
                        control: Control::FinalComplete,
                    },
                ],
            ),
        ];
        Self { phases }
    }

    /// All phases in order.
    #[must_use]
    pub fn phases(&self) -> &[PhaseSpec] {
        &self.phases
    }

    /// Number of phases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    /// Always `false`: construction rejects empty workflows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Phase at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&PhaseSpec> {
        self.phases.get(index)
    }

    /// Resolves a phase name to its index.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::UnknownPhase`] with the closest known name
    /// when it is within edit distance 3.
    pub fn index_of(&self, name: &str) -> Result<usize, PhaseError> {
        self.phases
            .iter()
            .position(|p| p.id.as_str() == name)
            .ok_or_else(|| PhaseError::UnknownPhase {
                name: name.to_string(),
                suggestion: self.suggest(name),
            })
    }

    fn suggest(&self, input: &str) -> Option<String> {
        self.phases
            .iter()
            .map(|p| (p.id.as_str(), strsim::damerau_levenshtein(input, p.id.as_str())))
            .filter(|(_, dist)| *dist <= 3)
            .min_by_key(|(_, dist)| *dist)
            .map(|(name, _)| name.to_string())
    }

    /// Phase names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.id.as_str()).collect()
    }
}

fn advance(next: &str) -> Step {
    Step::Advance {
        control: Control::Confirm,
        next: PhaseId::new(next),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrospective_has_five_forward_phases() {
        let workflow = Workflow::retrospective(&FormAnswers::default());
        assert_eq!(
            workflow.names(),
            vec!["phase1", "phase2", "phase3", "phase4", "phase5"]
        );
        // Re-validating the built-in workflow must succeed
        assert!(Workflow::new(workflow.phases().to_vec()).is_ok());
    }

    #[test]
    fn survey_clicks_every_keyword_then_score() {
        let answers = FormAnswers::default();
        let workflow = Workflow::retrospective(&answers);
        let steps = &workflow.get(0).unwrap().steps;
        assert_eq!(steps.len(), answers.keywords.len() + 2);
        assert_eq!(
            steps[answers.keywords.len()],
            Step::Click(Control::Score(9))
        );
    }

    #[test]
    fn final_phase_ends_with_finish() {
        let workflow = Workflow::retrospective(&FormAnswers::default());
        let last = workflow.get(4).unwrap().steps.last().unwrap();
        assert!(matches!(last, Step::Finish { control: Control::FinalComplete }));
    }

    #[test]
    fn unknown_phase_suggests_closest() {
        let workflow = Workflow::retrospective(&FormAnswers::default());
        assert_eq!(workflow.index_of("phase3"), Ok(2));
        assert_eq!(
            workflow.index_of("phse3"),
            Err(PhaseError::UnknownPhase {
                name: "phse3".into(),
                suggestion: Some("phase3".into()),
            })
        );
        assert!(matches!(
            workflow.index_of("completely-different"),
            Err(PhaseError::UnknownPhase { suggestion: None, .. })
        ));
    }

    #[test]
    fn backward_advance_is_rejected() {
        let phases = vec![
            PhaseSpec::new("a", vec![]),
            PhaseSpec::new("b", vec![advance("a")]),
        ];
        assert!(matches!(
            Workflow::new(phases),
            Err(PhaseError::Backward { .. })
        ));
    }

    #[test]
    fn empty_workflow_is_rejected() {
        assert_eq!(Workflow::new(vec![]), Err(PhaseError::EmptyWorkflow));
    }
}
