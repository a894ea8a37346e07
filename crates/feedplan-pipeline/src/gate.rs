//! Quality gate and the review-loop state machine.
//!
//! The loop is data-driven: [`QualityPolicy`] holds the threshold and the
//! number of escalations allowed, and [`ReviewState::after_review`] is the only
//! place that decides what comes next. The orchestrator just executes states.

use feedplan_core::{AppConfig, ReviewIssue, ReviewReport};

use crate::progress::Stage;

pub const DEFAULT_QUALITY_THRESHOLD: u8 = 80;
pub const DEFAULT_MAX_REFINEMENT_ROUNDS: u8 = 2;

/// What to do with a set of captions after a review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Accept,
    /// Rewrite only the days named by these issues.
    Rewrite(Vec<ReviewIssue>),
    /// Plan again from the same analyses, with review feedback.
    Replan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityPolicy {
    pub threshold: u8,
    /// Escalations allowed after the first review: the first is a targeted
    /// rewrite, the second a full re-plan.
    pub max_refinement_rounds: u8,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_QUALITY_THRESHOLD,
            max_refinement_rounds: DEFAULT_MAX_REFINEMENT_ROUNDS,
        }
    }
}

impl QualityPolicy {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            threshold: config.quality_threshold,
            max_refinement_rounds: config.max_refinement_rounds,
        }
    }

    /// Decides the next step given a report and the escalations already spent.
    ///
    /// Pure: the same inputs always give the same decision.
    #[must_use]
    pub fn decide(&self, report: &ReviewReport, escalations: u8) -> Decision {
        if report.score >= self.threshold || escalations >= self.max_refinement_rounds {
            return Decision::Accept;
        }
        match escalations {
            0 => {
                let issues = report.actionable_issues();
                if issues.is_empty() {
                    // Low-severity-only reports are not worth a rewrite.
                    Decision::Accept
                } else {
                    Decision::Rewrite(issues)
                }
            }
            1 => Decision::Replan,
            _ => Decision::Accept,
        }
    }
}

/// The review loop as an explicit finite-state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewState {
    /// Review the current captions; `escalations` already happened before it.
    Review { escalations: u8 },
    Rewrite { issues: Vec<ReviewIssue> },
    Replan,
    /// Reporting-only review after a re-plan; never triggers another loop.
    FinalReview,
    Accept,
}

impl ReviewState {
    #[must_use]
    pub fn start() -> Self {
        ReviewState::Review { escalations: 0 }
    }

    /// Stage label recorded when this state starts executing.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            ReviewState::Review { escalations: 0 } => Stage::Reviewing,
            ReviewState::Review { .. } => Stage::ReReview,
            ReviewState::Rewrite { .. } => Stage::Rewrite,
            ReviewState::Replan => Stage::RePlanning,
            ReviewState::FinalReview => Stage::FinalReview,
            ReviewState::Accept => Stage::Accept,
        }
    }

    /// Transition out of a `Review` state.
    #[must_use]
    pub fn after_review(policy: &QualityPolicy, report: &ReviewReport, escalations: u8) -> Self {
        match policy.decide(report, escalations) {
            Decision::Accept => ReviewState::Accept,
            Decision::Rewrite(issues) => ReviewState::Rewrite { issues },
            Decision::Replan => ReviewState::Replan,
        }
    }

    /// Transition out of a completed `Rewrite`.
    #[must_use]
    pub fn after_rewrite() -> Self {
        ReviewState::Review { escalations: 1 }
    }

    /// Transition out of a completed re-plan and re-write.
    #[must_use]
    pub fn after_replan() -> Self {
        ReviewState::FinalReview
    }
}

#[cfg(test)]
mod tests {
    use feedplan_core::Severity;

    use super::*;

    fn report(score: u8, severities: &[Severity]) -> ReviewReport {
        ReviewReport {
            score,
            issues: severities
                .iter()
                .enumerate()
                .map(|(i, &severity)| ReviewIssue {
                    day_number: u32::try_from(i).unwrap() + 1,
                    severity,
                    category: "tone".to_string(),
                    message: "off-brand".to_string(),
                })
                .collect(),
            summary: String::new(),
        }
    }

    #[test]
    fn passing_score_accepts() {
        let policy = QualityPolicy::default();
        assert_eq!(policy.decide(&report(80, &[Severity::High]), 0), Decision::Accept);
    }

    #[test]
    fn low_only_issues_accept_on_first_review() {
        let policy = QualityPolicy::default();
        assert_eq!(policy.decide(&report(30, &[Severity::Low]), 0), Decision::Accept);
    }

    #[test]
    fn actionable_issues_trigger_rewrite_then_replan() {
        let policy = QualityPolicy::default();
        let bad = report(45, &[Severity::High, Severity::Low]);

        match policy.decide(&bad, 0) {
            Decision::Rewrite(issues) => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].day_number, 1);
            }
            other => panic!("expected rewrite, got {other:?}"),
        }
        assert_eq!(policy.decide(&bad, 1), Decision::Replan);
        // Re-review escalates even when only low issues remain.
        assert_eq!(policy.decide(&report(45, &[Severity::Low]), 1), Decision::Replan);
        assert_eq!(policy.decide(&bad, 2), Decision::Accept);
    }

    #[test]
    fn threshold_and_rounds_are_data() {
        let strict = QualityPolicy {
            threshold: 95,
            max_refinement_rounds: 2,
        };
        assert!(matches!(
            strict.decide(&report(90, &[Severity::Medium]), 0),
            Decision::Rewrite(_)
        ));

        let no_refinement = QualityPolicy {
            threshold: 80,
            max_refinement_rounds: 0,
        };
        assert_eq!(
            no_refinement.decide(&report(0, &[Severity::High]), 0),
            Decision::Accept
        );

        let rewrite_only = QualityPolicy {
            threshold: 80,
            max_refinement_rounds: 1,
        };
        assert_eq!(
            rewrite_only.decide(&report(0, &[Severity::High]), 1),
            Decision::Accept
        );
    }

    #[test]
    fn machine_terminates_when_every_score_is_zero() {
        let policy = QualityPolicy::default();
        let zero = report(0, &[Severity::High]);
        let mut state = ReviewState::start();
        let mut stages = Vec::new();

        for _ in 0..10 {
            stages.push(state.stage());
            state = match state {
                ReviewState::Review { escalations } => {
                    ReviewState::after_review(&policy, &zero, escalations)
                }
                ReviewState::Rewrite { .. } => ReviewState::after_rewrite(),
                ReviewState::Replan => ReviewState::after_replan(),
                ReviewState::FinalReview | ReviewState::Accept => ReviewState::Accept,
            };
            if state == ReviewState::Accept {
                stages.push(Stage::Accept);
                break;
            }
        }

        assert_eq!(
            stages,
            vec![
                Stage::Reviewing,
                Stage::Rewrite,
                Stage::ReReview,
                Stage::RePlanning,
                Stage::FinalReview,
                Stage::Accept,
            ]
        );
    }
}
