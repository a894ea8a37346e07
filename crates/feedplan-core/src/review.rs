//! Reviewer output.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewIssue {
    pub day_number: u32,
    pub severity: Severity,
    pub category: String,
    pub message: String,
}

impl ReviewIssue {
    /// Medium and high issues are worth a rewrite.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        self.severity >= Severity::Medium
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewReport {
    /// Overall quality, 0 to 100.
    pub score: u8,
    pub issues: Vec<ReviewIssue>,
    pub summary: String,
}

impl ReviewReport {
    #[must_use]
    pub fn actionable_issues(&self) -> Vec<ReviewIssue> {
        self.issues
            .iter()
            .filter(|i| i.is_actionable())
            .cloned()
            .collect()
    }

    /// Day numbers referenced by actionable issues, ascending.
    #[must_use]
    pub fn days_needing_rewrite(&self) -> BTreeSet<u32> {
        self.issues
            .iter()
            .filter(|i| i.is_actionable())
            .map(|i| i.day_number)
            .collect()
    }

    /// Feedback text for the planner or writer describing this report.
    #[must_use]
    pub fn feedback_text(&self) -> String {
        let mut out = format!("Review score {}/100. {}", self.score, self.summary.trim());
        for issue in &self.issues {
            out.push_str(&format!(
                "\n- day {} [{}/{}]: {}",
                issue.day_number, issue.severity, issue.category, issue.message
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(day: u32, severity: Severity) -> ReviewIssue {
        ReviewIssue {
            day_number: day,
            severity,
            category: "tone".to_string(),
            message: format!("day {day} reads flat"),
        }
    }

    #[test]
    fn severity_orders_low_to_high() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
    }

    #[test]
    fn days_needing_rewrite_skips_low_and_dedups() {
        let report = ReviewReport {
            score: 40,
            issues: vec![
                issue(3, Severity::High),
                issue(1, Severity::Low),
                issue(3, Severity::Medium),
                issue(2, Severity::Medium),
            ],
            summary: "uneven".to_string(),
        };
        let days: Vec<u32> = report.days_needing_rewrite().into_iter().collect();
        assert_eq!(days, vec![2, 3]);
        assert_eq!(report.actionable_issues().len(), 3);
    }

    #[test]
    fn feedback_text_lists_every_issue() {
        let report = ReviewReport {
            score: 55,
            issues: vec![issue(4, Severity::High)],
            summary: "Needs work".to_string(),
        };
        let text = report.feedback_text();
        assert!(text.starts_with("Review score 55/100. Needs work"));
        assert!(text.contains("day 4 [high/tone]"));
    }
}
