//! Threshold-based decision policy.
//!
//! Maps a probability distribution to one of three categories and a fixed
//! filter action. Anything below both thresholds is `Unknown` and gets no
//! action at all, so the OS default applies instead of a guess.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_HAM_THRESHOLD, DEFAULT_SPAM_THRESHOLD};
use crate::error::{CoreError, Result};
use crate::model::ClassificationResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Spam,
    Ham,
    Unknown,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::Spam => "spam",
            Category::Ham => "ham",
            Category::Unknown => "unknown",
        })
    }
}

/// Enforcement directive returned to the extension runtime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    Allow,
    Junk,
    #[default]
    None,
}

impl fmt::Display for FilterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FilterAction::Allow => "allow",
            FilterAction::Junk => "junk",
            FilterAction::None => "none",
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum SubAction {
    #[default]
    None,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionDecision {
    pub action: FilterAction,
    pub subaction: SubAction,
}

impl ActionDecision {
    /// The conservative default: let the OS apply its own policy.
    pub const NONE: ActionDecision = ActionDecision {
        action: FilterAction::None,
        subaction: SubAction::None,
    };

    pub fn for_category(category: Category) -> Self {
        let action = match category {
            Category::Spam => FilterAction::Junk,
            Category::Ham => FilterAction::Allow,
            Category::Unknown => FilterAction::None,
        };
        Self {
            action,
            subaction: SubAction::None,
        }
    }
}

/// Category plus the action it implies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub category: Category,
    pub decision: ActionDecision,
}

impl Verdict {
    pub fn unknown() -> Self {
        Self::from_category(Category::Unknown)
    }

    pub fn from_category(category: Category) -> Self {
        Self {
            category,
            decision: ActionDecision::for_category(category),
        }
    }
}

/// Per-class confidence thresholds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    #[serde(rename = "spam_threshold")]
    pub spam: f64,
    #[serde(rename = "ham_threshold")]
    pub ham: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            spam: DEFAULT_SPAM_THRESHOLD,
            ham: DEFAULT_HAM_THRESHOLD,
        }
    }
}

impl Thresholds {
    pub fn new(spam: f64, ham: f64) -> Result<Self> {
        let t = Self { spam, ham };
        t.validate()?;
        Ok(t)
    }

    /// Both thresholds must lie in (0, 1].
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("spam", self.spam), ("ham", self.ham)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(CoreError::InvalidPolicy(format!(
                    "{name} threshold {value} outside (0, 1]"
                )));
            }
        }
        Ok(())
    }

    pub fn categorize(&self, result: &ClassificationResult) -> Category {
        if result.evidence == 0 {
            return Category::Unknown;
        }
        if result.spam_probability() >= self.spam {
            Category::Spam
        } else if result.ham_probability() >= self.ham {
            Category::Ham
        } else {
            Category::Unknown
        }
    }

    pub fn decide(&self, result: &ClassificationResult) -> Verdict {
        Verdict::from_category(self.categorize(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(spam: f64, evidence: usize) -> ClassificationResult {
        ClassificationResult {
            probabilities: vec![1.0 - spam, spam],
            spam_index: 1,
            ham_index: 0,
            evidence,
        }
    }

    #[test]
    fn test_display_matches_wire_names() {
        for c in [Category::Spam, Category::Ham, Category::Unknown] {
            assert_eq!(serde_json::to_value(c).unwrap(), c.to_string());
        }
        for a in [FilterAction::Allow, FilterAction::Junk, FilterAction::None] {
            assert_eq!(serde_json::to_value(a).unwrap(), a.to_string());
        }
    }

    #[test]
    fn test_spam_above_threshold() {
        let v = Thresholds::default().decide(&result(0.93, 4));
        assert_eq!(v.category, Category::Spam);
        assert_eq!(v.decision.action, FilterAction::Junk);
        assert_eq!(v.decision.subaction, SubAction::None);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let t = Thresholds::new(0.75, 0.75).unwrap();
        assert_eq!(t.categorize(&result(0.75, 1)), Category::Spam);
        assert_eq!(t.categorize(&result(0.25, 1)), Category::Ham);
    }

    #[test]
    fn test_ham_above_threshold() {
        let v = Thresholds::default().decide(&result(0.05, 4));
        assert_eq!(v.category, Category::Ham);
        assert_eq!(v.decision.action, FilterAction::Allow);
    }

    #[test]
    fn test_ambiguous_is_unknown() {
        let v = Thresholds::default().decide(&result(0.5, 4));
        assert_eq!(v.category, Category::Unknown);
        assert_eq!(v.decision, ActionDecision::NONE);
    }

    #[test]
    fn test_no_evidence_is_unknown() {
        let v = Thresholds::default().decide(&result(0.99, 0));
        assert_eq!(v.category, Category::Unknown);
        assert_eq!(v.decision.action, FilterAction::None);
    }

    #[test]
    fn test_spam_checked_before_ham() {
        // Low thresholds can both be met; spam wins.
        let t = Thresholds::new(0.4, 0.4).unwrap();
        assert_eq!(t.categorize(&result(0.55, 2)), Category::Spam);
    }

    #[test]
    fn test_action_mapping_is_total() {
        assert_eq!(ActionDecision::for_category(Category::Spam).action, FilterAction::Junk);
        assert_eq!(ActionDecision::for_category(Category::Ham).action, FilterAction::Allow);
        assert_eq!(ActionDecision::for_category(Category::Unknown).action, FilterAction::None);
    }

    #[test]
    fn test_threshold_validation() {
        assert!(Thresholds::new(0.0, 0.8).is_err());
        assert!(Thresholds::new(0.8, 1.2).is_err());
        assert!(Thresholds::new(f64::NAN, 0.8).is_err());
        assert!(Thresholds::new(1.0, 1.0).is_ok());
    }

    #[test]
    fn test_default_decision_is_none() {
        assert_eq!(ActionDecision::default(), ActionDecision::NONE);
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&Verdict::from_category(Category::Spam)).unwrap();
        assert_eq!(
            json,
            r#"{"category":"spam","decision":{"action":"junk","subaction":"none"}}"#
        );
    }
}
