use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

/// Suggestions below this confidence carry an advisory asking the user to
/// double check the category. Independent of the tier boundaries.
pub const REVIEW_NOTICE_THRESHOLD: f64 = 0.7;

pub const MAX_DISPLAYED_SCORES: usize = 4;

/// A category suggested by the categoriser for a single transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub category: String,
    pub confidence: f64,
    #[serde(default)]
    pub scores: Option<HashMap<String, f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            ConfidenceTier::High
        } else if confidence >= 0.6 {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "High Confidence",
            ConfidenceTier::Medium => "Medium Confidence",
            ConfidenceTier::Low => "Low Confidence",
        }
    }
}

pub fn needs_review_notice(confidence: f64) -> bool {
    confidence < REVIEW_NOTICE_THRESHOLD
}

/// Highest scores first, at most [`MAX_DISPLAYED_SCORES`] of them. Equal
/// scores are ordered by category name so the output is deterministic.
pub fn top_scores(scores: &HashMap<String, f64>) -> Vec<(String, f64)> {
    let mut entries: Vec<(String, f64)> = scores
        .iter()
        .map(|(category, score)| (category.clone(), *score))
        .collect();

    entries.sort_by(|(a_category, a_score), (b_category, b_score)| {
        b_score
            .total_cmp(a_score)
            .then_with(|| a_category.cmp(b_category))
    });
    entries.truncate(MAX_DISPLAYED_SCORES);
    entries
}

fn as_percent(value: f64) -> u32 {
    (value * 100.0).round() as u32
}

/// View of a suggestion ready to render. Holds no state of its own beyond
/// what it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionCard<'a> {
    suggestion: &'a Suggestion,
    busy: bool,
}

impl<'a> SuggestionCard<'a> {
    /// Returns `None` when there is nothing to show.
    pub fn new(suggestion: Option<&'a Suggestion>, busy: bool) -> Option<Self> {
        suggestion.map(|suggestion| SuggestionCard { suggestion, busy })
    }

    pub fn tier(&self) -> ConfidenceTier {
        ConfidenceTier::from_confidence(self.suggestion.confidence)
    }

    pub fn shows_review_notice(&self) -> bool {
        needs_review_notice(self.suggestion.confidence)
    }

    pub fn displayed_scores(&self) -> Vec<(String, u32)> {
        self.suggestion
            .scores
            .as_ref()
            .map(|scores| {
                top_scores(scores)
                    .into_iter()
                    .map(|(category, score)| (category, as_percent(score)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn actions_enabled(&self) -> bool {
        !self.busy
    }

    pub fn accept_label(&self) -> &'static str {
        if self.busy { "Accepting..." } else { "Accept" }
    }

    pub fn reject_label(&self) -> &'static str {
        "Reject"
    }

    /// Hands the suggestion to `on_accept`. Does nothing while busy.
    pub fn accept<F: FnMut(&Suggestion)>(&self, mut on_accept: F) -> bool {
        if self.busy {
            return false;
        }
        on_accept(self.suggestion);
        true
    }

    /// Hands the suggestion to `on_reject`. Does nothing while busy.
    pub fn reject<F: FnMut(&Suggestion)>(&self, mut on_reject: F) -> bool {
        if self.busy {
            return false;
        }
        on_reject(self.suggestion);
        true
    }
}

impl fmt::Display for SuggestionCard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Suggested category: {}", self.suggestion.category)?;
        writeln!(
            f,
            "Confidence: {}% ({})",
            as_percent(self.suggestion.confidence),
            self.tier().label()
        )?;

        if self.shows_review_notice() {
            writeln!(
                f,
                "Note: this suggestion has low confidence, please review it before accepting."
            )?;
        }

        let scores = self.displayed_scores();
        if !scores.is_empty() {
            writeln!(f, "Other categories:")?;
            for (category, percent) in scores.iter() {
                writeln!(f, "  {}: {}%", category, percent)?;
            }
        }

        let state = if self.actions_enabled() { "" } else { " (disabled)" };
        write!(
            f,
            "[{}] [{}]{}",
            self.accept_label(),
            self.reject_label(),
            state
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suggestion(confidence: f64) -> Suggestion {
        Suggestion {
            category: String::from("Groceries"),
            confidence,
            scores: None,
        }
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(ConfidenceTier::from_confidence(0.8), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_confidence(0.79), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_confidence(0.6), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_confidence(0.59), ConfidenceTier::Low);
        assert_eq!(ConfidenceTier::from_confidence(1.0).label(), "High Confidence");
        assert_eq!(ConfidenceTier::from_confidence(0.0).label(), "Low Confidence");
    }

    #[test]
    fn review_notice_below_point_seven() {
        assert!(needs_review_notice(0.69));
        assert!(!needs_review_notice(0.70));

        let medium_with_notice = suggestion(0.65);
        let card = SuggestionCard::new(Some(&medium_with_notice), false).unwrap();
        assert_eq!(card.tier(), ConfidenceTier::Medium);
        assert!(card.shows_review_notice());
    }

    #[test]
    fn top_four_scores_descending_with_ties_by_name() {
        let scores: HashMap<String, f64> = [
            ("Dining", 0.30),
            ("Groceries", 0.30),
            ("Shopping", 0.15),
            ("Transportation", 0.10),
            ("Utilities", 0.10),
            ("Entertainment", 0.05),
        ]
        .into_iter()
        .map(|(category, score)| (category.to_string(), score))
        .collect();

        let top = top_scores(&scores);
        let categories: Vec<&str> = top.iter().map(|(category, _)| category.as_str()).collect();
        assert_eq!(
            categories,
            vec!["Dining", "Groceries", "Shopping", "Transportation"]
        );
    }

    #[test]
    fn displayed_scores_are_percentages() {
        let mut with_scores = suggestion(0.9);
        with_scores.scores = Some(HashMap::from([
            (String::from("Groceries"), 0.9),
            (String::from("Dining"), 0.07),
        ]));
        let card = SuggestionCard::new(Some(&with_scores), false).unwrap();
        assert_eq!(
            card.displayed_scores(),
            vec![(String::from("Groceries"), 90), (String::from("Dining"), 7)]
        );
    }

    #[test]
    fn no_suggestion_renders_nothing() {
        assert!(SuggestionCard::new(None, false).is_none());
    }

    #[test]
    fn busy_card_disables_actions() {
        let s = suggestion(0.85);
        let card = SuggestionCard::new(Some(&s), true).unwrap();
        let mut calls = 0;

        assert!(!card.accept(|_| calls += 1));
        assert!(!card.reject(|_| calls += 1));
        assert_eq!(calls, 0);
        assert_eq!(card.accept_label(), "Accepting...");
        assert!(card.to_string().ends_with("[Accepting...] [Reject] (disabled)"));
    }

    #[test]
    fn idle_card_dispatches_suggestion() {
        let s = suggestion(0.85);
        let card = SuggestionCard::new(Some(&s), false).unwrap();
        let mut accepted = vec![];
        let mut rejected = vec![];

        assert!(card.accept(|s| accepted.push(s.category.clone())));
        assert!(card.reject(|s| rejected.push(s.category.clone())));
        assert_eq!(accepted, vec!["Groceries"]);
        assert_eq!(rejected, vec!["Groceries"]);
        assert_eq!(card.accept_label(), "Accept");
    }

    #[test]
    fn renders_notice_only_when_needed() {
        let confident = suggestion(0.7);
        let rendered = SuggestionCard::new(Some(&confident), false)
            .unwrap()
            .to_string();
        assert!(rendered.contains("Confidence: 70% (Medium Confidence)"));
        assert!(!rendered.contains("low confidence"));

        let unsure = suggestion(0.4);
        let rendered = SuggestionCard::new(Some(&unsure), false).unwrap().to_string();
        assert!(rendered.contains("Low Confidence"));
        assert!(rendered.contains("low confidence"));
    }

    #[test]
    fn deserializes_without_scores() {
        let parsed: Suggestion =
            serde_json::from_str("{\"category\":\"Dining\",\"confidence\":0.72}").unwrap();
        assert_eq!(parsed.category, "Dining");
        assert!(parsed.scores.is_none());
    }
}
