//! Ranked strategy output.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ActionType, Item, StrategyKind};

/// Counts of trending-relevant actions inside the trending window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionBreakdown {
    pub likes: u32,
    pub bookmarks: u32,
    pub generations: u32,
}

impl ActionBreakdown {
    /// Weighted trending total, using [`ActionType::trending_weight`].
    pub fn weighted_total(&self) -> f64 {
        [
            (ActionType::Like, self.likes),
            (ActionType::Bookmark, self.bookmarks),
            (ActionType::GenerateArtifact, self.generations),
        ]
        .iter()
        .map(|(action, count)| action.trending_weight().unwrap_or(0.0) * *count as f64)
        .sum()
    }
}

/// Signals that justified a candidate's score.
///
/// Each strategy fills only the fields it computed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supporting_users: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similar_users: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_match: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub community_match: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity_match: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_breakdown: Option<ActionBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collaborative_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diversity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serendipity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
}

/// One recommended item with its score and explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub item: Item,
    pub score: f64,
    /// Human-readable explanation.
    pub reason: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    pub strategy: StrategyKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supporting_evidence: Option<Evidence>,
}

impl ScoredCandidate {
    pub fn new(item: Item, score: f64, strategy: StrategyKind, reason: impl Into<String>) -> Self {
        Self {
            item,
            score,
            reason: reason.into(),
            confidence: 0.5,
            strategy,
            supporting_evidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.supporting_evidence = Some(evidence);
        self
    }

    pub fn item_id(&self) -> &str {
        &self.item.id
    }
}

/// Why a strategy produced nothing.
///
/// Empty output is an expected outcome, not a failure; the orchestrator uses
/// the reason only for logging and fallback decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoCandidates {
    /// No preference vector exists for the user.
    NoProfile,
    /// The user has no recorded behavior.
    NoBehavior,
    /// Nobody shares enough engagement with the user.
    NoSimilarUsers,
    /// No positive engagement inside the trending window.
    NoRecentActivity,
    /// Candidates existed but none passed the strategy's filters.
    NoEligibleItems,
    /// A store read failed; the failure was logged.
    StoreUnavailable,
}

impl fmt::Display for NoCandidates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NoCandidates::NoProfile => "no preference profile",
            NoCandidates::NoBehavior => "no behavior history",
            NoCandidates::NoSimilarUsers => "no similar users",
            NoCandidates::NoRecentActivity => "no recent activity",
            NoCandidates::NoEligibleItems => "no eligible items",
            NoCandidates::StoreUnavailable => "data store unavailable",
        };
        f.write_str(s)
    }
}

/// Result of running one strategy.
pub type StrategyOutcome = Result<Vec<ScoredCandidate>, NoCandidates>;
