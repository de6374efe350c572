use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// The ranking model used to produce recommendations.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Items liked by users with overlapping engagement.
    Collaborative,
    /// Items matching the user's category, community and complexity profile.
    ContentBased,
    /// Weighted blend of collaborative and content-based.
    #[default]
    Hybrid,
    /// Items with the most recent positive engagement.
    Trending,
    /// Trending, boosted by the user's category and community weights.
    PersonalizedTrending,
    /// Maximal Marginal Relevance re-ranking of the hybrid pool.
    Diversity,
    /// Good items from categories and communities the user has not explored.
    Serendipity,
    /// Newest public items; the last-resort fallback.
    Recent,
}

impl StrategyKind {
    /// Strategies a caller may request directly.
    pub const SELECTABLE: [StrategyKind; 7] = [
        StrategyKind::Collaborative,
        StrategyKind::ContentBased,
        StrategyKind::Hybrid,
        StrategyKind::Trending,
        StrategyKind::PersonalizedTrending,
        StrategyKind::Diversity,
        StrategyKind::Serendipity,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_default_is_hybrid() {
        assert_eq!(StrategyKind::default(), StrategyKind::Hybrid);
    }

    #[test]
    fn test_parse_snake_case() {
        assert_eq!(
            StrategyKind::from_str("personalized_trending").unwrap(),
            StrategyKind::PersonalizedTrending
        );
        assert_eq!(StrategyKind::ContentBased.to_string(), "content_based");
        assert!(StrategyKind::from_str("popular").is_err());
    }
}
