//! Item records and their derived feature summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A harvested idea, as read from the data store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Source community (subreddit).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub community: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Length of the item body in characters.
    #[serde(default)]
    pub content_length: usize,
    /// Editorial complexity in `[0, 1]`, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<f64>,
    #[serde(default = "default_public")]
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

fn default_public() -> bool {
    true
}

impl Item {
    /// Create a public item with only a title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            category: None,
            community: None,
            tags: Vec::new(),
            content_length: 0,
            complexity: None,
            is_public: true,
            created_at: Utc::now(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_community(mut self, community: impl Into<String>) -> Self {
        self.community = Some(community.into());
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_content_length(mut self, len: usize) -> Self {
        self.content_length = len;
        self
    }

    pub fn with_complexity(mut self, complexity: f64) -> Self {
        self.complexity = Some(complexity.clamp(0.0, 1.0));
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub fn private(mut self) -> Self {
        self.is_public = false;
        self
    }

    /// Community plus tags, deduplicated, in that order.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::with_capacity(self.tags.len() + 1);
        for label in self.community.iter().chain(self.tags.iter()) {
            if !labels.contains(&label.as_str()) {
                labels.push(label.as_str());
            }
        }
        labels
    }
}

/// Derived, per-item feature snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFeatureSummary {
    pub item_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub community: Option<String>,
    pub complexity_score: f64,
    pub popularity_score: f64,
    pub novelty_score: f64,
    pub last_updated: DateTime<Utc>,
}
