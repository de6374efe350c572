//! Read-only dashboard aggregation.
//!
//! Everything here is computed on demand from the behavior log, the served
//! recommendation records and the experiment logs over a trailing window.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::error::SiftResult;
use crate::experiment::aggregate;
use crate::traits::DataStore;
use crate::types::{
    ActionType, ExperimentPerformance, ExperimentStatus, StrategyKind, Variant,
};

/// Days covered by the dashboard.
pub const DASHBOARD_WINDOW_DAYS: i64 = 7;

const TOP_CATEGORIES: usize = 5;

/// Activity for one UTC day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetrics {
    /// `YYYY-MM-DD`.
    pub date: String,
    pub recommendations: u64,
    pub behaviors: u64,
    pub unique_users: u64,
    pub clicks: u64,
}

/// Activity over the whole window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeeklyMetrics {
    pub recommendations: u64,
    pub behaviors: u64,
    pub unique_users: u64,
    pub clicks: u64,
    /// Clicks on recommended items divided by recommended slots.
    pub recommendation_ctr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

/// Headline numbers for one running experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub id: String,
    pub name: String,
    pub status: ExperimentStatus,
    pub strategy_control: StrategyKind,
    pub strategy_treatment: StrategyKind,
    pub traffic_split: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    pub control: ExperimentPerformance,
    pub treatment: ExperimentPerformance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsTotals {
    pub recommendations: u64,
    pub behaviors: u64,
    pub unique_users: u64,
    pub active_experiments: u64,
}

/// Everything the dashboard shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsDashboardData {
    pub generated_at: DateTime<Utc>,
    pub window_days: i64,
    pub totals: AnalyticsTotals,
    /// Oldest day first.
    pub daily: Vec<DailyMetrics>,
    pub weekly: WeeklyMetrics,
    /// Served strategy (after fallbacks) to list count.
    pub strategy_usage: BTreeMap<String, u64>,
    pub action_breakdown: BTreeMap<String, u64>,
    pub top_categories: Vec<CategoryCount>,
    pub experiments: Vec<ExperimentSummary>,
}

#[derive(Default)]
struct DayBucket {
    recommendations: u64,
    behaviors: u64,
    clicks: u64,
    users: HashSet<String>,
}

/// Builds [`AnalyticsDashboardData`] from a [`DataStore`].
#[derive(Clone)]
pub struct AnalyticsAggregator {
    store: Arc<dyn DataStore>,
}

impl AnalyticsAggregator {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    pub async fn dashboard(&self) -> SiftResult<AnalyticsDashboardData> {
        self.dashboard_at(Utc::now()).await
    }

    /// Dashboard for the window ending at `now`.
    pub async fn dashboard_at(&self, now: DateTime<Utc>) -> SiftResult<AnalyticsDashboardData> {
        let today = now.date_naive();
        let first_day = today - Duration::days(DASHBOARD_WINDOW_DAYS - 1);
        let since = first_day
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(now - Duration::days(DASHBOARD_WINDOW_DAYS));

        let metrics: Vec<_> = self
            .store
            .recommendation_metrics_since(since)
            .await?
            .into_iter()
            .filter(|m| m.created_at <= now)
            .collect();
        let behaviors: Vec<_> = self
            .store
            .behaviors_since(since, &[])
            .await?
            .into_iter()
            .filter(|e| e.occurred_at <= now)
            .collect();

        let mut days: BTreeMap<String, DayBucket> = (0..DASHBOARD_WINDOW_DAYS)
            .map(|offset| {
                let day = first_day + Duration::days(offset);
                (day.format("%Y-%m-%d").to_string(), DayBucket::default())
            })
            .collect();
        let mut window_users: HashSet<String> = HashSet::new();
        let mut strategy_usage: BTreeMap<String, u64> = BTreeMap::new();
        let mut action_breakdown: BTreeMap<String, u64> = BTreeMap::new();
        let mut categories: HashMap<String, u64> = HashMap::new();

        // Earliest time each (user, item) pair was recommended.
        let mut recommended: HashMap<(&str, &str), DateTime<Utc>> = HashMap::new();
        let mut slots = 0u64;

        for metric in &metrics {
            let key = metric.created_at.format("%Y-%m-%d").to_string();
            if let Some(bucket) = days.get_mut(&key) {
                bucket.recommendations += 1;
                bucket.users.insert(metric.user_id.clone());
            }
            window_users.insert(metric.user_id.clone());
            *strategy_usage
                .entry(metric.served_strategy.to_string())
                .or_default() += 1;

            slots += metric.recommended_item_ids.len() as u64;
            for item_id in &metric.recommended_item_ids {
                recommended
                    .entry((metric.user_id.as_str(), item_id.as_str()))
                    .and_modify(|t| *t = (*t).min(metric.created_at))
                    .or_insert(metric.created_at);
            }
        }

        let mut clicked_recommendations: HashSet<(&str, &str)> = HashSet::new();
        for event in &behaviors {
            let key = event.occurred_at.format("%Y-%m-%d").to_string();
            let is_click = event.action_type == ActionType::Click;
            if let Some(bucket) = days.get_mut(&key) {
                bucket.behaviors += 1;
                bucket.users.insert(event.user_id.clone());
                if is_click {
                    bucket.clicks += 1;
                }
            }
            window_users.insert(event.user_id.clone());
            *action_breakdown
                .entry(event.action_type.to_string())
                .or_default() += 1;
            if let Some(category) = &event.metadata.category {
                *categories.entry(category.clone()).or_default() += 1;
            }

            let pair = (event.user_id.as_str(), event.item_id.as_str());
            if is_click {
                if let Some(served_at) = recommended.get(&pair) {
                    if *served_at <= event.occurred_at {
                        clicked_recommendations.insert(pair);
                    }
                }
            }
        }

        let daily: Vec<DailyMetrics> = days
            .into_iter()
            .map(|(date, bucket)| DailyMetrics {
                date,
                recommendations: bucket.recommendations,
                behaviors: bucket.behaviors,
                unique_users: bucket.users.len() as u64,
                clicks: bucket.clicks,
            })
            .collect();

        let recommendation_ctr = if slots > 0 {
            (clicked_recommendations.len() as f64 / slots as f64).min(1.0)
        } else {
            0.0
        };
        let weekly = WeeklyMetrics {
            recommendations: metrics.len() as u64,
            behaviors: behaviors.len() as u64,
            unique_users: window_users.len() as u64,
            clicks: daily.iter().map(|d| d.clicks).sum(),
            recommendation_ctr,
        };

        let mut top_categories: Vec<CategoryCount> = categories
            .into_iter()
            .map(|(category, count)| CategoryCount { category, count })
            .collect();
        top_categories.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
        top_categories.truncate(TOP_CATEGORIES);

        let experiments = self.experiment_summaries().await?;

        debug!(
            recommendations = weekly.recommendations,
            behaviors = weekly.behaviors,
            experiments = experiments.len(),
            "dashboard aggregated"
        );

        Ok(AnalyticsDashboardData {
            generated_at: now,
            window_days: DASHBOARD_WINDOW_DAYS,
            totals: AnalyticsTotals {
                recommendations: weekly.recommendations,
                behaviors: weekly.behaviors,
                unique_users: weekly.unique_users,
                active_experiments: experiments.len() as u64,
            },
            daily,
            weekly,
            strategy_usage,
            action_breakdown,
            top_categories,
            experiments,
        })
    }

    async fn experiment_summaries(&self) -> SiftResult<Vec<ExperimentSummary>> {
        let active = self
            .store
            .list_experiments(Some(ExperimentStatus::Active))
            .await?;
        let mut summaries = Vec::with_capacity(active.len());
        for experiment in active {
            let logs = self.store.performance_logs(&experiment.id).await?;
            summaries.push(ExperimentSummary {
                control: aggregate(Variant::A, &logs),
                treatment: aggregate(Variant::B, &logs),
                id: experiment.id,
                name: experiment.name,
                status: experiment.status,
                strategy_control: experiment.strategy_control,
                strategy_treatment: experiment.strategy_treatment,
                traffic_split: experiment.traffic_split,
                start_date: experiment.start_date,
            });
        }
        Ok(summaries)
    }
}
