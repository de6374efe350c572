//! Experiment, assignment and performance types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use super::StrategyKind;

/// Lifecycle state of an experiment.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    #[default]
    Draft,
    Active,
    Paused,
    Completed,
    Archived,
}

impl ExperimentStatus {
    /// Whether the lifecycle allows moving from `self` to `target`.
    ///
    /// draft -> active -> {paused <-> active, completed} -> archived.
    /// Completion always comes from active; archived is terminal.
    pub fn can_transition_to(&self, target: ExperimentStatus) -> bool {
        use ExperimentStatus::*;
        matches!(
            (self, target),
            (Draft, Active)
                | (Active, Paused)
                | (Paused, Active)
                | (Active, Completed)
                | (Paused, Archived)
                | (Completed, Archived)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExperimentStatus::Archived)
    }
}

/// Experiment arm. `A` is control, `B` is treatment.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
pub enum Variant {
    A,
    B,
}

impl Variant {
    pub fn is_control(&self) -> bool {
        matches!(self, Variant::A)
    }
}

/// Metric an experiment is judged on.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SuccessMetric {
    #[default]
    Ctr,
    ConversionRate,
}

/// An A/B test comparing two strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub strategy_control: StrategyKind,
    pub strategy_treatment: StrategyKind,
    /// Fraction of new assignments that land in control.
    pub traffic_split: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    pub status: ExperimentStatus,
    pub success_metric: SuccessMetric,
    pub min_sample_size: u64,
    pub confidence_level: f64,
    pub power_target: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Experiment {
    /// Strategy served to a variant.
    pub fn strategy_for(&self, variant: Variant) -> StrategyKind {
        match variant {
            Variant::A => self.strategy_control,
            Variant::B => self.strategy_treatment,
        }
    }

    /// Significance threshold derived from the confidence level.
    ///
    /// Rounded to nine places so 0.95 yields exactly 0.05.
    pub fn alpha(&self) -> f64 {
        ((1.0 - self.confidence_level) * 1e9).round() / 1e9
    }

    pub fn is_active(&self) -> bool {
        self.status == ExperimentStatus::Active
    }
}

/// Operator input for creating an experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExperiment {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub strategy_control: StrategyKind,
    pub strategy_treatment: StrategyKind,
    #[serde(default)]
    pub traffic_split: Option<f64>,
    #[serde(default)]
    pub success_metric: SuccessMetric,
    #[serde(default)]
    pub min_sample_size: Option<u64>,
    #[serde(default)]
    pub confidence_level: Option<f64>,
    #[serde(default)]
    pub power_target: Option<f64>,
}

impl NewExperiment {
    pub fn new(
        name: impl Into<String>,
        strategy_control: StrategyKind,
        strategy_treatment: StrategyKind,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            strategy_control,
            strategy_treatment,
            traffic_split: None,
            success_metric: SuccessMetric::default(),
            min_sample_size: None,
            confidence_level: None,
            power_target: None,
        }
    }

    pub fn with_traffic_split(mut self, split: f64) -> Self {
        self.traffic_split = Some(split);
        self
    }

    pub fn with_success_metric(mut self, metric: SuccessMetric) -> Self {
        self.success_metric = metric;
        self
    }

    pub fn with_min_sample_size(mut self, n: u64) -> Self {
        self.min_sample_size = Some(n);
        self
    }
}

/// Persisted, sticky mapping of a user to a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentAssignment {
    pub user_id: String,
    pub experiment_id: String,
    pub variant: Variant,
    pub assigned_at: DateTime<Utc>,
}

/// Outcome of an insert-if-absent assignment write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentWrite {
    /// Our row was stored.
    Inserted(ExperimentAssignment),
    /// Another writer got there first; this is the stored row.
    Existing(ExperimentAssignment),
}

impl AssignmentWrite {
    pub fn into_assignment(self) -> ExperimentAssignment {
        match self {
            AssignmentWrite::Inserted(a) | AssignmentWrite::Existing(a) => a,
        }
    }
}

/// Experiment-side user action.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExperimentAction {
    Impression,
    Click,
    Conversion,
    Engagement,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engagement_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyKind>,
}

/// Append-only experiment log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceLogEntry {
    pub id: String,
    pub experiment_id: String,
    pub user_id: String,
    pub variant: Variant,
    pub action: ExperimentAction,
    pub item_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_in_list: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub metadata: PerformanceMetadata,
    pub occurred_at: DateTime<Utc>,
}

/// Aggregated results for one variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentPerformance {
    pub variant: Variant,
    pub total_users: u64,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub ctr: f64,
    pub conversion_rate: f64,
    pub avg_engagement_time: f64,
}

impl ExperimentPerformance {
    pub fn empty(variant: Variant) -> Self {
        Self {
            variant,
            total_users: 0,
            impressions: 0,
            clicks: 0,
            conversions: 0,
            ctr: 0.0,
            conversion_rate: 0.0,
            avg_engagement_time: 0.0,
        }
    }

    /// Observed proportion for a metric.
    pub fn metric(&self, metric: SuccessMetric) -> f64 {
        match metric {
            SuccessMetric::Ctr => self.ctr,
            SuccessMetric::ConversionRate => self.conversion_rate,
        }
    }
}

/// Control and treatment performance side by side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceByVariant {
    pub control: ExperimentPerformance,
    pub treatment: ExperimentPerformance,
}

/// Outcome of one two-sample comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalTestResult {
    pub experiment_id: String,
    pub metric_name: String,
    pub control_mean: f64,
    pub treatment_mean: f64,
    pub control_n: u64,
    pub treatment_n: u64,
    pub t_statistic: f64,
    pub p_value: f64,
    pub is_significant: bool,
    pub ci_lower: f64,
    pub ci_upper: f64,
    /// Cohen's d.
    pub effect_size: f64,
    pub power: f64,
    pub computed_at: DateTime<Utc>,
}

/// Full analysis handed back to operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentAnalysis {
    pub experiment_id: String,
    pub performance: PerformanceByVariant,
    pub statistical_tests: Vec<StatisticalTestResult>,
    pub recommendation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<Variant>,
    pub confidence: f64,
    pub sample_size_reached: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_lifecycle_edges() {
        use ExperimentStatus::*;
        assert!(Draft.can_transition_to(Active));
        assert!(Active.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Active));
        assert!(Active.can_transition_to(Completed));
        assert!(Completed.can_transition_to(Archived));
        assert!(Paused.can_transition_to(Archived));

        assert!(!Draft.can_transition_to(Completed));
        assert!(!Paused.can_transition_to(Completed));
        assert!(!Draft.can_transition_to(Archived));
    }

    #[test]
    fn test_alpha_is_exact_for_common_levels() {
        let now = Utc::now();
        let mut exp = Experiment {
            id: "e".into(),
            name: "n".into(),
            description: None,
            strategy_control: StrategyKind::Hybrid,
            strategy_treatment: StrategyKind::Trending,
            traffic_split: 0.5,
            start_date: None,
            end_date: None,
            status: ExperimentStatus::Draft,
            success_metric: SuccessMetric::Ctr,
            min_sample_size: 100,
            confidence_level: 0.95,
            power_target: 0.8,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(exp.alpha(), 0.05);
        exp.confidence_level = 0.99;
        assert_eq!(exp.alpha(), 0.01);
        exp.confidence_level = 0.9;
        assert_eq!(exp.alpha(), 0.1);
    }

    #[test]
    fn test_archived_is_terminal() {
        for target in ExperimentStatus::iter() {
            assert!(!ExperimentStatus::Archived.can_transition_to(target));
        }
        assert!(ExperimentStatus::Archived.is_terminal());
    }

    #[test]
    fn test_variant_serializes_as_letter() {
        assert_eq!(serde_json::to_string(&Variant::B).unwrap(), "\"B\"");
        assert_eq!(Variant::A.to_string(), "A");
    }
}
