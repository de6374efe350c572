//! Experiment lifecycle, sticky variant assignment and event logging.
//!
//! Operator actions (create, transition, split changes, analysis) surface their
//! errors. Assignment sits on the serving path and degrades to control when the
//! store misbehaves.

use chrono::Utc;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ExperimentConfig;
use crate::error::{SiftError, SiftResult};
use crate::stats::StatisticalEngine;
use crate::traits::DataStore;
use crate::types::{
    AssignmentWrite, Experiment, ExperimentAction, ExperimentAnalysis, ExperimentAssignment,
    ExperimentPerformance, ExperimentStatus, NewExperiment, PerformanceByVariant,
    PerformanceLogEntry, PerformanceMetadata, Variant,
};

/// An experiment-attributed user action to log.
#[derive(Debug, Clone)]
pub struct ExperimentEvent {
    pub experiment_id: String,
    pub user_id: String,
    pub variant: Variant,
    pub action: ExperimentAction,
    pub item_id: String,
    pub position_in_list: Option<u32>,
    pub session_id: Option<String>,
    pub metadata: PerformanceMetadata,
}

impl ExperimentEvent {
    pub fn new(
        experiment_id: impl Into<String>,
        user_id: impl Into<String>,
        variant: Variant,
        action: ExperimentAction,
        item_id: impl Into<String>,
    ) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            user_id: user_id.into(),
            variant,
            action,
            item_id: item_id.into(),
            position_in_list: None,
            session_id: None,
            metadata: PerformanceMetadata::default(),
        }
    }

    pub fn at_position(mut self, position: u32) -> Self {
        self.position_in_list = Some(position);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: PerformanceMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

fn check_unit_interval(field: &str, value: f64) -> SiftResult<()> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(SiftError::out_of_range(field, value, "(0, 1)"))
    }
}

/// Aggregate one variant's log entries.
pub fn aggregate(variant: Variant, entries: &[PerformanceLogEntry]) -> ExperimentPerformance {
    let mut perf = ExperimentPerformance::empty(variant);
    let mut users: HashSet<&str> = HashSet::new();
    let mut engagement_total = 0.0;
    let mut engagement_count = 0u64;

    for entry in entries.iter().filter(|e| e.variant == variant) {
        users.insert(entry.user_id.as_str());
        match entry.action {
            ExperimentAction::Impression => perf.impressions += 1,
            ExperimentAction::Click => perf.clicks += 1,
            ExperimentAction::Conversion => perf.conversions += 1,
            ExperimentAction::Engagement => {}
        }
        if let Some(seconds) = entry.metadata.engagement_seconds {
            engagement_total += seconds;
            engagement_count += 1;
        }
    }

    perf.total_users = users.len() as u64;
    if perf.impressions > 0 {
        perf.ctr = perf.clicks as f64 / perf.impressions as f64;
        perf.conversion_rate = perf.conversions as f64 / perf.impressions as f64;
    }
    if engagement_count > 0 {
        perf.avg_engagement_time = engagement_total / engagement_count as f64;
    }
    perf
}

fn validate_event(event: &ExperimentEvent) -> SiftResult<()> {
    if event.user_id.trim().is_empty() {
        return Err(SiftError::missing_field("user_id"));
    }
    if event.item_id.trim().is_empty() {
        return Err(SiftError::missing_field("item_id"));
    }
    if let Some(seconds) = event.metadata.engagement_seconds {
        if seconds.is_nan() || seconds < 0.0 {
            return Err(SiftError::out_of_range("engagement_seconds", seconds, "[0, inf)"));
        }
    }
    Ok(())
}

fn log_entry(event: ExperimentEvent) -> PerformanceLogEntry {
    PerformanceLogEntry {
        id: uuid::Uuid::new_v4().to_string(),
        experiment_id: event.experiment_id,
        user_id: event.user_id,
        variant: event.variant,
        action: event.action,
        item_id: event.item_id,
        position_in_list: event.position_in_list,
        session_id: event.session_id,
        metadata: event.metadata,
        occurred_at: Utc::now(),
    }
}

/// Runs experiments against a [`DataStore`].
#[derive(Clone)]
pub struct ExperimentManager {
    store: Arc<dyn DataStore>,
    defaults: ExperimentConfig,
    stats: StatisticalEngine,
}

impl ExperimentManager {
    pub fn new(store: Arc<dyn DataStore>, defaults: ExperimentConfig) -> Self {
        let stats = StatisticalEngine::new(defaults.significance_method);
        Self {
            store,
            defaults,
            stats,
        }
    }

    /// Create a draft experiment, filling unset fields from the defaults.
    pub async fn create_experiment(&self, input: NewExperiment) -> SiftResult<Experiment> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(SiftError::missing_field("name"));
        }
        if input.strategy_control == input.strategy_treatment {
            return Err(SiftError::validation_with_suggestion(
                format!(
                    "control and treatment both use {}",
                    input.strategy_control
                ),
                "Pick two different strategies to compare",
            ));
        }

        let traffic_split = input
            .traffic_split
            .unwrap_or(self.defaults.default_traffic_split);
        let confidence_level = input
            .confidence_level
            .unwrap_or(self.defaults.default_confidence_level);
        let power_target = input
            .power_target
            .unwrap_or(self.defaults.default_power_target);
        let min_sample_size = input
            .min_sample_size
            .unwrap_or(self.defaults.default_min_sample_size);

        check_unit_interval("traffic_split", traffic_split)?;
        check_unit_interval("confidence_level", confidence_level)?;
        check_unit_interval("power_target", power_target)?;
        if min_sample_size == 0 {
            return Err(SiftError::out_of_range(
                "min_sample_size",
                0.0,
                "[1, inf)",
            ));
        }

        let now = Utc::now();
        let experiment = Experiment {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: input.description,
            strategy_control: input.strategy_control,
            strategy_treatment: input.strategy_treatment,
            traffic_split,
            start_date: None,
            end_date: None,
            status: ExperimentStatus::Draft,
            success_metric: input.success_metric,
            min_sample_size,
            confidence_level,
            power_target,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_experiment(&experiment).await?;
        info!(
            experiment_id = %experiment.id,
            control = %experiment.strategy_control,
            treatment = %experiment.strategy_treatment,
            "created experiment"
        );
        Ok(experiment)
    }

    /// Get an experiment or fail with not-found.
    pub async fn get_experiment(&self, experiment_id: &str) -> SiftResult<Experiment> {
        self.store
            .get_experiment(experiment_id)
            .await?
            .ok_or_else(|| SiftError::experiment_not_found(experiment_id))
    }

    pub async fn list_experiments(
        &self,
        status: Option<ExperimentStatus>,
    ) -> SiftResult<Vec<Experiment>> {
        self.store.list_experiments(status).await
    }

    /// Move an experiment along its lifecycle.
    pub async fn transition(
        &self,
        experiment_id: &str,
        target: ExperimentStatus,
    ) -> SiftResult<Experiment> {
        let mut experiment = self.get_experiment(experiment_id).await?;
        let from = experiment.status;
        if !from.can_transition_to(target) {
            return Err(SiftError::invalid_transition(from.to_string(), target.to_string()));
        }

        let now = Utc::now();
        if target == ExperimentStatus::Active && experiment.start_date.is_none() {
            experiment.start_date = Some(now);
        }
        if target == ExperimentStatus::Completed {
            experiment.end_date = Some(now);
        }
        experiment.status = target;
        experiment.updated_at = now;

        self.store.update_experiment(&experiment).await?;
        info!(experiment_id, from = %from, to = %target, "experiment transitioned");
        Ok(experiment)
    }

    /// Change the split for future assignments. Stored assignments stay put.
    pub async fn update_traffic_split(
        &self,
        experiment_id: &str,
        traffic_split: f64,
    ) -> SiftResult<Experiment> {
        check_unit_interval("traffic_split", traffic_split)?;
        let mut experiment = self.get_experiment(experiment_id).await?;
        if experiment.status.is_terminal() {
            return Err(SiftError::validation(format!(
                "experiment {} is archived",
                experiment_id
            )));
        }
        experiment.traffic_split = traffic_split;
        experiment.updated_at = Utc::now();
        self.store.update_experiment(&experiment).await?;
        info!(experiment_id, traffic_split, "traffic split updated");
        Ok(experiment)
    }

    /// Assign a variant, surfacing store failures.
    pub async fn try_assign_variant(
        &self,
        user_id: &str,
        experiment_id: &str,
    ) -> SiftResult<Variant> {
        if let Some(existing) = self.store.get_assignment(user_id, experiment_id).await? {
            return Ok(existing.variant);
        }

        let experiment = self.get_experiment(experiment_id).await?;
        if !experiment.is_active() {
            debug!(user_id, experiment_id, status = %experiment.status, "experiment not active, serving control");
            return Ok(Variant::A);
        }

        let draw: f64 = rand::thread_rng().gen();
        let variant = if draw < experiment.traffic_split {
            Variant::A
        } else {
            Variant::B
        };
        let assignment = ExperimentAssignment {
            user_id: user_id.to_string(),
            experiment_id: experiment_id.to_string(),
            variant,
            assigned_at: Utc::now(),
        };

        match self.store.insert_assignment_if_absent(&assignment).await? {
            AssignmentWrite::Inserted(a) => {
                debug!(user_id, experiment_id, variant = %a.variant, "assigned variant");
                Ok(a.variant)
            }
            AssignmentWrite::Existing(a) => {
                debug!(user_id, experiment_id, variant = %a.variant, "lost assignment race, using stored variant");
                Ok(a.variant)
            }
        }
    }

    /// Assign a variant. Any failure serves control.
    pub async fn assign_variant(&self, user_id: &str, experiment_id: &str) -> Variant {
        match self.try_assign_variant(user_id, experiment_id).await {
            Ok(variant) => variant,
            Err(e) => {
                warn!(user_id, experiment_id, error = %e, "assignment failed, serving control");
                Variant::A
            }
        }
    }

    /// Append an experiment log entry.
    pub async fn log_event(&self, event: ExperimentEvent) -> SiftResult<PerformanceLogEntry> {
        validate_event(&event)?;
        // Existence check only; logging is allowed in any status.
        self.get_experiment(&event.experiment_id).await?;

        let entry = log_entry(event);
        self.store.append_performance_log(&entry).await?;
        Ok(entry)
    }

    /// Append several entries for an experiment the caller already loaded.
    ///
    /// Stops at the first invalid event or store failure; entries before it
    /// stay written. Returns how many were appended.
    pub async fn log_events_for(
        &self,
        experiment: &Experiment,
        events: impl IntoIterator<Item = ExperimentEvent>,
    ) -> SiftResult<usize> {
        let mut written = 0;
        for event in events {
            if event.experiment_id != experiment.id {
                return Err(SiftError::validation(format!(
                    "event for experiment {} logged against {}",
                    event.experiment_id, experiment.id
                )));
            }
            validate_event(&event)?;
            self.store.append_performance_log(&log_entry(event)).await?;
            written += 1;
        }
        Ok(written)
    }

    /// Per-variant performance from the log.
    pub async fn performance(&self, experiment_id: &str) -> SiftResult<PerformanceByVariant> {
        let logs = self.store.performance_logs(experiment_id).await?;
        Ok(PerformanceByVariant {
            control: aggregate(Variant::A, &logs),
            treatment: aggregate(Variant::B, &logs),
        })
    }

    /// Run the significance tests and persist their results.
    pub async fn analyze(&self, experiment_id: &str) -> SiftResult<ExperimentAnalysis> {
        let experiment = self.get_experiment(experiment_id).await?;
        let performance = self.performance(experiment_id).await?;
        let analysis = self.stats.analyze(&experiment, &performance, Utc::now());
        self.store
            .save_test_results(&analysis.statistical_tests)
            .await?;
        info!(
            experiment_id,
            winner = ?analysis.winner,
            confidence = analysis.confidence,
            "experiment analyzed"
        );
        Ok(analysis)
    }

    /// The most recently started active experiment.
    pub async fn active_experiment(&self) -> SiftResult<Option<Experiment>> {
        let active = self
            .store
            .list_experiments(Some(ExperimentStatus::Active))
            .await?;
        Ok(active
            .into_iter()
            .max_by_key(|e| e.start_date))
    }
}
