//! SQLite-backed DataStore.
//!
//! Natural keys are enforced by the schema: items, profiles and feature
//! summaries upsert on their primary key, and assignments carry a
//! `UNIQUE(user_id, experiment_id)` constraint so concurrent first requests
//! resolve to a single persisted variant.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{SiftError, SiftResult};
use crate::traits::{action_matches, DataStore};
use crate::types::{
    ActionType, AssignmentWrite, BehaviorEvent, Experiment, ExperimentAssignment,
    ExperimentStatus, Item, ItemFeatureSummary, PerformanceLogEntry, RecommendationMetric,
    StatisticalTestResult, UserPreferenceVector,
};

/// SQLite-backed store for items, behavior and experiments.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn new<P: AsRef<Path>>(path: P) -> SiftResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> SiftResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> SiftResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| SiftError::database(e.to_string()))
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> SiftResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                category TEXT,
                community TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                content_length INTEGER NOT NULL DEFAULT 0,
                complexity REAL,
                is_public INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_items_public_created ON items(is_public, created_at);

            -- Append-only behavior log
            CREATE TABLE IF NOT EXISTS behavior_events (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                action_type TEXT NOT NULL,
                duration_seconds REAL,
                session_id TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                occurred_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_behavior_user ON behavior_events(user_id, occurred_at);
            CREATE INDEX IF NOT EXISTS idx_behavior_item ON behavior_events(item_id);
            CREATE INDEX IF NOT EXISTS idx_behavior_occurred ON behavior_events(occurred_at);

            CREATE TABLE IF NOT EXISTS user_preferences (
                user_id TEXT PRIMARY KEY,
                category_weights TEXT NOT NULL,
                community_weights TEXT NOT NULL,
                complexity_preference REAL NOT NULL,
                novelty_preference REAL NOT NULL,
                interaction_count INTEGER NOT NULL,
                last_updated TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS item_features (
                item_id TEXT PRIMARY KEY,
                category TEXT,
                community TEXT,
                complexity_score REAL NOT NULL,
                popularity_score REAL NOT NULL,
                novelty_score REAL NOT NULL,
                last_updated TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS experiments (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                strategy_control TEXT NOT NULL,
                strategy_treatment TEXT NOT NULL,
                traffic_split REAL NOT NULL,
                start_date TEXT,
                end_date TEXT,
                status TEXT NOT NULL,
                success_metric TEXT NOT NULL,
                min_sample_size INTEGER NOT NULL,
                confidence_level REAL NOT NULL,
                power_target REAL NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_experiments_status ON experiments(status);

            -- Sticky bucketing: one row per user and experiment
            CREATE TABLE IF NOT EXISTS experiment_assignments (
                user_id TEXT NOT NULL,
                experiment_id TEXT NOT NULL,
                variant TEXT NOT NULL,
                assigned_at TEXT NOT NULL,
                UNIQUE(user_id, experiment_id)
            );

            CREATE TABLE IF NOT EXISTS experiment_performance (
                id TEXT PRIMARY KEY,
                experiment_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                variant TEXT NOT NULL,
                action TEXT NOT NULL,
                item_id TEXT NOT NULL,
                position_in_list INTEGER,
                session_id TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                occurred_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_performance_experiment
                ON experiment_performance(experiment_id, occurred_at);

            CREATE TABLE IF NOT EXISTS statistical_tests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                experiment_id TEXT NOT NULL,
                metric_name TEXT NOT NULL,
                control_mean REAL NOT NULL,
                treatment_mean REAL NOT NULL,
                control_n INTEGER NOT NULL,
                treatment_n INTEGER NOT NULL,
                t_statistic REAL NOT NULL,
                p_value REAL NOT NULL,
                is_significant INTEGER NOT NULL,
                ci_lower REAL NOT NULL,
                ci_upper REAL NOT NULL,
                effect_size REAL NOT NULL,
                power REAL NOT NULL,
                computed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tests_experiment ON statistical_tests(experiment_id);

            CREATE TABLE IF NOT EXISTS recommendation_metrics (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                requested_strategy TEXT NOT NULL,
                served_strategy TEXT NOT NULL,
                item_ids TEXT NOT NULL,
                experiment_id TEXT,
                variant TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_metrics_created ON recommendation_metrics(created_at);
            ",
        )?;

        Ok(())
    }
}

// ============================================================================
// Column helpers
// ============================================================================

/// Fixed-width UTC timestamps so text comparison matches time order.
fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_err(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_err(idx, e))
    })
    .transpose()
}

fn enum_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(|e| conversion_err(idx, e))
}

fn opt_enum_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| T::from_str(&s).map_err(|e| conversion_err(idx, e)))
        .transpose()
}

fn json_col<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_err(idx, e))
}

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

// ============================================================================
// Row mappers
// ============================================================================

const ITEM_COLUMNS: &str =
    "id, title, category, community, tags, content_length, complexity, is_public, created_at";

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        title: row.get(1)?,
        category: row.get(2)?,
        community: row.get(3)?,
        tags: json_col(row, 4)?,
        content_length: row.get::<_, i64>(5)?.max(0) as usize,
        complexity: row.get(6)?,
        is_public: row.get::<_, i64>(7)? != 0,
        created_at: ts_col(row, 8)?,
    })
}

const BEHAVIOR_COLUMNS: &str =
    "id, user_id, item_id, action_type, duration_seconds, session_id, metadata, occurred_at";

fn row_to_behavior(row: &Row<'_>) -> rusqlite::Result<BehaviorEvent> {
    Ok(BehaviorEvent {
        id: row.get(0)?,
        user_id: row.get(1)?,
        item_id: row.get(2)?,
        action_type: enum_col(row, 3)?,
        duration_seconds: row.get(4)?,
        session_id: row.get(5)?,
        metadata: json_col(row, 6)?,
        occurred_at: ts_col(row, 7)?,
    })
}

const EXPERIMENT_COLUMNS: &str = "id, name, description, strategy_control, strategy_treatment, \
     traffic_split, start_date, end_date, status, success_metric, min_sample_size, \
     confidence_level, power_target, created_at, updated_at";

fn row_to_experiment(row: &Row<'_>) -> rusqlite::Result<Experiment> {
    Ok(Experiment {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        strategy_control: enum_col(row, 3)?,
        strategy_treatment: enum_col(row, 4)?,
        traffic_split: row.get(5)?,
        start_date: opt_ts_col(row, 6)?,
        end_date: opt_ts_col(row, 7)?,
        status: enum_col(row, 8)?,
        success_metric: enum_col(row, 9)?,
        min_sample_size: row.get::<_, i64>(10)?.max(0) as u64,
        confidence_level: row.get(11)?,
        power_target: row.get(12)?,
        created_at: ts_col(row, 13)?,
        updated_at: ts_col(row, 14)?,
    })
}

fn row_to_assignment(row: &Row<'_>) -> rusqlite::Result<ExperimentAssignment> {
    Ok(ExperimentAssignment {
        user_id: row.get(0)?,
        experiment_id: row.get(1)?,
        variant: enum_col(row, 2)?,
        assigned_at: ts_col(row, 3)?,
    })
}

fn row_to_performance(row: &Row<'_>) -> rusqlite::Result<PerformanceLogEntry> {
    Ok(PerformanceLogEntry {
        id: row.get(0)?,
        experiment_id: row.get(1)?,
        user_id: row.get(2)?,
        variant: enum_col(row, 3)?,
        action: enum_col(row, 4)?,
        item_id: row.get(5)?,
        position_in_list: row.get(6)?,
        session_id: row.get(7)?,
        metadata: json_col(row, 8)?,
        occurred_at: ts_col(row, 9)?,
    })
}

fn row_to_test_result(row: &Row<'_>) -> rusqlite::Result<StatisticalTestResult> {
    Ok(StatisticalTestResult {
        experiment_id: row.get(0)?,
        metric_name: row.get(1)?,
        control_mean: row.get(2)?,
        treatment_mean: row.get(3)?,
        control_n: row.get::<_, i64>(4)?.max(0) as u64,
        treatment_n: row.get::<_, i64>(5)?.max(0) as u64,
        t_statistic: row.get(6)?,
        p_value: row.get(7)?,
        is_significant: row.get::<_, i64>(8)? != 0,
        ci_lower: row.get(9)?,
        ci_upper: row.get(10)?,
        effect_size: row.get(11)?,
        power: row.get(12)?,
        computed_at: ts_col(row, 13)?,
    })
}

fn row_to_metric(row: &Row<'_>) -> rusqlite::Result<RecommendationMetric> {
    Ok(RecommendationMetric {
        id: row.get(0)?,
        user_id: row.get(1)?,
        requested_strategy: enum_col(row, 2)?,
        served_strategy: enum_col(row, 3)?,
        recommended_item_ids: json_col(row, 4)?,
        experiment_id: row.get(5)?,
        variant: opt_enum_col(row, 6)?,
        created_at: ts_col(row, 7)?,
    })
}

// ============================================================================
// DataStore implementation
// ============================================================================

#[async_trait]
impl DataStore for SqliteStore {
    async fn upsert_item(&self, item: &Item) -> SiftResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO items (id, title, category, community, tags, content_length, complexity, is_public, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                category = excluded.category,
                community = excluded.community,
                tags = excluded.tags,
                content_length = excluded.content_length,
                complexity = excluded.complexity,
                is_public = excluded.is_public,
                created_at = excluded.created_at",
            params![
                item.id,
                item.title,
                item.category,
                item.community,
                serde_json::to_string(&item.tags)?,
                item.content_length as i64,
                item.complexity,
                item.is_public as i64,
                ts(&item.created_at),
            ],
        )?;
        Ok(())
    }

    async fn get_item(&self, item_id: &str) -> SiftResult<Option<Item>> {
        let conn = self.conn()?;
        let item = conn
            .query_row(
                &format!("SELECT {} FROM items WHERE id = ?1", ITEM_COLUMNS),
                params![item_id],
                row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    async fn get_items(&self, item_ids: &[String]) -> SiftResult<Vec<Item>> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM items WHERE id IN ({})",
            ITEM_COLUMNS,
            placeholders(item_ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params_from_iter(item_ids.iter()), row_to_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    async fn recent_public_items(&self, limit: usize) -> SiftResult<Vec<Item>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM items WHERE is_public = 1 ORDER BY created_at DESC, id ASC LIMIT ?1",
            ITEM_COLUMNS
        ))?;
        let items = stmt
            .query_map(params![limit as i64], row_to_item)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    async fn append_behavior(&self, event: &BehaviorEvent) -> SiftResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO behavior_events (id, user_id, item_id, action_type, duration_seconds, session_id, metadata, occurred_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.id,
                event.user_id,
                event.item_id,
                event.action_type.to_string(),
                event.duration_seconds,
                event.session_id,
                serde_json::to_string(&event.metadata)?,
                ts(&event.occurred_at),
            ],
        )?;
        Ok(())
    }

    async fn recent_behaviors(
        &self,
        user_id: &str,
        limit: usize,
    ) -> SiftResult<Vec<BehaviorEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM behavior_events WHERE user_id = ?1 ORDER BY occurred_at DESC LIMIT ?2",
            BEHAVIOR_COLUMNS
        ))?;
        let events = stmt
            .query_map(params![user_id, limit as i64], row_to_behavior)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    async fn interacted_item_ids(&self, user_id: &str) -> SiftResult<HashSet<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT item_id FROM behavior_events WHERE user_id = ?1")?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    async fn item_behaviors(&self, item_id: &str) -> SiftResult<Vec<BehaviorEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM behavior_events WHERE item_id = ?1 ORDER BY occurred_at ASC",
            BEHAVIOR_COLUMNS
        ))?;
        let events = stmt
            .query_map(params![item_id], row_to_behavior)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    async fn behaviors_on_items(
        &self,
        item_ids: &[String],
        actions: &[ActionType],
    ) -> SiftResult<Vec<BehaviorEvent>> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM behavior_events WHERE item_id IN ({})",
            BEHAVIOR_COLUMNS,
            placeholders(item_ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(params_from_iter(item_ids.iter()), row_to_behavior)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events
            .into_iter()
            .filter(|e| action_matches(actions, e.action_type))
            .collect())
    }

    async fn behaviors_by_users(
        &self,
        user_ids: &[String],
        actions: &[ActionType],
    ) -> SiftResult<Vec<BehaviorEvent>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM behavior_events WHERE user_id IN ({})",
            BEHAVIOR_COLUMNS,
            placeholders(user_ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(params_from_iter(user_ids.iter()), row_to_behavior)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events
            .into_iter()
            .filter(|e| action_matches(actions, e.action_type))
            .collect())
    }

    async fn behaviors_since(
        &self,
        since: DateTime<Utc>,
        actions: &[ActionType],
    ) -> SiftResult<Vec<BehaviorEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM behavior_events WHERE occurred_at >= ?1 ORDER BY occurred_at ASC",
            BEHAVIOR_COLUMNS
        ))?;
        let events = stmt
            .query_map(params![ts(&since)], row_to_behavior)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events
            .into_iter()
            .filter(|e| action_matches(actions, e.action_type))
            .collect())
    }

    async fn get_profile(&self, user_id: &str) -> SiftResult<Option<UserPreferenceVector>> {
        let conn = self.conn()?;
        let profile = conn
            .query_row(
                "SELECT user_id, category_weights, community_weights, complexity_preference,
                        novelty_preference, interaction_count, last_updated
                 FROM user_preferences WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserPreferenceVector {
                        user_id: row.get(0)?,
                        category_weights: json_col(row, 1)?,
                        community_weights: json_col(row, 2)?,
                        complexity_preference: row.get(3)?,
                        novelty_preference: row.get(4)?,
                        interaction_count: row.get::<_, i64>(5)?.max(0) as usize,
                        last_updated: ts_col(row, 6)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    async fn upsert_profile(&self, profile: &UserPreferenceVector) -> SiftResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO user_preferences (user_id, category_weights, community_weights,
                complexity_preference, novelty_preference, interaction_count, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(user_id) DO UPDATE SET
                category_weights = excluded.category_weights,
                community_weights = excluded.community_weights,
                complexity_preference = excluded.complexity_preference,
                novelty_preference = excluded.novelty_preference,
                interaction_count = excluded.interaction_count,
                last_updated = excluded.last_updated",
            params![
                profile.user_id,
                serde_json::to_string(&profile.category_weights)?,
                serde_json::to_string(&profile.community_weights)?,
                profile.complexity_preference,
                profile.novelty_preference,
                profile.interaction_count as i64,
                ts(&profile.last_updated),
            ],
        )?;
        Ok(())
    }

    async fn upsert_item_features(&self, summary: &ItemFeatureSummary) -> SiftResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO item_features (item_id, category, community, complexity_score,
                popularity_score, novelty_score, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(item_id) DO UPDATE SET
                category = excluded.category,
                community = excluded.community,
                complexity_score = excluded.complexity_score,
                popularity_score = excluded.popularity_score,
                novelty_score = excluded.novelty_score,
                last_updated = excluded.last_updated",
            params![
                summary.item_id,
                summary.category,
                summary.community,
                summary.complexity_score,
                summary.popularity_score,
                summary.novelty_score,
                ts(&summary.last_updated),
            ],
        )?;
        Ok(())
    }

    async fn get_item_features(&self, item_id: &str) -> SiftResult<Option<ItemFeatureSummary>> {
        let conn = self.conn()?;
        let summary = conn
            .query_row(
                "SELECT item_id, category, community, complexity_score, popularity_score,
                        novelty_score, last_updated
                 FROM item_features WHERE item_id = ?1",
                params![item_id],
                |row| {
                    Ok(ItemFeatureSummary {
                        item_id: row.get(0)?,
                        category: row.get(1)?,
                        community: row.get(2)?,
                        complexity_score: row.get(3)?,
                        popularity_score: row.get(4)?,
                        novelty_score: row.get(5)?,
                        last_updated: ts_col(row, 6)?,
                    })
                },
            )
            .optional()?;
        Ok(summary)
    }

    async fn insert_experiment(&self, experiment: &Experiment) -> SiftResult<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO experiments ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                EXPERIMENT_COLUMNS
            ),
            params![
                experiment.id,
                experiment.name,
                experiment.description,
                experiment.strategy_control.to_string(),
                experiment.strategy_treatment.to_string(),
                experiment.traffic_split,
                experiment.start_date.as_ref().map(ts),
                experiment.end_date.as_ref().map(ts),
                experiment.status.to_string(),
                experiment.success_metric.to_string(),
                experiment.min_sample_size as i64,
                experiment.confidence_level,
                experiment.power_target,
                ts(&experiment.created_at),
                ts(&experiment.updated_at),
            ],
        )?;
        Ok(())
    }

    async fn update_experiment(&self, experiment: &Experiment) -> SiftResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE experiments SET name = ?2, description = ?3, strategy_control = ?4,
                strategy_treatment = ?5, traffic_split = ?6, start_date = ?7, end_date = ?8,
                status = ?9, success_metric = ?10, min_sample_size = ?11,
                confidence_level = ?12, power_target = ?13, updated_at = ?14
             WHERE id = ?1",
            params![
                experiment.id,
                experiment.name,
                experiment.description,
                experiment.strategy_control.to_string(),
                experiment.strategy_treatment.to_string(),
                experiment.traffic_split,
                experiment.start_date.as_ref().map(ts),
                experiment.end_date.as_ref().map(ts),
                experiment.status.to_string(),
                experiment.success_metric.to_string(),
                experiment.min_sample_size as i64,
                experiment.confidence_level,
                experiment.power_target,
                ts(&experiment.updated_at),
            ],
        )?;
        if updated == 0 {
            return Err(SiftError::experiment_not_found(&experiment.id));
        }
        Ok(())
    }

    async fn get_experiment(&self, experiment_id: &str) -> SiftResult<Option<Experiment>> {
        let conn = self.conn()?;
        let experiment = conn
            .query_row(
                &format!("SELECT {} FROM experiments WHERE id = ?1", EXPERIMENT_COLUMNS),
                params![experiment_id],
                row_to_experiment,
            )
            .optional()?;
        Ok(experiment)
    }

    async fn list_experiments(
        &self,
        status: Option<ExperimentStatus>,
    ) -> SiftResult<Vec<Experiment>> {
        let conn = self.conn()?;
        let experiments = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM experiments WHERE status = ?1 ORDER BY created_at DESC, id ASC",
                    EXPERIMENT_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![status.to_string()], row_to_experiment)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM experiments ORDER BY created_at DESC, id ASC",
                    EXPERIMENT_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], row_to_experiment)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(experiments)
    }

    async fn get_assignment(
        &self,
        user_id: &str,
        experiment_id: &str,
    ) -> SiftResult<Option<ExperimentAssignment>> {
        let conn = self.conn()?;
        let assignment = conn
            .query_row(
                "SELECT user_id, experiment_id, variant, assigned_at
                 FROM experiment_assignments WHERE user_id = ?1 AND experiment_id = ?2",
                params![user_id, experiment_id],
                row_to_assignment,
            )
            .optional()?;
        Ok(assignment)
    }

    async fn insert_assignment_if_absent(
        &self,
        assignment: &ExperimentAssignment,
    ) -> SiftResult<AssignmentWrite> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO experiment_assignments (user_id, experiment_id, variant, assigned_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, experiment_id) DO NOTHING",
            params![
                assignment.user_id,
                assignment.experiment_id,
                assignment.variant.to_string(),
                ts(&assignment.assigned_at),
            ],
        )?;
        if inserted == 1 {
            return Ok(AssignmentWrite::Inserted(assignment.clone()));
        }

        // Lost the race; the stored row is authoritative.
        let existing = conn.query_row(
            "SELECT user_id, experiment_id, variant, assigned_at
             FROM experiment_assignments WHERE user_id = ?1 AND experiment_id = ?2",
            params![assignment.user_id, assignment.experiment_id],
            row_to_assignment,
        )?;
        Ok(AssignmentWrite::Existing(existing))
    }

    async fn append_performance_log(&self, entry: &PerformanceLogEntry) -> SiftResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO experiment_performance (id, experiment_id, user_id, variant, action,
                item_id, position_in_list, session_id, metadata, occurred_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entry.id,
                entry.experiment_id,
                entry.user_id,
                entry.variant.to_string(),
                entry.action.to_string(),
                entry.item_id,
                entry.position_in_list,
                entry.session_id,
                serde_json::to_string(&entry.metadata)?,
                ts(&entry.occurred_at),
            ],
        )?;
        Ok(())
    }

    async fn performance_logs(&self, experiment_id: &str) -> SiftResult<Vec<PerformanceLogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, experiment_id, user_id, variant, action, item_id, position_in_list,
                    session_id, metadata, occurred_at
             FROM experiment_performance WHERE experiment_id = ?1 ORDER BY occurred_at ASC",
        )?;
        let entries = stmt
            .query_map(params![experiment_id], row_to_performance)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    async fn save_test_results(&self, results: &[StatisticalTestResult]) -> SiftResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for r in results {
            tx.execute(
                "INSERT INTO statistical_tests (experiment_id, metric_name, control_mean,
                    treatment_mean, control_n, treatment_n, t_statistic, p_value, is_significant,
                    ci_lower, ci_upper, effect_size, power, computed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    r.experiment_id,
                    r.metric_name,
                    r.control_mean,
                    r.treatment_mean,
                    r.control_n as i64,
                    r.treatment_n as i64,
                    r.t_statistic,
                    r.p_value,
                    r.is_significant as i64,
                    r.ci_lower,
                    r.ci_upper,
                    r.effect_size,
                    r.power,
                    ts(&r.computed_at),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn test_results(&self, experiment_id: &str) -> SiftResult<Vec<StatisticalTestResult>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT experiment_id, metric_name, control_mean, treatment_mean, control_n,
                    treatment_n, t_statistic, p_value, is_significant, ci_lower, ci_upper,
                    effect_size, power, computed_at
             FROM statistical_tests WHERE experiment_id = ?1 ORDER BY computed_at DESC, id DESC",
        )?;
        let results = stmt
            .query_map(params![experiment_id], row_to_test_result)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(results)
    }

    async fn append_recommendation_metric(
        &self,
        metric: &RecommendationMetric,
    ) -> SiftResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO recommendation_metrics (id, user_id, requested_strategy, served_strategy,
                item_ids, experiment_id, variant, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                metric.id,
                metric.user_id,
                metric.requested_strategy.to_string(),
                metric.served_strategy.to_string(),
                serde_json::to_string(&metric.recommended_item_ids)?,
                metric.experiment_id,
                metric.variant.map(|v| v.to_string()),
                ts(&metric.created_at),
            ],
        )?;
        Ok(())
    }

    async fn recommendation_metrics_since(
        &self,
        since: DateTime<Utc>,
    ) -> SiftResult<Vec<RecommendationMetric>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, requested_strategy, served_strategy, item_ids, experiment_id,
                    variant, created_at
             FROM recommendation_metrics WHERE created_at >= ?1 ORDER BY created_at ASC",
        )?;
        let metrics = stmt
            .query_map(params![ts(&since)], row_to_metric)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        BehaviorMetadata, ExperimentAction, PerformanceMetadata, StrategyKind, SuccessMetric,
        Variant,
    };
    use chrono::Duration;
    use std::collections::HashMap;

    fn experiment(id: &str, status: ExperimentStatus) -> Experiment {
        let now = Utc::now();
        Experiment {
            id: id.to_string(),
            name: format!("exp {}", id),
            description: None,
            strategy_control: StrategyKind::Hybrid,
            strategy_treatment: StrategyKind::Diversity,
            traffic_split: 0.5,
            start_date: None,
            end_date: None,
            status,
            success_metric: SuccessMetric::Ctr,
            min_sample_size: 100,
            confidence_level: 0.95,
            power_target: 0.8,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_item_round_trip_and_upsert() {
        let store = SqliteStore::in_memory().unwrap();
        let item = Item::new("i1", "CLI for feeds")
            .with_category("tools")
            .with_community("rust")
            .with_tags(["cli"])
            .with_content_length(420)
            .with_complexity(0.6);
        store.upsert_item(&item).await.unwrap();

        let loaded = store.get_item("i1").await.unwrap().unwrap();
        assert_eq!(loaded.category.as_deref(), Some("tools"));
        assert_eq!(loaded.tags, vec!["cli".to_string()]);
        assert_eq!(loaded.content_length, 420);

        let renamed = Item {
            title: "Feed CLI".into(),
            ..item
        };
        store.upsert_item(&renamed).await.unwrap();
        assert_eq!(store.get_item("i1").await.unwrap().unwrap().title, "Feed CLI");
    }

    #[tokio::test]
    async fn test_behavior_queries() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();
        let events = [
            BehaviorEvent::new("u1", "i1", ActionType::Like).at(now - Duration::days(10)),
            BehaviorEvent::new("u1", "i2", ActionType::View).at(now - Duration::days(1)),
            BehaviorEvent::new("u2", "i1", ActionType::Bookmark)
                .at(now)
                .with_metadata(BehaviorMetadata {
                    category: Some("tools".into()),
                    ..Default::default()
                }),
        ];
        for e in &events {
            store.append_behavior(e).await.unwrap();
        }

        let recent = store.recent_behaviors("u1", 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].item_id, "i2");

        let seen = store.interacted_item_ids("u1").await.unwrap();
        assert!(seen.contains("i1") && seen.contains("i2"));

        let on_i1 = store
            .behaviors_on_items(&["i1".to_string()], &ActionType::POSITIVE)
            .await
            .unwrap();
        assert_eq!(on_i1.len(), 2);

        let last_week = store
            .behaviors_since(now - Duration::days(7), &[])
            .await
            .unwrap();
        assert_eq!(last_week.len(), 2);
        assert_eq!(
            last_week[1].metadata.category.as_deref(),
            Some("tools")
        );
    }

    #[tokio::test]
    async fn test_assignment_unique_constraint() {
        let store = SqliteStore::in_memory().unwrap();
        let first = ExperimentAssignment {
            user_id: "u1".into(),
            experiment_id: "e1".into(),
            variant: Variant::B,
            assigned_at: Utc::now(),
        };
        let rival = ExperimentAssignment {
            variant: Variant::A,
            ..first.clone()
        };

        let a = store.insert_assignment_if_absent(&first).await.unwrap();
        assert!(matches!(a, AssignmentWrite::Inserted(_)));
        let b = store.insert_assignment_if_absent(&rival).await.unwrap();
        assert_eq!(b.into_assignment().variant, Variant::B);
    }

    #[tokio::test]
    async fn test_experiment_update_and_list() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .insert_experiment(&experiment("e1", ExperimentStatus::Draft))
            .await
            .unwrap();
        store
            .insert_experiment(&experiment("e2", ExperimentStatus::Draft))
            .await
            .unwrap();

        let mut e1 = store.get_experiment("e1").await.unwrap().unwrap();
        e1.status = ExperimentStatus::Active;
        e1.start_date = Some(Utc::now());
        store.update_experiment(&e1).await.unwrap();

        let active = store
            .list_experiments(Some(ExperimentStatus::Active))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert!(active[0].start_date.is_some());
        assert_eq!(store.list_experiments(None).await.unwrap().len(), 2);

        let missing = experiment("nope", ExperimentStatus::Draft);
        assert!(store.update_experiment(&missing).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_performance_logs_and_results() {
        let store = SqliteStore::in_memory().unwrap();
        let entry = PerformanceLogEntry {
            id: "p1".into(),
            experiment_id: "e1".into(),
            user_id: "u1".into(),
            variant: Variant::A,
            action: ExperimentAction::Engagement,
            item_id: "i1".into(),
            position_in_list: Some(2),
            session_id: None,
            metadata: PerformanceMetadata {
                engagement_seconds: Some(12.5),
                strategy: Some(StrategyKind::Hybrid),
            },
            occurred_at: Utc::now(),
        };
        store.append_performance_log(&entry).await.unwrap();
        let logs = store.performance_logs("e1").await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, ExperimentAction::Engagement);
        assert_eq!(logs[0].position_in_list, Some(2));
        assert_eq!(logs[0].metadata, entry.metadata);

        let result = StatisticalTestResult {
            experiment_id: "e1".into(),
            metric_name: "ctr".into(),
            control_mean: 0.1,
            treatment_mean: 0.14,
            control_n: 1000,
            treatment_n: 1000,
            t_statistic: 2.98,
            p_value: 0.01,
            is_significant: true,
            ci_lower: 0.01,
            ci_upper: 0.07,
            effect_size: 0.12,
            power: 0.8,
            computed_at: Utc::now(),
        };
        store.save_test_results(&[result]).await.unwrap();
        let stored = store.test_results("e1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].is_significant);
    }

    #[tokio::test]
    async fn test_profile_upsert() {
        let store = SqliteStore::in_memory().unwrap();
        let mut profile = UserPreferenceVector {
            user_id: "u1".into(),
            category_weights: HashMap::from([("ai".to_string(), 1.0)]),
            community_weights: HashMap::new(),
            complexity_preference: 0.5,
            novelty_preference: 0.0,
            interaction_count: 1,
            last_updated: Utc::now(),
        };
        store.upsert_profile(&profile).await.unwrap();
        profile.interaction_count = 2;
        store.upsert_profile(&profile).await.unwrap();

        let loaded = store.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(loaded.interaction_count, 2);
        assert_eq!(loaded.category_weights.get("ai"), Some(&1.0));
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sift.db");
        {
            let store = SqliteStore::new(&path).unwrap();
            store.upsert_item(&Item::new("i1", "Idea")).await.unwrap();
        }
        let reopened = SqliteStore::new(&path).unwrap();
        assert!(reopened.get_item("i1").await.unwrap().is_some());
    }
}
