//! Two-sample statistics for experiment analysis.
//!
//! Metrics are proportions (CTR, conversion rate), so each group's variance
//! is approximated by `mean * (1 - mean)`. Significance uses Welch's t
//! statistic; the p-value comes either from coarse critical-value bands or
//! from a normal approximation, per [`SignificanceMethod`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::strategy::SCORE_EPSILON;
use crate::types::{
    Experiment, ExperimentAnalysis, PerformanceByVariant, StatisticalTestResult, SuccessMetric,
    Variant,
};

/// Two-tailed 95% critical value used for confidence intervals.
const Z_CRITICAL: f64 = 1.96;

/// How p-values and power are derived from the test statistic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignificanceMethod {
    /// Fixed bands: |t| > 2.58 -> 0.01, > 1.96 -> 0.05, > 1.65 -> 0.1, else 0.2.
    #[default]
    LegacyBands,
    /// Two-tailed p from the standard normal CDF.
    NormalApproximation,
}

/// Observed proportion and sample size for one group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub mean: f64,
    pub n: u64,
}

impl Sample {
    pub fn new(mean: f64, n: u64) -> Self {
        Self { mean, n }
    }

    fn variance(&self) -> f64 {
        let m = self.mean.clamp(0.0, 1.0);
        m * (1.0 - m)
    }
}

/// Standard normal CDF via the Abramowitz-Stegun erf approximation.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

/// Runs significance tests and turns them into an analysis.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatisticalEngine {
    method: SignificanceMethod,
}

impl StatisticalEngine {
    pub fn new(method: SignificanceMethod) -> Self {
        Self { method }
    }

    /// Two-tailed p-value for a test statistic.
    pub fn p_value(&self, t: f64) -> f64 {
        let t = t.abs();
        match self.method {
            SignificanceMethod::LegacyBands => {
                if t > 2.58 {
                    0.01
                } else if t > 1.96 {
                    0.05
                } else if t > 1.65 {
                    0.1
                } else {
                    0.2
                }
            }
            SignificanceMethod::NormalApproximation => (2.0 * (1.0 - normal_cdf(t))).clamp(0.0, 1.0),
        }
    }

    /// Approximate power at alpha = 0.05 from the noncentrality parameter.
    pub fn power(&self, noncentrality: f64) -> f64 {
        let delta = noncentrality.abs();
        match self.method {
            SignificanceMethod::LegacyBands => {
                if delta >= 3.61 {
                    0.95
                } else if delta >= 3.24 {
                    0.90
                } else if delta >= 2.80 {
                    0.80
                } else if delta >= 2.49 {
                    0.70
                } else if delta >= 1.96 {
                    0.50
                } else {
                    0.20
                }
            }
            SignificanceMethod::NormalApproximation => {
                (normal_cdf(delta - Z_CRITICAL) + normal_cdf(-delta - Z_CRITICAL)).clamp(0.0, 1.0)
            }
        }
    }

    /// Welch's t-test of treatment against control.
    ///
    /// Returns `None` when either group is empty. A zero standard error (both
    /// groups at 0 or 1) yields `t = 0`.
    pub fn welch_test(
        &self,
        experiment_id: &str,
        metric_name: &str,
        control: Sample,
        treatment: Sample,
        alpha: f64,
        now: DateTime<Utc>,
    ) -> Option<StatisticalTestResult> {
        if control.n == 0 || treatment.n == 0 {
            return None;
        }
        let (na, nb) = (control.n as f64, treatment.n as f64);
        let (va, vb) = (control.variance(), treatment.variance());
        let diff = treatment.mean - control.mean;

        let se = (va / na + vb / nb).sqrt();
        let t = if se > 0.0 { diff / se } else { 0.0 };
        let p_value = self.p_value(t);

        let pooled_sd = if na + nb > 2.0 {
            (((na - 1.0) * va + (nb - 1.0) * vb) / (na + nb - 2.0)).sqrt()
        } else {
            0.0
        };
        let effect_size = if pooled_sd > 0.0 { diff / pooled_sd } else { 0.0 };
        let noncentrality = effect_size * (na * nb / (na + nb)).sqrt();

        Some(StatisticalTestResult {
            experiment_id: experiment_id.to_string(),
            metric_name: metric_name.to_string(),
            control_mean: control.mean,
            treatment_mean: treatment.mean,
            control_n: control.n,
            treatment_n: treatment.n,
            t_statistic: t,
            p_value,
            is_significant: p_value < alpha - SCORE_EPSILON,
            ci_lower: diff - Z_CRITICAL * se,
            ci_upper: diff + Z_CRITICAL * se,
            effect_size,
            power: self.power(noncentrality),
            computed_at: now,
        })
    }

    /// Test every metric and write the operator recommendation.
    pub fn analyze(
        &self,
        experiment: &Experiment,
        performance: &PerformanceByVariant,
        now: DateTime<Utc>,
    ) -> ExperimentAnalysis {
        let control = &performance.control;
        let treatment = &performance.treatment;
        let alpha = experiment.alpha();

        // Primary metric first.
        let metrics: Vec<SuccessMetric> = match experiment.success_metric {
            SuccessMetric::Ctr => vec![SuccessMetric::Ctr, SuccessMetric::ConversionRate],
            SuccessMetric::ConversionRate => vec![SuccessMetric::ConversionRate, SuccessMetric::Ctr],
        };
        let tests: Vec<StatisticalTestResult> = metrics
            .iter()
            .filter_map(|&metric| {
                let name: &'static str = metric.into();
                self.welch_test(
                    &experiment.id,
                    name,
                    Sample::new(control.metric(metric), control.impressions),
                    Sample::new(treatment.metric(metric), treatment.impressions),
                    alpha,
                    now,
                )
            })
            .collect();

        let sample_size_reached = control.impressions >= experiment.min_sample_size
            && treatment.impressions >= experiment.min_sample_size;

        let primary = tests.first().filter(|t| t.is_significant);
        let winner = primary.map(winning_variant);
        let confidence = primary.map_or(0.0, |t| 1.0 - t.p_value);

        let recommendation = recommend(
            experiment,
            &tests,
            control.impressions,
            treatment.impressions,
            sample_size_reached,
        );

        ExperimentAnalysis {
            experiment_id: experiment.id.clone(),
            performance: performance.clone(),
            statistical_tests: tests,
            recommendation,
            winner,
            confidence,
            sample_size_reached,
        }
    }
}

fn winning_variant(test: &StatisticalTestResult) -> Variant {
    if test.treatment_mean > test.control_mean {
        Variant::B
    } else {
        Variant::A
    }
}

fn recommend(
    experiment: &Experiment,
    tests: &[StatisticalTestResult],
    control_n: u64,
    treatment_n: u64,
    sample_size_reached: bool,
) -> String {
    if tests.is_empty() {
        return format!(
            "No impressions recorded for one or both variants yet; collect at least {} per variant.",
            experiment.min_sample_size
        );
    }

    let mut lines: Vec<String> = tests
        .iter()
        .filter(|t| t.is_significant)
        .map(|t| {
            let winner = winning_variant(t);
            let (win_mean, lose_mean) = match winner {
                Variant::B => (t.treatment_mean, t.control_mean),
                Variant::A => (t.control_mean, t.treatment_mean),
            };
            format!(
                "Variant {} ({}) wins on {}: {:.2}% vs {:.2}% (p = {}).",
                winner,
                experiment.strategy_for(winner),
                t.metric_name,
                win_mean * 100.0,
                lose_mean * 100.0,
                t.p_value
            )
        })
        .collect();

    if lines.is_empty() {
        if sample_size_reached {
            let primary = &tests[0];
            lines.push(format!(
                "No significant difference on {} yet (p = {}); keep collecting data.",
                primary.metric_name, primary.p_value
            ));
        } else {
            lines.push(format!(
                "Not enough data: need at least {} impressions per variant (control {}, treatment {}). Keep the experiment running.",
                experiment.min_sample_size, control_n, treatment_n
            ));
        }
    } else if !sample_size_reached {
        lines.push(format!(
            "Below the {}-impression minimum; treat this as preliminary.",
            experiment.min_sample_size
        ));
    }

    if let Some(primary) = tests.first() {
        if primary.is_significant && primary.power < experiment.power_target {
            lines.push(format!(
                "Estimated power {:.2} is below the {:.2} target.",
                primary.power, experiment.power_target
            ));
        }
    }

    lines.join(" ")
}
