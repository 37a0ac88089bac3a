//! Estimation model and learning statistics over completion history.
//!
//! The model is a pure function of complexity factors, configuration, and the
//! pool of completed similar tasks. Every completion that reaches the pool
//! immediately influences the next estimate; there is no offline training.

use super::{
    CompletionRecord, ConfidenceBand, ComplexityFactors, EstimateNote, EstimateSuggestion,
    ProjectId, StoryPoints, Tags, TaskId, TaskType,
};
use crate::config::EstimationConfig;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Keeps the latest record per task among `records`.
#[must_use]
pub fn latest_per_task(records: &[CompletionRecord]) -> Vec<&CompletionRecord> {
    let mut latest: HashMap<TaskId, &CompletionRecord> = HashMap::new();
    for record in records {
        latest
            .entry(record.task_id)
            .and_modify(|current| {
                if record.recorded_at >= current.recorded_at {
                    *current = record;
                }
            })
            .or_insert(record);
    }
    let mut selected: Vec<&CompletionRecord> = latest.into_values().collect();
    selected.sort_by_key(|record| (record.completed_at, record.task_id));
    selected
}

/// Filters the learning pool down to samples similar to the requested task.
///
/// Samples must share the task type; when `tags` is non-empty they must also
/// share at least one tag.
#[must_use]
pub fn select_similar<'a>(
    records: &'a [CompletionRecord],
    task_type: TaskType,
    tags: &Tags,
) -> Vec<&'a CompletionRecord> {
    latest_per_task(records)
        .into_iter()
        .filter(|record| record.is_learning_sample())
        .filter(|record| record.profile.task_type == task_type)
        .filter(|record| tags.is_empty() || record.profile.tags.overlaps(tags))
        .collect()
}

/// Mean absolute variance turned into an accuracy in `[0, 1]`.
#[must_use]
pub fn accuracy<'a>(samples: impl IntoIterator<Item = &'a CompletionRecord>) -> Option<f64> {
    let variances: Vec<f64> = samples
        .into_iter()
        .filter_map(|record| record.variance)
        .map(f64::abs)
        .collect();
    if variances.is_empty() {
        return None;
    }
    let mean = variances.iter().sum::<f64>() / variances.len() as f64;
    Some(clamp_unit(1.0 - mean))
}

/// Estimation model parameterized by configuration.
#[derive(Debug, Clone, Copy)]
pub struct EstimationModel<'a> {
    config: &'a EstimationConfig,
}

impl<'a> EstimationModel<'a> {
    /// Creates a model over `config`.
    #[must_use]
    pub const fn new(config: &'a EstimationConfig) -> Self {
        Self { config }
    }

    /// Confidence band for a sample count.
    #[must_use]
    pub const fn band(&self, sample_count: usize) -> ConfidenceBand {
        if sample_count >= self.config.high_confidence_samples {
            ConfidenceBand::High
        } else if sample_count >= self.config.medium_confidence_samples {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }

    /// Produces an estimate for `factors` backed by `samples`.
    ///
    /// With no samples the result is formula-only, carries confidence 0 and
    /// the [`EstimateNote::InsufficientHistory`] note.
    #[must_use]
    pub fn suggest(
        &self,
        factors: &ComplexityFactors,
        samples: &[&CompletionRecord],
    ) -> EstimateSuggestion {
        let story_points = StoryPoints::from_complexity(factors);
        let points = f64::from(story_points.value());
        let base_hours = points * self.config.hours_per_point;
        let base_tokens = points * self.config.tokens_per_point as f64;

        let Some(per_point) = observed_hours_per_point(samples) else {
            return EstimateSuggestion {
                story_points,
                hours: base_hours,
                tokens: token_count(base_tokens),
                cost: self.cost(base_hours, base_tokens),
                confidence: 0.0,
                band: ConfidenceBand::Low,
                sample_count: 0,
                similar_task_ids: Vec::new(),
                notes: vec![EstimateNote::InsufficientHistory],
            };
        };

        let sample_count = samples.len();
        let confidence = self.confidence(sample_count, accuracy(samples.iter().copied()));
        let weight = clamp_unit(confidence * self.config.history_weight_cap);
        let historical_hours = points * per_point;
        let hours = base_hours * (1.0 - weight) + historical_hours * weight;
        let scale = if base_hours > 0.0 { hours / base_hours } else { 1.0 };
        let tokens = base_tokens * scale;

        EstimateSuggestion {
            story_points,
            hours,
            tokens: token_count(tokens),
            cost: self.cost(hours, tokens),
            confidence,
            band: self.band(sample_count),
            sample_count,
            similar_task_ids: samples.iter().map(|record| record.task_id).collect(),
            notes: vec![EstimateNote::HistoryAdjusted],
        }
    }

    /// Confidence from sample coverage, discounted by historical accuracy.
    #[must_use]
    pub fn confidence(&self, sample_count: usize, accuracy: Option<f64>) -> f64 {
        if sample_count == 0 {
            return 0.0;
        }
        let high = self.config.high_confidence_samples.max(1) as f64;
        let coverage = clamp_unit(sample_count as f64 / high);
        let observed = accuracy.map_or(0.0, clamp_unit);
        clamp_unit(coverage * (0.5 + 0.5 * observed))
    }

    const fn cost(&self, hours: f64, tokens: f64) -> f64 {
        hours * self.config.hourly_rate + tokens / 1000.0 * self.config.cost_per_thousand_tokens
    }

    /// Aggregates learning statistics for a project.
    #[must_use]
    pub fn insights(
        &self,
        project_id: ProjectId,
        records: &[CompletionRecord],
        now: DateTime<Utc>,
    ) -> LearningInsights {
        let mut samples: Vec<&CompletionRecord> = latest_per_task(records)
            .into_iter()
            .filter(|record| record.is_learning_sample())
            .collect();
        samples.sort_by_key(|record| std::cmp::Reverse(record.completed_at));

        let sample_count = samples.len();
        let recent = samples.iter().take(self.config.accuracy_window).copied();
        let accuracy_value = accuracy(recent).unwrap_or(0.0);
        let mean_variance = if samples.is_empty() {
            0.0
        } else {
            samples.iter().filter_map(|record| record.variance).sum::<f64>() / sample_count as f64
        };
        let weekly = self.weekly_accuracy(&samples, now);
        let weekly_improvement = match (weekly.first(), weekly.last()) {
            (Some(earliest), Some(latest)) if weekly.len() > 1 => latest.accuracy - earliest.accuracy,
            _ => 0.0,
        };

        LearningInsights {
            project_id,
            sample_count,
            accuracy: accuracy_value,
            mean_variance,
            weekly_improvement,
            weekly_accuracy: weekly,
            is_learning: sample_count > self.config.learning_sample_threshold,
        }
    }

    /// Non-empty weekly accuracy buckets in the trailing window, oldest first.
    fn weekly_accuracy(&self, samples: &[&CompletionRecord], now: DateTime<Utc>) -> Vec<WeeklyAccuracy> {
        let weeks = i64::from(self.config.improvement_window_weeks);
        let mut buckets: Vec<WeeklyAccuracy> = (0..weeks)
            .rev()
            .filter_map(|weeks_ago| {
                let week_end = now - Duration::weeks(weeks_ago);
                let week_start = week_end - Duration::weeks(1);
                let in_week: Vec<&CompletionRecord> = samples
                    .iter()
                    .copied()
                    .filter(|record| record.completed_at > week_start && record.completed_at <= week_end)
                    .collect();
                accuracy(in_week.iter().copied()).map(|value| WeeklyAccuracy {
                    week_start,
                    sample_count: in_week.len(),
                    accuracy: value,
                })
            })
            .collect();
        buckets.sort_by_key(|bucket| bucket.week_start);
        buckets
    }
}

/// Accuracy of one trailing week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyAccuracy {
    /// Exclusive start of the week.
    pub week_start: DateTime<Utc>,
    /// Samples completed within the week.
    pub sample_count: usize,
    /// Accuracy within the week.
    pub accuracy: f64,
}

/// Aggregate view of how estimation is learning for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningInsights {
    /// Project the insights describe.
    pub project_id: ProjectId,
    /// Number of learning samples.
    pub sample_count: usize,
    /// `1 - mean |variance|` over the most recent samples, in `[0, 1]`.
    pub accuracy: f64,
    /// Mean signed variance; positive means work runs over estimate.
    pub mean_variance: f64,
    /// Latest minus earliest weekly accuracy in the trailing window.
    pub weekly_improvement: f64,
    /// Non-empty weekly buckets, oldest first.
    pub weekly_accuracy: Vec<WeeklyAccuracy>,
    /// `true` once enough samples exist to adjust estimates meaningfully.
    pub is_learning: bool,
}

fn observed_hours_per_point(samples: &[&CompletionRecord]) -> Option<f64> {
    let rates: Vec<f64> = samples
        .iter()
        .filter_map(|record| {
            let points = record.profile.story_points?;
            Some(record.actuals.hours / f64::from(points.value()))
        })
        .collect();
    if rates.is_empty() {
        return None;
    }
    Some(rates.iter().sum::<f64>() / rates.len() as f64)
}

const fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "token budgets are clamped to a non-negative finite range first"
)]
fn token_count(tokens: f64) -> u64 {
    if tokens.is_finite() && tokens > 0.0 {
        tokens.round().min(u64::MAX as f64) as u64
    } else {
        0
    }
}
