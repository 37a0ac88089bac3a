//! Estimate and completion records used by the feedback loop.

use super::{
    CompletionId, EstimateId, Extensions, ProjectId, Tags, TaskDomainError, TaskId, TaskType,
    WorkflowState,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Complexity rating from 1 (trivial) to 5 (severe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct ComplexityScore(u8);

impl ComplexityScore {
    /// Creates a validated score.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidComplexityScore`] outside `1..=5`.
    pub const fn new(value: u8) -> Result<Self, TaskDomainError> {
        if value == 0 || value > 5 {
            return Err(TaskDomainError::InvalidComplexityScore(value));
        }
        Ok(Self(value))
    }

    /// Returns the numeric score.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for ComplexityScore {
    type Error = TaskDomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ComplexityScore> for u8 {
    fn from(value: ComplexityScore) -> Self {
        value.0
    }
}

/// Inputs describing how hard a task is expected to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComplexityFactors {
    /// Amount of code expected to change.
    pub code_footprint: ComplexityScore,
    /// How many systems the change touches.
    pub integration_depth: ComplexityScore,
    /// Effort needed to test the change.
    pub test_complexity: ComplexityScore,
    /// Unknowns in the requirements or approach.
    pub uncertainty: ComplexityScore,
    /// How well the team knows the domain; higher means easier.
    pub domain_familiarity: ComplexityScore,
}

impl ComplexityFactors {
    /// Creates factors from raw scores.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidComplexityScore`] for any score
    /// outside `1..=5`.
    pub fn from_scores(
        code_footprint: u8,
        integration_depth: u8,
        test_complexity: u8,
        uncertainty: u8,
        domain_familiarity: u8,
    ) -> Result<Self, TaskDomainError> {
        Ok(Self {
            code_footprint: ComplexityScore::new(code_footprint)?,
            integration_depth: ComplexityScore::new(integration_depth)?,
            test_complexity: ComplexityScore::new(test_complexity)?,
            uncertainty: ComplexityScore::new(uncertainty)?,
            domain_familiarity: ComplexityScore::new(domain_familiarity)?,
        })
    }

    /// Sum of the difficulty contributions, `5..=25`.
    ///
    /// Familiarity reduces difficulty, so it contributes `6 - score`.
    #[must_use]
    pub const fn total(&self) -> u8 {
        self.code_footprint.0
            + self.integration_depth.0
            + self.test_complexity.0
            + self.uncertainty.0
            + (6 - self.domain_familiarity.0)
    }
}

/// Story points on the Fibonacci-like scale 1, 2, 3, 5, 8, 13.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct StoryPoints(u8);

impl StoryPoints {
    /// Permitted point values.
    pub const SCALE: [u8; 6] = [1, 2, 3, 5, 8, 13];

    /// Maps a complexity total onto the point scale.
    #[must_use]
    pub const fn from_complexity(factors: &ComplexityFactors) -> Self {
        let points = match factors.total() {
            0..=6 => 1,
            7..=9 => 2,
            10..=12 => 3,
            13..=16 => 5,
            17..=20 => 8,
            _ => 13,
        };
        Self(points)
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for StoryPoints {
    type Error = TaskDomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if Self::SCALE.contains(&value) {
            Ok(Self(value))
        } else {
            Err(TaskDomainError::InvalidStoryPoints(value))
        }
    }
}

impl From<StoryPoints> for u8 {
    fn from(value: StoryPoints) -> Self {
        value.0
    }
}

impl fmt::Display for StoryPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse confidence band derived from the historical sample count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    /// Fewer samples than the medium threshold.
    Low,
    /// At least the medium threshold.
    Medium,
    /// At least the high threshold.
    High,
}

/// Qualifiers attached to an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateNote {
    /// No completed similar tasks exist; the estimate is formula-only.
    InsufficientHistory,
    /// The estimate was adjusted by completed similar tasks.
    HistoryAdjusted,
}

/// Estimate output shared by persisted and read-only estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateSuggestion {
    /// Derived story points.
    pub story_points: StoryPoints,
    /// Expected hours.
    pub hours: f64,
    /// Expected token budget.
    pub tokens: u64,
    /// Expected cost.
    pub cost: f64,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Confidence band.
    pub band: ConfidenceBand,
    /// Number of historical samples used.
    pub sample_count: usize,
    /// Completed tasks the estimate is based on.
    pub similar_task_ids: Vec<TaskId>,
    /// Qualifiers.
    pub notes: Vec<EstimateNote>,
}

impl EstimateSuggestion {
    /// Returns `true` when no history backed the estimate.
    #[must_use]
    pub fn has_insufficient_history(&self) -> bool {
        self.notes.contains(&EstimateNote::InsufficientHistory)
    }
}

/// Versioned, append-only estimate row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Row identifier.
    pub id: EstimateId,
    /// Estimated task.
    pub task_id: TaskId,
    /// Monotonic per-task version starting at 1.
    pub version: u32,
    /// Complexity inputs.
    pub factors: ComplexityFactors,
    /// Derived values.
    pub suggestion: EstimateSuggestion,
    /// Typed extensions.
    pub extensions: Extensions,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Current-estimate snapshot denormalized onto the task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateSnapshot {
    /// Source estimate row.
    pub estimate_id: EstimateId,
    /// Source estimate version.
    pub version: u32,
    /// Story points.
    pub story_points: StoryPoints,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Expected hours.
    pub hours: f64,
    /// Expected tokens.
    pub tokens: u64,
    /// Expected cost.
    pub cost: f64,
}

impl From<&Estimate> for EstimateSnapshot {
    fn from(estimate: &Estimate) -> Self {
        Self {
            estimate_id: estimate.id,
            version: estimate.version,
            story_points: estimate.suggestion.story_points,
            confidence: estimate.suggestion.confidence,
            hours: estimate.suggestion.hours,
            tokens: estimate.suggestion.tokens,
            cost: estimate.suggestion.cost,
        }
    }
}

/// Hours, cost, and tokens spent or expected on a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Effort {
    /// Hours spent.
    pub hours: f64,
    /// Money spent.
    pub cost: f64,
    /// Tokens consumed.
    pub tokens: u64,
}

impl Effort {
    /// Creates validated effort.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidActuals`] for negative or non-finite
    /// hours or cost.
    pub fn new(hours: f64, cost: f64, tokens: u64) -> Result<Self, TaskDomainError> {
        ensure_non_negative(hours, "hours")?;
        ensure_non_negative(cost, "cost")?;
        Ok(Self {
            hours,
            cost,
            tokens,
        })
    }

    /// Effort with only hours known.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidActuals`] for invalid hours.
    pub fn from_hours(hours: f64) -> Result<Self, TaskDomainError> {
        Self::new(hours, 0.0, 0)
    }

    /// Adds `other` to `self`, saturating the token count.
    #[must_use]
    pub const fn plus(self, other: Self) -> Self {
        Self {
            hours: self.hours + other.hours,
            cost: self.cost + other.cost,
            tokens: self.tokens.saturating_add(other.tokens),
        }
    }
}

pub(crate) const fn ensure_non_negative(value: f64, field: &'static str) -> Result<(), TaskDomainError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(TaskDomainError::InvalidActuals { field })
    }
}

/// Task attributes captured with a completion so the learning pool is
/// self-contained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleProfile {
    /// Task type.
    pub task_type: TaskType,
    /// Technology tags.
    pub tags: Tags,
    /// Story points of the estimate in force at completion.
    pub story_points: Option<StoryPoints>,
    /// Terminal state reached.
    pub terminal_state: WorkflowState,
}

/// Immutable record of actual effort written when a task terminates.
///
/// Corrections append a newer record; the latest per task is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    /// Row identifier.
    pub id: CompletionId,
    /// Completed task.
    pub task_id: TaskId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Actual effort.
    pub actuals: Effort,
    /// Estimated hours in force at completion.
    pub estimated_hours: Option<f64>,
    /// `(actual - estimated) / estimated`, when both are known.
    pub variance: Option<f64>,
    /// Sample attributes.
    pub profile: SampleProfile,
    /// When the task reached its terminal state.
    pub completed_at: DateTime<Utc>,
    /// When this record was written.
    pub recorded_at: DateTime<Utc>,
}

impl CompletionRecord {
    /// Returns `true` when the record can train future estimates.
    #[must_use]
    pub fn is_learning_sample(&self) -> bool {
        self.profile.terminal_state == WorkflowState::Deployed
            && self.actuals.hours > 0.0
            && self.variance.is_some()
            && self.profile.story_points.is_some()
    }
}

/// Computes relative variance of `actual` against `estimated`.
#[must_use]
pub fn relative_variance(actual: f64, estimated: f64) -> Option<f64> {
    (estimated > 0.0 && actual > 0.0).then(|| (actual - estimated) / estimated)
}
