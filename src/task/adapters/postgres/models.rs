//! Diesel row models for task workflow persistence.

use super::schema::{
    completion_records, dependency_edges, estimates, git_event_receipts, projects, tasks,
    workflow_transitions,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Project row.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = projects)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProjectRow {
    /// Project identifier.
    pub id: uuid::Uuid,
    /// Display name.
    pub name: String,
    /// Dependency graph revision.
    pub graph_revision: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Task row; `body` holds the serialized aggregate, the other columns are
/// indexed projections of it.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TaskRow {
    /// Task identifier.
    pub id: uuid::Uuid,
    /// Owning project.
    pub project_id: uuid::Uuid,
    /// Parent task.
    pub parent_id: Option<uuid::Uuid>,
    /// Kind of work.
    pub task_type: String,
    /// Workflow state.
    pub workflow_state: String,
    /// Revision.
    pub revision: i64,
    /// Serialized aggregate.
    pub body: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Dependency edge row.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = dependency_edges)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct EdgeRow {
    /// Edge identifier.
    pub id: uuid::Uuid,
    /// Owning project.
    pub project_id: uuid::Uuid,
    /// Source task.
    pub source_task_id: uuid::Uuid,
    /// Target task.
    pub target_task_id: uuid::Uuid,
    /// Relationship type.
    pub dependency_type: String,
    /// Resolution flag.
    pub resolved: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Resolution timestamp.
    #[diesel(treat_none_as_null = true)]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Insert model for audit records; `seq` is assigned by the database.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = workflow_transitions)]
pub struct NewTransitionRow {
    /// Record identifier.
    pub id: uuid::Uuid,
    /// Task the record belongs to.
    pub task_id: uuid::Uuid,
    /// Serialized record.
    pub record: Value,
    /// When the transition was recorded.
    pub occurred_at: DateTime<Utc>,
}

/// Insert model for estimates.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = estimates)]
pub struct NewEstimateRow {
    /// Estimate identifier.
    pub id: uuid::Uuid,
    /// Estimated task.
    pub task_id: uuid::Uuid,
    /// Per-task version.
    pub version: i32,
    /// Serialized estimate.
    pub body: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Insert model for completion records; `seq` is assigned by the database.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = completion_records)]
pub struct NewCompletionRow {
    /// Record identifier.
    pub id: uuid::Uuid,
    /// Completed task.
    pub task_id: uuid::Uuid,
    /// Owning project.
    pub project_id: uuid::Uuid,
    /// Serialized record.
    pub body: Value,
    /// When the record was written.
    pub recorded_at: DateTime<Utc>,
}

/// Insert model for git delivery receipts; `applied_at` defaults to `now()`.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = git_event_receipts)]
pub struct GitReceiptRow {
    /// VCS provider.
    pub provider: String,
    /// Provider delivery identifier.
    pub delivery_id: String,
}
