//! Typed, directed dependency edges and cycle detection.

use super::{EdgeId, ParseEnumError, ProjectId, TaskDomainError, TaskId};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Relationship carried by a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    /// `source` must finish before `target` can start.
    Blocks,
    /// `source` cannot start until `target` finishes.
    Requires,
    /// Informational link.
    RelatesTo,
    /// The tasks make incompatible changes.
    ConflictsWith,
}

impl DependencyType {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::Requires => "requires",
            Self::RelatesTo => "relates_to",
            Self::ConflictsWith => "conflicts_with",
        }
    }

    /// Returns `true` for edge types that gate progress.
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        matches!(self, Self::Blocks | Self::Requires)
    }
}

impl TryFrom<&str> for DependencyType {
    type Error = ParseEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "blocks" => Ok(Self::Blocks),
            "requires" => Ok(Self::Requires),
            "relates_to" => Ok(Self::RelatesTo),
            "conflicts_with" => Ok(Self::ConflictsWith),
            _ => Err(ParseEnumError::new("dependency type", value)),
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Directed relation between two tasks of one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    id: EdgeId,
    project_id: ProjectId,
    source_task_id: TaskId,
    target_task_id: TaskId,
    dependency_type: DependencyType,
    resolved: bool,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

/// Parameter object for reconstructing a persisted edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEdgeData {
    /// Edge identifier.
    pub id: EdgeId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Source task.
    pub source_task_id: TaskId,
    /// Target task.
    pub target_task_id: TaskId,
    /// Relationship type.
    pub dependency_type: DependencyType,
    /// Resolution flag.
    pub resolved: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Resolution timestamp.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl DependencyEdge {
    /// Creates an unresolved edge.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::SelfReference`] when source equals target.
    pub fn new(
        project_id: ProjectId,
        source_task_id: TaskId,
        target_task_id: TaskId,
        dependency_type: DependencyType,
        clock: &impl Clock,
    ) -> Result<Self, TaskDomainError> {
        if source_task_id == target_task_id {
            return Err(TaskDomainError::SelfReference(source_task_id));
        }
        Ok(Self {
            id: EdgeId::new(),
            project_id,
            source_task_id,
            target_task_id,
            dependency_type,
            resolved: false,
            created_at: clock.utc(),
            resolved_at: None,
        })
    }

    /// Reconstructs an edge from persisted storage.
    #[must_use]
    pub const fn from_persisted(data: PersistedEdgeData) -> Self {
        Self {
            id: data.id,
            project_id: data.project_id,
            source_task_id: data.source_task_id,
            target_task_id: data.target_task_id,
            dependency_type: data.dependency_type,
            resolved: data.resolved,
            created_at: data.created_at,
            resolved_at: data.resolved_at,
        }
    }

    /// Returns the edge identifier.
    #[must_use]
    pub const fn id(&self) -> EdgeId {
        self.id
    }

    /// Returns the owning project.
    #[must_use]
    pub const fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Returns the source task.
    #[must_use]
    pub const fn source_task_id(&self) -> TaskId {
        self.source_task_id
    }

    /// Returns the target task.
    #[must_use]
    pub const fn target_task_id(&self) -> TaskId {
        self.target_task_id
    }

    /// Returns the relationship type.
    #[must_use]
    pub const fn dependency_type(&self) -> DependencyType {
        self.dependency_type
    }

    /// Returns `true` once resolved.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the resolution timestamp.
    #[must_use]
    pub const fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    /// Returns `(prerequisite, dependent)` for blocking edges.
    ///
    /// `blocks` points from prerequisite to dependent; `requires` points from
    /// dependent to prerequisite.
    #[must_use]
    pub const fn ordering(&self) -> Option<(TaskId, TaskId)> {
        match self.dependency_type {
            DependencyType::Blocks => Some((self.source_task_id, self.target_task_id)),
            DependencyType::Requires => Some((self.target_task_id, self.source_task_id)),
            DependencyType::RelatesTo | DependencyType::ConflictsWith => None,
        }
    }

    /// Returns the task gated by this edge, for blocking edges.
    #[must_use]
    pub const fn dependent(&self) -> Option<TaskId> {
        match self.ordering() {
            Some((_, dependent)) => Some(dependent),
            None => None,
        }
    }

    /// Returns the task that must finish first, for blocking edges.
    #[must_use]
    pub const fn prerequisite(&self) -> Option<TaskId> {
        match self.ordering() {
            Some((prerequisite, _)) => Some(prerequisite),
            None => None,
        }
    }

    /// Returns `true` when this edge currently gates `task_id`.
    #[must_use]
    pub fn blocks_task(&self, task_id: TaskId) -> bool {
        !self.resolved && self.dependent() == Some(task_id)
    }

    /// Returns `true` when the edge touches `task_id`.
    #[must_use]
    pub fn touches(&self, task_id: TaskId) -> bool {
        self.source_task_id == task_id || self.target_task_id == task_id
    }

    /// Returns `true` when `other` links the same tasks with the same type.
    #[must_use]
    pub fn duplicates(&self, other: &Self) -> bool {
        self.source_task_id == other.source_task_id
            && self.target_task_id == other.target_task_id
            && self.dependency_type == other.dependency_type
    }

    /// Marks the edge resolved.
    ///
    /// Returns `false` when the edge was already resolved.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::NonBlockingEdge`] for informational edges.
    pub fn resolve(&mut self, clock: &impl Clock) -> Result<bool, TaskDomainError> {
        if !self.dependency_type.is_blocking() {
            return Err(TaskDomainError::NonBlockingEdge(self.id));
        }
        if self.resolved {
            return Ok(false);
        }
        self.resolved = true;
        self.resolved_at = Some(clock.utc());
        Ok(true)
    }
}

/// Prerequisite-to-dependent adjacency view over a project's blocking edges.
///
/// Resolved edges stay in the graph: resolution releases the gate but does
/// not change the ordering the edge expresses.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    successors: HashMap<TaskId, Vec<TaskId>>,
}

impl DependencyGraph {
    /// Builds the graph from any edge set; informational edges are skipped.
    #[must_use]
    pub fn from_edges<'a>(edges: impl IntoIterator<Item = &'a DependencyEdge>) -> Self {
        let mut successors: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for (prerequisite, dependent) in edges.into_iter().filter_map(DependencyEdge::ordering) {
            successors.entry(prerequisite).or_default().push(dependent);
        }
        Self { successors }
    }

    /// Returns `true` when `to` is reachable from `from`.
    ///
    /// Iterative depth-first search; the visited set bounds the walk by the
    /// number of distinct tasks.
    #[must_use]
    pub fn reaches(&self, from: TaskId, to: TaskId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(next) = self.successors.get(&current) {
                stack.extend(next.iter().copied().filter(|id| !visited.contains(id)));
            }
        }
        false
    }

    /// Rejects `edge` when it would close a cycle.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::SelfReference`] for self edges and
    /// [`TaskDomainError::DependencyCycle`] when the dependent already
    /// reaches the prerequisite.
    pub fn check_insert(&self, edge: &DependencyEdge) -> Result<(), TaskDomainError> {
        if edge.source_task_id == edge.target_task_id {
            return Err(TaskDomainError::SelfReference(edge.source_task_id));
        }
        let Some((prerequisite, dependent)) = edge.ordering() else {
            return Ok(());
        };
        if self.reaches(dependent, prerequisite) {
            return Err(TaskDomainError::DependencyCycle {
                source_id: edge.source_task_id,
                target_id: edge.target_task_id,
                dependency_type: edge.dependency_type,
            });
        }
        Ok(())
    }

    /// Adds a checked edge to the view.
    pub fn insert(&mut self, edge: &DependencyEdge) {
        if let Some((prerequisite, dependent)) = edge.ordering() {
            self.successors.entry(prerequisite).or_default().push(dependent);
        }
    }

    /// Returns `true` when the blocking sub-graph contains no cycle.
    #[must_use]
    pub fn is_acyclic(&self) -> bool {
        self.successors
            .iter()
            .all(|(node, next)| next.iter().all(|succ| !self.reaches(*succ, *node)))
    }
}
