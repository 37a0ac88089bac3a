//! `PostgreSQL` repository implementation for task workflow storage.

use super::{
    models::{
        EdgeRow, GitReceiptRow, NewCompletionRow, NewEstimateRow, NewTransitionRow, ProjectRow,
        TaskRow,
    },
    schema::{
        completion_records, dependency_edges, estimates, git_event_receipts, projects, tasks,
        workflow_transitions,
    },
};
use crate::task::{
    domain::{
        CompletionRecord, DependencyEdge, DependencyType, EdgeId, Estimate, GitEventId,
        PersistedEdgeData, Project, ProjectId, Task, TaskId, WorkflowTransition,
    },
    ports::{
        ChangeSet, CommitReceipt, GraphGuard, ProjectGraph, TaskRepository, TaskRepositoryError,
        TaskRepositoryResult,
    },
};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::BTreeSet;

/// `PostgreSQL` connection pool type used by task adapters.
pub type TaskPgPool = Pool<ConnectionManager<PgConnection>>;

/// `PostgreSQL`-backed task repository.
///
/// Each commit runs in one database transaction. Task updates are
/// conditional on the revision the writer read, so a lost race surfaces as
/// [`TaskRepositoryError::Conflict`] rather than an overwrite.
#[derive(Debug, Clone)]
pub struct PostgresTaskRepository {
    pool: TaskPgPool,
}

impl PostgresTaskRepository {
    /// Creates a new repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: TaskPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> TaskRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> TaskRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(TaskRepositoryError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(TaskRepositoryError::persistence)?
    }
}

impl From<DieselError> for TaskRepositoryError {
    fn from(err: DieselError) -> Self {
        Self::persistence(err)
    }
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    async fn store_project(&self, project: &Project) -> TaskRepositoryResult<()> {
        let project_id = project.id();
        let row = ProjectRow {
            id: project_id.into_inner(),
            name: project.name().to_owned(),
            graph_revision: 0,
            created_at: project.created_at(),
        };
        self.run_blocking(move |connection| {
            diesel::insert_into(projects::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                        TaskRepositoryError::DuplicateProject(project_id)
                    }
                    _ => TaskRepositoryError::persistence(err),
                })?;
            Ok(())
        })
        .await
    }

    async fn find_project(&self, id: ProjectId) -> TaskRepositoryResult<Option<Project>> {
        self.run_blocking(move |connection| {
            let found = projects::table
                .filter(projects::id.eq(id.into_inner()))
                .select(ProjectRow::as_select())
                .first::<ProjectRow>(connection)
                .optional()?;
            Ok(found.map(|row| {
                Project::from_persisted(ProjectId::from_uuid(row.id), row.name, row.created_at)
            }))
        })
        .await
    }

    async fn find_by_id(&self, id: TaskId) -> TaskRepositoryResult<Option<Task>> {
        self.run_blocking(move |connection| {
            let row = tasks::table
                .filter(tasks::id.eq(id.into_inner()))
                .select(TaskRow::as_select())
                .first::<TaskRow>(connection)
                .optional()?;
            row.map(row_to_task).transpose()
        })
        .await
    }

    async fn find_children(&self, parent_id: TaskId) -> TaskRepositoryResult<Vec<Task>> {
        self.run_blocking(move |connection| {
            tasks::table
                .filter(tasks::parent_id.eq(parent_id.into_inner()))
                .order((tasks::created_at.asc(), tasks::id.asc()))
                .select(TaskRow::as_select())
                .load::<TaskRow>(connection)?
                .into_iter()
                .map(row_to_task)
                .collect()
        })
        .await
    }

    async fn project_graph(&self, project_id: ProjectId) -> TaskRepositoryResult<ProjectGraph> {
        self.run_blocking(move |connection| {
            connection
                .build_transaction()
                .repeatable_read()
                .read_only()
                .run(|snapshot| {
                    let revision = projects::table
                        .filter(projects::id.eq(project_id.into_inner()))
                        .select(projects::graph_revision)
                        .first::<i64>(snapshot)
                        .optional()?
                        .ok_or(TaskRepositoryError::ProjectNotFound(project_id))?;
                    let edges = dependency_edges::table
                        .filter(dependency_edges::project_id.eq(project_id.into_inner()))
                        .order((dependency_edges::created_at.asc(), dependency_edges::id.asc()))
                        .select(EdgeRow::as_select())
                        .load::<EdgeRow>(snapshot)?
                        .into_iter()
                        .map(row_to_edge)
                        .collect::<TaskRepositoryResult<Vec<_>>>()?;
                    Ok(ProjectGraph {
                        revision: from_i64(revision)?,
                        edges,
                    })
                })
        })
        .await
    }

    async fn edges_for_task(&self, task_id: TaskId) -> TaskRepositoryResult<Vec<DependencyEdge>> {
        self.run_blocking(move |connection| {
            let id = task_id.into_inner();
            dependency_edges::table
                .filter(
                    dependency_edges::source_task_id
                        .eq(id)
                        .or(dependency_edges::target_task_id.eq(id)),
                )
                .order((dependency_edges::created_at.asc(), dependency_edges::id.asc()))
                .select(EdgeRow::as_select())
                .load::<EdgeRow>(connection)?
                .into_iter()
                .map(row_to_edge)
                .collect()
        })
        .await
    }

    async fn find_edge(&self, id: EdgeId) -> TaskRepositoryResult<Option<DependencyEdge>> {
        self.run_blocking(move |connection| {
            let row = dependency_edges::table
                .filter(dependency_edges::id.eq(id.into_inner()))
                .select(EdgeRow::as_select())
                .first::<EdgeRow>(connection)
                .optional()?;
            row.map(row_to_edge).transpose()
        })
        .await
    }

    async fn transitions_for(
        &self,
        task_id: TaskId,
    ) -> TaskRepositoryResult<Vec<WorkflowTransition>> {
        self.run_blocking(move |connection| {
            workflow_transitions::table
                .filter(workflow_transitions::task_id.eq(task_id.into_inner()))
                .order(workflow_transitions::seq.asc())
                .select(workflow_transitions::record)
                .load::<Value>(connection)?
                .into_iter()
                .map(from_json)
                .collect()
        })
        .await
    }

    async fn estimates_for(&self, task_id: TaskId) -> TaskRepositoryResult<Vec<Estimate>> {
        self.run_blocking(move |connection| {
            estimates::table
                .filter(estimates::task_id.eq(task_id.into_inner()))
                .order(estimates::version.asc())
                .select(estimates::body)
                .load::<Value>(connection)?
                .into_iter()
                .map(from_json)
                .collect()
        })
        .await
    }

    async fn completions_for(
        &self,
        task_id: TaskId,
    ) -> TaskRepositoryResult<Vec<CompletionRecord>> {
        self.run_blocking(move |connection| {
            completion_records::table
                .filter(completion_records::task_id.eq(task_id.into_inner()))
                .order(completion_records::seq.asc())
                .select(completion_records::body)
                .load::<Value>(connection)?
                .into_iter()
                .map(from_json)
                .collect()
        })
        .await
    }

    async fn completions_for_project(
        &self,
        project_id: ProjectId,
    ) -> TaskRepositoryResult<Vec<CompletionRecord>> {
        self.run_blocking(move |connection| {
            completion_records::table
                .filter(completion_records::project_id.eq(project_id.into_inner()))
                .order(completion_records::seq.asc())
                .select(completion_records::body)
                .load::<Value>(connection)?
                .into_iter()
                .map(from_json)
                .collect()
        })
        .await
    }

    async fn git_event_seen(&self, event_id: &GitEventId) -> TaskRepositoryResult<bool> {
        let provider = event_id.provider().as_str();
        let delivery_id = event_id.delivery_id().to_owned();
        self.run_blocking(move |connection| {
            let seen = diesel::select(diesel::dsl::exists(
                git_event_receipts::table
                    .filter(git_event_receipts::provider.eq(provider))
                    .filter(git_event_receipts::delivery_id.eq(delivery_id)),
            ))
            .get_result::<bool>(connection)?;
            Ok(seen)
        })
        .await
    }

    async fn commit(&self, changes: ChangeSet) -> TaskRepositoryResult<CommitReceipt> {
        self.run_blocking(move |connection| {
            connection.transaction(|transaction| apply_changes(transaction, changes))
        })
        .await
    }
}

fn apply_changes(
    connection: &mut PgConnection,
    changes: ChangeSet,
) -> TaskRepositoryResult<CommitReceipt> {
    let ChangeSet {
        inserted_tasks,
        updated_tasks,
        transitions,
        estimates: estimate_rows,
        completions,
        inserted_edges,
        updated_edges,
        graph_guard,
        git_events,
    } = changes;

    if let Some(guard) = graph_guard {
        advance_graph_revision(connection, guard)?;
    }
    let unguarded_projects: BTreeSet<ProjectId> = inserted_edges
        .iter()
        .map(DependencyEdge::project_id)
        .filter(|project_id| graph_guard.is_none_or(|guard| guard.project_id != *project_id))
        .collect();
    for project_id in unguarded_projects {
        diesel::update(projects::table.filter(projects::id.eq(project_id.into_inner())))
            .set(projects::graph_revision.eq(projects::graph_revision + 1))
            .execute(connection)?;
    }

    let mut committed = Vec::with_capacity(inserted_tasks.len() + updated_tasks.len());
    for mut task in inserted_tasks {
        task.advance_revision();
        insert_task(connection, &task)?;
        committed.push(task);
    }
    for mut task in updated_tasks {
        let expected = task.revision();
        task.advance_revision();
        update_task(connection, &task, expected)?;
        committed.push(task);
    }

    for edge in &inserted_edges {
        diesel::insert_into(dependency_edges::table)
            .values(edge_to_row(edge))
            .execute(connection)
            .map_err(|err| match err {
                DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                    TaskRepositoryError::NotFound(edge.source_task_id())
                }
                _ => TaskRepositoryError::persistence(err),
            })?;
    }
    for edge in &updated_edges {
        let row = edge_to_row(edge);
        let updated = diesel::update(dependency_edges::table.find(row.id))
            .set(&row)
            .execute(connection)?;
        if updated == 0 {
            return Err(TaskRepositoryError::EdgeNotFound(edge.id()));
        }
    }

    for transition in &transitions {
        diesel::insert_into(workflow_transitions::table)
            .values(NewTransitionRow {
                id: transition.id.into_inner(),
                task_id: transition.task_id.into_inner(),
                record: to_json(transition)?,
                occurred_at: transition.occurred_at,
            })
            .execute(connection)?;
    }
    for estimate in &estimate_rows {
        diesel::insert_into(estimates::table)
            .values(NewEstimateRow {
                id: estimate.id.into_inner(),
                task_id: estimate.task_id.into_inner(),
                version: i32::try_from(estimate.version).map_err(TaskRepositoryError::persistence)?,
                body: to_json(estimate)?,
                created_at: estimate.created_at,
            })
            .execute(connection)?;
    }
    for record in &completions {
        diesel::insert_into(completion_records::table)
            .values(NewCompletionRow {
                id: record.id.into_inner(),
                task_id: record.task_id.into_inner(),
                project_id: record.project_id.into_inner(),
                body: to_json(record)?,
                recorded_at: record.recorded_at,
            })
            .execute(connection)?;
    }

    for event_id in git_events {
        diesel::insert_into(git_event_receipts::table)
            .values(GitReceiptRow {
                provider: event_id.provider().as_str().to_owned(),
                delivery_id: event_id.delivery_id().to_owned(),
            })
            .execute(connection)
            .map_err(|err| match err {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    TaskRepositoryError::DuplicateEvent(event_id.clone())
                }
                _ => TaskRepositoryError::persistence(err),
            })?;
    }

    Ok(CommitReceipt::new(committed))
}

fn advance_graph_revision(
    connection: &mut PgConnection,
    guard: GraphGuard,
) -> TaskRepositoryResult<()> {
    let project_id = guard.project_id.into_inner();
    let updated = diesel::update(
        projects::table
            .filter(projects::id.eq(project_id))
            .filter(projects::graph_revision.eq(to_i64(guard.expected_revision)?)),
    )
    .set(projects::graph_revision.eq(projects::graph_revision + 1))
    .execute(connection)?;
    if updated > 0 {
        return Ok(());
    }
    let exists = diesel::select(diesel::dsl::exists(
        projects::table.filter(projects::id.eq(project_id)),
    ))
    .get_result::<bool>(connection)?;
    Err(if exists {
        TaskRepositoryError::GraphConflict(guard.project_id)
    } else {
        TaskRepositoryError::ProjectNotFound(guard.project_id)
    })
}

fn insert_task(connection: &mut PgConnection, task: &Task) -> TaskRepositoryResult<()> {
    let row = task_to_row(task)?;
    diesel::insert_into(tasks::table)
        .values(&row)
        .execute(connection)
        .map_err(|err| match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                TaskRepositoryError::DuplicateTask(task.id())
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                TaskRepositoryError::ProjectNotFound(task.project_id())
            }
            _ => TaskRepositoryError::persistence(err),
        })?;
    Ok(())
}

fn update_task(
    connection: &mut PgConnection,
    task: &Task,
    expected_revision: u64,
) -> TaskRepositoryResult<()> {
    let row = task_to_row(task)?;
    let updated = diesel::update(
        tasks::table
            .filter(tasks::id.eq(row.id))
            .filter(tasks::revision.eq(to_i64(expected_revision)?)),
    )
    .set(&row)
    .execute(connection)?;
    if updated > 0 {
        return Ok(());
    }
    let stored = tasks::table
        .filter(tasks::id.eq(row.id))
        .select(tasks::revision)
        .first::<i64>(connection)
        .optional()?;
    match stored {
        Some(actual) => Err(TaskRepositoryError::Conflict {
            task_id: task.id(),
            expected: expected_revision,
            actual: from_i64(actual)?,
        }),
        None => Err(TaskRepositoryError::NotFound(task.id())),
    }
}

fn task_to_row(task: &Task) -> TaskRepositoryResult<TaskRow> {
    Ok(TaskRow {
        id: task.id().into_inner(),
        project_id: task.project_id().into_inner(),
        parent_id: task.parent_id().map(TaskId::into_inner),
        task_type: task.task_type().as_str().to_owned(),
        workflow_state: task.workflow_state().as_str().to_owned(),
        revision: to_i64(task.revision())?,
        body: to_json(task)?,
        created_at: task.created_at(),
        updated_at: task.updated_at(),
    })
}

fn row_to_task(row: TaskRow) -> TaskRepositoryResult<Task> {
    from_json(row.body)
}

fn edge_to_row(edge: &DependencyEdge) -> EdgeRow {
    EdgeRow {
        id: edge.id().into_inner(),
        project_id: edge.project_id().into_inner(),
        source_task_id: edge.source_task_id().into_inner(),
        target_task_id: edge.target_task_id().into_inner(),
        dependency_type: edge.dependency_type().as_str().to_owned(),
        resolved: edge.is_resolved(),
        created_at: edge.created_at(),
        resolved_at: edge.resolved_at(),
    }
}

fn row_to_edge(row: EdgeRow) -> TaskRepositoryResult<DependencyEdge> {
    let dependency_type = DependencyType::try_from(row.dependency_type.as_str())
        .map_err(TaskRepositoryError::persistence)?;
    Ok(DependencyEdge::from_persisted(PersistedEdgeData {
        id: EdgeId::from_uuid(row.id),
        project_id: ProjectId::from_uuid(row.project_id),
        source_task_id: TaskId::from_uuid(row.source_task_id),
        target_task_id: TaskId::from_uuid(row.target_task_id),
        dependency_type,
        resolved: row.resolved,
        created_at: row.created_at,
        resolved_at: row.resolved_at,
    }))
}

fn to_json(value: &impl Serialize) -> TaskRepositoryResult<Value> {
    serde_json::to_value(value).map_err(TaskRepositoryError::persistence)
}

fn from_json<T: DeserializeOwned>(value: Value) -> TaskRepositoryResult<T> {
    serde_json::from_value(value).map_err(TaskRepositoryError::persistence)
}

fn to_i64(value: u64) -> TaskRepositoryResult<i64> {
    i64::try_from(value).map_err(TaskRepositoryError::persistence)
}

fn from_i64(value: i64) -> TaskRepositoryResult<u64> {
    u64::try_from(value).map_err(TaskRepositoryError::persistence)
}
