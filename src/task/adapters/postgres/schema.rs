//! Diesel schema for task workflow persistence.

diesel::table! {
    /// Projects owning tasks and dependency graphs.
    projects (id) {
        /// Project identifier.
        id -> Uuid,
        /// Display name.
        #[max_length = 255]
        name -> Varchar,
        /// Bumped by every edge insert; guards concurrent cycle checks.
        graph_revision -> Int8,
        /// Creation timestamp.
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Task aggregates.
    tasks (id) {
        /// Task identifier.
        id -> Uuid,
        /// Owning project.
        project_id -> Uuid,
        /// Parent task, if any.
        parent_id -> Nullable<Uuid>,
        /// Kind of work.
        #[max_length = 32]
        task_type -> Varchar,
        /// Workflow state.
        #[max_length = 50]
        workflow_state -> Varchar,
        /// Optimistic-concurrency revision.
        revision -> Int8,
        /// Full serialized aggregate.
        body -> Jsonb,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Directed relations between tasks.
    dependency_edges (id) {
        /// Edge identifier.
        id -> Uuid,
        /// Owning project.
        project_id -> Uuid,
        /// Source task.
        source_task_id -> Uuid,
        /// Target task.
        target_task_id -> Uuid,
        /// Relationship type.
        #[max_length = 32]
        dependency_type -> Varchar,
        /// Resolution flag.
        resolved -> Bool,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Resolution timestamp.
        resolved_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Append-only workflow audit trail.
    workflow_transitions (id) {
        /// Record identifier.
        id -> Uuid,
        /// Insertion order.
        seq -> Int8,
        /// Task the record belongs to.
        task_id -> Uuid,
        /// Serialized record.
        record -> Jsonb,
        /// When the transition was recorded.
        occurred_at -> Timestamptz,
    }
}

diesel::table! {
    /// Append-only estimate versions.
    estimates (id) {
        /// Estimate identifier.
        id -> Uuid,
        /// Estimated task.
        task_id -> Uuid,
        /// Per-task version.
        version -> Int4,
        /// Serialized estimate.
        body -> Jsonb,
        /// Creation timestamp.
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// Append-only completion records feeding the learning pool.
    completion_records (id) {
        /// Record identifier.
        id -> Uuid,
        /// Insertion order.
        seq -> Int8,
        /// Completed task.
        task_id -> Uuid,
        /// Owning project.
        project_id -> Uuid,
        /// Serialized record.
        body -> Jsonb,
        /// When the record was written.
        recorded_at -> Timestamptz,
    }
}

diesel::table! {
    /// Applied git deliveries, keyed for deduplication.
    git_event_receipts (provider, delivery_id) {
        /// VCS provider.
        #[max_length = 16]
        provider -> Varchar,
        /// Provider delivery identifier.
        #[max_length = 255]
        delivery_id -> Varchar,
        /// When the delivery was applied.
        applied_at -> Timestamptz,
    }
}

diesel::joinable!(tasks -> projects (project_id));
diesel::joinable!(dependency_edges -> projects (project_id));

diesel::allow_tables_to_appear_in_same_query!(
    projects,
    tasks,
    dependency_edges,
    workflow_transitions,
    estimates,
    completion_records,
    git_event_receipts,
);
