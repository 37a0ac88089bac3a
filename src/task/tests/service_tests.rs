//! Service orchestration tests for task creation, edits, progress, and
//! workflow transitions.

use chrono::Duration;
use rstest::rstest;
use serde_json::json;

use super::support::{Harness, alice, path_to};
use crate::config::EngineConfig;
use crate::task::{
    domain::{
        CompletionPercentage, Effort, ProjectId, TaskDomainError, TaskId, TaskPatch,
        TransitionValidation, TriggerKind, WorkflowState, recompute_completion,
    },
    ports::{ChangeSet, TaskRepository, TaskRepositoryError, WorkflowEvent},
    services::{ErrorKind, TransitionRequest, WorkflowError},
};

fn percent(value: u8) -> CompletionPercentage {
    CompletionPercentage::new(value).expect("valid percentage")
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn create_persists_task_with_initial_audit_record() {
    let harness = Harness::start().await;
    let task = harness
        .engine
        .lifecycle
        .create(
            harness
                .request("  Build the rollup engine ")
                .with_description("Parent completion from children")
                .with_priority(2)
                .with_tags(["Rust", "postgres"]),
        )
        .await
        .expect("task creation should succeed");

    assert_eq!(task.title().as_str(), "Build the rollup engine");
    assert_eq!(task.workflow_state(), WorkflowState::Planning);
    assert_eq!(task.revision(), 1);
    assert_eq!(task.priority().value(), 2);

    let fetched = harness.engine.lifecycle.get(task.id()).await.expect("lookup");
    assert_eq!(fetched, task);

    let history = harness
        .engine
        .lifecycle
        .transition_history(task.id())
        .await
        .expect("history");
    assert_eq!(history.len(), 1);
    let initial = history.first().expect("initial record");
    assert_eq!(initial.from_state, None);
    assert_eq!(initial.to_state, WorkflowState::Planning);
    assert_eq!(harness.listener.names(), vec!["task_created"]);
}

#[rstest]
#[case("", ErrorKind::Validation)]
#[case("   ", ErrorKind::Validation)]
#[tokio::test(flavor = "multi_thread")]
async fn create_rejects_blank_titles(#[case] title: &str, #[case] kind: ErrorKind) {
    let harness = Harness::start().await;
    let result = harness.engine.lifecycle.create(harness.request(title)).await;
    let err = result.expect_err("blank title must fail");
    assert!(matches!(err, WorkflowError::Domain(TaskDomainError::EmptyTitle)));
    assert_eq!(err.kind(), kind);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn create_rejects_unknown_project_and_parent() {
    let harness = Harness::start().await;
    let stranger = ProjectId::new();
    let orphan = harness
        .engine
        .lifecycle
        .create(crate::task::services::CreateTaskRequest::new(
            stranger,
            "Orphan",
            crate::task::domain::TaskType::Chore,
        ))
        .await;
    assert!(matches!(orphan, Err(WorkflowError::UnknownProject(id)) if id == stranger));

    let missing = TaskId::new();
    let err = harness
        .engine
        .lifecycle
        .create(harness.request("Lost child").with_parent(missing))
        .await
        .expect_err("missing parent must fail");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn create_rejects_parent_from_another_project() {
    let harness = Harness::start().await;
    let other = harness
        .engine
        .lifecycle
        .register_project("elsewhere")
        .await
        .expect("second project");
    let foreign_parent = harness
        .engine
        .lifecycle
        .create(crate::task::services::CreateTaskRequest::new(
            other.id(),
            "Foreign",
            crate::task::domain::TaskType::Feature,
        ))
        .await
        .expect("foreign parent");

    let result = harness
        .engine
        .lifecycle
        .create(harness.request("Cross").with_parent(foreign_parent.id()))
        .await;
    assert!(matches!(
        result,
        Err(WorkflowError::Domain(TaskDomainError::CrossProjectReference(_)))
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn terminal_parent_refuses_new_children() {
    let harness = Harness::start().await;
    let parent = harness.task("Finished epic").await;
    harness.deploy(parent.id()).await;

    let result = harness
        .engine
        .lifecycle
        .create(harness.request("Late child").with_parent(parent.id()))
        .await;
    assert!(matches!(
        result,
        Err(WorkflowError::Domain(TaskDomainError::TaskTerminal(id))) if id == parent.id()
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn valid_transition_appends_accepted_record() {
    let harness = Harness::start().await;
    let task = harness.task("Plan it").await;
    harness.listener.clear();

    let updated = harness
        .engine
        .lifecycle
        .transition(TransitionRequest::new(task.id(), WorkflowState::Estimation, alice()))
        .await
        .expect("planning -> estimation is legal");

    assert_eq!(updated.workflow_state(), WorkflowState::Estimation);
    assert_eq!(updated.revision(), task.revision() + 1);
    let history = harness
        .engine
        .lifecycle
        .transition_history(task.id())
        .await
        .expect("history");
    let last = history.last().expect("latest record");
    assert_eq!(last.from_state, Some(WorkflowState::Planning));
    assert_eq!(last.to_state, WorkflowState::Estimation);
    assert_eq!(last.trigger, TriggerKind::Manual);
    assert_eq!(last.actor, alice());
    assert_eq!(last.validation, TransitionValidation::Accepted);
    assert_eq!(
        harness.listener.events(),
        vec![WorkflowEvent::TransitionCommitted {
            task_id: task.id(),
            from: WorkflowState::Planning,
            to: WorkflowState::Estimation,
            trigger: TriggerKind::Manual,
        }]
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn invalid_transition_changes_nothing() {
    let harness = Harness::start().await;
    let task = harness.task("Skip ahead").await;
    harness.listener.clear();

    let err = harness
        .engine
        .lifecycle
        .transition(TransitionRequest::new(task.id(), WorkflowState::Deployed, alice()))
        .await
        .expect_err("planning -> deployed is illegal");

    assert_eq!(err.kind(), ErrorKind::Transition);
    assert!(!err.is_retryable());
    let stored = harness.engine.lifecycle.get(task.id()).await.expect("lookup");
    assert_eq!(stored, task);
    let history = harness
        .engine
        .lifecycle
        .transition_history(task.id())
        .await
        .expect("history");
    assert_eq!(history.len(), 1);
    assert!(harness.listener.events().is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn deploying_a_leaf_completes_it_and_writes_completion_record() {
    let harness = Harness::start().await;
    let task = harness.task("Ship").await;
    harness
        .engine
        .lifecycle
        .log_work(task.id(), Effort::from_hours(3.0).expect("valid"))
        .await
        .expect("log work");

    let deployed = harness.deploy(task.id()).await;

    assert_eq!(deployed.workflow_state(), WorkflowState::Deployed);
    assert_eq!(deployed.completion(), CompletionPercentage::COMPLETE);
    assert!(deployed.completed_at().is_some());
    let records = harness
        .repository
        .completions_for(task.id())
        .await
        .expect("completions");
    assert_eq!(records.len(), 1);
    let record = records.first().expect("record");
    assert!((record.actuals.hours - 3.0).abs() < f64::EPSILON);
    assert_eq!(record.variance, None, "no estimate was recorded");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn terminal_transition_prefers_supplied_actuals() {
    let harness = Harness::start().await;
    let task = harness.task("Close early").await;
    harness.advance(task.id(), &path_to(WorkflowState::Ready)).await;

    harness
        .engine
        .lifecycle
        .transition(
            TransitionRequest::new(task.id(), WorkflowState::Closed, alice())
                .with_actuals(Effort::from_hours(1.25).expect("valid")),
        )
        .await
        .expect("close");

    let records = harness
        .repository
        .completions_for(task.id())
        .await
        .expect("completions");
    let record = records.first().expect("record");
    assert!((record.actuals.hours - 1.25).abs() < f64::EPSILON);
    assert_eq!(record.profile.terminal_state, WorkflowState::Closed);
    assert!(!record.is_learning_sample());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn update_fields_refuses_workflow_keys_and_keeps_task() {
    let harness = Harness::start().await;
    let task = harness.task("Guarded").await;

    let err = harness
        .engine
        .lifecycle
        .update_fields_json(task.id(), &json!({"workflow_state": "deployed"}))
        .await
        .expect_err("workflow state is not a field");
    assert!(matches!(
        err,
        WorkflowError::Domain(TaskDomainError::ForbiddenPatchField(ref field)) if field == "workflow_state"
    ));
    let stored = harness.engine.lifecycle.get(task.id()).await.expect("lookup");
    assert_eq!(stored.workflow_state(), WorkflowState::Planning);

    let renamed = harness
        .engine
        .lifecycle
        .update_fields_json(task.id(), &json!({"title": "Renamed", "priority": 1}))
        .await
        .expect("descriptive fields update");
    assert_eq!(renamed.title().as_str(), "Renamed");
    assert_eq!(renamed.priority().value(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn terminal_tasks_accept_only_metadata_edits() {
    let harness = Harness::start().await;
    let task = harness.task("Done").await;
    harness.deploy(task.id()).await;

    let retitled = harness
        .engine
        .lifecycle
        .update_fields(task.id(), TaskPatch::new().with_title("Done, renamed").expect("title"))
        .await
        .expect("metadata edit on terminal task");
    assert_eq!(retitled.title().as_str(), "Done, renamed");

    let reprioritised = harness
        .engine
        .lifecycle
        .update_fields(task.id(), TaskPatch::new().with_priority(1).expect("priority"))
        .await
        .expect_err("priority is frozen");
    assert!(matches!(
        reprioritised,
        WorkflowError::Domain(TaskDomainError::TaskTerminal(_))
    ));

    let logged = harness
        .engine
        .lifecycle
        .log_work(task.id(), Effort::from_hours(1.0).expect("valid"))
        .await
        .expect_err("effort is frozen");
    assert!(matches!(logged, WorkflowError::Domain(TaskDomainError::TaskTerminal(_))));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn child_progress_rolls_up_the_whole_chain() {
    let harness = Harness::start().await;
    let epic = harness.task("Epic").await;
    let story = harness.child(epic.id(), "Story").await;
    let first = harness.child(story.id(), "First").await;
    let second = harness.child(story.id(), "Second").await;

    harness
        .engine
        .lifecycle
        .report_progress(first.id(), percent(100))
        .await
        .expect("leaf progress");
    harness
        .engine
        .lifecycle
        .report_progress(second.id(), percent(25))
        .await
        .expect("leaf progress");

    let stored_story = harness.engine.lifecycle.get(story.id()).await.expect("story");
    let stored_epic = harness.engine.lifecycle.get(epic.id()).await.expect("epic");
    assert_eq!(stored_story.completion(), percent(63));
    assert_eq!(stored_epic.completion(), percent(63));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn parents_refuse_direct_progress_reports() {
    let harness = Harness::start().await;
    let parent = harness.task("Parent").await;
    harness.child(parent.id(), "Child").await;

    let err = harness
        .engine
        .lifecycle
        .report_progress(parent.id(), percent(80))
        .await
        .expect_err("parent completion is derived");
    assert!(matches!(
        err,
        WorkflowError::Domain(TaskDomainError::ProgressDerivedFromChildren(_))
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn adding_a_child_dilutes_parent_completion() {
    let harness = Harness::start().await;
    let parent = harness.task("Parent").await;
    let child = harness.child(parent.id(), "Only child").await;
    harness
        .engine
        .lifecycle
        .report_progress(child.id(), percent(100))
        .await
        .expect("progress");
    assert_eq!(
        harness.engine.lifecycle.get(parent.id()).await.expect("parent").completion(),
        percent(100)
    );

    harness.child(parent.id(), "Sibling").await;
    assert_eq!(
        harness.engine.lifecycle.get(parent.id()).await.expect("parent").completion(),
        percent(50)
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn recompute_is_idempotent() {
    let harness = Harness::start().await;
    let parent = harness.task("Parent").await;
    let child = harness.child(parent.id(), "Child").await;
    harness
        .engine
        .lifecycle
        .report_progress(child.id(), percent(40))
        .await
        .expect("progress");

    let first = harness.engine.lifecycle.recompute(parent.id()).await.expect("recompute");
    harness.clock.advance(Duration::minutes(10));
    let second = harness.engine.lifecycle.recompute(parent.id()).await.expect("recompute");

    assert_eq!(first, second, "no write when nothing changed");
    assert_eq!(second.completion(), percent(40));
}

/// Plans a progress report on a child without committing it.
async fn plan_progress(harness: &Harness, child_id: TaskId, value: u8) -> ChangeSet {
    let mut child = harness.context.require_task(child_id).await.expect("child");
    child
        .report_progress(percent(value), false, &*harness.clock)
        .expect("leaf progress");
    let parent_id = child.parent_id().expect("child has a parent");
    let mut changes = ChangeSet::new();
    changes.update_task(child);
    let mut events = Vec::new();
    harness
        .context
        .plan_rollup(&mut changes, &mut events, child_id, parent_id)
        .await
        .expect("rollup plan");
    changes
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn interleaved_sibling_reports_cannot_skew_the_parent() {
    let harness = Harness::start().await;
    let parent = harness.task("Parent").await;
    let first = harness.child(parent.id(), "First").await;
    let second = harness.child(parent.id(), "Second").await;
    let third = harness.child(parent.id(), "Third").await;
    harness
        .engine
        .lifecycle
        .report_progress(third.id(), percent(1))
        .await
        .expect("progress");

    // [0, 1, 1] rounds the parent up to 1; [0, 0, 0] leaves it at 0.
    let raising = plan_progress(&harness, second.id(), 1).await;
    let lowering = plan_progress(&harness, third.id(), 0).await;
    assert!(lowering.pending_task(parent.id()).is_some());

    harness.repository.commit(raising).await.expect("first commit");
    let err = harness
        .repository
        .commit(lowering)
        .await
        .expect_err("sibling snapshot is stale");
    assert!(matches!(
        err,
        TaskRepositoryError::Conflict { task_id, .. } if task_id == parent.id()
    ));

    harness
        .engine
        .lifecycle
        .report_progress(third.id(), percent(0))
        .await
        .expect("retried progress");
    let children = harness.engine.lifecycle.list_children(parent.id()).await.expect("children");
    let stored = harness.engine.lifecycle.get(parent.id()).await.expect("parent");
    assert_eq!(Some(stored.completion()), recompute_completion(&children));
    assert_eq!(stored.completion(), percent(0));
    assert!(children.iter().any(|child| child.id() == first.id()));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unchanged_rollup_still_advances_the_parent_revision() {
    let harness = Harness::start().await;
    let parent = harness.task("Parent").await;
    let child = harness.child(parent.id(), "Child").await;
    let before = harness.engine.lifecycle.get(parent.id()).await.expect("parent");

    harness.listener.clear();
    harness.advance(child.id(), &path_to(WorkflowState::Ready)).await;

    let after = harness.engine.lifecycle.get(parent.id()).await.expect("parent");
    assert_eq!(after.completion(), before.completion());
    assert!(after.revision() > before.revision());
    assert!(!harness.listener.names().contains(&"rollup_recomputed"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn spawned_child_inherits_parent_attributes() {
    let harness = Harness::start().await;
    let parent = harness
        .engine
        .lifecycle
        .create(harness.request("Epic").with_priority(1).with_tags(["rust"]))
        .await
        .expect("parent");

    let child = harness
        .engine
        .lifecycle
        .spawn_child_task(parent.id(), "\n  Wire the adapter  \nmore detail here")
        .await
        .expect("spawned child");

    assert_eq!(child.title().as_str(), "Wire the adapter");
    assert_eq!(child.parent_id(), Some(parent.id()));
    assert_eq!(child.priority().value(), 1);
    assert_eq!(child.tags(), parent.tags());
    assert!(child.description().is_some_and(|text| text.contains("more detail")));

    let children = harness
        .engine
        .lifecycle
        .list_children(parent.id())
        .await
        .expect("children");
    assert_eq!(children.len(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stale_writer_loses_with_conflict() {
    let harness = Harness::start().await;
    let task = harness.task("Contended").await;

    // Another writer advances the task after `task` was read.
    harness
        .engine
        .lifecycle
        .update_fields(task.id(), TaskPatch::new().with_title("First writer").expect("title"))
        .await
        .expect("first write");

    let mut changes = ChangeSet::new();
    changes.update_task(task.clone());
    let err = harness
        .repository
        .commit(changes)
        .await
        .expect_err("stale revision must be refused");
    assert!(matches!(
        err,
        TaskRepositoryError::Conflict { expected: 1, actual: 2, .. }
    ));
    assert!(WorkflowError::from(err).is_retryable());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn snapshot_reflects_committed_state() {
    let harness = Harness::start().await;
    let task = harness.task("Visible").await;
    harness.advance(task.id(), &path_to(WorkflowState::Ready)).await;

    let snapshot = harness.engine.lifecycle.snapshot(task.id()).await.expect("snapshot");
    assert_eq!(snapshot.id, task.id());
    assert_eq!(snapshot.workflow_state, WorkflowState::Ready);
    assert_eq!(snapshot.revision, 3);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn auto_resolve_can_be_disabled() {
    let mut config = EngineConfig::default();
    config.dependencies.auto_resolve_on_deploy = false;
    let harness = Harness::with_config(config).await;
    let prerequisite = harness.task("Prerequisite").await;
    let dependent = harness.task("Dependent").await;
    let edge = harness
        .engine
        .dependencies
        .add_dependency(
            prerequisite.id(),
            dependent.id(),
            crate::task::domain::DependencyType::Blocks,
        )
        .await
        .expect("edge");

    harness.deploy(prerequisite.id()).await;

    let stored = harness
        .repository
        .find_edge(edge.id())
        .await
        .expect("lookup")
        .expect("edge exists");
    assert!(!stored.is_resolved());
}
