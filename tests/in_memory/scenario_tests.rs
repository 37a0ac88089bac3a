//! End-to-end flows over the public engine API.

use super::helpers::{DELIVERY, Workspace, config, delivery_until, operator};
use rstest::rstest;
use workloom::{
    config::EngineConfig,
    task::{
        domain::{ComplexityFactors, DependencyType, Effort, Tags, TaskType, WorkflowState},
        services::{ErrorKind, TransitionRequest},
    },
};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn half_finished_children_put_parent_at_fifty(config: EngineConfig) -> eyre::Result<()> {
    let workspace = Workspace::open(config).await?;
    let t1 = workspace.create("T1", TaskType::Feature, None).await?;
    let t2 = workspace.create("T2", TaskType::Feature, Some(t1.id())).await?;
    let t3 = workspace.create("T3", TaskType::Feature, Some(t1.id())).await?;

    workspace.walk(t2.id(), &DELIVERY).await?;

    let parent = workspace.engine.lifecycle.get(t1.id()).await?;
    eyre::ensure!(parent.completion().value() == 50, "parent at {}", parent.completion().value());
    let sibling = workspace.engine.lifecycle.get(t3.id()).await?;
    eyre::ensure!(sibling.workflow_state() == WorkflowState::Planning);
    eyre::ensure!(sibling.completion().value() == 0);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn blocker_gates_start_until_resolved(config: EngineConfig) -> eyre::Result<()> {
    let workspace = Workspace::open(config).await?;
    let t4 = workspace.create("T4", TaskType::Feature, None).await?;
    let t5 = workspace.create("T5", TaskType::Feature, None).await?;
    workspace
        .walk(t5.id(), &[WorkflowState::Estimation, WorkflowState::Ready])
        .await?;
    let edge = workspace
        .engine
        .dependencies
        .add_dependency(t4.id(), t5.id(), DependencyType::Blocks)
        .await?;

    let start = TransitionRequest::new(t5.id(), WorkflowState::Implementing, operator());
    let blocked = workspace.engine.lifecycle.transition(start.clone()).await;
    eyre::ensure!(
        matches!(&blocked, Err(err) if err.kind() == ErrorKind::Dependency),
        "expected a dependency error, got {blocked:?}"
    );

    let reverse = workspace
        .engine
        .dependencies
        .add_dependency(t5.id(), t4.id(), DependencyType::Blocks)
        .await;
    eyre::ensure!(
        matches!(&reverse, Err(err) if err.kind() == ErrorKind::Cycle),
        "expected a cycle error, got {reverse:?}"
    );

    workspace.engine.dependencies.resolve(edge.id()).await?;
    let started = workspace.engine.lifecycle.transition(start).await?;
    eyre::ensure!(started.workflow_state() == WorkflowState::Implementing);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn completed_bugs_train_the_next_estimate() -> eyre::Result<()> {
    let mut config = EngineConfig::default();
    config.estimation.hours_per_point = 3.0;
    let workspace = Workspace::open(config).await?;
    let factors = ComplexityFactors::from_scores(1, 1, 1, 1, 5)?;
    let no_tags = Tags::default();

    let cold = workspace
        .engine
        .estimation
        .improved_estimate(workspace.project.id(), TaskType::Bug, &no_tags, factors)
        .await?;

    for (index, hours) in [2.0, 3.0, 4.0].into_iter().enumerate() {
        let bug = workspace
            .create(&format!("Bug {index}"), TaskType::Bug, None)
            .await?;
        let estimate = workspace.engine.estimation.estimate(bug.id(), factors).await?;
        eyre::ensure!((estimate.suggestion.hours - 3.0).abs() < 1.0, "prior estimate drifted");
        workspace
            .walk(bug.id(), &delivery_until(WorkflowState::Merging))
            .await?;
        workspace
            .engine
            .lifecycle
            .transition(
                TransitionRequest::new(bug.id(), WorkflowState::Deployed, operator())
                    .with_actuals(Effort::from_hours(hours)?),
            )
            .await?;
    }

    let warm = workspace
        .engine
        .estimation
        .improved_estimate(workspace.project.id(), TaskType::Bug, &no_tags, factors)
        .await?;
    eyre::ensure!(warm.confidence > cold.confidence, "confidence did not rise");
    eyre::ensure!(warm.sample_count == 3);

    let insights = workspace
        .engine
        .estimation
        .learning_insights(workspace.project.id())
        .await?;
    eyre::ensure!(insights.sample_count == 3);
    Ok(())
}
