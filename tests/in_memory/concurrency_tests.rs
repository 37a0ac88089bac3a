//! Racing writers against one in-memory store.

use std::sync::Arc;

use super::helpers::{DELIVERY, TestEngine, Workspace, config, operator};
use rstest::rstest;
use workloom::{
    config::EngineConfig,
    task::{
        domain::{
            CompletionPercentage, DependencyType, Task, TaskId, TaskType, WorkflowState,
            recompute_completion,
        },
        services::{ErrorKind, TransitionRequest, WorkflowResult},
    },
};

/// Applies one transition, retrying lost optimistic-concurrency races.
async fn transition_retrying(
    engine: &TestEngine,
    task_id: TaskId,
    to: WorkflowState,
) -> WorkflowResult<Task> {
    loop {
        match engine
            .lifecycle
            .transition(TransitionRequest::new(task_id, to, operator()))
            .await
        {
            Err(err) if err.is_retryable() => tokio::task::yield_now().await,
            other => return other,
        }
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_child_deploys_leave_parent_consistent(
    config: EngineConfig,
) -> eyre::Result<()> {
    let workspace = Workspace::open(config).await?;
    let parent = workspace.create("Release", TaskType::Feature, None).await?;
    let mut children = Vec::new();
    for index in 0..6 {
        children.push(
            workspace
                .create(&format!("Part {index}"), TaskType::Feature, Some(parent.id()))
                .await?,
        );
    }

    let handles: Vec<_> = children
        .iter()
        .map(|child| {
            let engine = Arc::clone(&workspace.engine);
            let child_id = child.id();
            tokio::spawn(async move {
                for state in DELIVERY {
                    transition_retrying(&engine, child_id, state).await?;
                }
                WorkflowResult::Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.await??;
    }

    let stored = workspace.engine.lifecycle.get(parent.id()).await?;
    eyre::ensure!(stored.completion().value() == 100, "parent at {}", stored.completion().value());
    let recomputed = workspace.engine.lifecycle.recompute(parent.id()).await?;
    eyre::ensure!(recomputed.completion() == stored.completion());
    eyre::ensure!(recomputed.revision() == stored.revision(), "recompute wrote a no-op change");
    Ok(())
}

/// Reports leaf progress, retrying lost optimistic-concurrency races.
async fn report_retrying(engine: &TestEngine, task_id: TaskId, value: u8) -> WorkflowResult<Task> {
    let completion = CompletionPercentage::new(value)?;
    loop {
        match engine.lifecycle.report_progress(task_id, completion).await {
            Err(err) if err.is_retryable() => tokio::task::yield_now().await,
            other => return other,
        }
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_sibling_reports_keep_parent_derived(config: EngineConfig) -> eyre::Result<()> {
    let workspace = Workspace::open(config).await?;
    let parent = workspace.create("Release", TaskType::Feature, None).await?;
    let mut children = Vec::new();
    for index in 0..3 {
        children.push(
            workspace
                .create(&format!("Part {index}"), TaskType::Feature, Some(parent.id()))
                .await?,
        );
    }

    // Small values flip the rounded mean between 0 and 1.
    let handles: Vec<_> = children
        .iter()
        .enumerate()
        .map(|(index, child)| {
            let engine = Arc::clone(&workspace.engine);
            let child_id = child.id();
            tokio::spawn(async move {
                for value in [1_u8, 0].into_iter().cycle().skip(index).take(20) {
                    report_retrying(&engine, child_id, value).await?;
                }
                WorkflowResult::Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.await??;
    }

    let stored = workspace.engine.lifecycle.get(parent.id()).await?;
    let siblings = workspace.engine.lifecycle.list_children(parent.id()).await?;
    eyre::ensure!(
        Some(stored.completion()) == recompute_completion(&siblings),
        "parent at {} drifted from its children",
        stored.completion().value()
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn opposing_edges_admit_exactly_one(config: EngineConfig) -> eyre::Result<()> {
    let workspace = Workspace::open(config).await?;
    let a = workspace.create("A", TaskType::Feature, None).await?;
    let b = workspace.create("B", TaskType::Feature, None).await?;

    let spawn_edge = |source: TaskId, target: TaskId| {
        let engine = Arc::clone(&workspace.engine);
        tokio::spawn(async move {
            engine
                .dependencies
                .add_dependency(source, target, DependencyType::Blocks)
                .await
        })
    };
    let forward = spawn_edge(a.id(), b.id());
    let backward = spawn_edge(b.id(), a.id());
    let outcomes = [forward.await?, backward.await?];

    let accepted = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    eyre::ensure!(accepted == 1, "expected exactly one accepted edge: {outcomes:?}");
    eyre::ensure!(
        outcomes
            .iter()
            .filter_map(|outcome| outcome.as_ref().err())
            .all(|err| err.kind() == ErrorKind::Cycle),
        "loser must see the cycle: {outcomes:?}"
    );
    let edges = workspace.engine.dependencies.dependencies_of(a.id()).await?;
    eyre::ensure!(edges.len() == 1);
    Ok(())
}
