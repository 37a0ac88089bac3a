//! When steps for workflow BDD scenarios.

use super::world::{WorkflowWorld, run_async, scenario_actor};
use rstest_bdd_macros::when;
use workloom::task::{
    domain::{DependencyType, WorkflowState},
    services::TransitionRequest,
};

const DELIVERY: [WorkflowState; 9] = [
    WorkflowState::Estimation,
    WorkflowState::Ready,
    WorkflowState::Implementing,
    WorkflowState::CodeReview,
    WorkflowState::Testing,
    WorkflowState::Validation,
    WorkflowState::PrReview,
    WorkflowState::Merging,
    WorkflowState::Deployed,
];

#[when(r#"task "{name}" is delivered"#)]
fn task_is_delivered(world: &mut WorkflowWorld, name: String) -> Result<(), eyre::Report> {
    let task_id = world.task_id(&name)?;
    for state in DELIVERY {
        run_async(
            world
                .engine
                .lifecycle
                .transition(TransitionRequest::new(task_id, state, scenario_actor()?)),
        )?;
    }
    Ok(())
}

#[when(r#"task "{name}" is moved to "{state}""#)]
fn task_is_moved(world: &mut WorkflowWorld, name: String, state: String) -> Result<(), eyre::Report> {
    let target = WorkflowState::try_from(state.as_str())
        .map_err(|err| eyre::eyre!("invalid state in scenario: {err}"))?;
    let request = TransitionRequest::new(world.task_id(&name)?, target, scenario_actor()?);
    let result = run_async(world.engine.lifecycle.transition(request));
    world.remember(result);
    Ok(())
}

#[when(r#"task "{source}" is made to block task "{target}""#)]
fn task_is_made_to_block(
    world: &mut WorkflowWorld,
    source: String,
    target: String,
) -> Result<(), eyre::Report> {
    let result = run_async(world.engine.dependencies.add_dependency(
        world.task_id(&source)?,
        world.task_id(&target)?,
        DependencyType::Blocks,
    ));
    if let Some(edge) = world.remember(result) {
        world.last_edge = Some(edge.id());
    }
    Ok(())
}

#[when("the last dependency is resolved")]
fn last_dependency_is_resolved(world: &mut WorkflowWorld) -> Result<(), eyre::Report> {
    let edge_id = world
        .last_edge
        .ok_or_else(|| eyre::eyre!("missing edge in scenario world"))?;
    run_async(world.engine.dependencies.resolve(edge_id))?;
    Ok(())
}
