//! Given steps for workflow BDD scenarios.

use super::world::{WorkflowWorld, run_async, scenario_actor};
use eyre::WrapErr;
use rstest_bdd_macros::given;
use workloom::task::{
    domain::{DependencyType, WorkflowState},
    services::TransitionRequest,
};

#[given(r#"a parent task "{parent}" with children "{first}" and "{second}""#)]
fn parent_with_children(
    world: &mut WorkflowWorld,
    parent: String,
    first: String,
    second: String,
) -> Result<(), eyre::Report> {
    world.create(&parent, None)?;
    world.create(&first, Some(&parent))?;
    world.create(&second, Some(&parent))?;
    Ok(())
}

#[given(r#"tasks "{first}" and "{second}""#)]
fn two_tasks(world: &mut WorkflowWorld, first: String, second: String) -> Result<(), eyre::Report> {
    world.create(&first, None)?;
    world.create(&second, None)?;
    Ok(())
}

#[given(r#"task "{name}" is ready"#)]
fn task_is_ready(world: &mut WorkflowWorld, name: String) -> Result<(), eyre::Report> {
    let task_id = world.task_id(&name)?;
    for state in [WorkflowState::Estimation, WorkflowState::Ready] {
        run_async(
            world
                .engine
                .lifecycle
                .transition(TransitionRequest::new(task_id, state, scenario_actor()?)),
        )
        .wrap_err_with(|| format!("move {name} to {state}"))?;
    }
    Ok(())
}

#[given(r#"task "{source}" blocks task "{target}""#)]
fn task_blocks_task(
    world: &mut WorkflowWorld,
    source: String,
    target: String,
) -> Result<(), eyre::Report> {
    let edge = run_async(world.engine.dependencies.add_dependency(
        world.task_id(&source)?,
        world.task_id(&target)?,
        DependencyType::Blocks,
    ))
    .wrap_err("add blocking edge in scenario setup")?;
    world.last_edge = Some(edge.id());
    Ok(())
}
