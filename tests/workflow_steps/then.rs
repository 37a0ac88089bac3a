//! Then steps for workflow BDD scenarios.

use super::world::WorkflowWorld;
use rstest_bdd_macros::then;
use workloom::task::{domain::WorkflowState, services::ErrorKind};

#[then(r#"task "{name}" is {percent:u8} percent complete"#)]
fn task_is_percent_complete(
    world: &WorkflowWorld,
    name: String,
    percent: u8,
) -> Result<(), eyre::Report> {
    let completion = world.task(&name)?.completion().value();
    eyre::ensure!(
        completion == percent,
        "expected {name} at {percent}%, found {completion}%"
    );
    Ok(())
}

#[then(r#"task "{name}" is in state "{state}""#)]
fn task_is_in_state(world: &WorkflowWorld, name: String, state: String) -> Result<(), eyre::Report> {
    let expected = WorkflowState::try_from(state.as_str())
        .map_err(|err| eyre::eyre!("invalid expected state in scenario: {err}"))?;
    let actual = world.task(&name)?.workflow_state();
    eyre::ensure!(actual == expected, "expected {name} in {expected}, found {actual}");
    Ok(())
}

#[then(r#"the last operation fails with a "{kind}" error"#)]
fn last_operation_fails(world: &WorkflowWorld, kind: String) -> Result<(), eyre::Report> {
    let expected = match kind.as_str() {
        "validation" => ErrorKind::Validation,
        "not found" => ErrorKind::NotFound,
        "transition" => ErrorKind::Transition,
        "dependency" => ErrorKind::Dependency,
        "cycle" => ErrorKind::Cycle,
        "conflict" => ErrorKind::Conflict,
        other => return Err(eyre::eyre!("unknown error kind in scenario: {other}")),
    };
    let err = world
        .last_error
        .as_ref()
        .ok_or_else(|| eyre::eyre!("expected the last operation to fail"))?;
    eyre::ensure!(err.kind() == expected, "expected a {kind} error, got {err}");
    Ok(())
}
