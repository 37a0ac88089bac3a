//! Tests for dependency edges and cycle detection.

use crate::task::domain::{
    DependencyEdge, DependencyGraph, DependencyType, ProjectId, TaskDomainError, TaskId,
};
use proptest::prelude::*;
use rstest::rstest;

use super::support::ManualClock;

fn edge(source: TaskId, target: TaskId, dependency_type: DependencyType) -> DependencyEdge {
    DependencyEdge::new(
        ProjectId::new(),
        source,
        target,
        dependency_type,
        &ManualClock::default(),
    )
    .expect("distinct endpoints")
}

#[rstest]
fn self_edges_are_rejected_at_construction() {
    let task = TaskId::new();
    let result = DependencyEdge::new(
        ProjectId::new(),
        task,
        task,
        DependencyType::RelatesTo,
        &ManualClock::default(),
    );
    assert_eq!(result, Err(TaskDomainError::SelfReference(task)));
}

#[rstest]
fn blocks_and_requires_point_in_opposite_directions() {
    let (a, b) = (TaskId::new(), TaskId::new());
    let blocks = edge(a, b, DependencyType::Blocks);
    let requires = edge(a, b, DependencyType::Requires);

    assert_eq!(blocks.prerequisite(), Some(a));
    assert_eq!(blocks.dependent(), Some(b));
    assert_eq!(requires.prerequisite(), Some(b));
    assert_eq!(requires.dependent(), Some(a));
    assert!(blocks.blocks_task(b));
    assert!(!blocks.blocks_task(a));
}

#[rstest]
#[case(DependencyType::RelatesTo)]
#[case(DependencyType::ConflictsWith)]
fn informational_edges_gate_nothing(#[case] dependency_type: DependencyType) {
    let (a, b) = (TaskId::new(), TaskId::new());
    let mut informational = edge(a, b, dependency_type);
    assert_eq!(informational.dependent(), None);
    assert!(!informational.blocks_task(b));
    assert_eq!(
        informational.resolve(&ManualClock::default()),
        Err(TaskDomainError::NonBlockingEdge(informational.id()))
    );
}

#[rstest]
fn resolving_twice_reports_no_change() {
    let clock = ManualClock::default();
    let mut blocking = edge(TaskId::new(), TaskId::new(), DependencyType::Blocks);
    assert_eq!(blocking.resolve(&clock), Ok(true));
    let resolved_at = blocking.resolved_at();
    assert_eq!(blocking.resolve(&clock), Ok(false));
    assert_eq!(blocking.resolved_at(), resolved_at);
    assert!(!blocking.blocks_task(blocking.target_task_id()));
}

#[rstest]
fn closing_a_chain_is_a_cycle() {
    let (a, b, c) = (TaskId::new(), TaskId::new(), TaskId::new());
    let graph = DependencyGraph::from_edges(&[
        edge(a, b, DependencyType::Blocks),
        edge(b, c, DependencyType::Blocks),
    ]);

    let closing = edge(c, a, DependencyType::Blocks);
    assert_eq!(
        graph.check_insert(&closing),
        Err(TaskDomainError::DependencyCycle {
            source_id: c,
            target_id: a,
            dependency_type: DependencyType::Blocks,
        })
    );
    assert!(graph.check_insert(&edge(a, c, DependencyType::Blocks)).is_ok());
}

#[rstest]
fn requires_edges_share_the_ordering_of_blocks_edges() {
    let (a, b) = (TaskId::new(), TaskId::new());
    let graph = DependencyGraph::from_edges(&[edge(a, b, DependencyType::Blocks)]);
    // `a requires b` means b before a, which contradicts a before b.
    assert!(graph.check_insert(&edge(a, b, DependencyType::Requires)).is_err());
    // `b requires a` restates the existing order.
    assert!(graph.check_insert(&edge(b, a, DependencyType::Requires)).is_ok());
}

#[rstest]
fn informational_edges_never_form_cycles() {
    let (a, b) = (TaskId::new(), TaskId::new());
    let graph = DependencyGraph::from_edges(&[edge(a, b, DependencyType::Blocks)]);
    assert!(graph.check_insert(&edge(b, a, DependencyType::RelatesTo)).is_ok());
    assert!(graph.check_insert(&edge(b, a, DependencyType::ConflictsWith)).is_ok());
}

#[rstest]
fn resolved_edges_still_constrain_ordering() {
    let (a, b) = (TaskId::new(), TaskId::new());
    let mut blocking = edge(a, b, DependencyType::Blocks);
    blocking
        .resolve(&ManualClock::default())
        .expect("blocking edge resolves");
    let graph = DependencyGraph::from_edges(&[blocking]);
    assert!(graph.check_insert(&edge(b, a, DependencyType::Blocks)).is_err());
}

#[rstest]
fn duplicates_compare_endpoints_and_type() {
    let (a, b) = (TaskId::new(), TaskId::new());
    let first = edge(a, b, DependencyType::Blocks);
    assert!(first.duplicates(&edge(a, b, DependencyType::Blocks)));
    assert!(!first.duplicates(&edge(a, b, DependencyType::RelatesTo)));
    assert!(!first.duplicates(&edge(b, a, DependencyType::Blocks)));
}

fn dependency_type() -> impl Strategy<Value = DependencyType> {
    prop_oneof![
        Just(DependencyType::Blocks),
        Just(DependencyType::Requires),
        Just(DependencyType::RelatesTo),
        Just(DependencyType::ConflictsWith),
    ]
}

proptest! {
    /// Accepting only edges that pass the check keeps the blocking
    /// sub-graph acyclic, whatever order the edges arrive in.
    #[test]
    fn prop_checked_inserts_keep_graph_acyclic(
        attempts in prop::collection::vec((0_usize..8, 0_usize..8, dependency_type()), 0..40)
    ) {
        let tasks: Vec<TaskId> = (0..8).map(|_| TaskId::new()).collect();
        let mut graph = DependencyGraph::default();
        for (source, target, dependency_type) in attempts {
            let (Some(&source), Some(&target)) = (tasks.get(source), tasks.get(target)) else {
                continue;
            };
            if source == target {
                continue;
            }
            let candidate = edge(source, target, dependency_type);
            match graph.check_insert(&candidate) {
                Ok(()) => graph.insert(&candidate),
                Err(TaskDomainError::DependencyCycle { .. }) => {
                    let (prerequisite, dependent) =
                        candidate.ordering().expect("only blocking edges cycle");
                    prop_assert!(graph.reaches(dependent, prerequisite));
                }
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
            prop_assert!(graph.is_acyclic());
        }
    }
}
