//! Parent/child completion rollup.

use super::{CompletionPercentage, Task, TaskDomainError, TaskId};
use std::collections::HashSet;

/// Hard bound on the length of any parent chain.
///
/// Parent links are fixed at creation, so a longer chain only appears through
/// corrupted data; walks stop with an error instead of looping.
pub const MAX_HIERARCHY_DEPTH: usize = 64;

/// Mean effective completion of `children`, rounded half up.
///
/// Terminal children count as 100. Returns `None` for an empty slice.
#[must_use]
pub fn recompute_completion<'a>(
    children: impl IntoIterator<Item = &'a Task>,
) -> Option<CompletionPercentage> {
    let (sum, count) = children
        .into_iter()
        .fold((0_u64, 0_u64), |(sum, count), child| {
            (sum + u64::from(child.effective_completion().value()), count + 1)
        });
    let rounded = (sum * 2 + count).checked_div(count * 2)?;
    let value = u8::try_from(rounded).unwrap_or(100);
    CompletionPercentage::new(value).ok()
}

/// Guard over an iterative parent-chain walk.
///
/// Each visited id is recorded; revisiting one or exceeding
/// [`MAX_HIERARCHY_DEPTH`] is an error.
#[derive(Debug)]
pub struct AncestorWalk {
    origin: TaskId,
    visited: HashSet<TaskId>,
}

impl AncestorWalk {
    /// Starts a walk above `origin`.
    #[must_use]
    pub fn new(origin: TaskId) -> Self {
        let mut visited = HashSet::new();
        visited.insert(origin);
        Self { origin, visited }
    }

    /// Records a step to `ancestor`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::HierarchyCycle`] when `ancestor` was already
    /// visited and [`TaskDomainError::HierarchyTooDeep`] past the bound.
    pub fn step(&mut self, ancestor: TaskId) -> Result<(), TaskDomainError> {
        if !self.visited.insert(ancestor) {
            return Err(TaskDomainError::HierarchyCycle(self.origin));
        }
        if self.depth() > MAX_HIERARCHY_DEPTH {
            return Err(TaskDomainError::HierarchyTooDeep {
                task_id: self.origin,
                limit: MAX_HIERARCHY_DEPTH,
            });
        }
        Ok(())
    }

    /// Number of ancestors visited so far.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.visited.len() - 1
    }
}
