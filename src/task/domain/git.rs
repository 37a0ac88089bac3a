//! Source-control status tracking driven by provider webhook events.

use super::{ParseEnumError, TaskDomainError, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length for a validated branch name.
const MAX_BRANCH_NAME_LENGTH: usize = 200;

/// Supported source-control providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VcsProvider {
    /// GitHub.
    #[serde(rename = "github")]
    GitHub,
    /// GitLab.
    #[serde(rename = "gitlab")]
    GitLab,
}

impl VcsProvider {
    /// Returns provider name in canonical storage format.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
        }
    }
}

impl TryFrom<&str> for VcsProvider {
    type Error = TaskDomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(Self::GitHub),
            "gitlab" => Ok(Self::GitLab),
            _ => Err(TaskDomainError::InvalidVcsProvider(value.to_owned())),
        }
    }
}

impl fmt::Display for VcsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provider-scoped webhook delivery identifier used for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GitEventId {
    provider: VcsProvider,
    delivery_id: String,
}

impl GitEventId {
    /// Creates a delivery identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyDeliveryId`] for blank delivery ids.
    pub fn new(
        provider: VcsProvider,
        delivery_id: impl Into<String>,
    ) -> Result<Self, TaskDomainError> {
        let raw = delivery_id.into();
        let normalized = raw.trim();
        if normalized.is_empty() {
            return Err(TaskDomainError::EmptyDeliveryId);
        }
        Ok(Self {
            provider,
            delivery_id: normalized.to_owned(),
        })
    }

    /// Returns the provider.
    #[must_use]
    pub const fn provider(&self) -> VcsProvider {
        self.provider
    }

    /// Returns the provider's delivery identifier.
    #[must_use]
    pub fn delivery_id(&self) -> &str {
        &self.delivery_id
    }
}

impl fmt::Display for GitEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.delivery_id)
    }
}

/// Validated Git branch name.
///
/// Non-empty after trimming, no whitespace, at most 200 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchName(String);

impl BranchName {
    /// Creates a validated branch name.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidBranchName`] when the value is empty,
    /// contains whitespace, or exceeds the length limit.
    pub fn new(value: impl Into<String>) -> Result<Self, TaskDomainError> {
        let raw = value.into();
        let normalized = raw.trim();
        let is_invalid = normalized.is_empty()
            || normalized.chars().any(char::is_whitespace)
            || normalized.len() > MAX_BRANCH_NAME_LENGTH;
        if is_invalid {
            return Err(TaskDomainError::InvalidBranchName(raw));
        }
        Ok(Self(normalized.to_owned()))
    }

    /// Returns the branch name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Positive pull request number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PullRequestNumber(u64);

impl PullRequestNumber {
    /// Creates a validated pull request number.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidPullRequestNumber`] for zero.
    pub const fn new(value: u64) -> Result<Self, TaskDomainError> {
        if value == 0 {
            return Err(TaskDomainError::InvalidPullRequestNumber(value));
        }
        Ok(Self(value))
    }

    /// Returns the underlying numeric value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PullRequestNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hex commit hash, abbreviated (7+) or full.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitSha(String);

impl CommitSha {
    /// Creates a validated commit hash, lower-cased.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidCommitSha`] unless the value is 7 to
    /// 64 hexadecimal characters.
    pub fn new(value: impl Into<String>) -> Result<Self, TaskDomainError> {
        let raw = value.into();
        let normalized = raw.trim().to_ascii_lowercase();
        let is_valid = (7..=64).contains(&normalized.len())
            && normalized.chars().all(|ch| ch.is_ascii_hexdigit());
        if !is_valid {
            return Err(TaskDomainError::InvalidCommitSha(raw));
        }
        Ok(Self(normalized))
    }

    /// Returns the hash.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Source-control status of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitStatus {
    /// No source-control activity yet.
    #[default]
    NotStarted,
    /// A branch exists for the task.
    BranchCreated,
    /// Commits have been pushed.
    CommitsMade,
    /// A pull request is open.
    PrOpened,
    /// The pull request was merged.
    Merged,
    /// The pull request has merge conflicts.
    Conflicts,
    /// Checks failed or the pull request was closed unmerged.
    Failed,
}

impl GitStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::BranchCreated => "branch_created",
            Self::CommitsMade => "commits_made",
            Self::PrOpened => "pr_opened",
            Self::Merged => "merged",
            Self::Conflicts => "conflicts",
            Self::Failed => "failed",
        }
    }

    /// Returns the status reached by applying `event`, if legal.
    #[must_use]
    pub const fn apply(self, event: &GitEventKind) -> Option<Self> {
        use GitEventKind as E;
        match (self, event) {
            (Self::NotStarted, E::BranchCreated { .. }) => Some(Self::BranchCreated),
            (Self::NotStarted | Self::BranchCreated | Self::CommitsMade, E::CommitPushed { .. })
            | (Self::Failed, E::CommitPushed { .. }) => Some(Self::CommitsMade),
            (
                Self::BranchCreated | Self::CommitsMade | Self::Failed,
                E::PullRequestOpened { .. },
            )
            | (Self::PrOpened | Self::Conflicts, E::CommitPushed { .. }) => Some(Self::PrOpened),
            (Self::PrOpened, E::PullRequestMerged) => Some(Self::Merged),
            (Self::PrOpened, E::ConflictDetected) => Some(Self::Conflicts),
            (Self::PrOpened | Self::Conflicts, E::ChecksFailed | E::PullRequestClosed) => {
                Some(Self::Failed)
            }
            _ => None,
        }
    }
}

impl TryFrom<&str> for GitStatus {
    type Error = ParseEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "not_started" => Ok(Self::NotStarted),
            "branch_created" => Ok(Self::BranchCreated),
            "commits_made" => Ok(Self::CommitsMade),
            "pr_opened" => Ok(Self::PrOpened),
            "merged" => Ok(Self::Merged),
            "conflicts" => Ok(Self::Conflicts),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseEnumError::new("git status", value)),
        }
    }
}

impl fmt::Display for GitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Source-control event kinds delivered by the webhook relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GitEventKind {
    /// A branch was created for the task.
    BranchCreated {
        /// Branch name.
        branch: BranchName,
    },
    /// A commit linked to the task was pushed.
    CommitPushed {
        /// Commit hash.
        sha: CommitSha,
    },
    /// A pull request was opened.
    PullRequestOpened {
        /// Pull request number.
        number: PullRequestNumber,
    },
    /// The pull request was merged.
    PullRequestMerged,
    /// The pull request was closed without merging.
    PullRequestClosed,
    /// The provider reported merge conflicts.
    ConflictDetected,
    /// Required checks failed.
    ChecksFailed,
}

impl GitEventKind {
    /// Returns the event name used in logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BranchCreated { .. } => "branch_created",
            Self::CommitPushed { .. } => "commit_pushed",
            Self::PullRequestOpened { .. } => "pull_request_opened",
            Self::PullRequestMerged => "pull_request_merged",
            Self::PullRequestClosed => "pull_request_closed",
            Self::ConflictDetected => "conflict_detected",
            Self::ChecksFailed => "checks_failed",
        }
    }
}

/// Source-control event addressed to one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitEvent {
    /// Provider-scoped delivery identifier.
    pub id: GitEventId,
    /// Task the event is linked to.
    pub task_id: TaskId,
    /// Event payload.
    pub kind: GitEventKind,
    /// When the provider emitted the event.
    pub occurred_at: DateTime<Utc>,
}

/// Branch and pull request references learned from git events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLink {
    /// Linked branch, if any.
    pub branch: Option<BranchName>,
    /// Linked pull request, if any.
    pub pull_request: Option<PullRequestNumber>,
}

impl GitLink {
    /// Records references carried by `event`.
    pub fn absorb(&mut self, event: &GitEventKind) {
        match event {
            GitEventKind::BranchCreated { branch } => self.branch = Some(branch.clone()),
            GitEventKind::PullRequestOpened { number } => self.pull_request = Some(*number),
            GitEventKind::CommitPushed { .. }
            | GitEventKind::PullRequestMerged
            | GitEventKind::PullRequestClosed
            | GitEventKind::ConflictDetected
            | GitEventKind::ChecksFailed => {}
        }
    }
}
