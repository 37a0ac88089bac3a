//! Validated scalar values shared by the task aggregate and its records.

use super::{ParseEnumError, TaskDomainError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a task title in characters.
pub const MAX_TITLE_LENGTH: usize = 200;

/// Validated, trimmed task title.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Title(String);

impl Title {
    /// Creates a validated title.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyTitle`] for blank input and
    /// [`TaskDomainError::TitleTooLong`] past [`MAX_TITLE_LENGTH`] characters.
    pub fn new(value: impl Into<String>) -> Result<Self, TaskDomainError> {
        let raw = value.into();
        let normalized = raw.trim();
        if normalized.is_empty() {
            return Err(TaskDomainError::EmptyTitle);
        }
        if normalized.chars().count() > MAX_TITLE_LENGTH {
            return Err(TaskDomainError::TitleTooLong {
                max: MAX_TITLE_LENGTH,
            });
        }
        Ok(Self(normalized.to_owned()))
    }

    /// Returns the title as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Title {
    type Error = TaskDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Title> for String {
    fn from(value: Title) -> Self {
        value.0
    }
}

impl fmt::Display for Title {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task priority from 1 (highest) to 5 (lowest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    /// Default priority assigned when none is supplied.
    pub const NORMAL: Self = Self(3);

    /// Creates a validated priority.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidPriority`] outside `1..=5`.
    pub const fn new(value: u8) -> Result<Self, TaskDomainError> {
        if value == 0 || value > 5 {
            return Err(TaskDomainError::InvalidPriority(value));
        }
        Ok(Self(value))
    }

    /// Returns the numeric priority.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl TryFrom<u8> for Priority {
    type Error = TaskDomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(value: Priority) -> Self {
        value.0
    }
}

/// Completion percentage in `0..=100`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct CompletionPercentage(u8);

impl CompletionPercentage {
    /// No progress.
    pub const ZERO: Self = Self(0);
    /// Fully complete.
    pub const COMPLETE: Self = Self(100);

    /// Creates a validated percentage.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidCompletionPercentage`] above 100.
    pub const fn new(value: u8) -> Result<Self, TaskDomainError> {
        if value > 100 {
            return Err(TaskDomainError::InvalidCompletionPercentage(value));
        }
        Ok(Self(value))
    }

    /// Returns the numeric percentage.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for CompletionPercentage {
    type Error = TaskDomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CompletionPercentage> for u8 {
    fn from(value: CompletionPercentage) -> Self {
        value.0
    }
}

impl fmt::Display for CompletionPercentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// New functionality.
    Feature,
    /// Defect fix.
    Bug,
    /// Behaviour-preserving restructuring.
    Refactor,
    /// Test coverage work.
    Test,
    /// Documentation.
    Docs,
    /// Maintenance and housekeeping.
    Chore,
    /// Time-boxed investigation.
    Research,
}

impl TaskType {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Bug => "bug",
            Self::Refactor => "refactor",
            Self::Test => "test",
            Self::Docs => "docs",
            Self::Chore => "chore",
            Self::Research => "research",
        }
    }
}

impl TryFrom<&str> for TaskType {
    type Error = ParseEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "feature" => Ok(Self::Feature),
            "bug" => Ok(Self::Bug),
            "refactor" => Ok(Self::Refactor),
            "test" => Ok(Self::Test),
            "docs" => Ok(Self::Docs),
            "chore" => Ok(Self::Chore),
            "research" => Ok(Self::Research),
            _ => Err(ParseEnumError::new("task type", value)),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalized technology tags used to match similar tasks.
///
/// Tags are trimmed, lower-cased, de-duplicated and kept sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Tags(Vec<String>);

impl Tags {
    /// Builds a normalized tag set.
    #[must_use]
    pub fn new(tags: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let mut normalized: Vec<String> = tags
            .into_iter()
            .map(|tag| tag.as_ref().trim().to_lowercase())
            .filter(|tag| !tag.is_empty())
            .collect();
        normalized.sort();
        normalized.dedup();
        Self(normalized)
    }

    /// Returns `true` when there are no tags.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` when at least one tag is shared.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.0.iter().any(|tag| other.0.binary_search(tag).is_ok())
    }

    /// Returns the tags as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl From<Vec<String>> for Tags {
    fn from(value: Vec<String>) -> Self {
        Self::new(value)
    }
}

impl From<Tags> for Vec<String> {
    fn from(value: Tags) -> Self {
        value.0
    }
}

/// Name of whoever requested a workflow change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Actor(String);

impl Actor {
    const SYSTEM: &'static str = "system";

    /// Creates a validated actor name.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyActor`] for blank input.
    pub fn new(value: impl Into<String>) -> Result<Self, TaskDomainError> {
        let raw = value.into();
        let normalized = raw.trim();
        if normalized.is_empty() {
            return Err(TaskDomainError::EmptyActor);
        }
        Ok(Self(normalized.to_owned()))
    }

    /// Actor used for automatic transitions.
    #[must_use]
    pub fn system() -> Self {
        Self(Self::SYSTEM.to_owned())
    }

    /// Returns the actor name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Actor {
    type Error = TaskDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Actor> for String {
    fn from(value: Actor) -> Self {
        value.0
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
