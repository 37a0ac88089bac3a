//! Typed extension map attached to tasks and estimates.
//!
//! Extensions replace free-form metadata bags with a closed, versioned key
//! set. Each key declares the kind of value it accepts; a new incompatible
//! meaning gets a new versioned key instead of reusing an old one.
//!
//! | key                       | value  | used on   |
//! |---------------------------|--------|-----------|
//! | `assignee.v1`             | text   | task      |
//! | `external_url.v1`         | text   | task      |
//! | `sprint.v1`               | text   | task      |
//! | `retro_note.v1`           | text   | task      |
//! | `story_points_override.v1`| number | task      |
//! | `estimation_model.v1`     | text   | estimate  |

use super::{ParseEnumError, TaskDomainError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Versioned extension keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExtensionKey {
    /// Person currently assigned to the task.
    #[serde(rename = "assignee.v1")]
    AssigneeV1,
    /// Link to the task in an external tracker.
    #[serde(rename = "external_url.v1")]
    ExternalUrlV1,
    /// Sprint or iteration label.
    #[serde(rename = "sprint.v1")]
    SprintV1,
    /// Retroactive note added after completion.
    #[serde(rename = "retro_note.v1")]
    RetroNoteV1,
    /// Manually agreed story points.
    #[serde(rename = "story_points_override.v1")]
    StoryPointsOverrideV1,
    /// Name of the estimation model that produced an estimate.
    #[serde(rename = "estimation_model.v1")]
    EstimationModelV1,
}

/// Value kinds accepted by extension keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Text,
    Number,
}

impl ValueKind {
    const fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
        }
    }
}

impl ExtensionKey {
    /// Returns the canonical key string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AssigneeV1 => "assignee.v1",
            Self::ExternalUrlV1 => "external_url.v1",
            Self::SprintV1 => "sprint.v1",
            Self::RetroNoteV1 => "retro_note.v1",
            Self::StoryPointsOverrideV1 => "story_points_override.v1",
            Self::EstimationModelV1 => "estimation_model.v1",
        }
    }

    const fn kind(self) -> ValueKind {
        match self {
            Self::StoryPointsOverrideV1 => ValueKind::Number,
            Self::AssigneeV1
            | Self::ExternalUrlV1
            | Self::SprintV1
            | Self::RetroNoteV1
            | Self::EstimationModelV1 => ValueKind::Text,
        }
    }
}

impl TryFrom<&str> for ExtensionKey {
    type Error = ParseEnumError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim() {
            "assignee.v1" => Ok(Self::AssigneeV1),
            "external_url.v1" => Ok(Self::ExternalUrlV1),
            "sprint.v1" => Ok(Self::SprintV1),
            "retro_note.v1" => Ok(Self::RetroNoteV1),
            "story_points_override.v1" => Ok(Self::StoryPointsOverrideV1),
            "estimation_model.v1" => Ok(Self::EstimationModelV1),
            _ => Err(ParseEnumError::new("extension key", value)),
        }
    }
}

impl fmt::Display for ExtensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Extension value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtensionValue {
    /// Integer value.
    Number(i64),
    /// Text value.
    Text(String),
}

impl ExtensionValue {
    const fn kind(&self) -> ValueKind {
        match self {
            Self::Number(_) => ValueKind::Number,
            Self::Text(_) => ValueKind::Text,
        }
    }

    /// Returns the text payload, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Number(_) => None,
        }
    }

    /// Returns the numeric payload, if any.
    #[must_use]
    pub const fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(number) => Some(*number),
            Self::Text(_) => None,
        }
    }
}

/// Type-checked extension map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Extensions(BTreeMap<ExtensionKey, ExtensionValue>);

impl Extensions {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value after checking it matches the key's declared kind.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidExtension`] on a kind mismatch.
    pub fn insert(
        &mut self,
        key: ExtensionKey,
        value: ExtensionValue,
    ) -> Result<(), TaskDomainError> {
        let expected = key.kind();
        if value.kind() != expected {
            return Err(TaskDomainError::InvalidExtension {
                key,
                expected: expected.name(),
            });
        }
        self.0.insert(key, value);
        Ok(())
    }

    /// Builder form of [`Self::insert`].
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidExtension`] on a kind mismatch.
    pub fn with(mut self, key: ExtensionKey, value: ExtensionValue) -> Result<Self, TaskDomainError> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Removes a key, returning its previous value.
    pub fn remove(&mut self, key: ExtensionKey) -> Option<ExtensionValue> {
        self.0.remove(&key)
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: ExtensionKey) -> Option<&ExtensionValue> {
        self.0.get(&key)
    }

    /// Returns `true` when no extensions are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merges `other` into `self`; keys in `other` win.
    pub fn merge(&mut self, other: &Self) {
        for (key, value) in &other.0 {
            self.0.insert(*key, value.clone());
        }
    }

    /// Checks every stored value against its key.
    ///
    /// Used after deserializing untrusted payloads.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidExtension`] for the first mismatch.
    pub fn validate(&self) -> Result<(), TaskDomainError> {
        for (key, value) in &self.0 {
            let expected = key.kind();
            if value.kind() != expected {
                return Err(TaskDomainError::InvalidExtension {
                    key: *key,
                    expected: expected.name(),
                });
            }
        }
        Ok(())
    }
}
