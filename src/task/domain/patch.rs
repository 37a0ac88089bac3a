//! Partial field updates restricted to descriptive task fields.

use super::{Extensions, Priority, TaskDomainError, Title};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Fields owned by dedicated operations; a field update may not set them.
const FORBIDDEN_FIELDS: [&str; 22] = [
    "id",
    "project_id",
    "parent_id",
    "parent_issue_id",
    "task_type",
    "tags",
    "workflow_state",
    "state",
    "blocked_from",
    "git_status",
    "git_link",
    "completion_percentage",
    "estimate",
    "story_points",
    "confidence_level",
    "estimated_hours",
    "estimated_tokens",
    "estimated_cost",
    "actual_hours",
    "actual_cost",
    "completed_at",
    "revision",
];

/// Descriptive fields that may change after creation.
///
/// `description` and `due_at` use a nested `Option`: `Some(None)` clears the
/// field, `None` leaves it unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    /// New title.
    pub title: Option<Title>,
    /// New or cleared description.
    pub description: Option<Option<String>>,
    /// New priority.
    pub priority: Option<Priority>,
    /// New or cleared due date.
    pub due_at: Option<Option<DateTime<Utc>>>,
    /// Extensions merged over the current ones.
    pub extensions: Option<Extensions>,
}

impl TaskPatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the title.
    ///
    /// # Errors
    ///
    /// Returns title validation errors.
    pub fn with_title(mut self, title: impl Into<String>) -> Result<Self, TaskDomainError> {
        self.title = Some(Title::new(title)?);
        Ok(self)
    }

    /// Sets or clears the description.
    #[must_use]
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    /// Sets the priority.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::InvalidPriority`] outside `1..=5`.
    pub fn with_priority(mut self, priority: u8) -> Result<Self, TaskDomainError> {
        self.priority = Some(Priority::new(priority)?);
        Ok(self)
    }

    /// Sets or clears the due date.
    #[must_use]
    pub const fn with_due_at(mut self, due_at: Option<DateTime<Utc>>) -> Self {
        self.due_at = Some(due_at);
        self
    }

    /// Sets extensions to merge.
    #[must_use]
    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = Some(extensions);
        self
    }

    /// Returns `true` when the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.due_at.is_none()
            && self.extensions.is_none()
    }

    /// Parses a JSON object from an external caller.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::ForbiddenPatchField`] for workflow,
    /// estimate, or identity fields, [`TaskDomainError::UnknownPatchField`]
    /// for anything else unrecognized, and [`TaskDomainError::MalformedPatch`]
    /// for values of the wrong shape.
    pub fn from_json(value: &Value) -> Result<Self, TaskDomainError> {
        let object = value
            .as_object()
            .ok_or_else(|| TaskDomainError::MalformedPatch("expected a JSON object".to_owned()))?;

        if let Some(forbidden) = object.keys().find(|key| FORBIDDEN_FIELDS.contains(&key.as_str())) {
            return Err(TaskDomainError::ForbiddenPatchField(forbidden.clone()));
        }

        let mut patch = Self::new();
        for (key, field) in object {
            match key.as_str() {
                "title" => {
                    let title = field.as_str().ok_or_else(|| malformed("title", "a string"))?;
                    patch.title = Some(Title::new(title)?);
                }
                "description" => patch.description = Some(optional_string(field)?),
                "priority" => patch.priority = Some(parse_priority(field)?),
                "due_at" | "due_date" => patch.due_at = Some(optional_timestamp(field)?),
                "extensions" => patch.extensions = Some(parse_extensions(field)?),
                other => return Err(TaskDomainError::UnknownPatchField(other.to_owned())),
            }
        }
        Ok(patch)
    }
}

fn malformed(field: &str, expected: &str) -> TaskDomainError {
    TaskDomainError::MalformedPatch(format!("{field} must be {expected}"))
}

fn optional_string(field: &Value) -> Result<Option<String>, TaskDomainError> {
    match field {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text.clone())),
        _ => Err(malformed("description", "a string or null")),
    }
}

fn parse_priority(field: &Value) -> Result<Priority, TaskDomainError> {
    let raw = field
        .as_u64()
        .ok_or_else(|| malformed("priority", "an integer"))?;
    let value = u8::try_from(raw).map_err(|_| TaskDomainError::InvalidPriority(u8::MAX))?;
    Priority::new(value)
}

fn optional_timestamp(field: &Value) -> Result<Option<DateTime<Utc>>, TaskDomainError> {
    match field {
        Value::Null => Ok(None),
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|parsed| Some(parsed.with_timezone(&Utc)))
            .map_err(|_| malformed("due_at", "an RFC 3339 timestamp")),
        _ => Err(malformed("due_at", "an RFC 3339 timestamp or null")),
    }
}

fn parse_extensions(field: &Value) -> Result<Extensions, TaskDomainError> {
    let object: &Map<String, Value> = field
        .as_object()
        .ok_or_else(|| malformed("extensions", "an object"))?;
    let extensions: Extensions = serde_json::from_value(Value::Object(object.clone()))
        .map_err(|err| TaskDomainError::MalformedPatch(err.to_string()))?;
    extensions.validate()?;
    Ok(extensions)
}
