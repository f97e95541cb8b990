//! Validation of raw todo form submissions.

use chrono::NaiveDateTime;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::Todo;

/// Maximum number of characters allowed in a title.
pub const TITLE_MAX_LENGTH: usize = 200;

/// Wire format of the `due_date` field, as sent by a `datetime-local` input.
pub const DUE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M";

const TRUTHY_TOKENS: [&str; 3] = ["true", "on", "1"];

/// Raw field values exactly as submitted by the browser.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct TodoForm {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub resolved: Option<String>,
}

/// A submission that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoPayload {
    pub title: String,
    pub description: String,
    pub due_date: Option<NaiveDateTime>,
    pub resolved: bool,
}

impl TodoPayload {
    /// A payload with only a title, every other field at its default.
    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            due_date: None,
            resolved: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("This field is required.")]
    Required,
    #[error("Ensure this value has at most {max} characters (it has {actual}).")]
    TooLong { max: usize, actual: usize },
    #[error("Enter a valid date/time.")]
    InvalidFormat,
}

/// Field-level validation failures keyed by field name.
#[derive(Debug, Default, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", summarize(.errors))]
pub struct FormErrors {
    errors: BTreeMap<&'static str, FieldError>,
}

fn summarize(errors: &BTreeMap<&'static str, FieldError>) -> String {
    errors
        .iter()
        .map(|(field, error)| format!("{field}: {error}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: &'static str, error: FieldError) {
        self.errors.insert(field, error);
    }

    pub fn get(&self, field: &str) -> Option<&FieldError> {
        self.errors.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// User-facing message for a field, empty when the field is valid.
    pub fn message(&self, field: &str) -> String {
        self.get(field).map(ToString::to_string).unwrap_or_default()
    }
}

impl TodoForm {
    /// Checks every field and returns the typed payload, or all field errors at once.
    pub fn validate(&self) -> Result<TodoPayload, FormErrors> {
        let mut errors = FormErrors::new();

        let title = self.title.clone().unwrap_or_default();
        let title_length = title.chars().count();
        if title.is_empty() {
            errors.insert("title", FieldError::Required);
        } else if title_length > TITLE_MAX_LENGTH {
            errors.insert(
                "title",
                FieldError::TooLong {
                    max: TITLE_MAX_LENGTH,
                    actual: title_length,
                },
            );
        }

        let due_date = match self.due_date.as_deref() {
            None | Some("") => None,
            Some(raw) => match NaiveDateTime::parse_from_str(raw, DUE_DATE_FORMAT) {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    errors.insert("due_date", FieldError::InvalidFormat);
                    None
                }
            },
        };

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(TodoPayload {
            title,
            description: self.description.clone().unwrap_or_default(),
            due_date,
            resolved: self.is_resolved(),
        })
    }

    /// Lenient checkbox coercion: only a known truthy token counts as checked.
    pub fn is_resolved(&self) -> bool {
        self.resolved.as_deref().is_some_and(|raw| {
            TRUTHY_TOKENS
                .iter()
                .any(|token| raw.eq_ignore_ascii_case(token))
        })
    }

    pub fn title_value(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    pub fn description_value(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }

    pub fn due_date_value(&self) -> &str {
        self.due_date.as_deref().unwrap_or_default()
    }
}

impl From<&Todo> for TodoForm {
    fn from(todo: &Todo) -> Self {
        Self {
            title: Some(todo.title().to_string()),
            description: Some(todo.description().to_string()),
            due_date: todo
                .due_date()
                .map(|due| due.format(DUE_DATE_FORMAT).to_string()),
            resolved: todo.resolved().then(|| "on".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn form(title: &str) -> TodoForm {
        TodoForm {
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn can_validate_form_with_datetime_local_format() {
        let submitted = TodoForm {
            title: Some("Form Task".to_string()),
            description: Some("desc".to_string()),
            due_date: Some("2025-01-01T10:00".to_string()),
            resolved: Some("false".to_string()),
        };

        let payload = submitted.validate().expect("form should be valid");

        let expected_due = NaiveDate::from_ymd_opt(2025, 1, 1)
            .and_then(|date| date.and_hms_opt(10, 0, 0))
            .unwrap();
        assert_eq!(
            payload,
            TodoPayload {
                title: "Form Task".to_string(),
                description: "desc".to_string(),
                due_date: Some(expected_due),
                resolved: false,
            }
        );
    }

    #[test]
    fn title_only_form_uses_defaults() {
        let payload = form("Just a title").validate().unwrap();
        assert_eq!(payload, TodoPayload::with_title("Just a title"));
    }

    #[test]
    fn cannot_validate_form_without_title() {
        let errors = form("").validate().unwrap_err();
        assert!(errors.contains("title"));
        assert_eq!(errors.get("title"), Some(&FieldError::Required));

        let errors = TodoForm::default().validate().unwrap_err();
        assert_eq!(errors.get("title"), Some(&FieldError::Required));
    }

    #[test]
    fn title_is_not_trimmed() {
        let payload = form("  padded  ").validate().unwrap();
        assert_eq!(payload.title, "  padded  ");
    }

    #[test]
    fn title_length_is_counted_in_characters() {
        assert!(form(&"é".repeat(TITLE_MAX_LENGTH)).validate().is_ok());

        let errors = form(&"a".repeat(TITLE_MAX_LENGTH + 1))
            .validate()
            .unwrap_err();
        assert_eq!(
            errors.get("title"),
            Some(&FieldError::TooLong {
                max: 200,
                actual: 201
            })
        );
    }

    #[test]
    fn cannot_validate_malformed_due_dates() {
        for raw in ["2025-01-01", "2025-01-01T10:00:00", "2025-01-01T10:00Z", "tomorrow"] {
            let submitted = TodoForm {
                due_date: Some(raw.to_string()),
                ..form("Task")
            };
            let errors = submitted.validate().unwrap_err();
            assert_eq!(
                errors.get("due_date"),
                Some(&FieldError::InvalidFormat),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn empty_due_date_means_none() {
        let submitted = TodoForm {
            due_date: Some(String::new()),
            ..form("Task")
        };
        assert_eq!(submitted.validate().unwrap().due_date, None);
    }

    #[test]
    fn reports_every_invalid_field() {
        let submitted = TodoForm {
            title: None,
            due_date: Some("not a date".to_string()),
            ..Default::default()
        };
        let errors = submitted.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        insta::assert_snapshot!(
            errors.to_string(),
            @"due_date: Enter a valid date/time.; title: This field is required."
        );
    }

    #[test]
    fn resolved_coercion_is_lenient() {
        for (raw, expected) in [
            (Some("true"), true),
            (Some("on"), true),
            (Some("1"), true),
            (Some("TRUE"), true),
            (Some("false"), false),
            (Some("yes"), false),
            (Some(""), false),
            (None, false),
        ] {
            let submitted = TodoForm {
                resolved: raw.map(str::to_string),
                ..form("Task")
            };
            assert_eq!(submitted.is_resolved(), expected, "{raw:?}");
        }
    }

    #[test]
    fn can_prefill_form_from_todo() {
        let due = NaiveDate::from_ymd_opt(2025, 3, 4)
            .and_then(|date| date.and_hms_opt(9, 30, 0))
            .unwrap();
        let now = chrono::Utc::now();
        let todo = Todo::new(
            1,
            "Edit me".to_string(),
            "body".to_string(),
            Some(due),
            true,
            now,
            now,
        );

        let prefilled = TodoForm::from(&todo);

        assert_eq!(prefilled.due_date_value(), "2025-03-04T09:30");
        assert!(prefilled.is_resolved());
        assert_eq!(
            prefilled.validate().unwrap(),
            TodoPayload {
                title: "Edit me".to_string(),
                description: "body".to_string(),
                due_date: Some(due),
                resolved: true,
            }
        );
    }
}
