//! Person Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Table that holds people rows
pub const PEOPLE_TABLE: &str = "people";

/// Maximum length of a name column (`VARCHAR(100)`)
pub const MAX_NAME_LEN: usize = 100;

/// A persisted person row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Person {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
}

/// Validation errors for person attributes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersonValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
}

/// Attributes of a person that has not been written yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPerson {
    first_name: String,
    last_name: String,
}

impl NewPerson {
    /// Validate and build the attributes for a new person.
    ///
    /// Names are trimmed; each must be non-empty and fit the column width.
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Result<Self, PersonValidationError> {
        let first_name = validate_name("first_name", first_name.into())?;
        let last_name = validate_name("last_name", last_name.into())?;
        Ok(Self {
            first_name,
            last_name,
        })
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }
}

fn validate_name(field: &'static str, value: String) -> Result<String, PersonValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PersonValidationError::Empty { field });
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(PersonValidationError::TooLong {
            field,
            max: MAX_NAME_LEN,
        });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_person_trims_names() {
        let person = NewPerson::new("  Ada ", "Lovelace\n").unwrap();
        assert_eq!(person.first_name(), "Ada");
        assert_eq!(person.last_name(), "Lovelace");
    }

    #[test]
    fn test_new_person_rejects_empty_names() {
        assert_eq!(
            NewPerson::new("", "Lovelace"),
            Err(PersonValidationError::Empty {
                field: "first_name"
            })
        );
        assert_eq!(
            NewPerson::new("Ada", "   "),
            Err(PersonValidationError::Empty { field: "last_name" })
        );
    }

    #[test]
    fn test_new_person_rejects_long_names() {
        let long = "x".repeat(MAX_NAME_LEN + 1);
        let err = NewPerson::new(long, "Lovelace").unwrap_err();
        assert_eq!(
            err,
            PersonValidationError::TooLong {
                field: "first_name",
                max: MAX_NAME_LEN
            }
        );

        let exact = "y".repeat(MAX_NAME_LEN);
        assert!(NewPerson::new("Ada", exact).is_ok());
    }
}
