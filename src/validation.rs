use std::{collections::BTreeMap, fmt};

use serde::Serialize;
use utoipa::ToSchema;
use validator::{ValidationError, ValidationErrors, ValidationErrorsKind};

/// Field-level validation messages keyed by dotted field path (`location.city`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn merge(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl From<ValidationErrors> for FieldErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut out = FieldErrors::new();
        collect(None, &errors, &mut out);
        out
    }
}

fn collect(prefix: Option<&str>, errors: &ValidationErrors, out: &mut FieldErrors) {
    for (field, kind) in errors.errors() {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{field}"),
            None => field.to_string(),
        };
        match kind {
            ValidationErrorsKind::Field(errors) => {
                for error in errors {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| error.code.to_string());
                    out.add(path.clone(), message);
                }
            }
            ValidationErrorsKind::Struct(nested) => collect(Some(&path), nested, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect(Some(&format!("{path}[{index}]")), nested, out);
                }
            }
        }
    }
}

/// Validates with `validator` and converts the failure into [`FieldErrors`].
pub fn validate<T: validator::Validate>(value: &T) -> Result<(), FieldErrors> {
    value.validate().map_err(FieldErrors::from)
}

/// Ten-digit mobile number.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if phone.len() == 10 && phone.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("phone").with_message("Please enter a valid 10-digit phone number".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Inner {
        #[validate(length(min = 1, message = "City is required"))]
        city: String,
    }

    #[derive(Validate)]
    struct Outer {
        #[validate(length(min = 2))]
        name: String,
        #[validate(nested)]
        location: Inner,
    }

    #[test]
    fn nested_errors_use_dotted_paths() {
        let outer = Outer {
            name: "a".into(),
            location: Inner { city: String::new() },
        };
        let errors = validate(&outer).unwrap_err();
        assert!(errors.contains("name"));
        assert!(errors.contains("location.city"));
        assert!(errors.to_string().contains("City is required"));
    }

    #[test]
    fn phone_numbers_are_ten_digits() {
        assert!(validate_phone("9876543210").is_ok());
        assert!(validate_phone("98765").is_err());
        assert!(validate_phone("98765432ab").is_err());
        assert!(validate_phone("+919876543210").is_err());
    }
}
