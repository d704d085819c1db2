use std::borrow::{Borrow, Cow};

use validator::{ValidationError, ValidationErrors};

use crate::{error::AppError, models::time_of_day};

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

/// Money amounts must be finite and not below zero.
pub fn validate_non_negative<T: Borrow<f64>>(amount: T) -> Result<(), ValidationError> {
    let amount = *amount.borrow();
    if !amount.is_finite() || amount < 0.0 {
        return Err(invalid("negative_amount", "must be a non-negative number"));
    }
    Ok(())
}

/// Image links are web addresses only.
pub fn validate_http_scheme(url: &str) -> Result<(), ValidationError> {
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Ok(())
    } else {
        Err(invalid("url_scheme", "must be an http(s) URL"))
    }
}

/// Stored times are 24-hour `HH:MM`.
pub fn validate_stored_time(time: &str) -> Result<(), ValidationError> {
    if time_of_day::normalize(time).as_deref() == Some(time) {
        Ok(())
    } else {
        Err(invalid("time_format", "must be a 24-hour HH:MM time"))
    }
}

/// Trims the value and maps blank input to `None`.
pub fn normalize_optional(input: Option<String>) -> Option<String> {
    input.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Flattens validator output into `field: message` pairs, sorted by field.
/// Record-level failures carry their own message without a field prefix.
pub fn describe(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    fields
        .into_iter()
        .flat_map(|(field, failures)| {
            let field = field.to_string();
            failures.iter().map(move |failure| {
                let message = failure
                    .message
                    .as_ref()
                    .map(|message| message.to_string())
                    .unwrap_or_else(|| failure.code.to_string());
                if field == "__all__" {
                    message
                } else {
                    format!("{field}: {message}")
                }
            })
        })
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(describe(&errors))
    }
}

#[cfg(test)]
mod tests {
    use validator::Validate;

    use super::*;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 3))]
        name: String,
        #[validate(custom(function = "validate_non_negative"))]
        amount: f64,
        #[validate(custom(function = "validate_stored_time"))]
        time: String,
    }

    #[test]
    fn collects_all_failures_into_one_error() {
        let sample = Sample {
            name: "Pa".into(),
            amount: f64::NAN,
            time: "7pm".into(),
        };
        let AppError::Validation(message) = AppError::from(sample.validate().unwrap_err())
        else {
            panic!("expected validation error");
        };
        assert!(message.starts_with("amount: must be a non-negative number"));
        assert!(message.contains("name: "));
        assert!(message.contains("time: must be a 24-hour HH:MM time"));
    }

    #[test]
    fn valid_sample_passes() {
        let sample = Sample {
            name: "Paris".into(),
            amount: 0.0,
            time: "07:05".into(),
        };
        assert!(sample.validate().is_ok());
    }

    #[test]
    fn amounts_and_schemes() {
        assert!(validate_non_negative(&0.0).is_ok());
        assert!(validate_non_negative(&-0.01).is_err());
        assert!(validate_non_negative(&f64::INFINITY).is_err());
        assert!(validate_http_scheme("https://example.com/paris.jpg").is_ok());
        assert!(validate_http_scheme("HTTP://cdn.example.org/a").is_ok());
        assert!(validate_http_scheme("ftp://example.com/a.jpg").is_err());
    }

    #[test]
    fn stored_time_is_strict() {
        assert!(validate_stored_time("21:15").is_ok());
        assert!(validate_stored_time("09:15 PM").is_err());
        assert!(validate_stored_time("25:00").is_err());
    }

    #[test]
    fn blank_optionals_become_none() {
        assert_eq!(normalize_optional(Some("   ".into())), None);
        assert_eq!(normalize_optional(None), None);
        assert_eq!(
            normalize_optional(Some(" https://x.io/a ".into())),
            Some("https://x.io/a".into())
        );
    }
}
