use tracing::{debug, warn};

use crate::error::ValidationError;
use crate::models::{ValidatedEvent, WebhookEvent};

pub const SUBJECT_HEADER: &str = "ce-subject";
pub const FILE_NAME_FIELD: &str = "name";
pub const BUCKET_FIELD: &str = "bucket";

/// Checks that a notification carries everything the pipeline needs before any
/// external call is made
#[derive(Debug, Clone)]
pub struct WebhookValidator {
    required_headers: Vec<String>,
}

impl WebhookValidator {
    pub fn new(required_headers: Vec<String>) -> Self {
        Self { required_headers }
    }

    /// Checks, in order: configured headers, `ce-subject`, body `name`.
    /// Returns the first missing field.
    pub fn validate(&self, event: &WebhookEvent) -> Result<ValidatedEvent, ValidationError> {
        for header in &self.required_headers {
            match event.header(header) {
                Some(value) => debug!(header = %header, value = %value, "Required header present"),
                None => {
                    warn!(header = %header, "Missing expected header");
                    return Err(ValidationError::MissingHeader(header.clone()));
                }
            }
        }

        let subject = event.header(SUBJECT_HEADER).ok_or_else(|| {
            warn!(header = SUBJECT_HEADER, "Missing expected header");
            ValidationError::MissingHeader(SUBJECT_HEADER.to_string())
        })?;

        let file_name = event.body_str(FILE_NAME_FIELD).ok_or_else(|| {
            warn!(field = FILE_NAME_FIELD, "Missing expected body element");
            ValidationError::MissingBodyField(FILE_NAME_FIELD.to_string())
        })?;

        Ok(ValidatedEvent {
            file_name: file_name.to_string(),
            bucket_name: event.body_str(BUCKET_FIELD).map(String::from),
            subject: subject.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value, json};
    use std::collections::HashMap;

    fn validator() -> WebhookValidator {
        WebhookValidator::new(vec!["ce-id".to_string(), "ce-type".to_string()])
    }

    fn event(headers: &[(&str, &str)], body: Value) -> WebhookEvent {
        let headers: HashMap<String, String> = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let body: Map<String, Value> = body.as_object().cloned().unwrap_or_default();
        WebhookEvent::new(headers, body)
    }

    #[test]
    fn accepts_complete_event() {
        let event = event(
            &[("ce-id", "1"), ("ce-type", "finalized"), ("ce-subject", "objects/book1.jpg")],
            json!({ "name": "book1.jpg", "bucket": "b1" }),
        );

        let validated = validator().validate(&event).unwrap();
        assert_eq!(validated.file_name, "book1.jpg");
        assert_eq!(validated.bucket_name.as_deref(), Some("b1"));
        assert_eq!(validated.subject, "objects/book1.jpg");
    }

    #[test]
    fn missing_bucket_is_not_a_failure() {
        let event = event(
            &[("ce-id", "1"), ("ce-type", "finalized"), ("ce-subject", "objects/book1.jpg")],
            json!({ "name": "book1.jpg" }),
        );

        let validated = validator().validate(&event).unwrap();
        assert_eq!(validated.bucket_name, None);
    }

    #[test]
    fn reports_first_missing_required_header() {
        let event = event(&[("ce-subject", "s")], json!({ "name": "book1.jpg" }));

        let err = validator().validate(&event).unwrap_err();
        assert_eq!(err, ValidationError::MissingHeader("ce-id".to_string()));
    }

    #[test]
    fn required_headers_are_checked_before_subject() {
        let event = event(&[("ce-id", "1")], json!({}));

        let err = validator().validate(&event).unwrap_err();
        assert_eq!(err.field(), "ce-type");
    }

    #[test]
    fn reports_missing_subject() {
        let event = event(&[("ce-id", "1"), ("ce-type", "t")], json!({ "name": "book1.jpg" }));

        let err = validator().validate(&event).unwrap_err();
        assert_eq!(err, ValidationError::MissingHeader("ce-subject".to_string()));
    }

    #[test]
    fn reports_missing_file_name_last() {
        let event = event(
            &[("ce-id", "1"), ("ce-type", "t"), ("ce-subject", "s")],
            json!({ "bucket": "b1" }),
        );

        let err = validator().validate(&event).unwrap_err();
        assert_eq!(err, ValidationError::MissingBodyField("name".to_string()));
    }
}
