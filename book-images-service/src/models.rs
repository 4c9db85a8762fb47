use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Inbound object-created notification: HTTP headers plus the JSON body fields
#[derive(Debug, Clone, Default)]
pub struct WebhookEvent {
    /// Header names are stored lower-cased
    pub headers: HashMap<String, String>,
    pub body: Map<String, Value>,
}

impl WebhookEvent {
    pub fn new(headers: HashMap<String, String>, body: Map<String, Value>) -> Self {
        let headers = headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        Self { headers, body }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Body field as a string; non-string values count as absent
    pub fn body_str(&self, field: &str) -> Option<&str> {
        self.body.get(field).and_then(Value::as_str)
    }
}

/// Event fields the pipeline needs, available only after validation succeeded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedEvent {
    pub file_name: String,
    pub bucket_name: Option<String>,
    /// Value of the `ce-subject` header
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedBookInfo {
    pub title: String,
    pub author: String,
}

/// Working copy of the record, filled in stage by stage while the workflow runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookDocument {
    pub file_name: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub summary: Option<String>,
    pub availability_note: Option<String>,
}

impl BookDocument {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..Default::default()
        }
    }

    pub fn book_info(&self) -> Option<ExtractedBookInfo> {
        Some(ExtractedBookInfo {
            title: self.title.clone()?,
            author: self.author.clone()?,
        })
    }
}

/// A fully populated record, the only shape the document store accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidatedRecord {
    pub file_name: String,
    pub title: String,
    pub author: String,
    pub summary: String,
    pub availability_note: String,
}

impl TryFrom<BookDocument> for ConsolidatedRecord {
    type Error = String;

    fn try_from(document: BookDocument) -> Result<Self, Self::Error> {
        let missing = |field: &str| format!("{} not set for {}", field, document.file_name);
        Ok(Self {
            title: document.title.clone().ok_or_else(|| missing("title"))?,
            author: document.author.clone().ok_or_else(|| missing("author"))?,
            summary: document.summary.clone().ok_or_else(|| missing("summary"))?,
            availability_note: document
                .availability_note
                .clone()
                .ok_or_else(|| missing("availability_note"))?,
            file_name: document.file_name,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedAck {
    pub write_timestamp: DateTime<Utc>,
}

/// Record as it sits in the document store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedBook {
    pub file_name: String,
    pub title: String,
    pub author: String,
    pub summary: String,
    pub availability_note: String,
    pub write_timestamp: DateTime<Utc>,
}

impl PersistedBook {
    pub fn from_record(record: ConsolidatedRecord, ack: PersistedAck) -> Self {
        Self {
            file_name: record.file_name,
            title: record.title,
            author: record.author,
            summary: record.summary,
            availability_note: record.availability_note,
            write_timestamp: ack.write_timestamp,
        }
    }
}

/// Successful outcome of one webhook invocation
#[derive(Debug, Clone)]
pub struct WebhookAck {
    pub message: String,
    pub book: PersistedBook,
    pub tool_invocations: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn header_lookup_ignores_case() {
        let headers = HashMap::from([("CE-Subject".to_string(), "objects/book1.jpg".to_string())]);
        let event = WebhookEvent::new(headers, Map::new());

        assert_eq!(event.header("ce-subject"), Some("objects/book1.jpg"));
        assert_eq!(event.header("Ce-Subject"), Some("objects/book1.jpg"));
    }

    #[test]
    fn non_string_body_fields_count_as_absent() {
        let body = json!({ "name": 42, "bucket": "b1" });
        let event = WebhookEvent::new(HashMap::new(), body.as_object().cloned().unwrap());

        assert_eq!(event.body_str("name"), None);
        assert_eq!(event.body_str("bucket"), Some("b1"));
    }

    #[test]
    fn incomplete_document_is_not_a_record() {
        let mut document = BookDocument::new("book1.jpg");
        document.title = Some("Dune".to_string());
        document.author = Some("Frank Herbert".to_string());
        document.summary = Some(String::new());

        let err = ConsolidatedRecord::try_from(document.clone()).unwrap_err();
        assert!(err.contains("availability_note"));

        document.availability_note = Some("Available in paperback".to_string());
        let record = ConsolidatedRecord::try_from(document).unwrap();
        assert_eq!(record.file_name, "book1.jpg");
        assert_eq!(record.summary, "");
    }

    #[test]
    fn persisted_book_uses_camel_case_fields() {
        let record = ConsolidatedRecord {
            file_name: "book1.jpg".to_string(),
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            summary: "Desert planet".to_string(),
            availability_note: "In stock".to_string(),
        };
        let ack = PersistedAck {
            write_timestamp: Utc::now(),
        };

        let value = serde_json::to_value(PersistedBook::from_record(record, ack)).unwrap();
        assert_eq!(value["fileName"], "book1.jpg");
        assert_eq!(value["availabilityNote"], "In stock");
        assert!(value.get("writeTimestamp").is_some());
    }
}
