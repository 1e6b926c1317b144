//! Bundle job model and queue-message normalization.
//!
//! Producers of the bundle queue have drifted over time: older gallery
//! backends send `customerEmail`/`files`/`downloadURL`, newer ones
//! `email`/`photos`/`url`. All variants are normalized here, at the
//! boundary, so the rest of the worker only ever sees [`Job`].

use serde::Deserialize;
use uuid::Uuid;

/// One unit of work: a set of media items to bundle for one recipient.
///
/// Immutable for the lifetime of processing; dropped when the job reaches a
/// terminal state.
#[derive(Debug, Clone)]
pub struct Job {
    pub event_id: String,
    pub recipient_email: String,
    pub items: Vec<MediaItem>,
    pub request_id: String,
}

/// One file to bundle.
#[derive(Debug, Clone)]
pub struct MediaItem {
    pub file_name: String,
    pub source_url: String,
    pub declared_size: Option<u64>,
}

/// Wire format of a bundle-request queue message.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRequest {
    pub event_id: String,
    #[serde(alias = "customerEmail")]
    pub email: String,
    #[serde(default, alias = "files")]
    pub photos: Vec<BundleRequestItem>,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRequestItem {
    #[serde(alias = "filename")]
    pub file_name: String,
    #[serde(alias = "downloadUrl", alias = "downloadURL")]
    pub url: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl Job {
    /// Parse and normalize a raw queue message body.
    pub fn from_message(body: &str) -> Result<Self, crate::JobError> {
        let request: BundleRequest = serde_json::from_str(body)
            .map_err(|e| crate::JobError::InvalidMessage(e.to_string()))?;
        Ok(request.into())
    }
}

impl From<BundleRequest> for Job {
    fn from(request: BundleRequest) -> Self {
        Job {
            event_id: request.event_id,
            recipient_email: request.email,
            items: request
                .photos
                .into_iter()
                .map(|p| MediaItem {
                    file_name: p.file_name,
                    source_url: p.url,
                    declared_size: p.size,
                })
                .collect(),
            request_id: request
                .request_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_message() {
        let body = r#"{
            "eventId": "evt-1",
            "email": "guest@example.com",
            "photos": [
                {"fileName": "a.jpg", "url": "https://cdn.example.com/a.jpg", "size": 1024},
                {"fileName": "b.jpg", "url": "https://cdn.example.com/b.jpg"}
            ],
            "requestId": "req-1"
        }"#;
        let job = Job::from_message(body).unwrap();
        assert_eq!(job.event_id, "evt-1");
        assert_eq!(job.recipient_email, "guest@example.com");
        assert_eq!(job.request_id, "req-1");
        assert_eq!(job.items.len(), 2);
        assert_eq!(job.items[0].file_name, "a.jpg");
        assert_eq!(job.items[0].declared_size, Some(1024));
        assert_eq!(job.items[1].declared_size, None);
    }

    #[test]
    fn accepts_legacy_aliases() {
        let body = r#"{
            "eventId": "evt-2",
            "customerEmail": "old@example.com",
            "files": [
                {"filename": "x.png", "downloadURL": "https://cdn.example.com/x.png"},
                {"fileName": "y.png", "downloadUrl": "https://cdn.example.com/y.png"}
            ]
        }"#;
        let job = Job::from_message(body).unwrap();
        assert_eq!(job.recipient_email, "old@example.com");
        assert_eq!(job.items.len(), 2);
        assert_eq!(job.items[0].file_name, "x.png");
        assert_eq!(job.items[0].source_url, "https://cdn.example.com/x.png");
        assert_eq!(job.items[1].source_url, "https://cdn.example.com/y.png");
    }

    #[test]
    fn missing_request_id_gets_generated() {
        let body = r#"{"eventId": "evt-3", "email": "a@b.c", "photos": []}"#;
        let job = Job::from_message(body).unwrap();
        assert!(!job.request_id.is_empty());
        assert!(job.items.is_empty());
    }

    #[test]
    fn malformed_body_is_invalid_message() {
        let err = Job::from_message("not json").unwrap_err();
        assert!(matches!(err, crate::JobError::InvalidMessage(_)));
        assert!(err.is_job_fatal());

        let err = Job::from_message(r#"{"email": "a@b.c"}"#).unwrap_err();
        assert!(matches!(err, crate::JobError::InvalidMessage(_)));
    }

    #[test]
    fn item_order_is_preserved() {
        let body = r#"{
            "eventId": "evt-4",
            "email": "a@b.c",
            "photos": [
                {"fileName": "1.jpg", "url": "u1"},
                {"fileName": "2.jpg", "url": "u2"},
                {"fileName": "3.jpg", "url": "u3"}
            ]
        }"#;
        let job = Job::from_message(body).unwrap();
        let names: Vec<_> = job.items.iter().map(|i| i.file_name.as_str()).collect();
        assert_eq!(names, vec!["1.jpg", "2.jpg", "3.jpg"]);
    }
}
