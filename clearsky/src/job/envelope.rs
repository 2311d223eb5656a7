//! Push delivery envelope.
//!
//! Push-style queues wrap each message in an envelope before POSTing it to
//! the worker:
//!
//! ```json
//! {
//!   "message": {
//!     "data": "eyJkYXRhc2V0cyI6Wy4uLl19",
//!     "messageId": "2070443601311540",
//!     "publishTime": "2024-01-29T12:00:00Z",
//!     "attributes": {}
//!   },
//!   "subscription": "projects/p/subscriptions/median"
//! }
//! ```
//!
//! `data` carries the base64-encoded [`CompositeJob`] JSON.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{CompositeJob, JobError};

/// Errors raised while unwrapping a delivery.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The body is not an envelope.
    #[error("invalid push envelope: {0}")]
    Json(#[from] serde_json::Error),

    /// The message carries no payload.
    #[error("push message {0:?} has no data")]
    MissingData(String),

    /// The payload is not valid base64.
    #[error("push message payload is not base64: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The payload is not a valid job.
    #[error(transparent)]
    Job(#[from] JobError),
}

/// A single pushed delivery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushEnvelope {
    /// The wrapped message.
    pub message: PushMessage,

    /// Subscription the delivery came from.
    #[serde(default)]
    pub subscription: String,
}

/// Message body inside a [`PushEnvelope`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushMessage {
    /// Base64 payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    #[serde(
        rename = "messageId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub message_id: Option<String>,

    // Some transports send both spellings, so they cannot be serde aliases.
    #[serde(
        rename = "message_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub message_id_snake: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(
        rename = "publishTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub publish_time: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
}

impl PushEnvelope {
    /// Wrap an encoded job for push delivery.
    pub fn wrap(
        job: &CompositeJob,
        delivery_id: impl Into<String>,
        subscription: impl Into<String>,
    ) -> Result<Self, JobError> {
        let payload = job.encode()?;
        Ok(Self {
            message: PushMessage {
                data: Some(BASE64_STANDARD.encode(payload)),
                message_id: Some(delivery_id.into()),
                publish_time: Some(chrono::Utc::now().to_rfc3339()),
                ..Default::default()
            },
            subscription: subscription.into(),
        })
    }

    /// Parse an envelope from a request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Identifier of this delivery, or an empty string if none was sent.
    pub fn delivery_id(&self) -> &str {
        self.message
            .message_id
            .as_deref()
            .or(self.message.message_id_snake.as_deref())
            .or(self.message.id.as_deref())
            .unwrap_or("")
    }

    /// Decode the job carried by this delivery.
    pub fn job(&self) -> Result<CompositeJob, EnvelopeError> {
        let data = self
            .message
            .data
            .as_deref()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| EnvelopeError::MissingData(self.delivery_id().to_string()))?;
        let payload = BASE64_STANDARD.decode(data)?;
        Ok(CompositeJob::decode(&payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Window;

    fn job() -> CompositeJob {
        CompositeJob::for_tile(
            vec!["a.tif".to_string(), "b.tif".to_string()],
            Window::new(0, 0, 16, 16),
            "gs://out/",
        )
        .unwrap()
    }

    #[test]
    fn test_wrap_and_unwrap() {
        let envelope = PushEnvelope::wrap(&job(), "42", "sub").unwrap();
        let body = serde_json::to_vec(&envelope).unwrap();

        let parsed = PushEnvelope::from_slice(&body).unwrap();
        assert_eq!(parsed.delivery_id(), "42");
        assert_eq!(parsed.subscription, "sub");
        assert_eq!(parsed.job().unwrap(), job());
    }

    #[test]
    fn test_accepts_both_id_spellings() {
        let body = br#"{"message":{"data":"","messageId":"1","message_id":"1"},"subscription":"s"}"#;
        let parsed = PushEnvelope::from_slice(body).unwrap();
        assert_eq!(parsed.delivery_id(), "1");
    }

    #[test]
    fn test_legacy_id_field() {
        let body = br#"{"message":{"id":"7"}}"#;
        let parsed = PushEnvelope::from_slice(body).unwrap();
        assert_eq!(parsed.delivery_id(), "7");
        assert!(matches!(parsed.job(), Err(EnvelopeError::MissingData(_))));
    }

    #[test]
    fn test_bad_base64() {
        let body = br#"{"message":{"data":"!!!","messageId":"1"}}"#;
        let parsed = PushEnvelope::from_slice(body).unwrap();
        assert!(matches!(parsed.job(), Err(EnvelopeError::Base64(_))));
    }

    #[test]
    fn test_missing_message_is_rejected() {
        assert!(matches!(
            PushEnvelope::from_slice(br#"{"subscription":"s"}"#),
            Err(EnvelopeError::Json(_))
        ));
    }

    #[test]
    fn test_invalid_job_payload() {
        let data = BASE64_STANDARD.encode(br#"{"datasets":"nope"}"#);
        let body = format!(r#"{{"message":{{"data":"{}"}}}}"#, data);
        let parsed = PushEnvelope::from_slice(body.as_bytes()).unwrap();
        assert!(matches!(parsed.job(), Err(EnvelopeError::Job(_))));
    }
}
