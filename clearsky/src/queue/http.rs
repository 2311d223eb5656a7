//! HTTP push publisher.
//!
//! Posts each job as a push envelope to an endpoint: a worker's ingress
//! directly, or a relay that feeds a managed queue.
//!
//! A worker ingress answers only after the job finishes, so its publish
//! timeout must cover a whole job (or be disabled). A relay answers as soon
//! as the message is queued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use reqwest::Client;
use tracing::trace;

use super::{Publisher, TransportError};
use crate::job::{CompositeJob, PushEnvelope};
use crate::source::BoxFuture;

/// Default timeout for one publish request to a relay.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(30);

/// Publishes by POSTing push envelopes.
pub struct HttpPushPublisher {
    client: Client,
    endpoint: String,
    subscription: String,
    run_id: i64,
    sequence: AtomicU64,
}

impl HttpPushPublisher {
    /// Create a publisher whose requests give up after `timeout`
    /// (`None` waits for the endpoint indefinitely).
    pub fn new(
        endpoint: impl Into<String>,
        subscription: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, TransportError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self::with_client(builder.build()?, endpoint, subscription))
    }

    pub fn with_client(
        client: Client,
        endpoint: impl Into<String>,
        subscription: impl Into<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            subscription: subscription.into(),
            run_id: chrono::Utc::now().timestamp_millis(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn next_message_id(&self) -> String {
        format!(
            "{}-{}",
            self.run_id,
            self.sequence.fetch_add(1, Ordering::Relaxed)
        )
    }
}

impl Publisher for HttpPushPublisher {
    fn publish<'a>(&'a self, job: &'a CompositeJob) -> BoxFuture<'a, Result<String, TransportError>> {
        async move {
            let id = self.next_message_id();
            let envelope = PushEnvelope::wrap(job, id.clone(), self.subscription.clone())?;
            let body = serde_json::to_vec(&envelope)?;

            let response = self
                .client
                .post(&self.endpoint)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await?;

            let status = response.status();
            trace!(message_id = %id, status = status.as_u16(), "Push response");
            if !status.is_success() {
                return Err(TransportError::Rejected {
                    status: status.as_u16(),
                });
            }
            Ok(id)
        }
        .boxed()
    }
}
