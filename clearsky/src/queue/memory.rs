//! In-process queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::FutureExt;
use parking_lot::Mutex;

use super::{Publisher, TransportError};
use crate::job::{CompositeJob, PushEnvelope};
use crate::source::BoxFuture;

/// A FIFO of published jobs, delivered as push envelopes.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    subscription: String,
    messages: Mutex<VecDeque<PushEnvelope>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl MemoryQueue {
    pub fn new(subscription: impl Into<String>) -> Self {
        Self {
            subscription: subscription.into(),
            ..Default::default()
        }
    }

    /// Refuse further publishes.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the oldest delivery.
    pub fn receive(&self) -> Option<PushEnvelope> {
        self.messages.lock().pop_front()
    }

    /// Take every pending delivery in publish order.
    pub fn drain(&self) -> Vec<PushEnvelope> {
        self.messages.lock().drain(..).collect()
    }
}

impl Publisher for MemoryQueue {
    fn publish<'a>(&'a self, job: &'a CompositeJob) -> BoxFuture<'a, Result<String, TransportError>> {
        let result = if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed)
        } else {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
            PushEnvelope::wrap(job, id.clone(), self.subscription.clone())
                .map(|envelope| {
                    self.messages.lock().push_back(envelope);
                    id
                })
                .map_err(TransportError::from)
        };
        futures::future::ready(result).boxed()
    }
}
