use super::{JobReport, WorkerError};

/// Outcome of handling one push delivery.
#[derive(Debug)]
pub enum Delivery {
    /// The job ran and its output is committed.
    Completed {
        delivery_id: String,
        report: JobReport,
    },
    /// The payload can never be processed; acknowledged so it is not
    /// redelivered.
    Dropped { delivery_id: String, reason: String },
    /// The body is not a push envelope at all.
    Rejected { reason: String },
    /// Processing failed; left unacknowledged so the queue redelivers.
    Failed {
        delivery_id: String,
        error: WorkerError,
    },
}

impl Delivery {
    /// Whether the delivery should be acknowledged to the queue.
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, Delivery::Completed { .. } | Delivery::Dropped { .. })
    }

    pub fn report(&self) -> Option<&JobReport> {
        match self {
            Delivery::Completed { report, .. } => Some(report),
            _ => None,
        }
    }
}
