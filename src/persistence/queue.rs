//! Save coalescing for one flow.
//!
//! At most one save is in flight. Requests made meanwhile collapse into a
//! single pending job carrying the newest state, which starts when the
//! running save completes (successfully or not).

use crate::model::Flow;

/// A save to run: the flow snapshot and the editor revision it reflects.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveJob {
    pub revision: u64,
    pub flow: Flow,
}

#[derive(Debug, Clone, Default)]
pub struct SaveQueue {
    in_flight: Option<u64>,
    pending: Option<SaveJob>,
}

impl SaveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the job to start now, or `None` if it was queued behind the
    /// running save (replacing any older queued job).
    pub fn request(&mut self, revision: u64, flow: Flow) -> Option<SaveJob> {
        let job = SaveJob { revision, flow };
        if self.in_flight.is_some() {
            self.pending = Some(job);
            None
        } else {
            self.in_flight = Some(revision);
            Some(job)
        }
    }

    /// Mark the running save finished and hand out the queued one, if any.
    pub fn complete(&mut self) -> Option<SaveJob> {
        self.in_flight = None;
        let next = self.pending.take()?;
        self.in_flight = Some(next.revision);
        Some(next)
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Revision of the running save.
    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }
}
