//! Failed sample bookkeeping and the end-of-run report
//!
//! The ledger is the only state shared between concurrent request tasks. It
//! is append-only and guarded by a single lock; keys keep the order in which
//! they were first recorded so the rendered report is deterministic for a
//! given sequence of failures.
//!
//! Two kinds of failure are kept apart:
//!
//! - sample failures, grouped under their request id
//! - request failures, where the sample listing itself failed and no sample
//!   id exists to record

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Write as _;

use crate::{RequestId, SampleId};

/// A request whose sample listing failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFailure {
    /// Request that produced no result
    pub request_id: RequestId,
    /// Human readable cause
    pub reason: String,
}

#[derive(Debug, Default)]
struct LedgerState {
    samples: Vec<(RequestId, Vec<SampleId>)>,
    index: HashMap<RequestId, usize>,
    request_failures: Vec<RequestFailure>,
}

/// Thread-safe, append-only failure ledger for one run
#[derive(Debug, Default)]
pub struct ErrorLedger {
    state: Mutex<LedgerState>,
}

impl ErrorLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed sample under `request_id`
    pub fn record(&self, request_id: &RequestId, sample_id: SampleId) {
        let mut state = self.state.lock();
        let slot = match state.index.get(request_id) {
            Some(&slot) => slot,
            None => {
                let slot = state.samples.len();
                state.samples.push((request_id.clone(), Vec::new()));
                state.index.insert(request_id.clone(), slot);
                slot
            }
        };
        state.samples[slot].1.push(sample_id);
    }

    /// Record a request whose sample listing failed
    pub fn record_request_failure(&self, request_id: &RequestId, reason: impl Into<String>) {
        self.state.lock().request_failures.push(RequestFailure {
            request_id: request_id.clone(),
            reason: reason.into(),
        });
    }

    /// Copy the current contents
    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.lock();
        LedgerSnapshot {
            samples: state.samples.clone(),
            request_failures: state.request_failures.clone(),
        }
    }

    /// Render the report for the current contents
    pub fn render(&self) -> String {
        self.snapshot().render()
    }
}

/// Point-in-time copy of an [`ErrorLedger`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    samples: Vec<(RequestId, Vec<SampleId>)>,
    request_failures: Vec<RequestFailure>,
}

impl LedgerSnapshot {
    /// Failed samples of `request_id`, in recording order
    pub fn failed_samples(&self, request_id: &RequestId) -> Option<&[SampleId]> {
        self.samples
            .iter()
            .find(|(id, _)| id == request_id)
            .map(|(_, samples)| samples.as_slice())
    }

    /// Requests with failed samples and their samples, in first-recorded order
    pub fn sample_failures(&self) -> impl Iterator<Item = (&RequestId, &[SampleId])> {
        self.samples.iter().map(|(id, s)| (id, s.as_slice()))
    }

    /// Requests whose sample listing failed, in recording order
    pub fn request_failures(&self) -> &[RequestFailure] {
        &self.request_failures
    }

    /// Total failed samples across all requests
    pub fn sample_failure_count(&self) -> usize {
        self.samples.iter().map(|(_, s)| s.len()).sum()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.request_failures.is_empty()
    }

    /// Plain-text summary grouped by request
    pub fn render(&self) -> String {
        let mut out = String::from("ERROR SUMMARY REPORT BY REQUEST\n");

        if self.is_empty() {
            out.push_str("\nNo errors.\n");
            return out;
        }

        for (request_id, samples) in &self.samples {
            let joined = samples
                .iter()
                .map(SampleId::as_str)
                .collect::<Vec<_>>()
                .join(",");
            let _ = write!(
                out,
                "\nRequest: {request_id}, errors: {}\n\tSamples: {joined}\n",
                samples.len()
            );
        }

        if !self.request_failures.is_empty() {
            out.push_str("\nREQUEST FAILURES\n");
            for failure in &self.request_failures {
                let _ = write!(
                    out,
                    "\nRequest: {}, reason: {}\n",
                    failure.request_id, failure.reason
                );
            }
        }

        out
    }
}
