use std::mem;
use std::sync::{Arc, Condvar, Mutex};

/// One failed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub key: String,
    pub error: String,
    /// The backup must not be considered usable.
    pub fatal: bool,
}

/// Aggregate outcome of every upload one uploader clone performed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: Vec<String>,
    pub failures: Vec<UploadFailure>,
}

impl UploadSummary {
    /// At least one upload landed and none failed.
    pub fn succeeded(&self) -> bool {
        !self.uploaded.is_empty() && self.failures.is_empty()
    }

    pub fn has_fatal(&self) -> bool {
        self.failures.iter().any(|f| f.fatal)
    }
}

#[derive(Default)]
struct TrackerState {
    in_flight: usize,
    summary: UploadSummary,
}

/// Per-clone wait group plus explicit upload results.
#[derive(Default)]
pub struct UploadTracker {
    state: Mutex<TrackerState>,
    idle: Condvar,
}

impl UploadTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a background upload. The returned guard retires it on drop.
    pub fn begin(self: &Arc<Self>) -> InFlight {
        self.state.lock().unwrap().in_flight += 1;
        InFlight {
            tracker: Arc::clone(self),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().unwrap().in_flight
    }

    pub fn record_success(&self, key: &str) {
        self.state
            .lock()
            .unwrap()
            .summary
            .uploaded
            .push(key.to_string());
    }

    pub fn record_failure(&self, key: &str, error: impl ToString, fatal: bool) {
        self.state
            .lock()
            .unwrap()
            .summary
            .failures
            .push(UploadFailure {
                key: key.to_string(),
                error: error.to_string(),
                fatal,
            });
    }

    /// Results recorded so far, without waiting.
    pub fn snapshot(&self) -> UploadSummary {
        self.state.lock().unwrap().summary.clone()
    }

    /// Block until every registered upload has finished, then take the
    /// results. No timeout.
    pub fn wait(&self) -> UploadSummary {
        let mut st = self.state.lock().unwrap();
        while st.in_flight > 0 {
            st = self.idle.wait(st).unwrap();
        }
        mem::take(&mut st.summary)
    }

    fn retire(&self) {
        let mut st = self.state.lock().unwrap();
        st.in_flight = st.in_flight.saturating_sub(1);
        if st.in_flight == 0 {
            self.idle.notify_all();
        }
    }
}

/// Guard for one registered background upload.
pub struct InFlight {
    tracker: Arc<UploadTracker>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.tracker.retire();
    }
}
