use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};

/// Default number of recent outcomes remembered per worker.
pub const DEFAULT_WINDOW: usize = 20;

/// Rolling per-worker success rates, fed by the executor and read by the selector.
#[derive(Debug)]
pub struct PerformanceHistory {
    window: usize,
    outcomes: RwLock<HashMap<String, VecDeque<bool>>>,
}

impl PerformanceHistory {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            outcomes: RwLock::new(HashMap::new()),
        }
    }

    /// Record the final outcome of one task for `worker_id`.
    pub fn record(&self, worker_id: &str, success: bool) {
        let mut outcomes = self.outcomes.write();
        let entry = outcomes.entry(worker_id.to_string()).or_default();
        entry.push_back(success);
        while entry.len() > self.window {
            entry.pop_front();
        }
    }

    /// Success rate over the window, or `None` without any recorded outcome.
    pub fn success_rate(&self, worker_id: &str) -> Option<f64> {
        let outcomes = self.outcomes.read();
        let entry = outcomes.get(worker_id).filter(|e| !e.is_empty())?;
        let successes = entry.iter().filter(|&&ok| ok).count();
        Some(successes as f64 / entry.len() as f64)
    }

    pub fn samples(&self, worker_id: &str) -> usize {
        self.outcomes.read().get(worker_id).map_or(0, VecDeque::len)
    }
}

impl Default for PerformanceHistory {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
