use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{Solver, SolverResult};

/// A scripted solver for tests. Returns pre-defined results in order and
/// keeps repeating the last one.
pub struct MockSolver {
    results: Vec<SolverResult>,
    index: AtomicUsize,
    delay: Duration,
    running: AtomicUsize,
    peak: AtomicUsize,
    inputs: Mutex<Vec<String>>,
}

impl MockSolver {
    pub fn new(results: Vec<SolverResult>) -> Self {
        assert!(!results.is_empty(), "MockSolver needs at least one result");
        Self {
            results,
            index: AtomicUsize::new(0),
            delay: Duration::ZERO,
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn always(result: SolverResult) -> Self {
        Self::new(vec![result])
    }

    /// Hold each call open for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Inputs received, in call order.
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Solver for MockSolver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn solve(&self, input: &str) -> SolverResult {
        let i = self.index.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(input.to_string());

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        let last = self.results.len() - 1;
        self.results[i.min(last)].clone()
    }
}
