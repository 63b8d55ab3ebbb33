//! Per-request stage timings, reported as a `Server-Timing` header.

use std::time::{Duration, Instant};

/// Durations of the pipeline stages of one request.
#[derive(Debug, Clone)]
pub struct RequestTimings {
    started: Instant,
    last: Instant,
    stages: Vec<(&'static str, Duration)>,
}

impl Default for RequestTimings {
    fn default() -> Self {
        Self::start()
    }
}

impl RequestTimings {
    pub fn start() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last: now,
            stages: Vec::new(),
        }
    }

    /// Close the current stage under `name`.
    pub fn mark(&mut self, name: &'static str) {
        let now = Instant::now();
        self.stages.push((name, now - self.last));
        self.last = now;
    }

    pub fn stages(&self) -> &[(&'static str, Duration)] {
        &self.stages
    }

    pub fn total(&self) -> Duration {
        self.started.elapsed()
    }

    /// `name;dur=<ms>` entries followed by the total.
    pub fn server_timing(&self) -> String {
        let mut parts: Vec<String> = self
            .stages
            .iter()
            .map(|(name, d)| format!("{};dur={:.3}", name, millis(*d)))
            .collect();
        parts.push(format!("total;dur={:.3}", millis(self.total())));
        parts.join(", ")
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
