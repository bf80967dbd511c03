//! Timer utilities
//!
//! Measures a conformance case and the phases it goes through.

use std::time::{Duration, Instant};

/// Timer with named phases
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    label: String,
    phases: Vec<(&'static str, Duration)>,
}

impl Timer {
    /// Create and start a new timer
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            label: label.into(),
            phases: Vec::new(),
        }
    }

    /// Close the current phase
    pub fn phase(&mut self, name: &'static str) {
        self.phases.push((name, self.start.elapsed()));
    }

    /// Duration of each phase, not cumulative
    pub fn phase_times(&self) -> Vec<(&'static str, Duration)> {
        let mut prev = Duration::ZERO;
        self.phases
            .iter()
            .map(|&(name, cumulative)| {
                let lap = cumulative.saturating_sub(prev);
                prev = cumulative;
                (name, lap)
            })
            .collect()
    }

    /// Get elapsed time in milliseconds
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Stop timer and return elapsed milliseconds
    pub fn stop(self) -> u64 {
        let elapsed = self.elapsed_ms();
        let phases: Vec<String> = self
            .phase_times()
            .into_iter()
            .map(|(name, d)| format!("{name} {}ms", d.as_millis()))
            .collect();
        tracing::debug!("{}: {}ms [{}]", self.label, elapsed, phases.join(", "));
        elapsed
    }
}
