//! Stage timing for pipeline reports.
//!
//! A [`StageClock`] is started once per pipeline run. Each stage is wrapped
//! in [`StageClock::time`], which records its wall time and logs it.

use std::time::Instant;

use serde::Serialize;

/// Elapsed time of one named stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageTiming {
    pub stage: String,
    pub elapsed_ms: f64,
}

/// Monotonic clock anchored at the start of a run.
#[derive(Debug, Clone)]
pub struct StageClock {
    epoch: Instant,

    /// Wall-clock time at start (ISO 8601 string).
    started_at: String,

    timings: Vec<StageTiming>,
}

impl StageClock {
    /// Create a clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            started_at: chrono::Utc::now().to_rfc3339(),
            timings: Vec::new(),
        }
    }

    /// Run `f` as stage `stage`, recording how long it took.
    pub fn time<T>(&mut self, stage: &str, f: impl FnOnce() -> T) -> T {
        let begin = Instant::now();
        let out = f();
        let elapsed_ms = begin.elapsed().as_secs_f64() * 1000.0;
        tracing::debug!(stage, elapsed_ms, "stage finished");
        self.timings.push(StageTiming {
            stage: stage.to_string(),
            elapsed_ms,
        });
        out
    }

    /// Milliseconds since the clock was started.
    pub fn elapsed_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }

    /// Wall-clock time at start.
    pub fn started_at(&self) -> &str {
        &self.started_at
    }

    /// Timings recorded so far, in execution order.
    pub fn timings(&self) -> &[StageTiming] {
        &self.timings
    }

    pub fn into_timings(self) -> Vec<StageTiming> {
        self.timings
    }
}
