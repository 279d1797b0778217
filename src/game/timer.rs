use serde::{Deserialize, Serialize};

/// Wall-clock stopwatch for one play session.
///
/// The host feeds it timestamps (`Date.now()` in the browser); the stopwatch
/// never reads a clock itself, which keeps the core testable without one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Stopwatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_at: Option<f64>,
    #[serde(default)]
    elapsed_secs: u32,
}

impl Stopwatch {
    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Starts counting from zero. No-op while already running.
    pub fn start(&mut self, now_ms: f64) {
        if self.started_at.is_none() {
            self.started_at = Some(now_ms);
            self.elapsed_secs = 0;
        }
    }

    /// Continues a reloaded session as if it had started `elapsed_secs` ago.
    pub fn resume(&mut self, elapsed_secs: u32, now_ms: f64) {
        self.started_at = Some(now_ms - f64::from(elapsed_secs) * 1_000.0);
        self.elapsed_secs = elapsed_secs;
    }

    /// Recomputes the elapsed whole seconds against `now_ms`.
    pub fn tick(&mut self, now_ms: f64) -> u32 {
        if let Some(started) = self.started_at {
            let delta = ((now_ms - started) / 1_000.0).floor();
            self.elapsed_secs = if delta > 0.0 { delta as u32 } else { 0 };
        }
        self.elapsed_secs
    }

    /// Stops counting; the elapsed time stays frozen at its final value.
    pub fn freeze(&mut self, now_ms: f64) {
        self.tick(now_ms);
        self.started_at = None;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn elapsed_secs(&self) -> u32 {
        self.elapsed_secs
    }

    pub fn minutes(&self) -> u32 {
        self.elapsed_secs / 60
    }

    pub fn seconds(&self) -> u32 {
        self.elapsed_secs % 60
    }
}
