//! Optional solver instrumentation, compiled in with the `timing` feature.
//!
//! Records per-iteration assembly and linear-solve durations in a
//! thread-local; the Newton controller resets it at solve start and logs
//! the summary on success.

#![allow(unused)]
use std::cell::RefCell;
use std::time::Duration;

#[derive(Default, Clone)]
pub struct TimingStats {
    pub assembly_times: Vec<Duration>,
    pub linear_solve_times: Vec<Duration>,
    pub total_time: Duration,
}

impl TimingStats {
    #[cfg(feature = "timing")]
    pub fn log_summary(&self) {
        if self.assembly_times.is_empty() {
            return;
        }
        let total_assembly: Duration = self.assembly_times.iter().sum();
        let total_linear: Duration = self.linear_solve_times.iter().sum();
        let overhead = self
            .total_time
            .saturating_sub(total_assembly + total_linear);
        tracing::info!(
            total = %format!("{:.3}s", self.total_time.as_secs_f64()),
            assembly_ms = total_assembly.as_secs_f64() * 1e3,
            linear_ms = total_linear.as_secs_f64() * 1e3,
            overhead_ms = overhead.as_secs_f64() * 1e3,
            iterations = self.assembly_times.len(),
            "solver timing"
        );
    }

    #[cfg(not(feature = "timing"))]
    pub fn log_summary(&self) {}
}

#[cfg(feature = "timing")]
thread_local! {
    static TIMING_STATS: RefCell<TimingStats> = RefCell::new(TimingStats::default());
}

#[cfg(feature = "timing")]
pub fn reset_timing() {
    TIMING_STATS.with(|stats| {
        *stats.borrow_mut() = TimingStats::default();
    });
}

#[cfg(not(feature = "timing"))]
pub fn reset_timing() {}

#[cfg(feature = "timing")]
pub fn record_assembly<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let start = std::time::Instant::now();
    let result = f();
    let elapsed = start.elapsed();
    TIMING_STATS.with(|stats| stats.borrow_mut().assembly_times.push(elapsed));
    result
}

#[cfg(not(feature = "timing"))]
pub fn record_assembly<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}

#[cfg(feature = "timing")]
pub fn record_linear_solve<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let start = std::time::Instant::now();
    let result = f();
    let elapsed = start.elapsed();
    TIMING_STATS.with(|stats| stats.borrow_mut().linear_solve_times.push(elapsed));
    result
}

#[cfg(not(feature = "timing"))]
pub fn record_linear_solve<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}

#[cfg(feature = "timing")]
pub fn finalize_and_log(total_time: Duration) {
    TIMING_STATS.with(|stats| {
        let mut s = stats.borrow_mut();
        s.total_time = total_time;
        s.clone()
    })
    .log_summary();
}

#[cfg(not(feature = "timing"))]
pub fn finalize_and_log(_total_time: Duration) {}
