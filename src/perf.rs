//! Lightweight performance aggregation for streaming layers.
//!
//! Coarse timing spans and counters, always enabled, meant for an end-of-run
//! summary (`streamconv --verbose`) rather than fine-grained profiling.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Named metrics tracked by the perf collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Metric {
    ConvForward,
    ConvStep,
    ConvFlush,
    ConvTransposeForward,
    ConvTransposeStep,
    PipelineForward,
    PipelineStep,
    PipelineFlush,
    ConvFrames,
    ConvTransposeSamples,
}

impl Metric {
    const COUNT: usize = 10;

    const ALL: [Metric; Metric::COUNT] = [
        Metric::ConvForward,
        Metric::ConvStep,
        Metric::ConvFlush,
        Metric::ConvTransposeForward,
        Metric::ConvTransposeStep,
        Metric::PipelineForward,
        Metric::PipelineStep,
        Metric::PipelineFlush,
        Metric::ConvFrames,
        Metric::ConvTransposeSamples,
    ];

    /// Dotted name used in reports.
    pub fn name(self) -> &'static str {
        match self {
            Metric::ConvForward => "conv.forward",
            Metric::ConvStep => "conv.step",
            Metric::ConvFlush => "conv.flush",
            Metric::ConvTransposeForward => "conv_tr.forward",
            Metric::ConvTransposeStep => "conv_tr.step",
            Metric::PipelineForward => "pipeline.forward",
            Metric::PipelineStep => "pipeline.step",
            Metric::PipelineFlush => "pipeline.flush",
            Metric::ConvFrames => "conv.frames",
            Metric::ConvTransposeSamples => "conv_tr.samples",
        }
    }

    fn is_counter(self) -> bool {
        matches!(self, Metric::ConvFrames | Metric::ConvTransposeSamples)
    }

    fn index(self) -> usize {
        self as usize
    }
}

struct Collector {
    start: Instant,
    micros: [AtomicU64; Metric::COUNT],
    counts: [AtomicU64; Metric::COUNT],
}

impl Collector {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            micros: std::array::from_fn(|_| AtomicU64::new(0)),
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    fn record(&self, metric: Metric, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.micros[metric.index()].fetch_add(micros, Ordering::Relaxed);
        self.counts[metric.index()].fetch_add(1, Ordering::Relaxed);
    }

    fn count(&self, metric: Metric, delta: u64) {
        self.counts[metric.index()].fetch_add(delta, Ordering::Relaxed);
    }
}

static COLLECTOR: OnceLock<Collector> = OnceLock::new();

fn collector() -> &'static Collector {
    COLLECTOR.get_or_init(Collector::new)
}

/// RAII timer that records its duration when dropped.
#[must_use = "the span records when dropped"]
pub struct PerfSpan {
    metric: Metric,
    start: Instant,
}

impl Drop for PerfSpan {
    fn drop(&mut self) {
        collector().record(self.metric, self.start.elapsed());
    }
}

/// Begin a timing span.
pub fn span(metric: Metric) -> PerfSpan {
    PerfSpan {
        metric,
        start: Instant::now(),
    }
}

/// Add `delta` to a counter metric.
pub fn add_count(metric: Metric, delta: u64) {
    collector().count(metric, delta);
}

/// Format a human-readable summary of everything recorded so far.
pub fn report() -> String {
    let collector = collector();
    let mut timings = Vec::new();
    let mut counters = Vec::new();
    for metric in Metric::ALL {
        let count = collector.counts[metric.index()].load(Ordering::Relaxed);
        if count == 0 {
            continue;
        }
        if metric.is_counter() {
            counters.push((metric, count));
        } else {
            let micros = collector.micros[metric.index()].load(Ordering::Relaxed);
            timings.push((metric, micros, count));
        }
    }
    timings.sort_by(|a, b| b.1.cmp(&a.1));

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Performance summary (uptime: {:.3}s)",
        collector.start.elapsed().as_secs_f64()
    );
    if timings.is_empty() && counters.is_empty() {
        let _ = writeln!(out, "No performance data recorded.");
        return out;
    }
    if !timings.is_empty() {
        let _ = writeln!(
            out,
            "  {:<20} {:>10} {:>8} {:>10}",
            "name", "total", "calls", "avg"
        );
        for (metric, micros, calls) in timings {
            let avg_ms = micros as f64 / calls as f64 / 1000.0;
            let _ = writeln!(
                out,
                "  {:<20} {:>9.3}s {:>8} {:>8.3}ms",
                metric.name(),
                micros as f64 / 1_000_000.0,
                calls,
                avg_ms
            );
        }
    }
    for (metric, value) in counters {
        let _ = writeln!(out, "  {:<20} {}", metric.name(), value);
    }
    out
}
