//! Progress display for multi-individual fits (`progress` feature).
//!
//! [`FitProgress`] wraps an `indicatif` bar shared by the worker threads. Each
//! finished individual advances the bar, counts towards the failures when its fit
//! did not succeed, and folds its wall time into a running mean per individual:
//! `mean ← α·dt + (1–α)·mean`, started at the first measured duration.
use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use indicatif::{ProgressBar, ProgressStyle};

/// Weight of the newest duration in the running mean.
const SMOOTHING: f64 = 0.2;

/// Human-readable duration: `"420ms"`, `"3.14s"`, `"2m05s"`, `"1h02m"`.
pub fn fmt_dur(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1_000 {
        return format!("{ms}ms");
    }
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.2}s", d.as_secs_f32())
    } else if secs < 3_600 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h{:02}m", secs / 3_600, (secs % 3_600) / 60)
    }
}

/// Exponential moving average of the per-individual wall time.
fn smoothed(mean: Option<Duration>, dt: Duration) -> Duration {
    match mean {
        None => dt,
        Some(mean) => mean.mul_f64(1.0 - SMOOTHING) + dt.mul_f64(SMOOTHING),
    }
}

#[derive(Debug)]
struct Timing {
    last: Instant,
    mean: Option<Duration>,
    failed: usize,
}

/// Shared progress bar over the individuals of one fit.
pub struct FitProgress {
    bar: ProgressBar,
    timing: Mutex<Timing>,
}

impl FitProgress {
    /// A visible bar, or a hidden one when `quiet`.
    pub fn new(total: usize, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total.max(1) as u64)
        };
        if let Ok(style) = ProgressStyle::with_template(
            "{bar:40.cyan/blue} {pos}/{len} individuals | {elapsed_precise} | ETA {eta} | {msg}",
        ) {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(200));

        FitProgress {
            bar,
            timing: Mutex::new(Timing {
                last: Instant::now(),
                mean: None,
                failed: 0,
            }),
        }
    }

    /// Record the completion of one individual.
    pub fn finish_one(&self, ok: bool) {
        if let Ok(mut timing) = self.timing.lock() {
            let now = Instant::now();
            let mean = smoothed(timing.mean, now.duration_since(timing.last));
            timing.last = now;
            timing.mean = Some(mean);
            if !ok {
                timing.failed += 1;
            }
            self.bar.set_message(format!(
                "{} failed | {}/individual",
                timing.failed,
                fmt_dur(mean)
            ));
        }
        self.bar.inc(1);
    }

    /// Individuals reported as failed so far.
    pub fn failed(&self) -> usize {
        self.timing.lock().map(|t| t.failed).unwrap_or(0)
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
