//! Peak CPU and memory tracking around an engine run.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::probe::{ProbeReading, ResourceProbe, SysinfoProbe};

/// Resources consumed by one training run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceSample {
    #[serde(rename = "train_time_sec")]
    pub train_time_secs: f64,
    pub cpu_peak_percent: f64,
    pub ram_peak_gb: f64,
}

/// Live view emitted on each monitor tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    pub elapsed_secs: f64,
    pub cpu_percent: f64,
    pub ram_used_gb: f64,
    pub cpu_peak_percent: f64,
    pub ram_peak_gb: f64,
}

/// Measurement state for one run, threaded through `start`/`tick`/`end`.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    started: Instant,
    cpu_peak: f64,
    ram_peak: f64,
    ticks: usize,
}

impl MonitorHandle {
    pub fn cpu_peak(&self) -> f64 {
        self.cpu_peak
    }

    pub fn ram_peak(&self) -> f64 {
        self.ram_peak
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Number of successful samples so far.
    pub fn ticks(&self) -> usize {
        self.ticks
    }
}

/// Wraps a probe and folds its readings into running peaks.
pub struct ResourceMonitor {
    probe: Box<dyn ResourceProbe>,
}

impl ResourceMonitor {
    pub fn new(probe: Box<dyn ResourceProbe>) -> Self {
        Self { probe }
    }

    /// Monitor backed by the host probe.
    pub fn host() -> Self {
        Self::new(Box::new(SysinfoProbe::new()))
    }

    pub fn start(&mut self) -> MonitorHandle {
        MonitorHandle {
            started: Instant::now(),
            cpu_peak: 0.0,
            ram_peak: 0.0,
            ticks: 0,
        }
    }

    /// Samples the probe and raises the handle's peaks.
    ///
    /// Peaks never decrease. A failed sample leaves the handle untouched and
    /// returns `None`.
    pub fn tick(&mut self, handle: &mut MonitorHandle) -> Option<MonitorSnapshot> {
        let ProbeReading {
            cpu_percent,
            ram_used_gb,
        } = self.probe.sample()?;
        handle.cpu_peak = handle.cpu_peak.max(cpu_percent);
        handle.ram_peak = handle.ram_peak.max(ram_used_gb);
        handle.ticks += 1;
        Some(MonitorSnapshot {
            elapsed_secs: round2(handle.elapsed().as_secs_f64()),
            cpu_percent: round2(cpu_percent),
            ram_used_gb: round2(ram_used_gb),
            cpu_peak_percent: round2(handle.cpu_peak),
            ram_peak_gb: round2(handle.ram_peak),
        })
    }

    pub fn end(&mut self, handle: MonitorHandle) -> ResourceSample {
        ResourceSample {
            train_time_secs: round2(handle.elapsed().as_secs_f64()),
            cpu_peak_percent: round2(handle.cpu_peak),
            ram_peak_gb: round2(handle.ram_peak),
        }
    }
}

impl std::fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceMonitor").finish_non_exhaustive()
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
