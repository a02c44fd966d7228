//! Host resource probes.

use std::collections::VecDeque;

use sysinfo::System;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// One instantaneous host reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeReading {
    pub cpu_percent: f64,
    pub ram_used_gb: f64,
}

/// Source of host CPU and memory readings.
///
/// Sampling is best effort: `None` means no reading was available.
pub trait ResourceProbe: Send {
    fn sample(&mut self) -> Option<ProbeReading>;
}

/// Reads host-wide CPU and memory usage through `sysinfo`.
pub struct SysinfoProbe {
    system: System,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta; prime it so the first sample is meaningful.
        system.refresh_cpu();
        system.refresh_memory();
        Self { system }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SysinfoProbe {
    fn sample(&mut self) -> Option<ProbeReading> {
        self.system.refresh_cpu();
        self.system.refresh_memory();
        let cpu_percent = f64::from(self.system.global_cpu_info().cpu_usage());
        let ram_used_gb = self.system.used_memory() as f64 / BYTES_PER_GB;
        (cpu_percent.is_finite() && ram_used_gb.is_finite()).then_some(ProbeReading {
            cpu_percent,
            ram_used_gb,
        })
    }
}

/// Replays a fixed sequence of readings, then reports nothing.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProbe {
    readings: VecDeque<Option<ProbeReading>>,
}

impl ScriptedProbe {
    pub fn new(readings: impl IntoIterator<Item = Option<ProbeReading>>) -> Self {
        Self {
            readings: readings.into_iter().collect(),
        }
    }

    /// Convenience constructor from `(cpu_percent, ram_used_gb)` pairs.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        Self::new(pairs.iter().map(|&(cpu_percent, ram_used_gb)| {
            Some(ProbeReading {
                cpu_percent,
                ram_used_gb,
            })
        }))
    }
}

impl ResourceProbe for ScriptedProbe {
    fn sample(&mut self) -> Option<ProbeReading> {
        self.readings.pop_front().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_probe_replays_then_stops() {
        let mut probe = ScriptedProbe::new([
            Some(ProbeReading {
                cpu_percent: 10.0,
                ram_used_gb: 1.0,
            }),
            None,
        ]);
        assert_eq!(probe.sample().map(|r| r.cpu_percent), Some(10.0));
        assert!(probe.sample().is_none());
        assert!(probe.sample().is_none());
    }

    #[test]
    fn test_sysinfo_probe_reads_memory() {
        let mut probe = SysinfoProbe::new();
        if let Some(reading) = probe.sample() {
            assert!(reading.cpu_percent >= 0.0);
            assert!(reading.ram_used_gb >= 0.0);
        }
    }
}
