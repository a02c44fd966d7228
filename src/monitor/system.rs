//! Host description and live usage snapshots.

use serde::{Deserialize, Serialize};
use sysinfo::System;

use super::resources::round2;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Static facts about the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub cpu_cores: usize,
    pub cpu_threads: usize,
    pub ram_total_gb: f64,
}

impl SystemInfo {
    pub fn collect() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();

        let os = match (System::name(), System::os_version()) {
            (Some(name), Some(version)) => format!("{name} {version}"),
            (Some(name), None) => name,
            _ => std::env::consts::OS.to_string(),
        };
        let cpu_threads = system.cpus().len();
        Self {
            os,
            cpu_cores: system.physical_core_count().unwrap_or(cpu_threads),
            cpu_threads,
            ram_total_gb: round2(system.total_memory() as f64 / BYTES_PER_GB),
        }
    }
}

/// Current host usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub cpu_percent: f64,
    pub ram_used_gb: f64,
    pub ram_percent: f64,
    pub uptime_secs: u64,
}

impl SystemStats {
    /// Takes a snapshot. CPU usage is measured over a short interval.
    pub async fn collect() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        system.refresh_cpu();
        system.refresh_memory();

        let total = system.total_memory() as f64;
        let used = system.used_memory() as f64;
        Self {
            cpu_percent: round2(f64::from(system.global_cpu_info().cpu_usage())),
            ram_used_gb: round2(used / BYTES_PER_GB),
            ram_percent: if total > 0.0 {
                round2(used / total * 100.0)
            } else {
                0.0
            },
            uptime_secs: System::uptime(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_info_is_populated() {
        let info = SystemInfo::collect();
        assert!(!info.os.is_empty());
        assert!(info.ram_total_gb >= 0.0);
    }

    #[tokio::test]
    async fn test_system_stats_ranges() {
        let stats = SystemStats::collect().await;
        assert!(stats.ram_percent >= 0.0 && stats.ram_percent <= 100.0);
        assert!(stats.cpu_percent >= 0.0);
    }
}
