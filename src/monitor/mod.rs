//! Resource monitoring.
//!
//! [`ResourceMonitor`] wraps an engine run: `start` opens a
//! [`MonitorHandle`], `tick` folds a probe reading into the running peaks and
//! `end` closes the handle into a [`ResourceSample`]. Probes are pluggable
//! through [`ResourceProbe`].

pub mod probe;
pub mod resources;
pub mod system;

pub use probe::{ProbeReading, ResourceProbe, ScriptedProbe, SysinfoProbe};
pub use resources::{MonitorHandle, MonitorSnapshot, ResourceMonitor, ResourceSample};
pub use system::{SystemInfo, SystemStats};
