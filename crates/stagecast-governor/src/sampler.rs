//! System load readings behind a trait so the monitor can be driven by a
//! scripted sampler in tests.

use serde::Serialize;
use sysinfo::{Disks, System};

use crate::error::SamplingError;

/// One reading of host load, each value in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemReading {
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub disk_percent: f64,
}

/// Source of host load readings. Called once per monitor tick.
pub trait SystemSampler: Send {
    fn sample(&mut self) -> Result<SystemReading, SamplingError>;
}

/// Production sampler backed by `sysinfo`.
///
/// The first CPU reading after construction is 0 because usage is computed
/// between two refreshes.
pub struct SysinfoSampler {
    system: System,
    disks: Disks,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSampler for SysinfoSampler {
    fn sample(&mut self) -> Result<SystemReading, SamplingError> {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.disks.refresh();

        let total_memory = self.system.total_memory();
        if total_memory == 0 {
            return Err(SamplingError::Unavailable {
                indicator: "memory",
                reason: "total memory reported as 0".to_string(),
            });
        }
        let mem_percent = self.system.used_memory() as f64 / total_memory as f64 * 100.0;

        let (total_disk, available_disk) = self
            .disks
            .list()
            .iter()
            .fold((0u64, 0u64), |(total, available), disk| {
                (
                    total.saturating_add(disk.total_space()),
                    available.saturating_add(disk.available_space()),
                )
            });
        let disk_percent = if total_disk == 0 {
            0.0
        } else {
            total_disk.saturating_sub(available_disk) as f64 / total_disk as f64 * 100.0
        };

        Ok(SystemReading {
            cpu_percent: f64::from(self.system.global_cpu_usage()),
            mem_percent,
            disk_percent,
        })
    }
}
