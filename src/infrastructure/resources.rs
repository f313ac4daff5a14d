//! Host resource sampling for the `status` report.

use serde::{Deserialize, Serialize};
use sysinfo::{
    CpuRefreshKind, MemoryRefreshKind, RefreshKind, System, MINIMUM_CPU_UPDATE_INTERVAL,
};
use tracing::debug;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// CPU, memory and uptime of the build host at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostResources {
    /// Global CPU usage percentage (0.0-100.0)
    pub cpu_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub uptime_secs: u64,
}

impl HostResources {
    /// Take a sample. CPU usage is the delta between two refreshes, so this waits
    /// [`MINIMUM_CPU_UPDATE_INTERVAL`] between them.
    pub async fn sample() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything());
        let mut sys = System::new_with_specifics(refresh_kind);

        tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;
        sys.refresh_cpu_all();
        sys.refresh_memory();

        let resources = Self {
            cpu_percent: sys.global_cpu_usage(),
            memory_used_mb: sys.used_memory() / BYTES_PER_MB,
            memory_total_mb: sys.total_memory() / BYTES_PER_MB,
            uptime_secs: System::uptime(),
        };
        debug!(
            cpu_percent = resources.cpu_percent,
            memory_used_mb = resources.memory_used_mb,
            "sampled host resources"
        );
        resources
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn memory_percent(&self) -> f64 {
        if self.memory_total_mb == 0 {
            0.0
        } else {
            self.memory_used_mb as f64 * 100.0 / self.memory_total_mb as f64
        }
    }

    /// Uptime as `2d 3h 04m`, `3h 04m` or `4m`.
    pub fn uptime_display(&self) -> String {
        let minutes = self.uptime_secs / 60;
        let (days, hours, minutes) = (minutes / 1440, minutes / 60 % 24, minutes % 60);
        match (days, hours) {
            (0, 0) => format!("{minutes}m"),
            (0, _) => format!("{hours}h {minutes:02}m"),
            _ => format!("{days}d {hours}h {minutes:02}m"),
        }
    }
}
