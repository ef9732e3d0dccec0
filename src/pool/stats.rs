//! Pool utilization statistics
//!
//! A [`PoolStats`] value is a derived, point-in-time snapshot computed by the
//! dispatcher, never authoritative state.

use serde::Serialize;
use sysinfo::{ProcessesToUpdate, System};

#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStats {
    pub total_workers: usize,
    pub idle_workers: usize,
    pub busy_workers: usize,
    /// Tasks currently assigned to a worker (queued tasks are not active)
    pub active_tasks: usize,
    /// busy / total at snapshot time
    pub utilization_rate: f64,
    /// Resident memory of the host process in MB
    pub memory_usage_mb: u64,
}

/// Sample the resident memory of the current process.
pub(crate) fn process_memory_mb() -> u64 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0;
    };
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid)
        .map(|process| process.memory() / (1024 * 1024))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sampling_does_not_fail() {
        // The exact value is host-dependent; a running test binary always
        // has a nonzero resident set.
        assert!(process_memory_mb() > 0);
    }
}
