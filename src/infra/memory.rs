//! Resident memory sampling for the batch guards.

use tracing::debug;

use crate::application::batch::MemoryProbe;

/// Reads the process resident set size from `/proc/self/status`.
///
/// Returns `None` off Linux or when procfs is unavailable; the batch loop then treats memory
/// pressure as zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessMemory;

impl MemoryProbe for ProcessMemory {
    fn resident_bytes(&self) -> Option<u64> {
        current_rss_bytes()
    }
}

#[cfg(target_os = "linux")]
fn current_rss_bytes() -> Option<u64> {
    let status = match std::fs::read_to_string("/proc/self/status") {
        Ok(status) => status,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                debug!(error = %err, "failed to read /proc/self/status");
            }
            return None;
        }
    };
    parse_vm_rss(&status)
}

#[cfg(not(target_os = "linux"))]
fn current_rss_bytes() -> Option<u64> {
    None
}

fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status
        .lines()
        .map(str::trim_start)
        .find_map(|line| line.strip_prefix("VmRSS:"))?;
    let kb = line.split_whitespace().next()?;
    match kb.parse::<u64>() {
        Ok(kb) => Some(kb.saturating_mul(1024)),
        Err(err) => {
            debug!(value = kb, error = %err, "failed to parse VmRSS");
            None
        }
    }
}
