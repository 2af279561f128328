//! Process memory probe used between batches

use std::time::Duration;

// statm reports pages; 4 KiB on every platform we ship for
const PAGE_SIZE: u64 = 4096;

/// Pause applied when resident memory is above the threshold
pub const MEMORY_PRESSURE_PAUSE: Duration = Duration::from_millis(100);

/// Resident set size of this process in bytes
///
/// Returns `None` where `/proc/self/statm` isn't available.
pub fn resident_memory_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * PAGE_SIZE)
}

/// Pause briefly if resident memory exceeds `threshold_bytes`
///
/// Returns true when the threshold was exceeded.
pub async fn relieve_memory_pressure(threshold_bytes: u64) -> bool {
    match resident_memory_bytes() {
        Some(resident) if resident > threshold_bytes => {
            tracing::warn!(
                resident_mb = resident / (1024 * 1024),
                threshold_mb = threshold_bytes / (1024 * 1024),
                "Memory usage above threshold, pausing before next batch"
            );
            tokio::time::sleep(MEMORY_PRESSURE_PAUSE).await;
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resident_memory_readable_on_linux() {
        if cfg!(target_os = "linux") {
            let resident = resident_memory_bytes().unwrap();
            assert!(resident > 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_pause_below_threshold() {
        assert!(!relieve_memory_pressure(u64::MAX).await);
    }
}
