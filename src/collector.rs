//! Per-process measurement collection from the /proc filesystem.
//!
//! Builds one `MeasurementBatch` per cycle for the pids known to the graph:
//! cumulative CPU time from `/proc/<pid>/stat` and the private memory
//! footprint from `/proc/<pid>/smaps_rollup`, falling back to resident pages
//! from `/proc/<pid>/statm` on kernels without the rollup file. A pid whose
//! files cannot be read is simply absent from the batch.

use once_cell::sync::Lazy;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::measurement::{MeasurementBatch, ProcessMeasurement};

/// Clock ticks per second, resolved once from the runtime.
static CLOCK_TICKS_PER_SECOND: Lazy<u64> = Lazy::new(|| {
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if ticks > 0 {
        ticks as u64
    } else {
        // Most Linux systems use 100 jiffies per second.
        100
    }
});

/// Page size in KB, resolved once from the runtime.
static PAGE_SIZE_KB: Lazy<u64> = Lazy::new(|| {
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size > 0 {
        (page_size as u64) / 1024
    } else {
        4
    }
});

/// Returns the runtime clock-tick rate used for CPU time conversion.
pub fn clock_ticks_per_second() -> u64 {
    *CLOCK_TICKS_PER_SECOND
}

/// Collects measurement batches from a /proc-style filesystem root.
pub struct Collector {
    proc_root: PathBuf,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector {
    pub fn new() -> Self {
        Self::with_proc_root("/proc")
    }

    /// Uses an alternate filesystem root instead of `/proc`.
    pub fn with_proc_root(root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: root.into(),
        }
    }

    /// Collects one measurement batch for the given pids.
    ///
    /// Pids are scanned in parallel; unreadable ones (exited processes,
    /// permission failures) are dropped from the batch rather than reported
    /// as errors.
    pub fn collect_batch(&self, pids: &[u32]) -> MeasurementBatch {
        let started = Instant::now();

        let mut measurements: Vec<ProcessMeasurement> = pids
            .par_iter()
            .filter_map(|&pid| self.measure_pid(pid))
            .collect();
        measurements.sort_by_key(|m| m.pid);

        MeasurementBatch {
            batch_started_time: started,
            batch_ended_time: Instant::now(),
            measurements,
        }
    }

    fn measure_pid(&self, pid: u32) -> Option<ProcessMeasurement> {
        let proc_path = self.proc_root.join(pid.to_string());

        let cumulative_cpu_usage = match read_cumulative_cpu(&proc_path) {
            Ok(cpu) => cpu,
            Err(e) => {
                debug!("skipping pid {}: {}", pid, e);
                return None;
            }
        };
        let private_footprint_kb = match read_private_footprint_kb(&proc_path) {
            Ok(kb) => kb,
            Err(e) => {
                debug!("skipping pid {}: {}", pid, e);
                return None;
            }
        };

        Some(ProcessMeasurement {
            pid,
            cumulative_cpu_usage,
            private_footprint_kb,
        })
    }
}

/// Reads cumulative CPU time (utime + stime) from `<proc_path>/stat`.
pub fn read_cumulative_cpu(proc_path: &Path) -> Result<Duration, String> {
    let content = fs::read_to_string(proc_path.join("stat"))
        .map_err(|e| format!("Failed to read stat: {}", e))?;
    let ticks = parse_stat_ticks(&content)?;
    Ok(ticks_to_duration(ticks))
}

/// Reads the private memory footprint in KB for a process.
///
/// Prefers `smaps_rollup` (Private_Clean + Private_Dirty); falls back to
/// resident pages from `statm` when the rollup file is unavailable.
pub fn read_private_footprint_kb(proc_path: &Path) -> Result<u64, String> {
    let rollup_path = proc_path.join("smaps_rollup");
    if rollup_path.exists() {
        let content = fs::read_to_string(&rollup_path)
            .map_err(|e| format!("Failed to read smaps_rollup: {}", e))?;
        return parse_smaps_rollup_private_kb(&content);
    }

    let content = fs::read_to_string(proc_path.join("statm"))
        .map_err(|e| format!("Failed to read statm: {}", e))?;
    let pages = parse_statm_resident_pages(&content)?;
    Ok(pages * *PAGE_SIZE_KB)
}

fn ticks_to_duration(ticks: u64) -> Duration {
    Duration::from_micros(ticks * 1_000_000 / *CLOCK_TICKS_PER_SECOND)
}

/// Parses utime + stime (in clock ticks) out of a `/proc/<pid>/stat` line.
///
/// The comm field may itself contain spaces and parentheses, so fields are
/// counted from after the last closing paren: state is field 3 of the full
/// line, utime field 14, stime field 15.
fn parse_stat_ticks(content: &str) -> Result<u64, String> {
    let rest = content
        .rsplit_once(')')
        .map(|(_, rest)| rest)
        .ok_or_else(|| "Invalid stat format: missing comm field".to_string())?;

    let parts: Vec<&str> = rest.split_whitespace().collect();
    if parts.len() <= 12 {
        return Err(format!(
            "Invalid stat format: expected at least 13 fields after comm, got {}",
            parts.len()
        ));
    }

    let utime: u64 = parts[11]
        .parse()
        .map_err(|e| format!("Failed to parse utime: {}", e))?;
    let stime: u64 = parts[12]
        .parse()
        .map_err(|e| format!("Failed to parse stime: {}", e))?;

    Ok(utime + stime)
}

/// Parses Private_Clean + Private_Dirty (KB) from smaps_rollup content.
fn parse_smaps_rollup_private_kb(content: &str) -> Result<u64, String> {
    let mut private_clean: Option<u64> = None;
    let mut private_dirty: Option<u64> = None;

    for line in content.lines() {
        if line.starts_with("Private_Clean:") {
            // Format: "Private_Clean:      1024 kB"
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 2 {
                if let Ok(kb) = parts[1].parse::<u64>() {
                    private_clean = Some(kb);
                }
            }
        } else if line.starts_with("Private_Dirty:") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 2 {
                if let Ok(kb) = parts[1].parse::<u64>() {
                    private_dirty = Some(kb);
                }
            }
        }

        if private_clean.is_some() && private_dirty.is_some() {
            break;
        }
    }

    match (private_clean, private_dirty) {
        (Some(clean), Some(dirty)) => Ok(clean + dirty),
        _ => Err("Failed to parse Private_Clean or Private_Dirty from smaps_rollup".to_string()),
    }
}

/// Parses the resident page count (second field) from statm content.
fn parse_statm_resident_pages(content: &str) -> Result<u64, String> {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(format!(
            "Invalid statm format: expected at least 2 fields, got {}",
            parts.len()
        ));
    }

    parts[1]
        .parse::<u64>()
        .map_err(|e| format!("Failed to parse resident pages: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stat_ticks() {
        let stat = "1234 (renderer) S 1 1234 1234 0 -1 4194560 12345 0 0 0 \
                    250 125 0 0 20 0 12 0 98765 1234567 890 18446744073709551615 \
                    1 1 0 0 0 0 0 0 0 0 0 0 17 3 0 0 0 0 0";
        let ticks = parse_stat_ticks(stat).unwrap();
        assert_eq!(ticks, 250 + 125);
    }

    #[test]
    fn test_parse_stat_ticks_comm_with_spaces_and_parens() {
        // The comm field is not escaped; everything up to the last closing
        // paren must be ignored.
        let stat = "42 (tmux: server (1)) S 1 42 42 0 -1 4194560 0 0 0 0 \
                    7 3 0 0 20 0 1 0 100 1000 10 18446744073709551615 \
                    1 1 0 0 0 0 0 0 0 0 0 0 17 3 0 0 0 0 0";
        assert_eq!(parse_stat_ticks(stat).unwrap(), 10);
    }

    #[test]
    fn test_parse_stat_ticks_truncated() {
        assert!(parse_stat_ticks("99 (short) S 1 99").is_err());
        assert!(parse_stat_ticks("no comm field here").is_err());
    }

    #[test]
    fn test_parse_smaps_rollup() {
        let rollup = "55f0d0a00000-7ffc7e1ff000 ---p 00000000 00:00 0    [rollup]\n\
                      Rss:                5120 kB\n\
                      Pss:                3072 kB\n\
                      Private_Clean:      1024 kB\n\
                      Private_Dirty:      2048 kB\n\
                      Shared_Clean:       1536 kB\n";
        assert_eq!(parse_smaps_rollup_private_kb(rollup).unwrap(), 3072);
    }

    #[test]
    fn test_parse_smaps_rollup_missing_fields() {
        let rollup = "Rss:                5120 kB\nPss:                3072 kB\n";
        assert!(parse_smaps_rollup_private_kb(rollup).is_err());
    }

    #[test]
    fn test_parse_statm_resident_pages() {
        assert_eq!(parse_statm_resident_pages("2048 512 300 10 0 200 0").unwrap(), 512);
        assert!(parse_statm_resident_pages("2048").is_err());
        assert!(parse_statm_resident_pages("2048 abc 1").is_err());
    }

    #[test]
    fn test_collect_batch_from_fake_proc_root() {
        let root = tempfile::tempdir().unwrap();
        let pid_dir = root.path().join("4242");
        fs::create_dir(&pid_dir).unwrap();
        fs::write(
            pid_dir.join("stat"),
            "4242 (worker) S 1 4242 4242 0 -1 4194560 0 0 0 0 \
             50 50 0 0 20 0 1 0 100 1000 10 18446744073709551615 \
             1 1 0 0 0 0 0 0 0 0 0 0 17 3 0 0 0 0 0",
        )
        .unwrap();
        fs::write(
            pid_dir.join("smaps_rollup"),
            "Rss: 500 kB\nPrivate_Clean: 100 kB\nPrivate_Dirty: 200 kB\n",
        )
        .unwrap();

        let collector = Collector::with_proc_root(root.path());
        let batch = collector.collect_batch(&[4242, 9999]);

        // 9999 has no directory and is silently dropped.
        assert_eq!(batch.len(), 1);
        let m = &batch.measurements[0];
        assert_eq!(m.pid, 4242);
        assert_eq!(m.private_footprint_kb, 300);
        assert_eq!(m.cumulative_cpu_usage, ticks_to_duration(100));
        assert!(batch.batch_ended_time >= batch.batch_started_time);
    }
}
