//! Disk I/O collector over `/proc/diskstats`.
//!
//! Delta sampler keyed by device name. Partitions are filtered out at parse
//! time, so rates describe whole devices. Elapsed time is the configured
//! poll interval, on the assumption that the polling loop runs on schedule;
//! a measured wall-clock delta is deliberately not used.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::collector::parser::{DiskSample, parse_diskstats};
use crate::collector::rates::{clamp_percent, delta, per_second, sectors_to_mib_rate};
use crate::collector::traits::FileSystem;
use crate::collector::{CollectError, MetricCollector};

/// Derived per-device metrics for one polling window.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskMetrics {
    pub name: String,
    pub read_iops: f64,
    pub write_iops: f64,
    pub read_mib_s: f64,
    pub write_mib_s: f64,
    pub utilization_percent: f64,
}

/// Delta sampler for per-device IOPS, throughput and utilization.
pub struct DiskCollector<F: FileSystem> {
    fs: F,
    diskstats_path: PathBuf,
    interval: Duration,
    prev: HashMap<String, DiskSample>,
    metrics: Vec<DiskMetrics>,
}

impl<F: FileSystem> DiskCollector<F> {
    /// Creates a new disk collector.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to the proc filesystem (usually "/proc")
    /// * `interval` - Configured poll interval, used as the rate denominator
    pub fn new(fs: F, proc_path: impl AsRef<Path>, interval: Duration) -> Self {
        Self {
            fs,
            diskstats_path: proc_path.as_ref().join("diskstats"),
            interval,
            prev: HashMap::new(),
            metrics: Vec::new(),
        }
    }

    /// Derived metrics from the last completed poll.
    pub fn metrics(&self) -> &[DiskMetrics] {
        &self.metrics
    }
}

impl<F: FileSystem> MetricCollector for DiskCollector<F> {
    fn name(&self) -> &'static str {
        "disk"
    }

    fn collect(&mut self) -> Result<(), CollectError> {
        let content = self
            .fs
            .read_to_string(&self.diskstats_path)
            .map_err(|source| CollectError::ResourceUnavailable {
                path: self.diskstats_path.display().to_string(),
                source,
            })?;
        let current = parse_diskstats(&content)?;

        let elapsed_sec = self.interval.as_secs_f64();
        let elapsed_ms = self.interval.as_millis() as u64;

        if self.prev.is_empty() {
            // Baseline poll: seed the previous-sample map, no rates yet.
            self.prev = current.into_iter().map(|d| (d.name.clone(), d)).collect();
            return Ok(());
        }

        let mut metrics = Vec::with_capacity(current.len());
        for curr in &current {
            // A device first seen this poll has no window to rate over.
            let Some(prev) = self.prev.get(&curr.name) else {
                continue;
            };

            let io_time_delta = delta(curr.io_time_ms, prev.io_time_ms);
            let utilization = if elapsed_ms > 0 {
                clamp_percent(io_time_delta as f64 / elapsed_ms as f64 * 100.0)
            } else {
                0.0
            };

            metrics.push(DiskMetrics {
                name: curr.name.clone(),
                read_iops: per_second(delta(curr.reads, prev.reads), elapsed_sec),
                write_iops: per_second(delta(curr.writes, prev.writes), elapsed_sec),
                read_mib_s: sectors_to_mib_rate(
                    delta(curr.sectors_read, prev.sectors_read),
                    elapsed_sec,
                ),
                write_mib_s: sectors_to_mib_rate(
                    delta(curr.sectors_written, prev.sectors_written),
                    elapsed_sec,
                ),
                utilization_percent: utilization,
            });
        }

        self.metrics = metrics;
        self.prev = current.into_iter().map(|d| (d.name.clone(), d)).collect();
        Ok(())
    }

    fn formatted(&self) -> String {
        if self.metrics.is_empty() {
            return "Disk: N/A".to_string();
        }

        let mut out = String::from("Disk IO:");
        for m in &self.metrics {
            out.push_str(&format!(
                "\n  {}: R {:.1} MiB/s ({:.0} IOPS), W {:.1} MiB/s ({:.0} IOPS), Util {:.1}%",
                m.name, m.read_mib_s, m.read_iops, m.write_mib_s, m.write_iops,
                m.utilization_percent
            ));
        }
        out
    }
}
