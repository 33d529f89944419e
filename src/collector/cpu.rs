//! CPU usage collector over `/proc/stat`.
//!
//! Delta sampler over the aggregate cpu line and, in per-core mode, every
//! `cpuN` line. Core samples are matched positionally by index across
//! polls: core topology is stable for the life of a boot, and a hot-added
//! core simply reads 0% for the round it first appears.

use std::path::{Path, PathBuf};

use crate::collector::parser::{CpuTimes, parse_stat};
use crate::collector::rates::{busy_percent, delta};
use crate::collector::traits::FileSystem;
use crate::collector::{CollectError, MetricCollector};

/// Delta sampler for aggregate and optional per-core CPU utilization.
pub struct CpuCollector<F: FileSystem> {
    fs: F,
    stat_path: PathBuf,
    per_core: bool,
    prev_total: Option<CpuTimes>,
    prev_cores: Vec<CpuTimes>,
    usage_percent: Option<f64>,
    core_usage_percents: Vec<f64>,
}

impl<F: FileSystem> CpuCollector<F> {
    /// Creates a new CPU collector.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path to the proc filesystem (usually "/proc")
    /// * `per_core` - Also track and render per-core utilization
    pub fn new(fs: F, proc_path: impl AsRef<Path>, per_core: bool) -> Self {
        Self {
            fs,
            stat_path: proc_path.as_ref().join("stat"),
            per_core,
            prev_total: None,
            prev_cores: Vec::new(),
            usage_percent: None,
            core_usage_percents: Vec::new(),
        }
    }

    fn usage_between(prev: &CpuTimes, curr: &CpuTimes) -> f64 {
        let active_delta = delta(curr.active(), prev.active());
        let idle_delta = delta(curr.idle_total(), prev.idle_total());
        busy_percent(active_delta, idle_delta)
    }
}

impl<F: FileSystem> MetricCollector for CpuCollector<F> {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn collect(&mut self) -> Result<(), CollectError> {
        let content = self.fs.read_to_string(&self.stat_path).map_err(|source| {
            CollectError::ResourceUnavailable {
                path: self.stat_path.display().to_string(),
                source,
            }
        })?;
        let current = parse_stat(&content)?;

        let Some(prev_total) = self.prev_total else {
            // Baseline poll: no window to rate over yet, reported as 0%.
            self.usage_percent = Some(0.0);
            if self.per_core {
                self.core_usage_percents = vec![0.0; current.per_core.len()];
                self.prev_cores = current.per_core;
            }
            self.prev_total = Some(current.total);
            return Ok(());
        };

        self.usage_percent = Some(Self::usage_between(&prev_total, &current.total));
        self.prev_total = Some(current.total);

        if self.per_core {
            self.core_usage_percents = current
                .per_core
                .iter()
                .enumerate()
                .map(|(i, curr)| {
                    // A core without a stored predecessor compares against
                    // itself and reads exactly 0% this round.
                    let prev = self.prev_cores.get(i).unwrap_or(curr);
                    Self::usage_between(prev, curr)
                })
                .collect();
            self.prev_cores = current.per_core;
        }

        Ok(())
    }

    fn formatted(&self) -> String {
        let Some(usage) = self.usage_percent else {
            return "CPU: N/A".to_string();
        };

        let mut out = format!("CPU: {:.1}%", usage);
        if self.per_core && !self.core_usage_percents.is_empty() {
            let cores: Vec<String> = self
                .core_usage_percents
                .iter()
                .enumerate()
                .map(|(i, usage)| format!("C{}:{:.1}", i, usage))
                .collect();
            out.push_str(&format!(" [{}]", cores.join(", ")));
        }
        out
    }
}
