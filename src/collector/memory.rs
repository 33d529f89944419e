//! Memory usage collector over `/proc/meminfo`.
//!
//! The only stateless point sampler: memory accounting is absolute, so no
//! previous sample is needed. `MemTotal` is mandatory; swap is rendered
//! only when the machine has swap configured.

use std::path::{Path, PathBuf};

use crate::collector::parser::{MemSample, parse_meminfo};
use crate::collector::traits::FileSystem;
use crate::collector::{CollectError, MetricCollector};

const KB_PER_GIB: f64 = 1024.0 * 1024.0;

/// Point sampler for memory and swap utilization.
pub struct MemoryCollector<F: FileSystem> {
    fs: F,
    meminfo_path: PathBuf,
    sample: Option<MemSample>,
}

impl<F: FileSystem> MemoryCollector<F> {
    /// Creates a new memory collector.
    pub fn new(fs: F, proc_path: impl AsRef<Path>) -> Self {
        Self {
            fs,
            meminfo_path: proc_path.as_ref().join("meminfo"),
            sample: None,
        }
    }
}

impl<F: FileSystem> MetricCollector for MemoryCollector<F> {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn collect(&mut self) -> Result<(), CollectError> {
        let content = self
            .fs
            .read_to_string(&self.meminfo_path)
            .map_err(|source| CollectError::ResourceUnavailable {
                path: self.meminfo_path.display().to_string(),
                source,
            })?;

        // Commit only a fully parsed sample; a failed poll must not leave
        // half-updated fields behind.
        self.sample = Some(parse_meminfo(&content)?);
        Ok(())
    }

    fn formatted(&self) -> String {
        let Some(sample) = &self.sample else {
            return "Memory: N/A".to_string();
        };

        let used_kb = sample.total_kb.saturating_sub(sample.available_kb);
        let used_percent = used_kb as f64 / sample.total_kb as f64 * 100.0;
        let used_gib = used_kb as f64 / KB_PER_GIB;
        let total_gib = sample.total_kb as f64 / KB_PER_GIB;

        let mut out = format!(
            "Memory: {:.2}% ({:.2} GiB / {:.2} GiB)",
            used_percent, used_gib, total_gib
        );

        if sample.swap_total_kb > 0 {
            let swap_used = sample.swap_total_kb.saturating_sub(sample.swap_free_kb);
            let swap_percent = swap_used as f64 / sample.swap_total_kb as f64 * 100.0;
            out.push_str(&format!(" | Swap: {:.2}%", swap_percent));
        }

        out
    }
}
