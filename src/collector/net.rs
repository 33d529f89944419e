//! Network throughput collector over `/proc/net/dev`.
//!
//! Delta sampler keyed by interface name. The loopback interface stays in
//! the previous-sample map so its deltas remain continuous, but it is never
//! rendered. Elapsed time is the configured poll interval, as for disks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::collector::parser::{NetSample, parse_net_dev};
use crate::collector::rates::{bytes_to_mib_rate, delta};
use crate::collector::traits::FileSystem;
use crate::collector::{CollectError, MetricCollector};

/// Interface name the kernel gives the loopback device.
const LOOPBACK: &str = "lo";

/// Derived per-interface metrics for one polling window.
#[derive(Debug, Clone, PartialEq)]
pub struct NetMetrics {
    pub name: String,
    pub rx_mib_s: f64,
    pub tx_mib_s: f64,
}

/// Delta sampler for per-interface receive/transmit throughput.
pub struct NetCollector<F: FileSystem> {
    fs: F,
    net_dev_path: PathBuf,
    interval: Duration,
    prev: HashMap<String, NetSample>,
    metrics: Vec<NetMetrics>,
}

impl<F: FileSystem> NetCollector<F> {
    /// Creates a new network collector.
    pub fn new(fs: F, proc_path: impl AsRef<Path>, interval: Duration) -> Self {
        Self {
            fs,
            net_dev_path: proc_path.as_ref().join("net/dev"),
            interval,
            prev: HashMap::new(),
            metrics: Vec::new(),
        }
    }

    /// Derived metrics from the last completed poll, loopback included.
    pub fn metrics(&self) -> &[NetMetrics] {
        &self.metrics
    }
}

impl<F: FileSystem> MetricCollector for NetCollector<F> {
    fn name(&self) -> &'static str {
        "net"
    }

    fn collect(&mut self) -> Result<(), CollectError> {
        let content = self
            .fs
            .read_to_string(&self.net_dev_path)
            .map_err(|source| CollectError::ResourceUnavailable {
                path: self.net_dev_path.display().to_string(),
                source,
            })?;
        let current = parse_net_dev(&content)?;

        let elapsed_sec = self.interval.as_secs_f64();

        if self.prev.is_empty() {
            self.prev = current.into_iter().map(|i| (i.name.clone(), i)).collect();
            return Ok(());
        }

        let mut metrics = Vec::with_capacity(current.len());
        for curr in &current {
            // An interface first seen this poll has no window to rate over.
            let Some(prev) = self.prev.get(&curr.name) else {
                continue;
            };

            metrics.push(NetMetrics {
                name: curr.name.clone(),
                rx_mib_s: bytes_to_mib_rate(delta(curr.rx_bytes, prev.rx_bytes), elapsed_sec),
                tx_mib_s: bytes_to_mib_rate(delta(curr.tx_bytes, prev.tx_bytes), elapsed_sec),
            });
        }

        self.metrics = metrics;
        self.prev = current.into_iter().map(|i| (i.name.clone(), i)).collect();
        Ok(())
    }

    fn formatted(&self) -> String {
        let rendered: Vec<&NetMetrics> = self
            .metrics
            .iter()
            .filter(|m| m.name != LOOPBACK)
            .collect();

        if rendered.is_empty() {
            return "Network: N/A".to_string();
        }

        let mut out = String::from("Network:");
        for m in rendered {
            out.push_str(&format!(
                "\n  {}: \u{2193} {:.2} MiB/s, \u{2191} {:.2} MiB/s",
                m.name, m.rx_mib_s, m.tx_mib_s
            ));
        }
        out
    }
}
