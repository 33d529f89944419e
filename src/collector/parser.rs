//! Parsers for `/proc` text sources.
//!
//! Pure functions that parse the content of `/proc/stat`, `/proc/meminfo`,
//! `/proc/diskstats` and `/proc/net/dev` into raw counter samples. One
//! narrow function per record shape, designed to be testable with literal
//! strings. An out-of-range or non-numeric field is a `MalformedRecord` or
//! `InsufficientData` error, never a panic.

use crate::collector::CollectError;

/// CPU time counters from one `/proc/stat` cpu line, in USER_HZ ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
}

impl CpuTimes {
    /// Ticks spent doing work: user + nice + system + irq + softirq + steal.
    pub fn active(&self) -> u64 {
        self.user + self.nice + self.system + self.irq + self.softirq + self.steal
    }

    /// Ticks spent waiting: idle + iowait.
    pub fn idle_total(&self) -> u64 {
        self.idle + self.iowait
    }
}

/// All CPU lines of one `/proc/stat` read: the aggregate plus per-core
/// entries in file order (core index is positional).
#[derive(Debug, Clone, Default)]
pub struct CpuSnapshot {
    pub total: CpuTimes,
    pub per_core: Vec<CpuTimes>,
}

/// Memory accounting counters from `/proc/meminfo`, in kB.
///
/// `total_kb` is mandatory; the optional fields default to zero when the
/// kernel does not report them.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemSample {
    pub total_kb: u64,
    pub free_kb: u64,
    pub available_kb: u64,
    pub swap_total_kb: u64,
    pub swap_free_kb: u64,
}

/// I/O counters for one block device row of `/proc/diskstats`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskSample {
    pub name: String,
    pub reads: u64,
    pub reads_merged: u64,
    pub sectors_read: u64,
    pub read_time_ms: u64,
    pub writes: u64,
    pub writes_merged: u64,
    pub sectors_written: u64,
    pub write_time_ms: u64,
    pub io_time_ms: u64,
    pub weighted_time_ms: u64,
}

/// Byte counters for one interface line of `/proc/net/dev`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetSample {
    pub name: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

fn parse_counter(token: &str, source: &'static str, what: &str) -> Result<u64, CollectError> {
    token.parse().map_err(|_| CollectError::MalformedRecord {
        source,
        detail: format!("invalid {}: {:?}", what, token),
    })
}

/// Parses one `cpu`/`cpuN` line of `/proc/stat`.
///
/// The label token is ignored; exactly the first 10 counters after it are
/// used (newer kernels may append more).
pub fn parse_cpu_line(line: &str) -> Result<CpuTimes, CollectError> {
    let mut fields = line.split_whitespace();
    let label = fields.next().unwrap_or_default();

    let mut values = [0u64; 10];
    for (i, slot) in values.iter_mut().enumerate() {
        let token = fields.next().ok_or_else(|| CollectError::InsufficientData {
            source: "stat",
            detail: format!("{}: expected 10 counters, got {}", label, i),
        })?;
        *slot = parse_counter(token, "stat", "cpu counter")?;
    }

    Ok(CpuTimes {
        user: values[0],
        nice: values[1],
        system: values[2],
        idle: values[3],
        iowait: values[4],
        irq: values[5],
        softirq: values[6],
        steal: values[7],
        guest: values[8],
        guest_nice: values[9],
    })
}

/// Parses `/proc/stat` content into the aggregate line plus per-core lines.
///
/// The aggregate `cpu ` line is required; per-core `cpuN` lines are kept in
/// file order. Non-cpu lines (intr, ctxt, btime, ...) are ignored.
pub fn parse_stat(content: &str) -> Result<CpuSnapshot, CollectError> {
    let mut total = None;
    let mut per_core = Vec::new();

    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("cpu") {
            match rest.chars().next() {
                Some(c) if c.is_ascii_whitespace() => total = Some(parse_cpu_line(line)?),
                Some(c) if c.is_ascii_digit() => per_core.push(parse_cpu_line(line)?),
                _ => {}
            }
        }
    }

    let total = total.ok_or(CollectError::InsufficientData {
        source: "stat",
        detail: "missing aggregate cpu line".to_string(),
    })?;

    Ok(CpuSnapshot { total, per_core })
}

/// Parses `/proc/meminfo` content.
///
/// Lines are `Key: value kB`. Individual malformed lines are skipped, not
/// fatal; a missing (or zero) `MemTotal` fails the whole parse.
pub fn parse_meminfo(content: &str) -> Result<MemSample, CollectError> {
    let mut sample = MemSample::default();

    for line in content.lines() {
        let mut fields = line.split_whitespace();
        let (Some(key), Some(value)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Ok(value) = value.parse::<u64>() else {
            continue;
        };

        match key {
            "MemTotal:" => sample.total_kb = value,
            "MemFree:" => sample.free_kb = value,
            "MemAvailable:" => sample.available_kb = value,
            "SwapTotal:" => sample.swap_total_kb = value,
            "SwapFree:" => sample.swap_free_kb = value,
            _ => {}
        }
    }

    if sample.total_kb == 0 {
        return Err(CollectError::InsufficientData {
            source: "meminfo",
            detail: "MemTotal not found".to_string(),
        });
    }

    Ok(sample)
}

/// Whether a `/proc/diskstats` device name denotes a partition rather than
/// a whole device.
///
/// A trailing digit normally marks a partition (`sda1`), but a whole NVMe
/// namespace also ends in a digit (`nvme0n1`); only the `p`-suffixed form
/// (`nvme0n1p1`) is a partition there.
fn is_partition(name: &str) -> bool {
    if !name.ends_with(|c: char| c.is_ascii_digit()) {
        return false;
    }
    !(name.contains("nvme") && !name.contains('p'))
}

/// Parses one row of `/proc/diskstats`.
///
/// Rows carry at least 14 whitespace-separated fields: major, minor, the
/// device name at index 2, then the I/O counters at indices 3-10, 12, 13.
pub fn parse_diskstats_row(line: &str) -> Result<DiskSample, CollectError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 14 {
        return Err(CollectError::InsufficientData {
            source: "diskstats",
            detail: format!("expected >= 14 fields, got {}", fields.len()),
        });
    }

    let counter = |idx: usize, what: &str| parse_counter(fields[idx], "diskstats", what);

    Ok(DiskSample {
        name: fields[2].to_string(),
        reads: counter(3, "reads")?,
        reads_merged: counter(4, "reads_merged")?,
        sectors_read: counter(5, "sectors_read")?,
        read_time_ms: counter(6, "read_time_ms")?,
        writes: counter(7, "writes")?,
        writes_merged: counter(8, "writes_merged")?,
        sectors_written: counter(9, "sectors_written")?,
        write_time_ms: counter(10, "write_time_ms")?,
        io_time_ms: counter(12, "io_time_ms")?,
        weighted_time_ms: counter(13, "weighted_time_ms")?,
    })
}

/// Parses `/proc/diskstats` content, excluding partition rows.
///
/// Every non-blank row must parse; a bad row fails the whole batch. Zero
/// whole devices after the partition filter is `NoEntities`.
pub fn parse_diskstats(content: &str) -> Result<Vec<DiskSample>, CollectError> {
    let mut disks = Vec::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let sample = parse_diskstats_row(line)?;
        if is_partition(&sample.name) {
            continue;
        }
        disks.push(sample);
    }

    if disks.is_empty() {
        return Err(CollectError::NoEntities {
            source: "diskstats",
        });
    }

    Ok(disks)
}

/// Parses `/proc/net/dev` content.
///
/// The two fixed header lines are skipped; each remaining line is
/// `iface: <16 counters>` with receive bytes at field 0 and transmit bytes
/// at field 8. The loopback interface is included - exclusion is a
/// rendering concern, not a parsing one.
pub fn parse_net_dev(content: &str) -> Result<Vec<NetSample>, CollectError> {
    let mut interfaces = Vec::new();

    for line in content.lines().skip(2) {
        if line.trim().is_empty() {
            continue;
        }
        let (name, counters) =
            line.split_once(':')
                .ok_or_else(|| CollectError::MalformedRecord {
                    source: "net/dev",
                    detail: format!("missing ':' separator: {:?}", line.trim()),
                })?;
        let name = name.trim_start();

        let mut values = [0u64; 16];
        let mut fields = counters.split_whitespace();
        for (i, slot) in values.iter_mut().enumerate() {
            let token = fields.next().ok_or_else(|| CollectError::InsufficientData {
                source: "net/dev",
                detail: format!("{}: expected 16 counters, got {}", name, i),
            })?;
            *slot = parse_counter(token, "net/dev", "interface counter")?;
        }

        interfaces.push(NetSample {
            name: name.to_string(),
            rx_bytes: values[0],
            tx_bytes: values[8],
        });
    }

    if interfaces.is_empty() {
        return Err(CollectError::NoEntities { source: "net/dev" });
    }

    Ok(interfaces)
}
