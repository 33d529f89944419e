//! In-memory mock filesystem for testing collectors without real `/proc`.
//!
//! `MockFs` simulates a filesystem in memory, allowing tests to run on
//! macOS and in CI environments without Linux. Clones share the underlying
//! file map, so a test can keep one handle and mutate file contents between
//! polls while collectors hold their own clones - this is what makes
//! delta-sampling testable: the "kernel counters" can advance between calls
//! to `collect()`.

use crate::collector::traits::FileSystem;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// In-memory filesystem for testing.
///
/// Stores files in memory, allowing tests to simulate various `/proc`
/// filesystem states without needing actual Linux access.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file with the given content, replacing any previous content.
    ///
    /// Visible through every clone of this filesystem.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        self.files
            .lock()
            .expect("mock fs lock poisoned")
            .insert(path.as_ref().to_path_buf(), content.into());
    }

    /// Removes a file, making subsequent reads fail with `NotFound`.
    pub fn remove_file(&self, path: impl AsRef<Path>) {
        self.files
            .lock()
            .expect("mock fs lock poisoned")
            .remove(path.as_ref());
    }

    /// Creates a typical idle system: four CPU cores, 16 GiB of memory with
    /// swap configured, one SATA disk and one NVMe namespace (plus their
    /// partitions), loopback and one ethernet interface.
    pub fn typical_system() -> Self {
        let fs = Self::new();

        fs.add_file(
            "/proc/stat",
            "\
cpu  10000 500 3000 80000 1000 200 100 0 0 0
cpu0 2500 125 750 20000 250 50 25 0 0 0
cpu1 2500 125 750 20000 250 50 25 0 0 0
cpu2 2500 125 750 20000 250 50 25 0 0 0
cpu3 2500 125 750 20000 250 50 25 0 0 0
intr 1000000 50 0 0 0 0 0 0 0 1 0
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 0
",
        );

        fs.add_file(
            "/proc/meminfo",
            "\
MemTotal:       16384000 kB
MemFree:         8192000 kB
MemAvailable:   12000000 kB
Buffers:          512000 kB
Cached:          2048000 kB
SwapTotal:       4096000 kB
SwapFree:        4096000 kB
Dirty:              1024 kB
",
        );

        fs.add_file(
            "/proc/diskstats",
            "\
   8       0 sda 1000 0 50000 400 2000 0 100000 800 0 500 1200 0 0 0 0
   8       1 sda1 900 0 45000 350 1900 0 95000 750 0 450 1100 0 0 0 0
 259       0 nvme0n1 5000 0 250000 900 8000 0 400000 1500 0 2000 2400 0 0 0 0
 259       1 nvme0n1p1 4900 0 245000 880 7900 0 395000 1480 0 1950 2350 0 0 0 0
",
        );

        fs.add_file(
            "/proc/net/dev",
            "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 1000000    1000    0    0    0     0          0         0  1000000    1000    0    0    0     0       0          0
  eth0: 5000000    4000    0    0    0     0          0         0  2000000    3000    0    0    0     0       0          0
",
        );

        fs
    }
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.files
            .lock()
            .expect("mock fs lock poisoned")
            .get(path)
            .cloned()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("file not found: {:?}", path),
                )
            })
    }

    fn exists(&self, path: &Path) -> bool {
        self.files
            .lock()
            .expect("mock fs lock poisoned")
            .contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typical_system_has_required_files() {
        let fs = MockFs::typical_system();
        for path in [
            "/proc/stat",
            "/proc/meminfo",
            "/proc/diskstats",
            "/proc/net/dev",
        ] {
            assert!(fs.exists(Path::new(path)), "missing {}", path);
        }
    }

    #[test]
    fn test_clones_share_contents() {
        let fs = MockFs::new();
        let clone = fs.clone();

        fs.add_file("/proc/uptime", "100.0 400.0\n");
        assert_eq!(
            clone.read_to_string(Path::new("/proc/uptime")).unwrap(),
            "100.0 400.0\n"
        );

        clone.add_file("/proc/uptime", "200.0 800.0\n");
        assert_eq!(
            fs.read_to_string(Path::new("/proc/uptime")).unwrap(),
            "200.0 800.0\n"
        );
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let fs = MockFs::new();
        let err = fs.read_to_string(Path::new("/proc/stat")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
