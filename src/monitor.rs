//! Polling harness: one collection task per collector per round, with a
//! deadline barrier and a uniform recovery policy.
//!
//! Each round fans one `collect()` task per collector out to the worker
//! pool, waits for all of them (bounded by the per-task deadline), and only
//! then reads every collector's formatted output, so all displayed values
//! belong to the same display frame.
//!
//! Recovery policy, applied here and nowhere else: a failing collector
//! keeps its last-good state and last-good output; the frame block is
//! flagged stale for the round. A collector that misses the deadline keeps
//! running and is skipped in later rounds until its task resolves, so no
//! collector ever has two in-flight tasks.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::collector::{CollectError, MetricCollector};
use crate::pool::{PoolClosed, ShutdownMode, TaskHandle, WorkerPool};

/// Freshness of one frame block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// This round's collection succeeded.
    Fresh,
    /// This round's collection failed; the text is the last good output.
    Stale,
    /// The collection task missed its deadline and is still running; the
    /// text is the last rendered output.
    Lagging,
}

/// One collector's contribution to a display frame.
#[derive(Debug, Clone)]
pub struct Block {
    pub name: &'static str,
    pub text: String,
    pub status: BlockStatus,
}

/// All formatted outputs of one polling round.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub blocks: Vec<Block>,
}

type SharedCollector = Arc<Mutex<dyn MetricCollector>>;
type CollectHandle = TaskHandle<Result<(), CollectError>>;

struct Slot {
    name: &'static str,
    collector: SharedCollector,
    /// Last rendered text, reused while the collector lags.
    last_text: String,
    /// Task still in flight from an earlier round, if any.
    pending: Option<CollectHandle>,
}

/// Drives the collector set through the worker pool, one round per poll.
pub struct Monitor {
    pool: WorkerPool,
    slots: Vec<Slot>,
    task_deadline: Duration,
}

impl Monitor {
    /// Creates a monitor with its own pool of `workers` threads.
    ///
    /// `task_deadline` bounds how long one round waits for any single
    /// collection task.
    pub fn new(workers: usize, task_deadline: Duration) -> Self {
        Self {
            pool: WorkerPool::new(workers),
            slots: Vec::new(),
            task_deadline,
        }
    }

    /// Registers a collector; frame blocks keep registration order.
    pub fn add_collector<C>(&mut self, collector: C)
    where
        C: MetricCollector + 'static,
    {
        let name = collector.name();
        let last_text = collector.formatted();
        self.slots.push(Slot {
            name,
            collector: Arc::new(Mutex::new(collector)),
            last_text,
            pending: None,
        });
    }

    /// Number of registered collectors.
    pub fn collectors(&self) -> usize {
        self.slots.len()
    }

    /// Runs one polling round and returns the resulting frame.
    pub fn poll_round(&mut self) -> Frame {
        let started = Instant::now();

        // Fan-out: one task per collector that is not still busy.
        let mut submitted: Vec<Option<CollectHandle>> = Vec::with_capacity(self.slots.len());
        for slot in &mut self.slots {
            if let Some(handle) = slot.pending.take() {
                match handle.try_wait() {
                    Ok(result) => {
                        // The stalled round resolved between polls; its
                        // result only matters for the log.
                        match result {
                            Ok(collect_result) => log_late_result(slot.name, collect_result),
                            Err(fault) => {
                                warn!("{}: stalled collection task fault: {}", slot.name, fault)
                            }
                        }
                    }
                    Err(handle) => {
                        warn!("{}: previous collection still running, skipping round", slot.name);
                        slot.pending = Some(handle);
                        submitted.push(None);
                        continue;
                    }
                }
            }

            let collector = Arc::clone(&slot.collector);
            let task = move || lock_collector(&collector).collect();
            match self.pool.submit(task) {
                Ok(handle) => submitted.push(Some(handle)),
                Err(PoolClosed) => {
                    warn!("{}: worker pool is shut down, skipping round", slot.name);
                    submitted.push(None);
                }
            }
        }

        // Barrier: wait for every task of the round, bounded by the
        // per-task deadline measured from round start.
        let mut statuses = Vec::with_capacity(self.slots.len());
        for (slot, maybe_handle) in self.slots.iter_mut().zip(submitted) {
            let Some(handle) = maybe_handle else {
                let status = if slot.pending.is_some() {
                    BlockStatus::Lagging
                } else {
                    BlockStatus::Stale
                };
                statuses.push(status);
                continue;
            };

            let remaining = self.task_deadline.saturating_sub(started.elapsed());
            let status = match handle.wait_timeout(remaining) {
                Ok(Ok(Ok(()))) => BlockStatus::Fresh,
                Ok(Ok(Err(err))) => {
                    warn!("{}: collection failed: {}", slot.name, err);
                    BlockStatus::Stale
                }
                Ok(Err(fault)) => {
                    warn!("{}: collection task fault: {}", slot.name, fault);
                    BlockStatus::Stale
                }
                Err(handle) => {
                    warn!(
                        "{}: collection exceeded {:?} deadline, displaying last output",
                        slot.name, self.task_deadline
                    );
                    slot.pending = Some(handle);
                    BlockStatus::Lagging
                }
            };
            statuses.push(status);
        }

        // Fan-in: read formatted outputs only after the barrier so the
        // frame is internally consistent. Lagging collectors are not
        // locked - their task still holds the state - and re-display the
        // cached text instead.
        let mut blocks = Vec::with_capacity(self.slots.len());
        for (slot, status) in self.slots.iter_mut().zip(statuses) {
            if status != BlockStatus::Lagging {
                slot.last_text = lock_collector(&slot.collector).formatted();
            }
            blocks.push(Block {
                name: slot.name,
                text: slot.last_text.clone(),
                status,
            });
        }

        debug!("round complete in {:?}", started.elapsed());
        Frame { blocks }
    }

    /// Shuts the pool down, cancelling tasks that never started.
    pub fn shutdown(&mut self) {
        self.pool.shutdown(ShutdownMode::CancelPending);
    }
}

/// Locks a collector, recovering from poisoning: a panicking `collect()`
/// poisons the mutex, but collectors commit state atomically, so the last
/// committed sample is still sound to read.
fn lock_collector(
    collector: &SharedCollector,
) -> std::sync::MutexGuard<'_, dyn MetricCollector + 'static> {
    collector
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn log_late_result(name: &str, result: Result<(), CollectError>) {
    match result {
        Ok(()) => debug!("{}: stalled collection eventually completed", name),
        Err(err) => warn!("{}: stalled collection eventually failed: {}", name, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;
    use crate::collector::{
        CpuCollector, DiskCollector, MemoryCollector, NetCollector,
    };
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::thread;

    fn full_monitor(fs: &MockFs, interval: Duration) -> Monitor {
        let mut monitor = Monitor::new(4, Duration::from_secs(5));
        monitor.add_collector(CpuCollector::new(fs.clone(), "/proc", false));
        monitor.add_collector(MemoryCollector::new(fs.clone(), "/proc"));
        monitor.add_collector(DiskCollector::new(fs.clone(), "/proc", interval));
        monitor.add_collector(NetCollector::new(fs.clone(), "/proc", interval));
        monitor
    }

    fn block<'a>(frame: &'a Frame, name: &str) -> &'a Block {
        frame
            .blocks
            .iter()
            .find(|b| b.name == name)
            .unwrap_or_else(|| panic!("no block named {}", name))
    }

    #[test]
    fn test_first_round_baselines() {
        let fs = MockFs::typical_system();
        let mut monitor = full_monitor(&fs, Duration::from_secs(1));

        let frame = monitor.poll_round();
        assert_eq!(frame.blocks.len(), 4);
        for b in &frame.blocks {
            assert_eq!(b.status, BlockStatus::Fresh, "{} not fresh", b.name);
        }

        // CPU baselines to an explicit 0%, the delta collectors to N/A.
        assert_eq!(block(&frame, "cpu").text, "CPU: 0.0%");
        assert!(block(&frame, "memory").text.starts_with("Memory: "));
        assert_eq!(block(&frame, "disk").text, "Disk: N/A");
        assert_eq!(block(&frame, "net").text, "Network: N/A");
    }

    #[test]
    fn test_second_round_produces_rates() {
        let fs = MockFs::typical_system();
        let mut monitor = full_monitor(&fs, Duration::from_secs(1));
        monitor.poll_round();

        fs.add_file(
            "/proc/stat",
            "cpu  10100 500 3000 80100 1000 200 100 0 0 0\n",
        );
        fs.add_file(
            "/proc/diskstats",
            "   8       0 sda 1100 0 52048 400 2000 0 100000 800 0 900 1200 0 0 0 0\n",
        );
        fs.add_file(
            "/proc/net/dev",
            "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 1000000 0 0 0 0 0 0 0 1000000 0 0 0 0 0 0 0
  eth0: 7097152 0 0 0 0 0 0 0 3048576 0 0 0 0 0 0 0
",
        );

        let frame = monitor.poll_round();
        assert_eq!(block(&frame, "cpu").text, "CPU: 50.0%");
        assert_eq!(
            block(&frame, "disk").text,
            "Disk IO:\n  sda: R 1.0 MiB/s (100 IOPS), W 0.0 MiB/s (0 IOPS), Util 40.0%"
        );
        assert_eq!(
            block(&frame, "net").text,
            "Network:\n  eth0: \u{2193} 2.00 MiB/s, \u{2191} 1.00 MiB/s"
        );
    }

    #[test]
    fn test_failure_marks_stale_and_keeps_output() {
        let fs = MockFs::typical_system();
        let mut monitor = full_monitor(&fs, Duration::from_secs(1));
        monitor.poll_round();

        let good = monitor.poll_round();
        let good_memory = block(&good, "memory").text.clone();

        fs.remove_file("/proc/meminfo");
        let frame = monitor.poll_round();

        let memory = block(&frame, "memory");
        assert_eq!(memory.status, BlockStatus::Stale);
        assert_eq!(memory.text, good_memory);
        // The other collectors are unaffected.
        assert_eq!(block(&frame, "cpu").status, BlockStatus::Fresh);

        // Recovery: the next good poll is fresh again.
        fs.add_file("/proc/meminfo", "MemTotal: 16777216 kB\nMemAvailable: 8388608 kB\n");
        let frame = monitor.poll_round();
        assert_eq!(block(&frame, "memory").status, BlockStatus::Fresh);
    }

    /// Collector whose collect blocks, for deadline tests.
    struct SlowCollector {
        delay: Duration,
        polls: Arc<AtomicU64>,
    }

    impl MetricCollector for SlowCollector {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn collect(&mut self) -> Result<(), CollectError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            Ok(())
        }

        fn formatted(&self) -> String {
            format!("Slow: {} polls", self.polls.load(Ordering::SeqCst))
        }
    }

    #[test]
    fn test_lagging_collector_does_not_block_round() {
        let polls = Arc::new(AtomicU64::new(0));
        let mut monitor = Monitor::new(2, Duration::from_millis(20));
        monitor.add_collector(SlowCollector {
            delay: Duration::from_millis(150),
            polls: Arc::clone(&polls),
        });
        monitor.add_collector(MemoryCollector::new(MockFs::typical_system(), "/proc"));

        let frame = monitor.poll_round();
        let slow = block(&frame, "slow");
        assert_eq!(slow.status, BlockStatus::Lagging);
        // Cached pre-collection output, since the task still owns the state.
        assert_eq!(slow.text, "Slow: 0 polls");
        assert_eq!(block(&frame, "memory").status, BlockStatus::Fresh);

        // While the task is in flight no second task is submitted.
        let frame = monitor.poll_round();
        assert_eq!(block(&frame, "slow").status, BlockStatus::Lagging);

        // After the stalled task resolves, a fresh task is submitted -
        // exactly one, never a second while the first was in flight.
        thread::sleep(Duration::from_millis(200));
        let frame = monitor.poll_round();
        assert_eq!(block(&frame, "slow").status, BlockStatus::Lagging);
        let deadline = Instant::now() + Duration::from_secs(2);
        while polls.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(polls.load(Ordering::SeqCst), 2);
    }

    /// Collector that panics on collect, for fault containment tests.
    struct PanickyCollector;

    impl MetricCollector for PanickyCollector {
        fn name(&self) -> &'static str {
            "panicky"
        }

        fn collect(&mut self) -> Result<(), CollectError> {
            panic!("boom");
        }

        fn formatted(&self) -> String {
            "Panicky: N/A".to_string()
        }
    }

    #[test]
    fn test_panicking_collector_is_contained() {
        let mut monitor = Monitor::new(2, Duration::from_secs(1));
        monitor.add_collector(PanickyCollector);
        monitor.add_collector(MemoryCollector::new(MockFs::typical_system(), "/proc"));

        let frame = monitor.poll_round();
        assert_eq!(block(&frame, "panicky").status, BlockStatus::Stale);
        assert_eq!(block(&frame, "memory").status, BlockStatus::Fresh);
    }

    #[test]
    fn test_shutdown_is_clean() {
        let fs = MockFs::typical_system();
        let mut monitor = full_monitor(&fs, Duration::from_secs(1));
        monitor.poll_round();
        monitor.shutdown();

        // Rounds after shutdown degrade to cached output, never panic.
        let frame = monitor.poll_round();
        assert_eq!(frame.blocks.len(), 4);
    }
}
