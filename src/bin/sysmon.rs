//! sysmon - terminal system resource monitor.
//!
//! Polls CPU, memory, disk and network counters from `/proc` at a
//! configurable period and redraws one text frame per round until
//! interrupted.
//!
//! Usage:
//!   sysmon                    # 1 second period
//!   sysmon -p 250ms           # faster polling
//!   sysmon --per-core         # include per-core CPU utilization
//!   sysmon --log-file sysmon.log -v

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Local;
use clap::Parser;
use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(not(target_os = "linux"))]
use sysmon::collector::MockFs;
#[cfg(target_os = "linux")]
use sysmon::collector::RealFs;
use sysmon::collector::{
    CpuCollector, DiskCollector, FileSystem, MemoryCollector, NetCollector,
};
use sysmon::monitor::{BlockStatus, Frame, Monitor};

/// Terminal system resource monitor.
#[derive(Parser)]
#[command(name = "sysmon", about = "Terminal system resource monitor", version)]
struct Args {
    /// Poll period, e.g. "1s", "500ms", "2s".
    #[arg(short = 'p', long, default_value = "1s", value_parser = parse_period)]
    period: Duration,

    /// Also track and display per-core CPU utilization.
    #[arg(long)]
    per_core: bool,

    /// Worker threads in the collection pool.
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, default_value = "/proc")]
    proc_path: String,

    /// Per-collection-task deadline in milliseconds.
    /// Defaults to the poll period; a collector that misses it keeps its
    /// last output on screen instead of stalling the whole frame.
    #[arg(long, value_name = "MS")]
    task_deadline: Option<u64>,

    /// Append timestamped log entries to this file instead of stderr.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only log errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Parses a poll period string like "1s", "2s" or "250ms" into a duration.
fn parse_period(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    let (num_str, unit_ms) = if let Some(num) = s.strip_suffix("ms") {
        (num, 1u64)
    } else if let Some(num) = s.strip_suffix('s') {
        (num, 1000u64)
    } else {
        return Err(format!(
            "invalid period '{}': expected <number>s or <number>ms",
            s
        ));
    };

    let value: u64 = num_str
        .trim()
        .parse()
        .map_err(|e| format!("invalid period '{}': {}", s, e))?;
    if value == 0 {
        return Err("period must be greater than zero".to_string());
    }

    Ok(Duration::from_millis(value * unit_ms))
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool, log_file: Option<&Path>) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("sysmon={}", level).parse().unwrap());

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match log_file {
        Some(path) => {
            let file = match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => file,
                Err(e) => {
                    eprintln!("Error: cannot open log file '{}': {}", path.display(), e);
                    std::process::exit(1);
                }
            };
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => builder.with_writer(io::stderr).init(),
    }
}

/// Clears the terminal and draws one frame of collector blocks.
fn render_frame(out: &mut impl Write, frame: &Frame) -> io::Result<()> {
    execute!(out, Clear(ClearType::All), MoveTo(0, 0))?;

    writeln!(
        out,
        "sysmon - {} - press Ctrl+C to exit",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )?;
    for block in &frame.blocks {
        match block.status {
            BlockStatus::Fresh => writeln!(out, "{}", block.text)?,
            BlockStatus::Stale => writeln!(out, "{} (stale)", block.text)?,
            BlockStatus::Lagging => writeln!(out, "{} (stalled)", block.text)?,
        }
    }
    out.flush()
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet, args.log_file.as_deref());

    if args.workers == 0 {
        eprintln!("Error: --workers must be at least 1");
        std::process::exit(1);
    }

    info!("sysmon {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: period={:?}, workers={}, per_core={}, proc={}",
        args.period, args.workers, args.per_core, args.proc_path
    );

    #[cfg(target_os = "linux")]
    let fs = RealFs::new();
    #[cfg(not(target_os = "linux"))]
    let fs = MockFs::typical_system();

    if !fs.exists(&Path::new(&args.proc_path).join("stat")) {
        warn!(
            "{}/stat not readable; collectors will report N/A until it appears",
            args.proc_path
        );
    }

    let task_deadline = args
        .task_deadline
        .map(Duration::from_millis)
        .unwrap_or(args.period);

    let mut monitor = Monitor::new(args.workers, task_deadline);
    monitor.add_collector(CpuCollector::new(fs.clone(), &args.proc_path, args.per_core));
    monitor.add_collector(MemoryCollector::new(fs.clone(), &args.proc_path));
    monitor.add_collector(DiskCollector::new(fs.clone(), &args.proc_path, args.period));
    monitor.add_collector(NetCollector::new(fs.clone(), &args.proc_path, args.period));
    info!(
        "Collectors registered: {} (task deadline {:?})",
        monitor.collectors(),
        task_deadline
    );

    // Setup graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    info!("Starting polling loop");

    let mut stdout = io::stdout();
    while running.load(Ordering::SeqCst) {
        let frame = monitor.poll_round();

        if let Err(e) = render_frame(&mut stdout, &frame) {
            error!("Failed to render frame: {}", e);
        }

        // Sleep with periodic checks for the shutdown signal
        let sleep_interval = Duration::from_millis(100);
        let mut remaining = args.period;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let sleep_time = remaining.min(sleep_interval);
            std::thread::sleep(sleep_time);
            remaining = remaining.saturating_sub(sleep_time);
        }
    }

    info!("Shutting down...");
    monitor.shutdown();
    info!("Shutdown complete");
}
