//! Delta-sampling resource collectors for Linux `/proc` text sources.
//!
//! Each collector reads one kernel-exposed table, keeps the previous raw
//! sample per entity, and derives rate/percentage metrics across consecutive
//! polls.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Monitor                           │
//! │  ┌──────────┐ ┌──────────────┐ ┌─────────┐ ┌─────────┐   │
//! │  │ CpuColl. │ │ MemoryColl.  │ │DiskColl.│ │NetColl. │   │
//! │  │ /proc/   │ │ /proc/       │ │ /proc/  │ │ /proc/  │   │
//! │  │ stat     │ │ meminfo      │ │diskstats│ │ net/dev │   │
//! │  └────┬─────┘ └──────┬───────┘ └────┬────┘ └────┬────┘   │
//! │       └──────────────┴───────┬──────┴───────────┘        │
//! │                       ┌──────▼──────┐                    │
//! │                       │  FileSystem │ (trait)            │
//! │                       └──────┬──────┘                    │
//! └──────────────────────────────┼───────────────────────────┘
//!                ┌───────────────┴───────────────┐
//!         ┌──────▼──────┐                 ┌──────▼──────┐
//!         │   RealFs    │                 │   MockFs    │
//!         │  (Linux)    │                 │  (Testing)  │
//!         └─────────────┘                 └─────────────┘
//! ```
//!
//! A collector's `collect()` either commits a complete new sample or returns
//! an error leaving all state untouched; `formatted()` always succeeds and
//! renders the last committed metrics (an `N/A` sentinel before the first
//! good sample).

pub mod cpu;
pub mod disk;
pub mod memory;
pub mod mock;
pub mod net;
pub mod parser;
pub mod rates;
pub mod traits;

use std::io;

pub use cpu::CpuCollector;
pub use disk::DiskCollector;
pub use memory::MemoryCollector;
pub use mock::MockFs;
pub use net::NetCollector;
pub use traits::{FileSystem, RealFs};

/// Error type for collection failures.
///
/// Every variant names the logical source it came from (`"stat"`,
/// `"meminfo"`, `"diskstats"`, `"net/dev"`) so harness-level logs stay
/// attributable without collectors doing their own logging.
#[derive(Debug)]
pub enum CollectError {
    /// The source file could not be opened or read.
    ResourceUnavailable { path: String, source: io::Error },
    /// A record failed the expected numeric shape.
    MalformedRecord {
        source: &'static str,
        detail: String,
    },
    /// Fewer fields or lines than the format requires.
    InsufficientData {
        source: &'static str,
        detail: String,
    },
    /// Zero qualifying devices/interfaces after filtering.
    NoEntities { source: &'static str },
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::ResourceUnavailable { path, source } => {
                write!(f, "cannot read {}: {}", path, source)
            }
            CollectError::MalformedRecord { source, detail } => {
                write!(f, "malformed record in {}: {}", source, detail)
            }
            CollectError::InsufficientData { source, detail } => {
                write!(f, "insufficient data in {}: {}", source, detail)
            }
            CollectError::NoEntities { source } => {
                write!(f, "no qualifying entities in {}", source)
            }
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollectError::ResourceUnavailable { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Capability contract shared by the four resource collectors.
///
/// `collect()` must not be invoked concurrently on the same instance; the
/// polling harness guarantees at most one in-flight task per collector.
pub trait MetricCollector: Send {
    /// Short display label, also used in harness logs ("cpu", "memory", ...).
    fn name(&self) -> &'static str;

    /// Reads the resource's raw source and updates internal state.
    ///
    /// On failure no state is committed: the previous sample map and the
    /// last formatted output remain whatever they were before the call.
    fn collect(&mut self) -> Result<(), CollectError>;

    /// Returns the last computed presentation.
    ///
    /// Always succeeds; yields the collector's `N/A` sentinel while no
    /// valid sample exists.
    fn formatted(&self) -> String;
}
