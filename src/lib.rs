//! sysmon - periodic system resource monitor library.
//!
//! This library provides the core functionality behind the `sysmon` binary:
//! - `collector` - delta-sampling collectors over `/proc`-style text sources
//! - `pool` - the fixed worker pool that runs one collection task per
//!   collector each polling round
//! - `monitor` - the round orchestrator producing one display frame per poll

pub mod collector;
pub mod monitor;
pub mod pool;
