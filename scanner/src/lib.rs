pub mod decoder;
pub mod detector;
pub mod display;
pub mod geometry;
pub mod handoff;
pub mod input;
pub mod overlay;
pub mod scan_loop;

#[cfg(test)]
mod testutil;

pub use scan_loop::{ScanReport, ScanSettings, Scanner, StopReason};
