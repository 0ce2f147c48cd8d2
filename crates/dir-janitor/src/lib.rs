//! Bounded directory janitor
//!
//! Keeps a directory tree under a set of ceilings (total bytes, file count)
//! by periodically deleting the oldest-modified regular files. One janitor
//! guards one tree; several janitors with different ceilings can run side by
//! side over different trees.

mod policy;
mod scan;
mod sweeper;
mod types;

pub use policy::{Ceiling, EvictionPlan, EvictionPolicy};
pub use scan::{scan_files, ScanResult};
pub use sweeper::{Janitor, JanitorHandle, ReportSlot};
pub use types::{CachedFile, SweepReport, Totals};
