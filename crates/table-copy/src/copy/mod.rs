//! Per-table copy engine: reference healing and batched insertion.
//!
//! - [`resolver`]: checks foreign-key values against the target and nulls the
//!   ones that point nowhere
//! - [`inserter`]: writes cleaned rows in duplicate-tolerant batches
//! - [`stats`]: counters and diagnostics produced along the way

pub mod inserter;
pub mod resolver;
pub mod stats;

pub use inserter::insert_batch;
pub use resolver::{CleanedRows, ReferenceIndex, ReferenceResolver, LOOKUP_CHUNK_SIZE};
pub use stats::{CopyStats, FkColumnSummary, FkValidationSummary};
