//! Static table catalog and dependency order.
//!
//! The [`SchemaRegistry`] is the only source of truth for which tables are
//! copied, in which order, and which of their columns reference other tables.

mod catalog;
mod registry;

pub use catalog::{builtin_tables, BUILTIN_CATALOG};
pub use registry::{ForeignKeyRef, SchemaRegistry, TableSpec};
