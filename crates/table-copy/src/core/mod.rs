//! Core abstractions shared by the drivers and the copy engine.
//!
//! - [`value`]: SQL values and their key form
//! - [`row`]: fetched rows
//! - [`identifier`]: identifier validation and quoting
//! - [`traits`]: the [`SourceReader`] and [`TargetWriter`] seams

pub mod identifier;
pub mod row;
pub mod traits;
pub mod value;

pub use identifier::{quote_mysql, validate_identifier};
pub use row::{Row, ID_COLUMN};
pub use traits::{InsertOutcome, SourceReader, TargetWriter};
pub use value::{PkValue, SqlValue};
