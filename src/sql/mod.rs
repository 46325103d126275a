//! Safe SQL generation: identifiers come from declared schemas only, values
//! are always bound as parameters.

mod builder;
mod compile;
mod date;
pub mod exec;
mod filter;
mod relational;

pub use builder::*;
pub use compile::{FilterCompiler, Fragment};
pub use date::{DateBound, DateCompare, DateQuery, DateValue};
pub use filter::*;
pub use relational::{compile_relationships, JoinFragment};

/// One row of column -> value, in column order.
pub type Row = serde_json::Map<String, serde_json::Value>;
