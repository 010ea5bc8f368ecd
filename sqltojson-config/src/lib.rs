//! Configuration for the sqltojson exporter.
//!
//! Holds the serde types describing an export run (source connection, output files, worker limits,
//! and the tree of root and nested queries) together with the loader that layers environment
//! variable overrides on top of a configuration file.

mod load;
pub mod shared;

pub use load::{Config, LoadConfigError, load_config};
