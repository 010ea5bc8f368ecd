//! Exports relational data as nested JSON documents ready for bulk ingestion into a search index.
//!
//! A [`schema::SchemaTree`] describes a root query and a tree of nested queries correlated to their
//! parent rows through key fields. The [`pipeline::Pipeline`] streams the root query through a
//! bounded queue into a pool of build workers. Each worker materializes the nested tree of one
//! root record by issuing parameterized sub-queries against a [`source::Source`], infers the
//! field types of everything it builds, and hands the finished document to a
//! [`destination::Destination`]. Once every worker has drained, the inferred mapping is written.

pub mod builder;
pub mod concurrency;
pub mod destination;
pub mod error;
mod macros;
pub mod metrics;
pub mod pipeline;
pub mod schema;
pub mod source;
pub mod types;
pub mod workers;
