//! Row sources the export reads from.
//!
//! The [`Source`] trait executes the root query as a stream and nested queries as bounded
//! fetches. [`postgres::PgSource`] reads from Postgres, [`memory::MemorySource`] serves scripted
//! rows for tests.

mod base;
pub mod memory;
pub mod postgres;

pub use base::Source;
