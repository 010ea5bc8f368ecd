//! Destinations receiving the built documents and the inferred mapping.

mod base;
pub mod bulk;
pub mod memory;

pub use base::Destination;
