//! Tracing setup shared by the exporter binary and the test suites.

pub mod tracing;
