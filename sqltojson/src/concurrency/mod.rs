//! Coordination primitives shared by the export workers.

pub mod shutdown;
pub mod signal;
