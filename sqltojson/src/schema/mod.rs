//! Schema tree, query templates, and the type mapping inferred while building records.

mod mapping;
mod query;
mod tree;

pub use mapping::{IndexMapping, Mapping};
pub use query::{Params, QueryTemplate};
pub use tree::{SchemaId, SchemaNode, SchemaTree};
