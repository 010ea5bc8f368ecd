//! Dynamically typed rows and the field types inferred from them.

mod field_type;
mod record;
mod value;

pub use field_type::FieldType;
pub use record::Record;
pub use value::Value;
