use std::fmt;

use serde::Serialize;

use crate::types::Value;

/// Index field type inferred from a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Nested,
    String,
    Boolean,
    Byte,
    Short,
    Integer,
    Long,
    Float,
    Double,
    Date,
}

impl FieldType {
    /// Infers the field type of `value`.
    ///
    /// Returns `None` for nulls, which never establish a type, and for values without an index
    /// counterpart.
    pub fn infer(value: &Value) -> Option<FieldType> {
        match value {
            Value::Nested(_) => Some(FieldType::Nested),
            Value::String(_) => Some(FieldType::String),
            Value::Bool(_) => Some(FieldType::Boolean),
            Value::I8(_) => Some(FieldType::Byte),
            Value::I16(_) => Some(FieldType::Short),
            Value::I32(_) => Some(FieldType::Integer),
            Value::I64(_) => Some(FieldType::Long),
            Value::F32(_) => Some(FieldType::Float),
            Value::F64(_) => Some(FieldType::Double),
            Value::Timestamp(_) => Some(FieldType::Date),
            Value::Null
            | Value::Numeric(_)
            | Value::Json(_)
            | Value::Bytes(_)
            | Value::Unsupported(_) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Nested => "nested",
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
            FieldType::Byte => "byte",
            FieldType::Short => "short",
            FieldType::Integer => "integer",
            FieldType::Long => "long",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::Date => "date",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn infers_by_width() {
        assert_eq!(FieldType::infer(&Value::I8(1)), Some(FieldType::Byte));
        assert_eq!(FieldType::infer(&Value::I16(1)), Some(FieldType::Short));
        assert_eq!(FieldType::infer(&Value::I32(1)), Some(FieldType::Integer));
        assert_eq!(FieldType::infer(&Value::I64(1)), Some(FieldType::Long));
        assert_eq!(FieldType::infer(&Value::F32(1.0)), Some(FieldType::Float));
        assert_eq!(FieldType::infer(&Value::F64(1.0)), Some(FieldType::Double));
        assert_eq!(
            FieldType::infer(&Value::Timestamp(Utc::now())),
            Some(FieldType::Date)
        );
        assert_eq!(
            FieldType::infer(&Value::Nested(Vec::new())),
            Some(FieldType::Nested)
        );
    }

    #[test]
    fn null_and_unknown_values_have_no_type() {
        assert_eq!(FieldType::infer(&Value::Null), None);
        assert_eq!(FieldType::infer(&Value::Bytes(vec![1])), None);
        assert_eq!(
            FieldType::infer(&Value::Unsupported("INTERVAL".to_string())),
            None
        );
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&FieldType::Boolean).unwrap(),
            "\"boolean\""
        );
    }
}
