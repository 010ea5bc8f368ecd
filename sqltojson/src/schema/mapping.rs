use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::EtlResult;
use crate::types::FieldType;

/// Snapshot of the inferred type of one field.
///
/// Nested fields carry the properties inferred for the rows embedded under them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mapping {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Mapping>,
}

impl Mapping {
    /// Creates a mapping for a scalar field.
    pub fn leaf(field_type: FieldType) -> Self {
        Self {
            field_type,
            properties: BTreeMap::new(),
        }
    }

    /// Creates a mapping for a nested field with the given properties.
    pub fn nested(properties: BTreeMap<String, Mapping>) -> Self {
        Self {
            field_type: FieldType::Nested,
            properties,
        }
    }
}

/// The index mapping document written once an export completes.
///
/// Renders as `{"mappings": {<type>: {"properties": {...}}}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMapping {
    doc_type: String,
    properties: BTreeMap<String, Mapping>,
}

#[derive(Serialize)]
struct TypeMapping<'a> {
    properties: &'a BTreeMap<String, Mapping>,
}

#[derive(Serialize)]
struct MappingsDocument<'a> {
    mappings: BTreeMap<&'a str, TypeMapping<'a>>,
}

impl IndexMapping {
    pub fn new(doc_type: impl Into<String>, properties: BTreeMap<String, Mapping>) -> Self {
        Self {
            doc_type: doc_type.into(),
            properties,
        }
    }

    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    pub fn properties(&self) -> &BTreeMap<String, Mapping> {
        &self.properties
    }

    /// Returns the JSON value of the mapping document.
    pub fn to_json(&self) -> EtlResult<serde_json::Value> {
        Ok(serde_json::to_value(self.document())?)
    }

    /// Returns the pretty-printed mapping document.
    pub fn to_json_pretty(&self) -> EtlResult<String> {
        Ok(serde_json::to_string_pretty(&self.document())?)
    }

    fn document(&self) -> MappingsDocument<'_> {
        let mut mappings = BTreeMap::new();
        mappings.insert(
            self.doc_type.as_str(),
            TypeMapping {
                properties: &self.properties,
            },
        );

        MappingsDocument { mappings }
    }
}
