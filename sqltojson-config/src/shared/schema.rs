use std::collections::BTreeMap;

use serde::Deserialize;

use crate::shared::ValidationError;

/// Declarative definition of one level of the document tree.
///
/// The root schema describes the query whose rows become documents. Every entry in
/// [`SchemaConfig::nested`] describes a query executed once per parent row, parameterized by the
/// parent's [`SchemaConfig::key`] fields, whose rows are embedded under the entry's name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaConfig {
    /// Name of the document type produced by this schema.
    #[serde(rename = "type", default)]
    pub doc_type: String,
    /// Fields of this schema's rows passed as named parameters to nested queries.
    #[serde(default)]
    pub key: Vec<String>,
    /// Fields removed from every built record.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Query template; nested queries reference key fields as `:name`.
    #[serde(default)]
    pub sql: String,
    /// Nested schemas keyed by the field name they are embedded under.
    #[serde(default)]
    pub nested: BTreeMap<String, SchemaConfig>,
}

impl SchemaConfig {
    /// Validates the schema tree.
    ///
    /// A schema with nested schemas must declare at least one key field, otherwise nested rows
    /// cannot be correlated to their parent.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_at(&self.doc_type)
    }

    fn validate_at(&self, path: &str) -> Result<(), ValidationError> {
        if self.nested.is_empty() {
            return Ok(());
        }

        if self.key.is_empty() {
            return Err(ValidationError::MissingNestedKey {
                path: path.to_string(),
            });
        }

        for (name, nested) in &self.nested {
            nested.validate_at(&format!("{path}/{name}"))?;
        }

        Ok(())
    }
}
