use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use sqltojson_config::shared::SchemaConfig;
use tracing::warn;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::schema::{IndexMapping, Mapping, QueryTemplate};
use crate::types::{FieldType, Record};

/// Stable identity of a node in a [`SchemaTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaId(usize);

/// One level of the document tree together with the field types inferred for it so far.
#[derive(Debug)]
pub struct SchemaNode {
    doc_type: String,
    key: Vec<String>,
    exclude: Vec<String>,
    query: QueryTemplate,
    nested: Vec<(String, SchemaId)>,
    fields: Mutex<BTreeMap<String, FieldType>>,
}

impl SchemaNode {
    pub fn doc_type(&self) -> &str {
        &self.doc_type
    }

    /// Fields passed as parameters to the nested queries.
    pub fn key(&self) -> &[String] {
        &self.key
    }

    /// Fields stripped from every record built with this node.
    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    pub fn query(&self) -> &QueryTemplate {
        &self.query
    }

    /// Nested children as `(field name, node)` pairs, ordered by field name.
    pub fn nested(&self) -> &[(String, SchemaId)] {
        &self.nested
    }

    /// Returns the type registered for `name`, if any.
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.lock_fields().get(name).copied()
    }

    /// Registers `field_type` for `name` unless the field already has a type.
    ///
    /// Returns `true` if this call set the type.
    pub fn register_field(&self, name: &str, field_type: FieldType) -> bool {
        let mut fields = self.lock_fields();
        if fields.contains_key(name) {
            return false;
        }

        fields.insert(name.to_string(), field_type);
        true
    }

    /// Registers the type of every non-null field of `record` that has no type yet.
    ///
    /// Values without an index counterpart are logged and skipped.
    pub fn infer_fields(&self, record: &Record) {
        let mut fields = self.lock_fields();

        for (name, value) in record.iter() {
            if value.is_null() || fields.contains_key(name) {
                continue;
            }

            match FieldType::infer(value) {
                Some(field_type) => {
                    fields.insert(name.to_string(), field_type);
                }
                None => {
                    warn!(
                        schema = %self.doc_type,
                        field = name,
                        value_type = value.type_name(),
                        "unknown value type, field left out of the mapping"
                    );
                }
            }
        }
    }

    fn nested_child(&self, name: &str) -> Option<SchemaId> {
        self.nested
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, id)| *id)
    }

    fn lock_fields(&self) -> MutexGuard<'_, BTreeMap<String, FieldType>> {
        // The map is only ever mutated by single inserts, so a poisoned lock still holds a
        // consistent map.
        self.fields.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Arena holding every node of a schema tree, the root at [`SchemaTree::root`].
///
/// The tree is shared read-only between workers; only the per-node field maps change during a run,
/// each behind its own lock.
#[derive(Debug)]
pub struct SchemaTree {
    nodes: Vec<SchemaNode>,
}

impl SchemaTree {
    /// Builds the arena from a schema configuration, validating it first.
    pub fn from_config(config: &SchemaConfig) -> EtlResult<Self> {
        if let Err(err) = config.validate() {
            return Err(etl_error!(
                ErrorKind::ConfigError,
                "Invalid schema configuration",
                err.to_string(),
                source: err
            ));
        }

        let mut nodes = Vec::new();
        Self::add_node(&mut nodes, config);

        Ok(Self { nodes })
    }

    fn add_node(nodes: &mut Vec<SchemaNode>, config: &SchemaConfig) -> SchemaId {
        let id = SchemaId(nodes.len());
        nodes.push(SchemaNode {
            doc_type: config.doc_type.clone(),
            key: config.key.clone(),
            exclude: config.exclude.clone(),
            query: QueryTemplate::parse(&config.sql),
            nested: Vec::with_capacity(config.nested.len()),
            fields: Mutex::new(BTreeMap::new()),
        });

        for (name, nested) in &config.nested {
            let child = Self::add_node(nodes, nested);
            nodes[id.0].nested.push((name.clone(), child));
        }

        id
    }

    pub fn root(&self) -> SchemaId {
        SchemaId(0)
    }

    pub fn node(&self, id: SchemaId) -> &SchemaNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns a snapshot of the properties inferred for `id`, nested nodes included.
    pub fn properties(&self, id: SchemaId) -> BTreeMap<String, Mapping> {
        let node = self.node(id);
        let fields = node.lock_fields().clone();

        fields
            .into_iter()
            .map(|(name, field_type)| {
                let mapping = match node.nested_child(&name) {
                    Some(child) if field_type == FieldType::Nested => {
                        Mapping::nested(self.properties(child))
                    }
                    _ => Mapping::leaf(field_type),
                };
                (name, mapping)
            })
            .collect()
    }

    /// Returns a snapshot of the mapping of `id` as a nested field.
    pub fn mapping(&self, id: SchemaId) -> Mapping {
        Mapping::nested(self.properties(id))
    }

    /// Returns the index mapping document for the root type.
    pub fn index_mapping(&self) -> IndexMapping {
        let root = self.root();
        IndexMapping::new(self.node(root).doc_type(), self.properties(root))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::types::Value;

    fn config() -> SchemaConfig {
        let lab = SchemaConfig {
            doc_type: "lab".to_string(),
            sql: "select * from lab where visit_id = :visit_id".to_string(),
            ..Default::default()
        };

        let mut visit = SchemaConfig {
            doc_type: "visit".to_string(),
            key: vec!["visit_id".to_string()],
            sql: "select * from visit where patient_id = :id".to_string(),
            ..Default::default()
        };
        visit.nested.insert("labs".to_string(), lab);

        let mut patient = SchemaConfig {
            doc_type: "patient".to_string(),
            key: vec!["id".to_string()],
            exclude: vec!["ssn".to_string()],
            sql: "select * from patient".to_string(),
            ..Default::default()
        };
        patient.nested.insert("visits".to_string(), visit);
        patient
    }

    #[test]
    fn builds_arena_in_depth_first_order() {
        let tree = SchemaTree::from_config(&config()).unwrap();

        assert_eq!(tree.len(), 3);
        let root = tree.node(tree.root());
        assert_eq!(root.doc_type(), "patient");
        assert_eq!(root.exclude(), ["ssn"]);

        let (name, visit) = &root.nested()[0];
        assert_eq!(name, "visits");
        assert_eq!(
            tree.node(*visit).query().sql(),
            "select * from visit where patient_id = $1"
        );
    }

    #[test]
    fn invalid_schema_is_a_config_error() {
        let mut config = config();
        config.key.clear();

        let err = SchemaTree::from_config(&config).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[test]
    fn first_registered_type_wins() {
        let tree = SchemaTree::from_config(&config()).unwrap();
        let root = tree.node(tree.root());

        assert!(root.register_field("age", FieldType::Integer));
        assert!(!root.register_field("age", FieldType::Long));

        let record: Record = [("age", Value::F64(1.0))].into_iter().collect();
        root.infer_fields(&record);

        assert_eq!(root.field_type("age"), Some(FieldType::Integer));
    }

    #[test]
    fn nulls_and_unknown_types_are_not_mapped() {
        let tree = SchemaTree::from_config(&config()).unwrap();
        let root = tree.node(tree.root());

        let record: Record = [
            ("name", Value::Null),
            ("blob", Value::Bytes(vec![1, 2])),
            ("active", Value::Bool(true)),
        ]
        .into_iter()
        .collect();
        root.infer_fields(&record);

        assert_eq!(root.field_type("name"), None);
        assert_eq!(root.field_type("blob"), None);
        assert_eq!(root.field_type("active"), Some(FieldType::Boolean));

        let record: Record = [("name", Value::from("ada"))].into_iter().collect();
        root.infer_fields(&record);
        assert_eq!(root.field_type("name"), Some(FieldType::String));
    }

    #[test]
    fn snapshot_embeds_nested_properties() {
        let tree = SchemaTree::from_config(&config()).unwrap();
        let root_id = tree.root();
        let root = tree.node(root_id);
        let (_, visit_id) = root.nested()[0];
        let visit = tree.node(visit_id);

        root.register_field("visits", FieldType::Nested);
        root.register_field("id", FieldType::Integer);
        visit.register_field("labs", FieldType::Nested);
        visit.register_field("visit_id", FieldType::Long);

        let properties = tree.properties(root_id);

        assert_eq!(properties["id"], Mapping::leaf(FieldType::Integer));
        let visits = &properties["visits"];
        assert_eq!(visits.field_type, FieldType::Nested);
        assert_eq!(
            visits.properties["visit_id"],
            Mapping::leaf(FieldType::Long)
        );
        assert_eq!(
            visits.properties["labs"],
            Mapping::nested(BTreeMap::new())
        );
        assert_eq!(tree.index_mapping().doc_type(), "patient");
    }

    #[test]
    fn concurrent_registration_keeps_one_type() {
        let tree = Arc::new(SchemaTree::from_config(&config()).unwrap());

        let handles: Vec<_> = [FieldType::Integer, FieldType::Long, FieldType::Short]
            .into_iter()
            .map(|field_type| {
                let tree = tree.clone();
                std::thread::spawn(move || {
                    let root = tree.node(tree.root());
                    root.register_field("count", field_type)
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
        assert!(tree.node(tree.root()).field_type("count").is_some());
    }
}
