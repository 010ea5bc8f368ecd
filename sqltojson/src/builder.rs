//! Recursive materialization of one record's nested tree.

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::EtlResult;
use crate::schema::{Params, SchemaId, SchemaTree};
use crate::source::Source;
use crate::types::{FieldType, Record, Value};

/// Builds `record` according to the schema node `id`.
///
/// Every nested query of the node is executed with the record's key fields as parameters, unless
/// its field is excluded. The returned rows are built recursively and attached under the nested
/// field name. Excluded fields are then removed and the types of the remaining fields are
/// registered on the node.
///
/// Any query failure aborts the build. The record may be partially filled at that point, so a
/// retry must start again from the original row.
pub fn build_record<'a, S>(
    source: &'a S,
    tree: &'a SchemaTree,
    id: SchemaId,
    record: &'a mut Record,
) -> BoxFuture<'a, EtlResult<()>>
where
    S: Source + Sync,
{
    async move {
        let node = tree.node(id);

        if !node.nested().is_empty() {
            let params = Params::from_record(record, node.key());

            for (name, child_id) in node.nested() {
                // An excluded nested field is neither queried nor mapped.
                if node.exclude().contains(name) {
                    continue;
                }

                let mut children = source
                    .fetch_all(tree.node(*child_id).query(), &params)
                    .await?;

                for child in children.iter_mut() {
                    build_record(source, tree, *child_id, child).await?;
                }

                record.insert(name.as_str(), Value::Nested(children));
                node.register_field(name, FieldType::Nested);
            }
        }

        for field in node.exclude() {
            record.remove(field);
        }

        node.infer_fields(record);

        Ok(())
    }
    .boxed()
}
