use std::path::Path;

use serde::Serialize;
use sqltojson_config::shared::{FilesConfig, OutputTarget};
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::info;

use crate::destination::Destination;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::schema::IndexMapping;
use crate::types::Record;

type DataWriter = BufWriter<Box<dyn AsyncWrite + Send + Unpin>>;

#[derive(Serialize)]
struct ActionTarget<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_type")]
    doc_type: &'a str,
}

#[derive(Serialize)]
struct BulkAction<'a> {
    create: ActionTarget<'a>,
}

/// Destination writing newline-delimited bulk ingestion data.
///
/// Every record is preceded by a `{"create": {"_index": .., "_type": ..}}` action header. The data
/// output is opened when the destination is created; the mapping output only when the mapping is
/// written, so a failed export leaves no mapping file behind.
pub struct BulkJsonDestination {
    action: Vec<u8>,
    data: Mutex<DataWriter>,
    mapping_target: OutputTarget,
}

impl BulkJsonDestination {
    /// Opens the data output described by `files`, truncating an existing file.
    pub async fn open(files: &FilesConfig, index: &str, doc_type: &str) -> EtlResult<Self> {
        let writer: Box<dyn AsyncWrite + Send + Unpin> = match files.data_target() {
            OutputTarget::Stdout => Box::new(tokio::io::stdout()),
            OutputTarget::File(path) => Box::new(create_file(&path).await?),
        };

        info!(data = %files.data, mapping = %files.mapping, "opened bulk data output");

        Self::from_writer(writer, files.mapping_target(), index, doc_type)
    }

    /// Creates a destination writing data to `writer`.
    pub fn from_writer(
        writer: Box<dyn AsyncWrite + Send + Unpin>,
        mapping_target: OutputTarget,
        index: &str,
        doc_type: &str,
    ) -> EtlResult<Self> {
        Ok(Self {
            action: encode_action(index, doc_type)?,
            data: Mutex::new(BufWriter::new(writer)),
            mapping_target,
        })
    }
}

impl Destination for BulkJsonDestination {
    fn name() -> &'static str {
        "bulk_json"
    }

    async fn shutdown(&self) -> EtlResult<()> {
        let mut data = self.data.lock().await;
        data.flush().await?;

        Ok(())
    }

    async fn write_record(&self, record: Record) -> EtlResult<()> {
        // Encoded before taking the lock so a failure never leaves a dangling header.
        let pair = encode_bulk_pair(&self.action, &record)?;

        let mut data = self.data.lock().await;
        data.write_all(&pair).await?;

        Ok(())
    }

    async fn write_mapping(&self, mapping: &IndexMapping) -> EtlResult<()> {
        let document = mapping.to_json_pretty()?;

        match &self.mapping_target {
            OutputTarget::Stdout => {
                let mut stdout = tokio::io::stdout();
                stdout.write_all(document.as_bytes()).await?;
                stdout.flush().await?;
            }
            OutputTarget::File(path) => {
                let mut file = create_file(path).await?;
                file.write_all(document.as_bytes()).await?;
                file.flush().await?;

                info!(path = %path.display(), "wrote mapping file");
            }
        }

        Ok(())
    }
}

async fn create_file(path: &Path) -> EtlResult<File> {
    File::create(path).await.map_err(|err| {
        etl_error!(
            ErrorKind::IoError,
            "Failed to create output file",
            format!("{}: {err}", path.display()),
            source: err
        )
    })
}

/// Encodes the action header of every record, newline included.
pub(crate) fn encode_action(index: &str, doc_type: &str) -> EtlResult<Vec<u8>> {
    let action = BulkAction {
        create: ActionTarget { index, doc_type },
    };

    let mut encoded = serde_json::to_vec(&action)?;
    encoded.push(b'\n');

    Ok(encoded)
}

/// Encodes the header and record lines written for one record.
pub(crate) fn encode_bulk_pair(action: &[u8], record: &Record) -> EtlResult<Vec<u8>> {
    let mut encoded = Vec::with_capacity(action.len() + 64 * record.len());
    encoded.extend_from_slice(action);
    serde_json::to_writer(&mut encoded, record)?;
    encoded.push(b'\n');

    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde_json::json;

    use super::*;
    use crate::types::Value;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("sqltojson-{name}-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn action_header_names_index_and_type() {
        let action = encode_action("clinic", "patient").unwrap();

        assert_eq!(
            String::from_utf8(action).unwrap(),
            "{\"create\":{\"_index\":\"clinic\",\"_type\":\"patient\"}}\n"
        );
    }

    #[test]
    fn pair_is_two_lines() {
        let action = encode_action("clinic", "patient").unwrap();
        let record: Record = [("id", Value::I32(1)), ("name", Value::from("ada"))]
            .into_iter()
            .collect();

        let pair = String::from_utf8(encode_bulk_pair(&action, &record).unwrap()).unwrap();
        let lines: Vec<&str> = pair.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], r#"{"id":1,"name":"ada"}"#);
    }

    #[tokio::test]
    async fn writes_data_and_mapping_files() {
        let files = FilesConfig {
            data: temp_path("data").display().to_string(),
            mapping: temp_path("mapping").display().to_string(),
        };

        let destination = BulkJsonDestination::open(&files, "clinic", "patient")
            .await
            .unwrap();
        for id in 0..2 {
            let record: Record = [("id", Value::I32(id))].into_iter().collect();
            destination.write_record(record).await.unwrap();
        }
        destination.shutdown().await.unwrap();

        // The mapping file only exists once the mapping is written.
        assert!(!Path::new(&files.mapping).exists());
        destination
            .write_mapping(&IndexMapping::new("patient", Default::default()))
            .await
            .unwrap();

        let data = tokio::fs::read_to_string(&files.data).await.unwrap();
        let values: Vec<serde_json::Value> = data
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(values.len(), 4);
        assert_eq!(
            values[0],
            json!({"create": {"_index": "clinic", "_type": "patient"}})
        );
        assert_eq!(values[3], json!({"id": 1}));

        let mapping = tokio::fs::read_to_string(&files.mapping).await.unwrap();
        let mapping: serde_json::Value = serde_json::from_str(&mapping).unwrap();
        assert_eq!(mapping, json!({"mappings": {"patient": {"properties": {}}}}));

        tokio::fs::remove_file(&files.data).await.unwrap();
        tokio::fs::remove_file(&files.mapping).await.unwrap();
    }
}
