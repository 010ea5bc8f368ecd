#![allow(dead_code)]

use std::time::Duration;

use sqltojson::destination::memory::MemoryDestination;
use sqltojson::pipeline::{Pipeline, PipelineConfig};
use sqltojson::schema::SchemaTree;
use sqltojson::source::memory::MemorySource;
use sqltojson::types::{Record, Value};
use sqltojson_config::shared::SchemaConfig;

pub const PATIENTS: &str = "select * from patient";
pub const VISITS: &str = "select * from visit where patient_id = :id";
pub const LABS: &str = "select * from lab where visit_id = :visit_id";

/// Root schema without nested queries.
pub fn flat_schema() -> SchemaConfig {
    SchemaConfig {
        doc_type: "patient".to_string(),
        sql: PATIENTS.to_string(),
        ..Default::default()
    }
}

/// Patients with their visits, each visit with its labs.
pub fn nested_schema() -> SchemaConfig {
    let labs = SchemaConfig {
        doc_type: "lab".to_string(),
        sql: LABS.to_string(),
        ..Default::default()
    };

    let mut visits = SchemaConfig {
        doc_type: "visit".to_string(),
        key: vec!["visit_id".to_string()],
        sql: VISITS.to_string(),
        ..Default::default()
    };
    visits.nested.insert("labs".to_string(), labs);

    let mut patient = SchemaConfig {
        doc_type: "patient".to_string(),
        key: vec!["id".to_string()],
        exclude: vec!["ssn".to_string()],
        sql: PATIENTS.to_string(),
        ..Default::default()
    };
    patient.nested.insert("visits".to_string(), visits);

    patient
}

pub fn patient(id: i32) -> Record {
    [
        ("id", Value::I32(id)),
        ("name", Value::from(format!("patient {id}"))),
        ("ssn", Value::from("000-00-0000")),
    ]
    .into_iter()
    .collect()
}

/// Scripts `roots` patients, `visits_per_patient` visits each and one lab per visit.
pub async fn clinic_source(roots: i32, visits_per_patient: i64) -> MemorySource {
    let source = MemorySource::new();
    source
        .add_rows(PATIENTS, (1..=roots).map(patient).collect())
        .await;
    source
        .add_resolver(VISITS, move |params| {
            let Some(Value::I32(id)) = params.get("id") else {
                return Vec::new();
            };

            (0..visits_per_patient)
                .map(|n| -> Record {
                    [
                        ("visit_id", Value::I64(i64::from(*id) * 1_000 + n)),
                        ("kind", Value::from("checkup")),
                    ]
                    .into_iter()
                    .collect()
                })
                .collect()
        })
        .await;
    source
        .add_resolver(LABS, |params| {
            let Some(visit_id) = params.get("visit_id").cloned() else {
                return Vec::new();
            };

            vec![
                [
                    ("visit_id", visit_id),
                    ("value", Value::F64(4.2)),
                    ("flag", Value::Null),
                ]
                .into_iter()
                .collect(),
            ]
        })
        .await;
    source
}

pub fn pipeline_config(workers: u16, max_retries: u32) -> PipelineConfig {
    PipelineConfig {
        workers,
        max_retries,
        retry_delay: Duration::from_millis(5),
        max_jitter: Duration::ZERO,
        handle_signals: false,
    }
}

pub fn create_pipeline(
    config: PipelineConfig,
    schema: &SchemaConfig,
    source: MemorySource,
    destination: MemoryDestination,
) -> Pipeline<MemorySource, MemoryDestination> {
    let tree = SchemaTree::from_config(schema).expect("schema is valid");

    Pipeline::new(config, tree, source, destination).with_stats_writer(Box::new(tokio::io::sink()))
}
