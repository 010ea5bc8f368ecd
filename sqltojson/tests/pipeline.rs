use std::time::Duration;

use sqltojson::destination::memory::MemoryDestination;
use sqltojson::error::ErrorKind;
use sqltojson::source::memory::MemorySource;
use sqltojson::types::{FieldType, Record, Value};
use sqltojson_telemetry::tracing::init_test_tracing;

mod common;

use common::{
    LABS, PATIENTS, VISITS, clinic_source, create_pipeline, flat_schema, nested_schema,
    pipeline_config,
};

#[tokio::test(flavor = "multi_thread")]
async fn flat_export_emits_one_document_per_row() {
    init_test_tracing();

    let source = MemorySource::new();
    let first: Record = [
        ("id", Value::I32(1)),
        ("name", Value::from("ada")),
        ("score", Value::Null),
    ]
    .into_iter()
    .collect();
    let second: Record = [
        ("id", Value::I64(2)),
        ("name", Value::Null),
        ("score", Value::F64(9.5)),
    ]
    .into_iter()
    .collect();
    source
        .add_rows(PATIENTS, vec![first.clone(), second.clone()])
        .await;

    let destination = MemoryDestination::new();
    let pipeline = create_pipeline(
        pipeline_config(1, 3),
        &flat_schema(),
        source,
        destination.clone(),
    );

    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.queued, 2);
    assert_eq!(summary.emitted, 2);
    assert_eq!(destination.records().await, vec![first, second]);
    assert_eq!(destination.shutdowns().await, 1);

    let mapping = destination.mapping().await.unwrap();
    assert_eq!(mapping.doc_type(), "patient");

    let properties = mapping.properties();
    assert_eq!(properties.len(), 3);
    assert_eq!(properties["id"].field_type, FieldType::Integer);
    assert_eq!(properties["name"].field_type, FieldType::String);
    assert_eq!(properties["score"].field_type, FieldType::Double);
}

#[tokio::test(flavor = "multi_thread")]
async fn nested_queries_run_once_per_parent_row() {
    init_test_tracing();

    let roots = 6;
    let source = clinic_source(roots, 2).await;
    let destination = MemoryDestination::new();
    let pipeline = create_pipeline(
        pipeline_config(3, 3),
        &nested_schema(),
        source.clone(),
        destination.clone(),
    );

    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.emitted, roots as u64);
    assert_eq!(source.executions(PATIENTS).await, 1);
    assert_eq!(source.executions(VISITS).await, roots as u64);
    assert_eq!(source.executions(LABS).await, roots as u64 * 2);
    assert_eq!(source.total_executions().await, 1 + 6 + 12);

    let records = destination.records().await;
    assert_eq!(records.len(), roots as usize);
    for record in &records {
        assert_eq!(record.get("ssn"), None);

        let Some(Value::Nested(visits)) = record.get("visits") else {
            panic!("visits missing from {record:?}");
        };
        assert_eq!(visits.len(), 2);
        for visit in visits {
            let Some(Value::Nested(labs)) = visit.get("labs") else {
                panic!("labs missing from {visit:?}");
            };
            assert_eq!(labs.len(), 1);
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn mapping_describes_nested_tree_without_excluded_fields() {
    init_test_tracing();

    let source = clinic_source(2, 1).await;
    let destination = MemoryDestination::new();
    let pipeline = create_pipeline(
        pipeline_config(2, 3),
        &nested_schema(),
        source,
        destination.clone(),
    );

    pipeline.run().await.unwrap();

    let mapping = destination.mapping().await.unwrap();
    let json = mapping.to_json().unwrap();

    assert_eq!(
        json,
        serde_json::json!({
            "mappings": {
                "patient": {
                    "properties": {
                        "id": {"type": "integer"},
                        "name": {"type": "string"},
                        "visits": {
                            "type": "nested",
                            "properties": {
                                "kind": {"type": "string"},
                                "labs": {
                                    "type": "nested",
                                    "properties": {
                                        "value": {"type": "double"},
                                        "visit_id": {"type": "long"}
                                    }
                                },
                                "visit_id": {"type": "long"}
                            }
                        }
                    }
                }
            }
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_failures_are_retried() {
    init_test_tracing();

    let source = clinic_source(3, 1).await;
    source.fail_next(VISITS, 2).await;

    let destination = MemoryDestination::new();
    let pipeline = create_pipeline(
        pipeline_config(1, 3),
        &nested_schema(),
        source.clone(),
        destination.clone(),
    );

    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.emitted, 3);
    assert_eq!(destination.records().await.len(), 3);
    assert_eq!(source.executions(VISITS).await, 3 + 2);
    assert!(destination.mapping().await.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_retries_fail_the_export_without_mapping() {
    init_test_tracing();

    let source = clinic_source(1, 1).await;
    source.fail_next(VISITS, 100).await;

    let destination = MemoryDestination::new();
    let pipeline = create_pipeline(
        pipeline_config(1, 3),
        &nested_schema(),
        source.clone(),
        destination.clone(),
    );

    let err = pipeline.run().await.unwrap_err();

    assert!(err.kinds().contains(&ErrorKind::BuildRetriesExhausted));
    assert_eq!(source.executions(VISITS).await, 3);
    assert!(destination.records().await.is_empty());
    assert!(destination.mapping().await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn undecodable_root_rows_are_skipped() {
    init_test_tracing();

    let source = clinic_source(2, 1).await;
    source
        .add_scan_failure(PATIENTS, "invalid utf-8 in column name")
        .await;

    let destination = MemoryDestination::new();
    let pipeline = create_pipeline(
        pipeline_config(2, 3),
        &nested_schema(),
        source,
        destination.clone(),
    );

    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.queued, 2);
    assert_eq!(summary.emitted, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_root_query_fails_the_export() {
    init_test_tracing();

    // Nothing is scripted for the root query.
    let source = MemorySource::new();
    let destination = MemoryDestination::new();
    let pipeline = create_pipeline(
        pipeline_config(2, 3),
        &flat_schema(),
        source,
        destination.clone(),
    );

    let err = pipeline.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SourceQueryFailed);
    assert!(destination.mapping().await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_before_run_dequeues_nothing() {
    init_test_tracing();

    let source = clinic_source(4, 1).await;
    let destination = MemoryDestination::new();
    let pipeline = create_pipeline(
        pipeline_config(2, 3),
        &nested_schema(),
        source.clone(),
        destination.clone(),
    );

    pipeline.shutdown_tx().shutdown();
    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.emitted, 0);
    assert_eq!(source.executions(VISITS).await, 0);
    assert!(destination.records().await.is_empty());

    let mapping = destination.mapping().await.unwrap();
    assert!(mapping.properties().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_interrupts_retry_backoff() {
    init_test_tracing();

    let source = clinic_source(1, 1).await;
    source.fail_next(VISITS, 1_000).await;

    let destination = MemoryDestination::new();
    let mut config = pipeline_config(1, 1_000);
    config.retry_delay = Duration::from_secs(3_600);
    let pipeline = create_pipeline(config, &nested_schema(), source.clone(), destination.clone());

    let shutdown_tx = pipeline.shutdown_tx();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.shutdown();
    });

    let summary = tokio::time::timeout(Duration::from_secs(10), pipeline.run())
        .await
        .expect("pipeline did not stop after shutdown")
        .unwrap();

    assert_eq!(summary.emitted, 0);
    assert_eq!(source.executions(VISITS).await, 1);
    assert!(destination.mapping().await.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn excluded_nested_field_is_neither_queried_nor_mapped() {
    init_test_tracing();

    let mut schema = nested_schema();
    schema.exclude.push("visits".to_string());

    let source = clinic_source(2, 2).await;
    let destination = MemoryDestination::new();
    let pipeline = create_pipeline(
        pipeline_config(2, 3),
        &schema,
        source.clone(),
        destination.clone(),
    );

    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.emitted, 2);
    assert_eq!(source.executions(VISITS).await, 0);
    assert_eq!(source.executions(LABS).await, 0);
    for record in destination.records().await {
        assert!(record.get("visits").is_none());
        assert!(record.get("ssn").is_none());
    }

    let mapping = destination.mapping().await.unwrap();
    let properties = mapping.properties();
    assert!(!properties.contains_key("visits"));
    assert!(!properties.contains_key("ssn"));
    assert_eq!(properties["id"].field_type, FieldType::Integer);
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_record_is_skipped_and_export_continues() {
    init_test_tracing();

    let source = clinic_source(3, 1).await;
    let destination = MemoryDestination::new();
    destination.fail_next_writes(1).await;

    let pipeline = create_pipeline(
        pipeline_config(1, 3),
        &flat_schema(),
        source,
        destination.clone(),
    );

    let summary = pipeline.run().await.unwrap();

    assert_eq!(summary.queued, 3);
    assert_eq!(summary.emitted, 2);
    assert_eq!(destination.write_attempts().await, 3);
    assert_eq!(destination.records().await.len(), 2);
    assert!(destination.mapping().await.is_some());
}
