use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::schema::{Params, QueryTemplate};
use crate::source::Source;
use crate::types::Record;

type Resolver = Arc<dyn Fn(&Params) -> Vec<Record> + Send + Sync>;

#[derive(Debug, Clone)]
enum ScriptedRow {
    Record(Record),
    ScanFailure(String),
}

#[derive(Clone)]
enum Script {
    Rows(Vec<ScriptedRow>),
    Resolver(Resolver),
}

#[derive(Default)]
struct Inner {
    scripts: HashMap<String, Script>,
    pending_failures: HashMap<String, u32>,
    executions: HashMap<String, u64>,
}

/// In-memory [`Source`] serving scripted rows.
///
/// Queries are matched by their SQL text after named parameters are rewritten, so scripts can be
/// registered with the same SQL used in the schema configuration. A query that has no script fails
/// with [`ErrorKind::SourceQueryFailed`].
#[derive(Clone, Default)]
pub struct MemorySource {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `rows` for every execution of `sql`, regardless of parameters.
    pub async fn add_rows(&self, sql: &str, rows: Vec<Record>) {
        let rows = rows.into_iter().map(ScriptedRow::Record).collect();

        let mut inner = self.inner.lock().await;
        inner.scripts.insert(normalize(sql), Script::Rows(rows));
    }

    /// Computes the rows of `sql` from the parameters of each execution.
    pub async fn add_resolver<F>(&self, sql: &str, resolver: F)
    where
        F: Fn(&Params) -> Vec<Record> + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().await;
        inner
            .scripts
            .insert(normalize(sql), Script::Resolver(Arc::new(resolver)));
    }

    /// Appends a row to `sql` that fails to decode.
    ///
    /// Streams yield the failure as a single item; fetches fail entirely.
    pub async fn add_scan_failure(&self, sql: &str, detail: &str) {
        let mut inner = self.inner.lock().await;
        let script = inner
            .scripts
            .entry(normalize(sql))
            .or_insert_with(|| Script::Rows(Vec::new()));

        if let Script::Rows(rows) = script {
            rows.push(ScriptedRow::ScanFailure(detail.to_string()));
        }
    }

    /// Makes the next `times` executions of `sql` fail with [`ErrorKind::SourceQueryFailed`].
    pub async fn fail_next(&self, sql: &str, times: u32) {
        let mut inner = self.inner.lock().await;
        *inner.pending_failures.entry(normalize(sql)).or_default() += times;
    }

    /// Returns how many times `sql` was executed, failed executions included.
    pub async fn executions(&self, sql: &str) -> u64 {
        let inner = self.inner.lock().await;
        inner
            .executions
            .get(&normalize(sql))
            .copied()
            .unwrap_or_default()
    }

    /// Returns the number of executions across all queries.
    pub async fn total_executions(&self) -> u64 {
        let inner = self.inner.lock().await;
        inner.executions.values().sum()
    }

    async fn execute(&self, query: &QueryTemplate, params: &Params) -> EtlResult<Vec<ScriptedRow>> {
        let mut inner = self.inner.lock().await;
        let sql = query.sql();

        *inner.executions.entry(sql.to_string()).or_default() += 1;

        if let Some(remaining) = inner.pending_failures.get_mut(sql)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(etl_error!(
                ErrorKind::SourceQueryFailed,
                "Injected query failure",
                sql
            ));
        }

        let Some(script) = inner.scripts.get(sql).cloned() else {
            return Err(etl_error!(
                ErrorKind::SourceQueryFailed,
                "No rows scripted for query",
                sql
            ));
        };
        drop(inner);

        debug!(sql, parameters = params.len(), "executing scripted query");

        let rows = match script {
            Script::Rows(rows) => rows,
            Script::Resolver(resolver) => resolver(params)
                .into_iter()
                .map(ScriptedRow::Record)
                .collect(),
        };

        Ok(rows)
    }
}

impl Source for MemorySource {
    fn name() -> &'static str {
        "memory"
    }

    async fn fetch_all(&self, query: &QueryTemplate, params: &Params) -> EtlResult<Vec<Record>> {
        self.execute(query, params)
            .await?
            .into_iter()
            .map(into_result)
            .collect()
    }

    fn stream_rows<'a>(&'a self, query: &'a QueryTemplate) -> BoxStream<'a, EtlResult<Record>> {
        stream::once(async move {
            match self.execute(query, &Params::new()).await {
                Ok(rows) => rows.into_iter().map(into_result).collect::<Vec<_>>(),
                Err(err) => vec![Err(err)],
            }
        })
        .flat_map(stream::iter)
        .boxed()
    }
}

fn into_result(row: ScriptedRow) -> EtlResult<Record> {
    match row {
        ScriptedRow::Record(record) => Ok(record),
        ScriptedRow::ScanFailure(detail) => Err(etl_error!(
            ErrorKind::ConversionError,
            "Failed to decode row",
            detail
        )),
    }
}

fn normalize(sql: &str) -> String {
    QueryTemplate::parse(sql).sql().to_string()
}
