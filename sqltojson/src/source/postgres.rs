use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use sqltojson_config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{
    PgArgumentBuffer, PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgTypeInfo,
};
use sqlx::query::Query;
use sqlx::{Column, Encode, Postgres, Row, Type, TypeInfo, ValueRef};
use tracing::info;

use crate::bail;
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;
use crate::schema::{Params, QueryTemplate};
use crate::source::Source;
use crate::types::{Record, Value};

/// Postgres [`Source`] backed by a bounded [`PgPool`].
#[derive(Debug, Clone)]
pub struct PgSource {
    pool: PgPool,
}

impl PgSource {
    /// Connects to the configured database with at most `max_connections` open connections.
    ///
    /// One connection is established eagerly so that an unreachable database fails here rather
    /// than inside the first build.
    pub async fn connect(config: &PgConnectionConfig, max_connections: u32) -> EtlResult<Self> {
        let options: PgConnectOptions = config.with_db();

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|err| {
                etl_error!(
                    ErrorKind::SourceConnectionFailed,
                    "Failed to connect to the source database",
                    format!("{}:{}/{}: {err}", config.host, config.port, config.name),
                    source: err
                )
            })?;

        info!(
            host = %config.host,
            port = config.port,
            database = %config.name,
            max_connections,
            "connected to source database"
        );

        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Closes every connection of the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl Source for PgSource {
    fn name() -> &'static str {
        "postgres"
    }

    async fn fetch_all(&self, query: &QueryTemplate, params: &Params) -> EtlResult<Vec<Record>> {
        let mut statement = sqlx::query(query.sql());
        for value in query.bind_values(params) {
            statement = bind_value(statement, value)?;
        }

        let rows = statement.fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }

    fn stream_rows<'a>(&'a self, query: &'a QueryTemplate) -> BoxStream<'a, EtlResult<Record>> {
        sqlx::query(query.sql())
            .fetch(&self.pool)
            .map(|row| row.map_err(EtlError::from).and_then(|row| decode_row(&row)))
            .boxed()
    }
}

/// A null parameter sent without a declared type so the server infers it from context.
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

fn bind_value<'q>(
    statement: Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> EtlResult<Query<'q, Postgres, PgArguments>> {
    let statement = match value {
        Value::Null => statement.bind(UntypedNull),
        Value::Bool(value) => statement.bind(*value),
        Value::I8(value) => statement.bind(*value),
        Value::I16(value) => statement.bind(*value),
        Value::I32(value) => statement.bind(*value),
        Value::I64(value) => statement.bind(*value),
        Value::F32(value) => statement.bind(*value),
        Value::F64(value) => statement.bind(*value),
        Value::String(value) => statement.bind(value.clone()),
        Value::Timestamp(value) => statement.bind(*value),
        Value::Numeric(value) => statement.bind(value.clone()),
        Value::Json(value) => statement.bind(value.clone()),
        Value::Bytes(value) => statement.bind(value.clone()),
        Value::Nested(_) | Value::Unsupported(_) => {
            bail!(
                ErrorKind::InvalidData,
                "Value cannot be used as a query parameter",
                value.type_name()
            );
        }
    };

    Ok(statement)
}

/// Decodes every column of `row` into a [`Record`], keeping column order.
fn decode_row(row: &PgRow) -> EtlResult<Record> {
    let mut record = Record::new();

    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            decode_column(row, index, column.type_info().name())?
        };

        record.insert(column.name(), value);
    }

    Ok(record)
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> EtlResult<Value> {
    let value = match type_name {
        "BOOL" => Value::Bool(row.try_get(index)?),
        "\"CHAR\"" => Value::I8(row.try_get(index)?),
        "INT2" => Value::I16(row.try_get(index)?),
        "INT4" => Value::I32(row.try_get(index)?),
        "INT8" => Value::I64(row.try_get(index)?),
        "FLOAT4" => Value::F32(row.try_get(index)?),
        "FLOAT8" => Value::F64(row.try_get(index)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => Value::String(row.try_get(index)?),
        "UUID" => Value::String(row.try_get::<uuid::Uuid, _>(index)?.to_string()),
        "TIMESTAMPTZ" => Value::Timestamp(row.try_get::<DateTime<Utc>, _>(index)?),
        "TIMESTAMP" => Value::Timestamp(row.try_get::<NaiveDateTime, _>(index)?.and_utc()),
        "DATE" => Value::Timestamp(
            row.try_get::<NaiveDate, _>(index)?
                .and_time(NaiveTime::MIN)
                .and_utc(),
        ),
        "NUMERIC" => Value::Numeric(row.try_get(index)?),
        "JSON" | "JSONB" => Value::Json(row.try_get(index)?),
        "BYTEA" => Value::Bytes(row.try_get(index)?),
        other => Value::Unsupported(other.to_string()),
    };

    Ok(value)
}
