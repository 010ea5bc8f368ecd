use std::future::Future;

use futures::stream::BoxStream;

use crate::error::EtlResult;
use crate::schema::{Params, QueryTemplate};
use crate::types::Record;

/// Executes queries against the relational database being exported.
///
/// Implementations must be cheap to share between workers; every build worker issues nested
/// queries through the same source concurrently.
pub trait Source {
    /// Returns the name of the source, used in logs.
    fn name() -> &'static str;

    /// Executes `query` with `params` and returns every resulting row.
    ///
    /// Any execution or decoding failure fails the whole call; no partial result is returned.
    fn fetch_all(
        &self,
        query: &QueryTemplate,
        params: &Params,
    ) -> impl Future<Output = EtlResult<Vec<Record>>> + Send;

    /// Executes `query` without parameters and streams its rows.
    ///
    /// Rows that cannot be decoded are yielded as individual [`crate::error::ErrorKind::ConversionError`]
    /// items so that the caller can skip them. Any other error item means the query itself failed.
    fn stream_rows<'a>(&'a self, query: &'a QueryTemplate) -> BoxStream<'a, EtlResult<Record>>;
}
