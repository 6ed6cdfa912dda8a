//! Typed fetchers for issue and comment events in the archive.

pub mod comment;
pub mod issue;
pub mod types;

pub use comment::CommentFetcher;
pub use issue::IssueFetcher;
pub use types::{Comment, Issue};

use crate::archive::{ExecutionError, QueryExecutor, Row};
use crate::query::{QueryError, SelectBuilder};
use futures_util::stream::{BoxStream, StreamExt};
use thiserror::Error;

/// Column holding the event-specific JSON document in the archive.
pub const PAYLOAD_COLUMN: &str = "payload";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Lazy sequence of decoded records; the first error ends the fetch.
pub type RecordStream<T> = BoxStream<'static, Result<T, FetchError>>;

/// Render `query`, run it and decode each row as it arrives.
async fn run_query<T, F>(
    executor: &dyn QueryExecutor,
    query: &SelectBuilder,
    decode: F,
) -> Result<RecordStream<T>, FetchError>
where
    T: Send + 'static,
    F: Fn(&Row) -> T + Send + 'static,
{
    let sql = query.sql()?;
    let rows = executor.execute(&sql).await?;
    Ok(rows
        .map(move |row| row.map(|r| decode(&r)).map_err(FetchError::from))
        .boxed())
}
