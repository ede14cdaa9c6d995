//! Bounded query execution through a session.

use std::time::Instant;
use tracing::{info, warn};

use super::VariantQuery;
use crate::error::{Result, SnowsampleError};
use crate::frame::QueryResult;
use crate::secrets::SnowflakeCredentials;
use crate::session::Session;
use crate::source::SNOWFLAKE_FORMAT;

/// Issues the read request for a query and enforces its row limit.
pub struct QueryExecutor<'a> {
    session: &'a Session,
    format: String,
}

impl<'a> QueryExecutor<'a> {
    /// Creates an executor reading from the warehouse format.
    pub fn new(session: &'a Session) -> Self {
        Self {
            session,
            format: SNOWFLAKE_FORMAT.to_string(),
        }
    }

    /// Reads through another registered format.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Executes `query` with the connection options from `credentials`.
    ///
    /// The whole result is pulled into memory. The returned result never
    /// holds more than `query.limit` rows; a source that over-returns is
    /// truncated and the result marked.
    pub async fn execute(
        &self,
        credentials: &SnowflakeCredentials,
        query: &VariantQuery,
    ) -> Result<QueryResult> {
        let start = Instant::now();
        let outcome = self
            .session
            .read()
            .format(&self.format)
            .options(credentials.to_options())
            .query(query)
            .load()
            .await;
        let execution_time = start.elapsed();

        let mut result = match outcome {
            Ok(result) => result,
            Err(e @ SnowsampleError::Query(_)) => return Err(e),
            Err(e @ SnowsampleError::Session(_)) => return Err(e),
            Err(e) => return Err(SnowsampleError::query(e.to_string())),
        };

        if result.rows.len() > query.limit {
            warn!(
                limit = query.limit,
                returned = result.rows.len(),
                "Source returned more rows than the limit; truncating"
            );
            result.truncate(query.limit);
        }

        info!(
            format = %self.format,
            rows = result.row_count,
            elapsed_ms = execution_time.as_millis() as u64,
            "Query executed"
        );
        Ok(result.with_execution_time(execution_time))
    }
}
