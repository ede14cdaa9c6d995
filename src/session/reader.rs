//! Read builder bound to a session.

use std::collections::BTreeMap;
use tracing::debug;

use super::Session;
use crate::error::{Result, SnowsampleError};
use crate::frame::QueryResult;
use crate::query::VariantQuery;
use crate::source::{ReadRequest, QUERY_OPTION};

/// Collects format, options and query, then loads the result.
#[derive(Debug)]
pub struct DataFrameReader<'a> {
    session: &'a Session,
    format: Option<String>,
    options: BTreeMap<String, String>,
    query: Option<VariantQuery>,
}

impl<'a> DataFrameReader<'a> {
    pub(super) fn new(session: &'a Session) -> Self {
        Self {
            session,
            format: None,
            options: BTreeMap::new(),
            query: None,
        }
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn options<I, K, V>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.options
            .extend(options.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets a structured query; its SQL becomes the `query` option.
    pub fn query(mut self, query: &VariantQuery) -> Self {
        self.options.insert(QUERY_OPTION.to_string(), query.to_sql());
        self.query = Some(query.clone());
        self
    }

    /// Runs the read and materializes the result.
    pub async fn load(self) -> Result<QueryResult> {
        let format = self
            .format
            .ok_or_else(|| SnowsampleError::query("No data source format set"))?;
        let source = self.session.source(&format)?;

        if let Some(query) = &self.query {
            query.validate()?;
        }

        debug!(%format, options = self.options.len(), "Loading");
        let request = ReadRequest {
            format,
            options: self.options,
            query: self.query,
        };
        source.load(&request).await
    }
}
