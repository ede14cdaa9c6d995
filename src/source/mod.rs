//! Data sources a session can read from.
//!
//! A source is addressed by a format name and receives a [`ReadRequest`]
//! carrying string options (connection settings, the query text) and, when
//! the caller built one, the structured query.

mod snowflake;
mod variant;

pub use snowflake::SnowflakeSource;
pub use variant::VariantSource;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, SnowsampleError};
use crate::frame::QueryResult;
use crate::query::VariantQuery;

/// Format name of the warehouse source.
pub const SNOWFLAKE_FORMAT: &str = "snowflake";

/// Fully qualified connector name accepted as an alias of [`SNOWFLAKE_FORMAT`].
pub const SNOWFLAKE_SOURCE_NAME: &str = "net.snowflake.spark.snowflake";

/// Format name of the in-memory variant source.
pub const VARIANT_FORMAT: &str = "variant";

/// Option key holding the query text.
pub const QUERY_OPTION: &str = "query";

/// A fully specified read.
#[derive(Debug, Clone, Default)]
pub struct ReadRequest {
    pub format: String,
    pub options: BTreeMap<String, String>,
    pub query: Option<VariantQuery>,
}

impl ReadRequest {
    /// Returns an option value.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Returns a non-empty option value or a query error naming the key.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.option(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                SnowsampleError::query(format!(
                    "Option '{key}' is required by the {} source",
                    self.format
                ))
            })
    }

    /// The query text.
    pub fn query_text(&self) -> Result<&str> {
        self.require(QUERY_OPTION)
    }

    /// The row limit carried by the structured query, if any.
    pub fn limit(&self) -> Option<usize> {
        self.query.as_ref().map(|q| q.limit)
    }
}

/// Something a session can load a table from.
#[async_trait]
pub trait DataSource: fmt::Debug + Send + Sync {
    /// Primary format name.
    fn name(&self) -> &str;

    /// Other names the format is registered under.
    fn aliases(&self) -> Vec<String> {
        Vec::new()
    }

    /// Driver products that must be on the session classpath.
    fn required_products(&self) -> Vec<String> {
        Vec::new()
    }

    /// Executes the read and materializes the whole result.
    async fn load(&self, request: &ReadRequest) -> Result<QueryResult>;
}
