//! In-memory source over JSON variant documents.
//!
//! Answers structured queries locally; used for offline runs
//! (`--mock-warehouse`) and tests.

use async_trait::async_trait;
use serde_json::json;
use std::time::Instant;

use super::{DataSource, ReadRequest, VARIANT_FORMAT};
use crate::error::{Result, SnowsampleError};
use crate::frame::QueryResult;

/// A table of JSON documents standing in for a variant column.
#[derive(Debug, Clone, Default)]
pub struct VariantSource {
    documents: Vec<serde_json::Value>,
}

impl VariantSource {
    pub fn new(documents: Vec<serde_json::Value>) -> Self {
        Self { documents }
    }

    /// A handful of weather observations in the warehouse sample layout.
    pub fn sample_weather() -> Self {
        let observation = |city: &str, lat: f64, lon: f64, max: f64, min: f64, time: i64| {
            json!({
                "city": {"name": city, "coord": {"lat": lat, "lon": lon}},
                "main": {"temp_max": max, "temp_min": min},
                "time": time
            })
        };
        Self::new(vec![
            observation("London", 51.51, -0.13, 288.15, 281.15, 1_477_494_000),
            observation("Paris", 48.85, 2.35, 291.15, 283.71, 1_477_494_000),
            observation("Oslo", 59.91, 10.75, 279.82, 272.04, 1_477_497_600),
            observation("Madrid", 40.42, -3.70, 297.04, 285.37, 1_477_497_600),
            observation("Reykjavik", 64.14, -21.90, 276.48, 270.93, 1_477_501_200),
        ])
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl DataSource for VariantSource {
    fn name(&self) -> &str {
        VARIANT_FORMAT
    }

    async fn load(&self, request: &ReadRequest) -> Result<QueryResult> {
        let query = request.query.as_ref().ok_or_else(|| {
            SnowsampleError::query("The variant source only answers structured queries")
        })?;

        let start = Instant::now();
        let rows = self
            .documents
            .iter()
            .take(query.limit)
            .map(|doc| query.evaluate(doc))
            .collect::<Result<Vec<_>>>()?;

        Ok(QueryResult::with_data(query.columns(), rows).with_execution_time(start.elapsed()))
    }
}
