//! Structured read queries over a semi-structured (variant) column.
//!
//! A [`VariantQuery`] renders to warehouse SQL and can also be evaluated
//! locally against JSON documents, which is how the in-memory source answers
//! it.

mod executor;

pub use executor::QueryExecutor;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SnowsampleError};
use crate::frame::{ColumnInfo, Row, Value};

/// Default upper bound on rows pulled into memory.
pub const DEFAULT_ROW_LIMIT: usize = 5_000_000;

/// Name of the variant column in the weather sample tables.
pub const DEFAULT_VARIANT_COLUMN: &str = "V";

/// Converts Kelvin to Fahrenheit: `(v - 273.15) * 1.8 + 32`.
pub fn kelvin_to_fahrenheit(kelvin: f64) -> f64 {
    (kelvin - 273.15) * 1.8 + 32.0
}

/// One output column of a [`VariantQuery`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Projection {
    /// Numeric field converted from Kelvin to Fahrenheit.
    KelvinToFahrenheit { path: String, alias: String },
    /// Field cast to a timestamp (epoch seconds or ISO text).
    CastTimestamp { path: String, alias: String },
    /// Field projected as-is.
    Field { path: String, alias: String },
}

impl Projection {
    pub fn kelvin_to_fahrenheit(path: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::KelvinToFahrenheit {
            path: path.into(),
            alias: alias.into(),
        }
    }

    pub fn cast_timestamp(path: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::CastTimestamp {
            path: path.into(),
            alias: alias.into(),
        }
    }

    pub fn field(path: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::Field {
            path: path.into(),
            alias: alias.into(),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::KelvinToFahrenheit { path, .. }
            | Self::CastTimestamp { path, .. }
            | Self::Field { path, .. } => path,
        }
    }

    pub fn alias(&self) -> &str {
        match self {
            Self::KelvinToFahrenheit { alias, .. }
            | Self::CastTimestamp { alias, .. }
            | Self::Field { alias, .. } => alias,
        }
    }

    /// Output column; unquoted aliases come back upper-cased from the
    /// warehouse, so local evaluation does the same.
    pub fn column(&self) -> ColumnInfo {
        let data_type = match self {
            Self::KelvinToFahrenheit { .. } => "REAL",
            Self::CastTimestamp { .. } => "TIMESTAMP_NTZ",
            Self::Field { .. } => "VARIANT",
        };
        ColumnInfo::new(self.alias().to_uppercase(), data_type)
    }

    fn to_sql(&self, column: &str) -> String {
        let field = format!("{column}:{}", self.path());
        match self {
            Self::KelvinToFahrenheit { alias, .. } => {
                format!("({field} - 273.15) * 1.8 + 32 AS {alias}")
            }
            Self::CastTimestamp { alias, .. } => format!("CAST({field} AS TIMESTAMP) AS {alias}"),
            Self::Field { alias, .. } => format!("{field} AS {alias}"),
        }
    }

    fn evaluate(&self, doc: &serde_json::Value) -> Result<Value> {
        let raw = lookup(doc, self.path());
        match self {
            Self::KelvinToFahrenheit { path, .. } => match raw {
                None | Some(serde_json::Value::Null) => Ok(Value::Null),
                Some(v) => json_number(v)
                    .map(|k| Value::Float(kelvin_to_fahrenheit(k)))
                    .ok_or_else(|| {
                        SnowsampleError::query(format!("Field '{path}' is not numeric: {v}"))
                    }),
            },
            Self::CastTimestamp { path, .. } => match raw {
                None | Some(serde_json::Value::Null) => Ok(Value::Null),
                Some(v) => json_timestamp(v).map(Value::Timestamp).ok_or_else(|| {
                    SnowsampleError::query(format!("Field '{path}' is not a timestamp: {v}"))
                }),
            },
            Self::Field { .. } => Ok(raw.map(json_to_value).unwrap_or(Value::Null)),
        }
    }
}

/// A bounded projection query over a variant column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantQuery {
    pub table: String,
    pub column: String,
    pub projections: Vec<Projection>,
    pub limit: usize,
}

impl VariantQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: DEFAULT_VARIANT_COLUMN.to_string(),
            projections: Vec::new(),
            limit: DEFAULT_ROW_LIMIT,
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn project(mut self, projection: Projection) -> Self {
        self.projections.push(projection);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// The weather sample: max/min temperature in Fahrenheit, observation
    /// time, and city coordinates.
    pub fn weather(table: impl Into<String>, limit: usize) -> Self {
        Self::new(table)
            .project(Projection::kelvin_to_fahrenheit("main.temp_max", "temp_max_far"))
            .project(Projection::kelvin_to_fahrenheit("main.temp_min", "temp_min_far"))
            .project(Projection::cast_timestamp("time", "time"))
            .project(Projection::field("city.coord.lat", "lat"))
            .project(Projection::field("city.coord.lon", "lon"))
            .limit(limit)
    }

    /// Rejects identifiers that would not render to safe SQL.
    pub fn validate(&self) -> Result<()> {
        if self.projections.is_empty() {
            return Err(SnowsampleError::query("Query projects no columns"));
        }
        if self.limit == 0 {
            return Err(SnowsampleError::query("Row limit must be greater than 0"));
        }
        if !is_dotted_identifier(&self.table) {
            return Err(SnowsampleError::query(format!(
                "Invalid table name '{}'",
                self.table
            )));
        }
        if !is_identifier(&self.column) {
            return Err(SnowsampleError::query(format!(
                "Invalid column name '{}'",
                self.column
            )));
        }
        for p in &self.projections {
            if !is_dotted_identifier(p.path()) {
                return Err(SnowsampleError::query(format!("Invalid field path '{}'", p.path())));
            }
            if !is_identifier(p.alias()) {
                return Err(SnowsampleError::query(format!("Invalid alias '{}'", p.alias())));
            }
        }
        Ok(())
    }

    /// Renders the query as warehouse SQL.
    pub fn to_sql(&self) -> String {
        let select: Vec<String> = self
            .projections
            .iter()
            .map(|p| p.to_sql(&self.column))
            .collect();
        format!(
            "SELECT {} FROM {} LIMIT {}",
            select.join(", "),
            self.table,
            self.limit
        )
    }

    /// Output columns in projection order.
    pub fn columns(&self) -> Vec<ColumnInfo> {
        self.projections.iter().map(Projection::column).collect()
    }

    /// Evaluates the projections against one variant document.
    pub fn evaluate(&self, doc: &serde_json::Value) -> Result<Row> {
        self.projections.iter().map(|p| p.evaluate(doc)).collect()
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn is_dotted_identifier(s: &str) -> bool {
    s.split('.').all(is_identifier)
}

fn lookup<'a>(doc: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.').try_fold(doc, |node, key| node.get(key))
}

fn json_number(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_timestamp(v: &serde_json::Value) -> Option<NaiveDateTime> {
    match v {
        serde_json::Value::Number(n) => {
            let secs = n.as_f64()?;
            epoch_to_naive(secs)
        }
        serde_json::Value::String(s) => parse_timestamp_text(s),
        _ => None,
    }
}

/// Epoch seconds (with fraction) to a naive UTC timestamp.
pub(crate) fn epoch_to_naive(secs: f64) -> Option<NaiveDateTime> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999)).map(|dt| dt.naive_utc())
}

/// Parses ISO-like timestamp text, or epoch seconds given as text.
pub(crate) fn parse_timestamp_text(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    s.parse::<f64>().ok().and_then(epoch_to_naive)
}

/// Converts a JSON node into a cell value.
pub(crate) fn json_to_value(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
        },
        serde_json::Value::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}
