//! Summary statistics over numeric columns.

use super::{QueryResult, Value};
use serde::Serialize;
use std::fmt;

/// Statistic row labels, in display order.
pub const STATISTICS: [&str; 5] = ["count", "mean", "std", "min", "max"];

/// Summary statistics for one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    /// Number of non-null values.
    pub count: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation (n - 1 denominator).
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ColumnSummary {
    fn from_values(name: &str, values: &[f64]) -> Self {
        let count = values.len();
        if count == 0 {
            return Self {
                name: name.to_string(),
                count,
                mean: None,
                std: None,
                min: None,
                max: None,
            };
        }

        let mean = values.iter().sum::<f64>() / count as f64;
        let std = if count > 1 {
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            Some(var.sqrt())
        } else {
            None
        };
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Self {
            name: name.to_string(),
            count,
            mean: Some(mean),
            std,
            min: Some(min),
            max: Some(max),
        }
    }

    fn statistic(&self, label: &str) -> String {
        let fmt_opt = |v: Option<f64>| v.map_or_else(|| "NaN".to_string(), |v| format!("{v:.6}"));
        match label {
            "count" => format!("{:.6}", self.count as f64),
            "mean" => fmt_opt(self.mean),
            "std" => fmt_opt(self.std),
            "min" => fmt_opt(self.min),
            "max" => fmt_opt(self.max),
            _ => String::new(),
        }
    }
}

/// `describe()` output for a query result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub columns: Vec<ColumnSummary>,
}

impl Summary {
    /// Looks up the summary of the named column (case-insensitive).
    pub fn column(&self, name: &str) -> Option<&ColumnSummary> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut header = vec![String::new()];
        header.extend(self.columns.iter().map(|c| c.name.clone()));

        let body: Vec<Vec<String>> = STATISTICS
            .iter()
            .map(|label| {
                let mut row = vec![label.to_string()];
                row.extend(self.columns.iter().map(|c| c.statistic(label)));
                row
            })
            .collect();

        write!(f, "{}", super::render_table(&header, &body))
    }
}

impl QueryResult {
    /// Computes count, mean, std, min and max for every numeric column.
    ///
    /// A column is numeric when all of its non-null values are ints or
    /// floats and at least one value is present. Nulls are excluded from
    /// every statistic.
    pub fn describe(&self) -> Summary {
        let mut columns = Vec::new();

        for (idx, col) in self.columns.iter().enumerate() {
            let mut values = Vec::with_capacity(self.rows.len());
            let mut numeric = true;

            for row in &self.rows {
                match row.get(idx).unwrap_or(&Value::Null) {
                    Value::Null => {}
                    v => match v.as_f64() {
                        Some(n) => values.push(n),
                        None => {
                            numeric = false;
                            break;
                        }
                    },
                }
            }

            if numeric && !values.is_empty() {
                columns.push(ColumnSummary::from_values(&col.name, &values));
            }
        }

        Summary { columns }
    }
}
