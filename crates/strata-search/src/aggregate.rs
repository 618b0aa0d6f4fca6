//! Bucketed aggregation over indexed events.
//!
//! Analyzers that need statistics (top talkers, activity histograms) use
//! this instead of streaming raw events.

use anyhow::Context;
use rusqlite::Connection;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use strata_core::error::{Result, StrataError};

/// What to bucket by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregationSpec {
    /// Count events per distinct value of `field`, descending, top `limit`.
    CountByField { field: String, limit: usize },
    /// Count events per time bucket of `interval_us` microseconds.
    TimeHistogram { interval_us: i64 },
}

/// One aggregation bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    /// Field value, or the bucket's start timestamp for histograms.
    pub key: String,
    pub count: u64,
}

/// Run an aggregation across `index_ids`.
///
/// # Errors
///
/// Returns `Validation` for an invalid field or non-positive interval, and
/// `Internal` on storage failure.
pub fn aggregate(
    conn: &Connection,
    index_ids: &[String],
    spec: &AggregationSpec,
) -> Result<Vec<Bucket>> {
    if index_ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; index_ids.len()].join(", ");
    let index_params = index_ids.iter().map(|id| SqlValue::Text(id.clone()));

    // Params must bind in the SQL's textual placeholder order: any JSON
    // path params (SELECT then WHERE) come before the index id list.
    let mut params: Vec<SqlValue> = Vec::new();
    let sql = match spec {
        AggregationSpec::CountByField { field, limit } => {
            let select_expr = aggregate_field_expr(field, &mut params)?;
            let where_expr = aggregate_field_expr(field, &mut params)?;
            params.extend(index_params);
            format!(
                "SELECT CAST({select_expr} AS TEXT) AS bucket_key, COUNT(*) AS n
                 FROM events e
                 WHERE {where_expr} IS NOT NULL AND e.index_id IN ({placeholders})
                 GROUP BY bucket_key
                 ORDER BY n DESC, bucket_key ASC
                 LIMIT {limit}"
            )
        }
        AggregationSpec::TimeHistogram { interval_us } => {
            if *interval_us <= 0 {
                return Err(StrataError::Validation(
                    "histogram interval must be positive".into(),
                ));
            }
            params.extend(index_params);
            format!(
                "SELECT CAST((e.ts_us / {interval_us}) * {interval_us} AS TEXT) AS bucket_key,
                        COUNT(*) AS n
                 FROM events e
                 WHERE e.index_id IN ({placeholders})
                 GROUP BY bucket_key
                 ORDER BY CAST(bucket_key AS INTEGER) ASC"
            )
        }
    };

    let mut stmt = conn
        .prepare(&sql)
        .context("prepare aggregation")
        .map_err(StrataError::Internal)?;

    let rows = stmt
        .query_map(params_from_iter(params.iter()), |row| {
            Ok(Bucket {
                key: row.get(0)?,
                count: row.get::<_, i64>(1)?.unsigned_abs(),
            })
        })
        .context("run aggregation")
        .map_err(StrataError::Internal)?;

    let mut buckets = Vec::new();
    for row in rows {
        buckets.push(row.context("read aggregation bucket").map_err(StrataError::Internal)?);
    }
    Ok(buckets)
}

/// Field expression for aggregation; JSON path params append in call order.
fn aggregate_field_expr(field: &str, params: &mut Vec<SqlValue>) -> Result<String> {
    match field {
        "timestamp" => Ok("e.ts_us".to_string()),
        "message" => Ok("e.message".to_string()),
        "source_type" => Ok("e.source_type".to_string()),
        other => {
            if other.is_empty()
                || !other
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':'))
            {
                return Err(StrataError::Validation(format!(
                    "invalid field name '{other}'"
                )));
            }
            params.push(SqlValue::Text(format!("$.{other}")));
            Ok("json_extract(e.attrs, ?)".to_string())
        }
    }
}
