//! Structured query expressions compiled to parameterized SQL.
//!
//! A [`SearchQuery`] has two halves, mirroring the explore surface of the
//! upstream API: an optional full-text string (FTS5 MATCH) and an optional
//! structured [`FilterExpr`]. Filters compose with `all`/`any`/`not` and
//! reach both the fixed columns and the open attribute set (via JSON1).

use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use strata_core::error::{Result, StrataError};

use crate::store::schema::{
    BM25_WEIGHT_ATTRS, BM25_WEIGHT_MESSAGE, BM25_WEIGHT_SOURCE_TYPE,
};

/// A sketch- or index-scoped query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Full-text component (FTS5 syntax: terms, prefix `*`, boolean ops).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Structured filter component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterExpr>,
}

impl SearchQuery {
    /// Query matching every event.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Full-text-only query.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            filter: None,
        }
    }

    /// Filter-only query.
    #[must_use]
    pub fn filter(filter: FilterExpr) -> Self {
        Self {
            text: None,
            filter: Some(filter),
        }
    }
}

/// Structured match conditions over event fields.
///
/// `field` resolves `timestamp`, `message`, and `source_type` to fixed
/// columns and anything else to the JSON attribute set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterExpr {
    /// Exact match on a field value.
    FieldEq {
        field: String,
        value: serde_json::Value,
    },
    /// Case-insensitive substring match.
    FieldContains { field: String, value: String },
    /// Numeric range over a field (inclusive bounds).
    Range {
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    /// Timestamp range in microseconds (inclusive bounds).
    TimeRange {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_us: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end_us: Option<i64>,
    },
    /// Every sub-filter must hold.
    All { of: Vec<FilterExpr> },
    /// At least one sub-filter must hold.
    Any { of: Vec<FilterExpr> },
    /// The sub-filter must not hold.
    Not { of: Box<FilterExpr> },
}

/// Result ordering, caller-selectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending timestamp, then insertion order. The default.
    #[default]
    Time,
    /// BM25 relevance. Falls back to time order when the query has no
    /// full-text component.
    Relevance,
}

/// A compiled query ready for paging.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub(crate) sql: String,
    pub(crate) params: Vec<SqlValue>,
}

/// Compile `query` against `index_ids`.
///
/// # Errors
///
/// Returns `Validation` for an invalid field name or an unusable filter
/// (e.g. a range with no bounds).
pub fn compile(
    index_ids: &[String],
    query: &SearchQuery,
    sort: SortOrder,
) -> Result<CompiledQuery> {
    let mut params: Vec<SqlValue> = Vec::new();

    let index_clause = if index_ids.is_empty() {
        // Matches nothing; callers usually short-circuit before this.
        "0".to_string()
    } else {
        let placeholders = vec!["?"; index_ids.len()].join(", ");
        for id in index_ids {
            params.push(SqlValue::Text(id.clone()));
        }
        format!("e.index_id IN ({placeholders})")
    };

    let use_relevance = sort == SortOrder::Relevance && query.text.is_some();

    let mut sql = String::from(
        "SELECT e.index_id, e.doc_id, e.ts_us, e.message, e.source_type, e.attrs\n",
    );
    if use_relevance {
        sql.push_str("FROM events_fts f\nINNER JOIN events e ON e.rowid = f.rowid\n");
    } else {
        sql.push_str("FROM events e\n");
    }
    sql.push_str(&format!("WHERE {index_clause}\n"));

    if let Some(text) = &query.text {
        if text.trim().is_empty() {
            return Err(StrataError::Validation("full-text query is empty".into()));
        }
        if use_relevance {
            sql.push_str("AND events_fts MATCH ?\n");
        } else {
            sql.push_str(
                "AND e.rowid IN (SELECT rowid FROM events_fts WHERE events_fts MATCH ?)\n",
            );
        }
        params.push(SqlValue::Text(text.clone()));
    }

    if let Some(filter) = &query.filter {
        let clause = compile_filter(filter, &mut params)?;
        sql.push_str(&format!("AND {clause}\n"));
    }

    if use_relevance {
        sql.push_str(&format!(
            "ORDER BY bm25(events_fts, {BM25_WEIGHT_MESSAGE}, {BM25_WEIGHT_SOURCE_TYPE}, {BM25_WEIGHT_ATTRS}), e.ts_us ASC\n",
        ));
    } else {
        sql.push_str("ORDER BY e.ts_us ASC, e.rowid ASC\n");
    }

    Ok(CompiledQuery { sql, params })
}

/// SQL expression for a field: fixed column or JSON1 path into `attrs`.
fn field_expr(field: &str, params: &mut Vec<SqlValue>) -> Result<String> {
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

fn push_json_value(value: &serde_json::Value, params: &mut Vec<SqlValue>) -> Result<()> {
    let sql_value = match value {
        serde_json::Value::String(s) => SqlValue::Text(s.clone()),
        serde_json::Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        serde_json::Value::Number(n) => n.as_i64().map_or_else(
            || {
                n.as_f64()
                    .map(SqlValue::Real)
                    .ok_or_else(|| StrataError::Validation("unusable number".into()))
            },
            |i| Ok(SqlValue::Integer(i)),
        )?,
        other => {
            return Err(StrataError::Validation(format!(
                "unsupported comparison value {other}"
            )));
        }
    };
    params.push(sql_value);
    Ok(())
}

fn compile_filter(filter: &FilterExpr, params: &mut Vec<SqlValue>) -> Result<String> {
    match filter {
        FilterExpr::FieldEq { field, value } => {
            let expr = field_expr(field, params)?;
            push_json_value(value, params)?;
            Ok(format!("{expr} = ?"))
        }
        FilterExpr::FieldContains { field, value } => {
            let expr = field_expr(field, params)?;
            params.push(SqlValue::Text(value.to_lowercase()));
            Ok(format!("instr(lower(CAST({expr} AS TEXT)), ?) > 0"))
        }
        FilterExpr::Range { field, min, max } => {
            if min.is_none() && max.is_none() {
                return Err(StrataError::Validation(
                    "range filter needs at least one bound".into(),
                ));
            }
            // Each bound resolves the field expression itself so the JSON
            // path param (if any) repeats exactly once per placeholder.
            let mut parts = Vec::new();
            if let Some(min) = min {
                let expr = field_expr(field, params)?;
                params.push(SqlValue::Real(*min));
                parts.push(format!("CAST({expr} AS REAL) >= ?"));
            }
            if let Some(max) = max {
                let expr = field_expr(field, params)?;
                params.push(SqlValue::Real(*max));
                parts.push(format!("CAST({expr} AS REAL) <= ?"));
            }
            Ok(format!("({})", parts.join(" AND ")))
        }
        FilterExpr::TimeRange { start_us, end_us } => {
            if start_us.is_none() && end_us.is_none() {
                return Err(StrataError::Validation(
                    "time range filter needs at least one bound".into(),
                ));
            }
            let mut parts = Vec::new();
            if let Some(start) = start_us {
                params.push(SqlValue::Integer(*start));
                parts.push("e.ts_us >= ?".to_string());
            }
            if let Some(end) = end_us {
                params.push(SqlValue::Integer(*end));
                parts.push("e.ts_us <= ?".to_string());
            }
            Ok(format!("({})", parts.join(" AND ")))
        }
        FilterExpr::All { of } => combine(of, " AND ", params),
        FilterExpr::Any { of } => combine(of, " OR ", params),
        FilterExpr::Not { of } => {
            let inner = compile_filter(of, params)?;
            Ok(format!("NOT ({inner})"))
        }
    }
}

fn combine(
    filters: &[FilterExpr],
    joiner: &str,
    params: &mut Vec<SqlValue>,
) -> Result<String> {
    if filters.is_empty() {
        return Err(StrataError::Validation(
            "boolean combinator needs at least one sub-filter".into(),
        ));
    }
    let parts = filters
        .iter()
        .map(|f| compile_filter(f, params))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("({})", parts.join(joiner)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn indices() -> Vec<String> {
        vec!["idx-0001".to_string()]
    }

    #[test]
    fn time_sort_produces_timestamp_order_clause() {
        let compiled = compile(&indices(), &SearchQuery::all(), SortOrder::Time)
            .expect("compile");
        assert!(compiled.sql.contains("ORDER BY e.ts_us ASC"));
        assert_eq!(compiled.params.len(), 1);
    }

    #[test]
    fn relevance_without_text_falls_back_to_time() {
        let compiled = compile(&indices(), &SearchQuery::all(), SortOrder::Relevance)
            .expect("compile");
        assert!(compiled.sql.contains("ORDER BY e.ts_us ASC"));
    }

    #[test]
    fn relevance_with_text_uses_bm25() {
        let compiled = compile(
            &indices(),
            &SearchQuery::text("powershell"),
            SortOrder::Relevance,
        )
        .expect("compile");
        assert!(compiled.sql.contains("bm25(events_fts"));
        assert!(compiled.sql.contains("events_fts MATCH ?"));
    }

    #[test]
    fn nested_filters_compile() {
        let filter = FilterExpr::All {
            of: vec![
                FilterExpr::FieldEq {
                    field: "source_type".into(),
                    value: json!("windows:evtx:record"),
                },
                FilterExpr::Any {
                    of: vec![
                        FilterExpr::FieldContains {
                            field: "message".into(),
                            value: "mimikatz".into(),
                        },
                        FilterExpr::Range {
                            field: "logon_type".into(),
                            min: Some(10.0),
                            max: None,
                        },
                    ],
                },
                FilterExpr::Not {
                    of: Box::new(FilterExpr::TimeRange {
                        start_us: Some(0),
                        end_us: Some(999),
                    }),
                },
            ],
        };
        let compiled = compile(&indices(), &SearchQuery::filter(filter), SortOrder::Time)
            .expect("compile");
        assert!(compiled.sql.contains("json_extract"));
        assert!(compiled.sql.contains("NOT ("));
        // index id + source_type value + lowered substring + json path +
        // range bound + two time bounds
        assert_eq!(compiled.params.len(), 7);
    }

    #[test]
    fn invalid_field_name_is_rejected() {
        let filter = FilterExpr::FieldEq {
            field: "msg'; DROP TABLE events; --".into(),
            value: json!("x"),
        };
        let result = compile(&indices(), &SearchQuery::filter(filter), SortOrder::Time);
        assert!(matches!(result, Err(StrataError::Validation(_))));
    }

    #[test]
    fn empty_range_is_rejected() {
        let filter = FilterExpr::Range {
            field: "pid".into(),
            min: None,
            max: None,
        };
        let result = compile(&indices(), &SearchQuery::filter(filter), SortOrder::Time);
        assert!(matches!(result, Err(StrataError::Validation(_))));
    }

    #[test]
    fn filter_expr_serde_roundtrip() {
        let filter = FilterExpr::Any {
            of: vec![
                FilterExpr::FieldEq {
                    field: "username".into(),
                    value: json!("alice"),
                },
                FilterExpr::TimeRange {
                    start_us: Some(1),
                    end_us: None,
                },
            ],
        };
        let raw = serde_json::to_string(&filter).expect("serialize");
        let parsed: FilterExpr = serde_json::from_str(&raw).expect("deserialize");
        assert_eq!(parsed, filter);
    }
}
