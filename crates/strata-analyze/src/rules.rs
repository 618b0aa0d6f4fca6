//! Signature rules: structured match conditions over event fields.
//!
//! A rule corpus is a set of YAML documents, each a list of rules. A rule's
//! condition is a tagged variant tree (equals / contains / regex / range
//! composed with all / any / not) evaluated as a pure predicate over one
//! event — no evaluation order, no shared state, deterministic for a fixed
//! event set and corpus.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use strata_core::error::{Result, StrataError};
use strata_core::model::Event;
use strata_search::FilterExpr;

/// One signature rule as authored in YAML.
///
/// ```yaml
/// - id: proc-psexec
///   title: PsExec service launch
///   description: Remote execution via PsExec
///   condition:
///     kind: contains
///     field: message
///     value: psexec
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureRule {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Tag emitted on matching events; defaults to `sig/<id>`.
    #[serde(default)]
    pub tag: Option<String>,
    pub condition: RuleCondition,
}

impl SignatureRule {
    /// The tag this rule writes on matching events.
    #[must_use]
    pub fn tag_name(&self) -> String {
        self.tag
            .clone()
            .unwrap_or_else(|| format!("sig/{}", self.id))
    }
}

/// Structured match condition, one variant per condition kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    /// Exact field equality (numbers compare numerically).
    Equals {
        field: String,
        value: serde_json::Value,
    },
    /// Case-insensitive substring match.
    Contains { field: String, value: String },
    /// Regular expression over the field rendered as text.
    Regex { field: String, pattern: String },
    /// Inclusive numeric range.
    Range {
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    /// Every sub-condition must hold.
    All { of: Vec<RuleCondition> },
    /// At least one sub-condition must hold.
    Any { of: Vec<RuleCondition> },
    /// The sub-condition must not hold.
    Not { of: Box<RuleCondition> },
}

/// A rule with its regexes compiled, ready for per-event evaluation.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: SignatureRule,
    condition: CompiledCondition,
}

#[derive(Debug, Clone)]
enum CompiledCondition {
    Equals {
        field: String,
        value: serde_json::Value,
    },
    Contains {
        field: String,
        value_lower: String,
    },
    Regex {
        field: String,
        regex: Regex,
    },
    Range {
        field: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    All(Vec<CompiledCondition>),
    Any(Vec<CompiledCondition>),
    Not(Box<CompiledCondition>),
}

impl CompiledRule {
    /// Compile a rule, validating its regexes and range bounds.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an invalid regex or an empty/unbounded
    /// condition.
    pub fn compile(rule: SignatureRule) -> Result<Self> {
        let condition = compile_condition(&rule.condition, &rule.id)?;
        Ok(Self { rule, condition })
    }

    /// Pure per-event predicate.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        eval(&self.condition, event)
    }

    /// Translate the condition to a store filter, when every variant has a
    /// direct equivalent. Regex conditions have none, so rules using them
    /// return `None` and fall back to a full-text saved search.
    #[must_use]
    pub fn as_filter(&self) -> Option<FilterExpr> {
        condition_to_filter(&self.rule.condition)
    }
}

fn compile_condition(condition: &RuleCondition, rule_id: &str) -> Result<CompiledCondition> {
    match condition {
        RuleCondition::Equals { field, value } => Ok(CompiledCondition::Equals {
            field: field.clone(),
            value: value.clone(),
        }),
        RuleCondition::Contains { field, value } => Ok(CompiledCondition::Contains {
            field: field.clone(),
            value_lower: value.to_lowercase(),
        }),
        RuleCondition::Regex { field, pattern } => {
            let regex = Regex::new(pattern).map_err(|err| {
                StrataError::Validation(format!(
                    "rule '{rule_id}': invalid regex '{pattern}': {err}"
                ))
            })?;
            Ok(CompiledCondition::Regex {
                field: field.clone(),
                regex,
            })
        }
        RuleCondition::Range { field, min, max } => {
            if min.is_none() && max.is_none() {
                return Err(StrataError::Validation(format!(
                    "rule '{rule_id}': range condition needs at least one bound"
                )));
            }
            Ok(CompiledCondition::Range {
                field: field.clone(),
                min: *min,
                max: *max,
            })
        }
        RuleCondition::All { of } | RuleCondition::Any { of } => {
            if of.is_empty() {
                return Err(StrataError::Validation(format!(
                    "rule '{rule_id}': boolean combinator needs at least one sub-condition"
                )));
            }
            let compiled = of
                .iter()
                .map(|c| compile_condition(c, rule_id))
                .collect::<Result<Vec<_>>>()?;
            Ok(match condition {
                RuleCondition::All { .. } => CompiledCondition::All(compiled),
                _ => CompiledCondition::Any(compiled),
            })
        }
        RuleCondition::Not { of } => Ok(CompiledCondition::Not(Box::new(compile_condition(
            of, rule_id,
        )?))),
    }
}

fn eval(condition: &CompiledCondition, event: &Event) -> bool {
    match condition {
        CompiledCondition::Equals { field, value } => {
            event.field(field).is_some_and(|actual| values_equal(&actual, value))
        }
        CompiledCondition::Contains { field, value_lower } => event
            .field(field)
            .is_some_and(|actual| value_text(&actual).to_lowercase().contains(value_lower)),
        CompiledCondition::Regex { field, regex } => event
            .field(field)
            .is_some_and(|actual| regex.is_match(&value_text(&actual))),
        CompiledCondition::Range { field, min, max } => {
            event.field(field).and_then(|v| value_number(&v)).is_some_and(|n| {
                min.is_none_or(|min| n >= min) && max.is_none_or(|max| n <= max)
            })
        }
        CompiledCondition::All(of) => of.iter().all(|c| eval(c, event)),
        CompiledCondition::Any(of) => of.iter().any(|c| eval(c, event)),
        CompiledCondition::Not(of) => !eval(of, event),
    }
}

/// Loose equality: numbers compare numerically across int/float, everything
/// else by exact JSON value.
fn values_equal(actual: &serde_json::Value, expected: &serde_json::Value) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
        _ => actual == expected,
    }
}

fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn condition_to_filter(condition: &RuleCondition) -> Option<FilterExpr> {
    match condition {
        RuleCondition::Equals { field, value } => Some(FilterExpr::FieldEq {
            field: field.clone(),
            value: value.clone(),
        }),
        RuleCondition::Contains { field, value } => Some(FilterExpr::FieldContains {
            field: field.clone(),
            value: value.clone(),
        }),
        RuleCondition::Regex { .. } => None,
        RuleCondition::Range { field, min, max } => {
            if field == "timestamp" {
                // Timestamp ranges have a dedicated filter variant.
                #[allow(clippy::cast_possible_truncation)]
                return Some(FilterExpr::TimeRange {
                    start_us: min.map(|m| m as i64),
                    end_us: max.map(|m| m as i64),
                });
            }
            Some(FilterExpr::Range {
                field: field.clone(),
                min: *min,
                max: *max,
            })
        }
        RuleCondition::All { of } => of
            .iter()
            .map(condition_to_filter)
            .collect::<Option<Vec<_>>>()
            .map(|of| FilterExpr::All { of }),
        RuleCondition::Any { of } => of
            .iter()
            .map(condition_to_filter)
            .collect::<Option<Vec<_>>>()
            .map(|of| FilterExpr::Any { of }),
        RuleCondition::Not { of } => condition_to_filter(of).map(|f| FilterExpr::Not {
            of: Box::new(f),
        }),
    }
}

/// Load every rule from the YAML files in `dir` (`*.yml` / `*.yaml`), each
/// file holding a list of rules. Rules come back sorted by id so the corpus
/// order is stable regardless of directory iteration order.
///
/// # Errors
///
/// Returns `Validation` for unparseable YAML or duplicate rule ids, and
/// `Internal` for I/O failures.
pub fn load_rules_dir(dir: &Path) -> Result<Vec<SignatureRule>> {
    let mut rules: Vec<SignatureRule> = Vec::new();

    let entries = std::fs::read_dir(dir).map_err(|err| {
        StrataError::Internal(anyhow::anyhow!("read rules dir {}: {err}", dir.display()))
    })?;

    for entry in entries {
        let entry = entry.map_err(|err| StrataError::Internal(err.into()))?;
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"));
        if !is_yaml {
            continue;
        }

        let raw = std::fs::read_to_string(&path).map_err(|err| {
            StrataError::Internal(anyhow::anyhow!("read {}: {err}", path.display()))
        })?;
        let mut file_rules: Vec<SignatureRule> =
            serde_yaml::from_str(&raw).map_err(|err| {
                StrataError::Validation(format!("parse rules {}: {err}", path.display()))
            })?;
        rules.append(&mut file_rules);
    }

    rules.sort_by(|a, b| a.id.cmp(&b.id));
    for pair in rules.windows(2) {
        if pair[0].id == pair[1].id {
            return Err(StrataError::Validation(format!(
                "duplicate rule id '{}'",
                pair[0].id
            )));
        }
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn event(message: &str, attrs: &[(&str, serde_json::Value)]) -> Event {
        Event {
            index_id: "idx-0001".into(),
            doc_id: "ev-0001".into(),
            ts_us: 1_000_000,
            message: message.into(),
            source_type: "test:line".into(),
            attributes: attrs
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn rule(condition: RuleCondition) -> CompiledRule {
        CompiledRule::compile(SignatureRule {
            id: "r1".into(),
            title: "test rule".into(),
            description: String::new(),
            tag: None,
            condition,
        })
        .expect("compile")
    }

    #[test]
    fn contains_is_case_insensitive() {
        let r = rule(RuleCondition::Contains {
            field: "message".into(),
            value: "PsExec".into(),
        });
        assert!(r.matches(&event("PSEXEC service installed", &[])));
        assert!(!r.matches(&event("nothing to see", &[])));
    }

    #[test]
    fn equals_compares_numbers_across_types() {
        let r = rule(RuleCondition::Equals {
            field: "logon_type".into(),
            value: json!(10),
        });
        assert!(r.matches(&event("logon", &[("logon_type", json!(10.0))])));
        assert!(!r.matches(&event("logon", &[("logon_type", json!(2))])));
        assert!(!r.matches(&event("logon", &[])));
    }

    #[test]
    fn regex_matches_rendered_field() {
        let r = rule(RuleCondition::Regex {
            field: "message".into(),
            pattern: r"cmd\.exe\s+/c".into(),
        });
        assert!(r.matches(&event("spawned cmd.exe /c whoami", &[])));
        assert!(!r.matches(&event("spawned powershell", &[])));
    }

    #[test]
    fn invalid_regex_is_a_validation_error() {
        let result = CompiledRule::compile(SignatureRule {
            id: "bad".into(),
            title: "bad".into(),
            description: String::new(),
            tag: None,
            condition: RuleCondition::Regex {
                field: "message".into(),
                pattern: "(unclosed".into(),
            },
        });
        assert!(matches!(result, Err(StrataError::Validation(_))));
    }

    #[test]
    fn range_handles_numbers_and_numeric_strings() {
        let r = rule(RuleCondition::Range {
            field: "severity".into(),
            min: Some(7.0),
            max: None,
        });
        assert!(r.matches(&event("alert", &[("severity", json!(9))])));
        assert!(r.matches(&event("alert", &[("severity", json!("8"))])));
        assert!(!r.matches(&event("alert", &[("severity", json!(3))])));
        assert!(!r.matches(&event("alert", &[("severity", json!("high"))])));
    }

    #[test]
    fn boolean_combinators_compose() {
        let r = rule(RuleCondition::All {
            of: vec![
                RuleCondition::Contains {
                    field: "message".into(),
                    value: "logon".into(),
                },
                RuleCondition::Not {
                    of: Box::new(RuleCondition::Equals {
                        field: "username".into(),
                        value: json!("SYSTEM"),
                    }),
                },
            ],
        });
        assert!(r.matches(&event("logon ok", &[("username", json!("alice"))])));
        assert!(!r.matches(&event("logon ok", &[("username", json!("SYSTEM"))])));
        assert!(!r.matches(&event("logoff", &[("username", json!("alice"))])));
    }

    #[test]
    fn filter_translation_covers_everything_but_regex() {
        let translatable = rule(RuleCondition::Any {
            of: vec![
                RuleCondition::Contains {
                    field: "message".into(),
                    value: "x".into(),
                },
                RuleCondition::Range {
                    field: "pid".into(),
                    min: Some(1.0),
                    max: None,
                },
            ],
        });
        assert!(translatable.as_filter().is_some());

        let with_regex = rule(RuleCondition::All {
            of: vec![
                RuleCondition::Contains {
                    field: "message".into(),
                    value: "x".into(),
                },
                RuleCondition::Regex {
                    field: "message".into(),
                    pattern: "y+".into(),
                },
            ],
        });
        assert!(with_regex.as_filter().is_none());
    }

    #[test]
    fn rules_dir_loads_sorted_and_rejects_duplicates() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("b.yml"),
            "- id: zz\n  title: last\n  condition:\n    kind: contains\n    field: message\n    value: b\n",
        )
        .expect("write");
        std::fs::write(
            dir.path().join("a.yaml"),
            "- id: aa\n  title: first\n  condition:\n    kind: contains\n    field: message\n    value: a\n",
        )
        .expect("write");
        std::fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

        let rules = load_rules_dir(dir.path()).expect("load");
        let ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["aa", "zz"]);

        std::fs::write(
            dir.path().join("c.yml"),
            "- id: aa\n  title: dup\n  condition:\n    kind: contains\n    field: message\n    value: c\n",
        )
        .expect("write");
        assert!(matches!(
            load_rules_dir(dir.path()),
            Err(StrataError::Validation(_))
        ));
    }

    #[test]
    fn default_tag_derives_from_id() {
        let r = SignatureRule {
            id: "proc-psexec".into(),
            title: "PsExec".into(),
            description: String::new(),
            tag: None,
            condition: RuleCondition::Contains {
                field: "message".into(),
                value: "psexec".into(),
            },
        };
        assert_eq!(r.tag_name(), "sig/proc-psexec");
    }
}
