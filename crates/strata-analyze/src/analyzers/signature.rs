//! Signature analyzer: rule corpus matching over a sketch's events.
//!
//! One pass over the event stream; every rule is a pure per-event
//! predicate, so the set of (event, rule) matches is deterministic and
//! independent of evaluation order. Matching events get the rule's tag and
//! each matching rule gets a saved search.

use std::collections::BTreeMap;
use strata_core::error::Result;
use strata_core::model::Event;
use strata_search::{SearchQuery, SortOrder};
use tracing::debug;

use crate::context::AnalyzerContext;
use crate::registry::{Analyzer, Findings};
use crate::rules::{CompiledRule, SignatureRule};

/// Rule-based signature matcher.
pub struct SignatureAnalyzer {
    rules: Vec<CompiledRule>,
}

impl SignatureAnalyzer {
    /// Build from a rule corpus, compiling every rule up front.
    ///
    /// # Errors
    ///
    /// Returns `Validation` when any rule fails to compile.
    pub fn new(rules: Vec<SignatureRule>) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Number of rules in the corpus.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    fn check_event(&self, event: &Event, ctx: &AnalyzerContext, hits: &mut BTreeMap<String, u64>) -> Result<u64> {
        let mut matched = 0_u64;
        let event_ref = event.event_ref();
        for rule in &self.rules {
            if rule.matches(event) {
                ctx.add_tag(&event_ref, &rule.rule.tag_name())?;
                *hits.entry(rule.rule.id.clone()).or_default() += 1;
                matched += 1;
            }
        }
        Ok(matched)
    }
}

impl Analyzer for SignatureAnalyzer {
    fn name(&self) -> &'static str {
        "signature"
    }

    fn description(&self) -> &'static str {
        "Tag events matching a structured rule corpus and save one search per matched rule"
    }

    fn run(&self, ctx: &AnalyzerContext) -> Result<Findings> {
        let mut hits: BTreeMap<String, u64> = BTreeMap::new();
        let mut total = 0_u64;

        ctx.for_each_event(&SearchQuery::all(), SortOrder::Time, |event| {
            total += self.check_event(event, ctx, &mut hits)?;
            Ok(())
        })?;

        let mut lines = Vec::new();
        for rule in &self.rules {
            let Some(count) = hits.get(&rule.rule.id) else {
                continue;
            };

            // A translatable condition becomes a replayable filter; regex
            // rules fall back to a full-text search on the rule title.
            let query = rule.as_filter().map_or_else(
                || SearchQuery::text(rule.rule.title.clone()),
                SearchQuery::filter,
            );
            ctx.save_search(&format!("signature: {}", rule.rule.title), &query)?;

            let line = format!("{} ({}): {count} matches", rule.rule.id, rule.rule.title);
            ctx.append_result(&line)?;
            lines.push(line);
        }

        debug!(total, rules_hit = hits.len(), "signature pass finished");
        Ok(Findings {
            count: total,
            summary: if lines.is_empty() {
                "no rule matched".to_string()
            } else {
                lines.join("\n")
            },
        })
    }
}
