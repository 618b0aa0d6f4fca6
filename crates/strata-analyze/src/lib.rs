//! strata-analyze: analyzer registry, worker-pool execution engine, and
//! signature-rule matching.
//!
//! Analyzers never mutate indexed events. Their writes are limited to tags,
//! comments, saved searches, and their own run summary, all attributed to
//! the run's identity; everything else they see is read-only.

pub mod analyzers;
pub mod context;
pub mod engine;
pub mod registry;
pub mod rules;

pub use analyzers::{DomainAnalyzer, SignatureAnalyzer};
pub use context::AnalyzerContext;
pub use engine::{AnalyzerEngine, EngineConfig};
pub use registry::{Analyzer, AnalyzerRegistry, Findings};
pub use rules::{CompiledRule, RuleCondition, SignatureRule, load_rules_dir};

use std::sync::Arc;
use strata_core::error::Result;

/// Registry with every built-in analyzer, the signature analyzer holding
/// the given rule corpus.
///
/// # Errors
///
/// Returns `Validation` when a rule in the corpus fails to compile.
pub fn builtin_registry(rules: Vec<SignatureRule>) -> Result<AnalyzerRegistry> {
    let mut registry = AnalyzerRegistry::new();
    registry.register(Arc::new(SignatureAnalyzer::new(rules)?));
    registry.register(Arc::new(DomainAnalyzer::new()?));
    Ok(registry)
}
