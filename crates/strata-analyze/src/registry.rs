//! Analyzer registry: a closed set of named components implementing one
//! fixed capability interface.
//!
//! Analyzers are registered by name and resolved at schedule time; there is
//! no runtime discovery. An analyzer's whole world is the
//! [`AnalyzerContext`] it is handed.

use std::collections::BTreeMap;
use std::sync::Arc;
use strata_core::error::Result;

use crate::context::AnalyzerContext;

/// What an analyzer produced, folded into its run record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Findings {
    /// Count of findings (e.g. matched events).
    pub count: u64,
    /// Free-form result text for the run summary.
    pub summary: String,
}

/// The fixed analyzer capability interface.
pub trait Analyzer: Send + Sync {
    /// Registry name, unique and stable.
    fn name(&self) -> &'static str;

    /// One-line description shown in listings.
    fn description(&self) -> &'static str;

    /// Execute against the context's sketch.
    ///
    /// A returned error is captured into the run's `error` state; it never
    /// crashes the engine or affects concurrently running analyzers.
    ///
    /// # Errors
    ///
    /// Implementations surface unrecoverable faults as errors.
    fn run(&self, ctx: &AnalyzerContext) -> Result<Findings>;
}

/// Named analyzer registry.
#[derive(Default, Clone)]
pub struct AnalyzerRegistry {
    analyzers: BTreeMap<&'static str, Arc<dyn Analyzer>>,
}

impl AnalyzerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an analyzer under its own name. Re-registering a name
    /// replaces the previous entry.
    pub fn register(&mut self, analyzer: Arc<dyn Analyzer>) {
        self.analyzers.insert(analyzer.name(), analyzer);
    }

    /// Look up an analyzer by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Analyzer>> {
        self.analyzers.get(name).cloned()
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.analyzers.contains_key(name)
    }

    /// (name, description) pairs in name order.
    #[must_use]
    pub fn list(&self) -> Vec<(&'static str, &'static str)> {
        self.analyzers
            .values()
            .map(|a| (a.name(), a.description()))
            .collect()
    }
}

impl std::fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzerRegistry")
            .field("names", &self.analyzers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    impl Analyzer for Nop {
        fn name(&self) -> &'static str {
            "nop"
        }

        fn description(&self) -> &'static str {
            "does nothing"
        }

        fn run(&self, _ctx: &AnalyzerContext) -> Result<Findings> {
            Ok(Findings::default())
        }
    }

    #[test]
    fn register_and_resolve() {
        let mut registry = AnalyzerRegistry::new();
        assert!(!registry.contains("nop"));

        registry.register(Arc::new(Nop));
        assert!(registry.contains("nop"));
        assert!(registry.get("nop").is_some());
        assert!(registry.get("ghost").is_none());
        assert_eq!(registry.list(), vec![("nop", "does nothing")]);
    }
}
