//! Built-in analyzers.

pub mod domain;
pub mod signature;

pub use domain::DomainAnalyzer;
pub use signature::SignatureAnalyzer;
