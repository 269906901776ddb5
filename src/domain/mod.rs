//! Domain layer for Schema Warden
//!
//! CDD Principle: Domain Model - Pure business logic for structural validation
//! - Contains documents, violations, reports and the error taxonomy
//! - Independent of the compilation pool, worker threads and rule-set files
//! - Expresses the ubiquitous language of rule sets, diagnostics and violations

pub mod document;
pub mod violations;

// Re-export main domain types for convenience
pub use document::*;
pub use violations::*;
