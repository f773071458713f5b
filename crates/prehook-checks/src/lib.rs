//! prehook checks
//!
//! The concrete pre-commit checks (whitespace and final-newline fixers,
//! formatter, linter, dependency tidiness, secret scanner), the registry that builds them from configuration, and the
//! pipeline that runs them against one shared [`prehook_core::RepoFacts`].

pub mod check;
pub mod eof;
pub mod fixer;
pub mod fumpt;
pub mod gitleaks;
pub mod lint;
pub mod mod_tidy;
pub mod pipeline;
pub mod registry;
pub mod whitespace;

pub use check::{Check, CheckCategory, CheckMetadata, CheckOutcome, CheckStatus};
pub use eof::EofCheck;
pub use fumpt::FumptCheck;
pub use gitleaks::GitleaksCheck;
pub use lint::LintCheck;
pub use mod_tidy::ModTidyCheck;
pub use pipeline::{CheckReport, Pipeline, PipelineOptions, PipelineResult};
pub use registry::{DependencyError, Registry};
pub use whitespace::WhitespaceCheck;
