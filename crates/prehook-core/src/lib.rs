//! prehook core library
//!
//! Repository fact caching, file-to-module resolution, per-group validator
//! execution and result aggregation shared by every prehook check.

pub mod aggregate;
pub mod config;
pub mod constraints;
pub mod deadline;
pub mod diagnostics;
pub mod error;
pub mod facts;
pub mod fakes;
pub mod git;
pub mod grouping;
pub mod module;
pub mod obs;
pub mod process;
pub mod telemetry;
pub mod validation;

pub use aggregate::{aggregate, AggregatedResult};
pub use config::{CheckSettings, Config};
pub use constraints::detect_constraints;
pub use deadline::Deadline;
pub use error::{CapabilityError, PrehookError, Result};
pub use facts::{CapabilityInfo, RepoFacts, CAPABILITY_TTL};
pub use grouping::{FileGroup, FileGrouper, InvocationTarget};
pub use module::ModuleResolver;
pub use process::{CommandRunner, CommandSpec, ProcessOutput, TokioCommandRunner};
pub use telemetry::init_tracing;
pub use validation::{classify, Classification, ValidationOutcome, ValidationRunner, Validator};

/// prehook version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
