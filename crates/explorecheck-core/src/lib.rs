//! explorecheck core
//!
//! Domain model shared by the Looker client, the isolation engine and the CLI.
//! Never rename diagnostic codes - they are part of the public API.

pub mod diagnostic;
pub mod field;
pub mod outcome;
pub mod report;
pub mod config;

pub use diagnostic::{Diagnostic, DiagnosticCode, Severity, Location};
pub use field::{FieldRef, FieldSet, ExclusionSet, Exclusion, ExclusionOrigin};
pub use outcome::{ExploreRef, ProbeResult, IsolationOutcome, UnresolvedReason};
pub use report::{Report, ReportSummary, ReportVersion};
pub use config::{
    Config, ConfigError, LookerConfig, CheckConfig, ExclusionPolicy, LocatorKind,
    SeverityThreshold, AllowlistRules, glob_match,
};
