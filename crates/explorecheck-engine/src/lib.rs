//! explorecheck engine - fault isolation for Looker explores
//!
//! This crate implements the checking logic:
//! - Error classification of probe payloads
//! - Culprit location from error text and generated SQL
//! - The bounded probe/exclude loop for one explore
//! - The sweep over models and explores, and report aggregation
//!
//! It talks to Looker only through the traits in `explorecheck-looker` and
//! never prints; progress goes to a [`Reporter`].

pub mod classifier;
pub mod isolator;
pub mod locator;
pub mod reporter;
pub mod summary;
pub mod sweep;

pub use classifier::{classify, count_probe_rows, headline, Verdict};
pub use isolator::{FaultIsolator, IsolationError, IsolatorOptions};
pub use locator::{locator_for, ChainLocator, CulpritLocator, ErrorContext, SqlLineLocator, SubstringLocator};
pub use reporter::{IsolationEvent, NullReporter, RecordingReporter, Reporter, SweepCounts};
pub use summary::SweepSummary;
pub use sweep::{resolve_targets, ExploreResult, ExploreStatus, Sweep, SweepOptions, TargetError};
