//! Progress events emitted while explores are checked
//!
//! The engine never prints. It hands every step to a [`Reporter`], which the
//! CLI renders to the terminal and tests record for assertions.

use explorecheck_core::{ExploreRef, FieldRef, IsolationOutcome};
use std::sync::Mutex;

/// Per-status explore counts at the end of a sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepCounts {
    pub clean: usize,
    pub unresolved: usize,
    pub not_found: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl SweepCounts {
    /// Explores that were probed or attempted (skipped ones excluded)
    pub fn attempted(&self) -> usize {
        self.clean + self.unresolved + self.not_found + self.failed
    }

    /// Whether anything needs attention
    pub fn has_failures(&self) -> bool {
        self.unresolved + self.not_found + self.failed > 0
    }
}

/// One observable step of a check
#[derive(Debug, Clone, PartialEq)]
pub enum IsolationEvent {
    /// Fields of the explore were fetched and probing starts
    ExploreStarted { target: ExploreRef, field_count: usize },

    /// A probe query is about to run
    ProbeIssued { target: ExploreRef, probe: usize, field_count: usize },

    /// The first error was seen and isolation continues
    ErrorsFound { target: ExploreRef, message: String },

    /// A culprit field was excluded
    FieldExcluded { target: ExploreRef, field: FieldRef, remaining: usize },

    /// Isolation finished for the explore
    Finished { target: ExploreRef, outcome: IsolationOutcome },

    /// The model or explore does not exist
    TargetNotFound { target: ExploreRef, message: String },

    /// Transport failure; the explore was abandoned
    TargetFailed { target: ExploreRef, error: String },

    /// Explore matched an allowlist skip rule
    Skipped { target: ExploreRef },

    /// Every target has been handled
    SweepFinished { counts: SweepCounts },
}

impl IsolationEvent {
    /// Explore the event concerns, if any
    pub fn target(&self) -> Option<&ExploreRef> {
        match self {
            Self::ExploreStarted { target, .. }
            | Self::ProbeIssued { target, .. }
            | Self::ErrorsFound { target, .. }
            | Self::FieldExcluded { target, .. }
            | Self::Finished { target, .. }
            | Self::TargetNotFound { target, .. }
            | Self::TargetFailed { target, .. }
            | Self::Skipped { target } => Some(target),
            Self::SweepFinished { .. } => None,
        }
    }
}

/// Receives progress events
pub trait Reporter: Send + Sync {
    fn report(&self, event: &IsolationEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _event: &IsolationEvent) {}
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<IsolationEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events so far
    pub fn events(&self) -> Vec<IsolationEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Fields excluded, in the order the events arrived
    pub fn excluded_fields(&self) -> Vec<FieldRef> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                IsolationEvent::FieldExcluded { field, .. } => Some(field),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, event: &IsolationEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}
