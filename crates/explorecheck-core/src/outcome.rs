//! Probe results and terminal isolation outcomes

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::field::{ExclusionSet, FieldSet};

/// A (model, explore) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExploreRef {
    /// LookML model name
    pub model: String,

    /// Explore name within the model
    pub explore: String,
}

impl ExploreRef {
    /// Create a new explore reference
    pub fn new(model: impl Into<String>, explore: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            explore: explore.into(),
        }
    }

    /// `model.explore`, the form allowlist patterns match against
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.model, self.explore)
    }
}

impl fmt::Display for ExploreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified())
    }
}

/// Outcome of executing one probe query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProbeResult {
    /// The backend returned data
    Success {
        /// Data rows in the compact probe (0 or 1 for a one-row probe)
        row_count_probe: usize,

        /// Shareable link to the query
        shared_reference: Option<String>,
    },

    /// The backend reported an error in place of data
    Error {
        /// Raw error payload as returned by the backend
        raw_message: String,

        /// Shareable link to the query
        shared_reference: Option<String>,
    },
}

impl ProbeResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn shared_reference(&self) -> Option<&str> {
        match self {
            Self::Success { shared_reference, .. } | Self::Error { shared_reference, .. } => {
                shared_reference.as_deref()
            }
        }
    }
}

/// Why an isolation run stopped without a clean probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// An error occurred and isolation was not requested
    FailFast,

    /// No field in the live set could be tied to the error text
    UnlocatableCulprit,

    /// Every field was excluded before any probe succeeded
    Exhausted,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailFast => write!(f, "stopped at first error"),
            Self::UnlocatableCulprit => write!(f, "no culprit field found in error"),
            Self::Exhausted => write!(f, "all fields excluded"),
        }
    }
}

/// Terminal result of one isolation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum IsolationOutcome {
    /// A probe over the remaining fields succeeded
    Clean {
        fields_validated: FieldSet,
        excluded: ExclusionSet,
        share_url: Option<String>,
        probes: usize,
    },

    /// The run gave up
    Unresolved {
        reason: UnresolvedReason,
        last_error: Option<String>,
        excluded: ExclusionSet,
        share_url: Option<String>,
        /// Generated SQL of the last failing query, when it was fetched
        sql: Option<String>,
        probes: usize,
    },
}

impl IsolationOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean { .. })
    }

    pub fn excluded(&self) -> &ExclusionSet {
        match self {
            Self::Clean { excluded, .. } | Self::Unresolved { excluded, .. } => excluded,
        }
    }

    /// Number of probe queries executed during the run
    pub fn probes(&self) -> usize {
        match self {
            Self::Clean { probes, .. } | Self::Unresolved { probes, .. } => *probes,
        }
    }

    pub fn share_url(&self) -> Option<&str> {
        match self {
            Self::Clean { share_url, .. } | Self::Unresolved { share_url, .. } => share_url.as_deref(),
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        match self {
            Self::Clean { .. } => None,
            Self::Unresolved { last_error, .. } => last_error.as_deref(),
        }
    }
}
