//! Diagnostic codes and error reporting
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Explore outcomes (1xxx)
    /// Every remaining field in the explore compiled and ran
    ExploreClean,

    /// The explore still errors and isolation stopped
    ExploreUnresolved,

    // Field-level findings (2xxx)
    /// A field was identified as the cause of a SQL error and excluded
    FieldExcluded,

    /// A field was excluded up front by configuration
    FieldSeededExclude,

    /// An error was returned but no field could be tied to it
    CulpritUnlocatable,

    // Target and transport failures (3xxx)
    /// The requested model or explore does not exist
    MetadataNotFound,

    /// The API was unreachable or returned no payload
    TransportFailure,

    // General (9xxx)
    /// General informational message
    Info,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExploreClean => "EXPLORE_CLEAN",
            Self::ExploreUnresolved => "EXPLORE_UNRESOLVED",
            Self::FieldExcluded => "FIELD_EXCLUDED",
            Self::FieldSeededExclude => "FIELD_SEEDED_EXCLUDE",
            Self::CulpritUnlocatable => "CULPRIT_UNLOCATABLE",
            Self::MetadataNotFound => "METADATA_NOT_FOUND",
            Self::TransportFailure => "TRANSPORT_FAILURE",
            Self::Info => "INFO",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - should be reviewed but not blocking
    Warn,

    /// Error - blocking issue that should fail CI
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Where in the semantic layer a diagnostic applies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Model name
    pub model: String,

    /// Explore name, if the diagnostic is narrower than a model
    pub explore: Option<String>,

    /// Fully-qualified field, if the diagnostic concerns a single field
    pub field: Option<String>,
}

impl Location {
    /// Create a location for a whole model
    pub fn model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            explore: None,
            field: None,
        }
    }

    /// Create a location for an explore
    pub fn explore(model: impl Into<String>, explore: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            explore: Some(explore.into()),
            field: None,
        }
    }

    /// Narrow the location to a field
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.model)?;
        if let Some(explore) = &self.explore {
            write!(f, "/{}", explore)?;
        }
        if let Some(field) = &self.field {
            write!(f, " [{}]", field)?;
        }
        Ok(())
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Model/explore/field the diagnostic concerns
    pub location: Option<Location>,

    /// Raw backend error text, when there is one
    pub detail: Option<String>,

    /// Shareable link to the query that produced this diagnostic
    pub share_url: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
            detail: None,
            share_url: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Attach the raw backend error
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach a shareable query link
    pub fn with_share_url(mut self, url: Option<String>) -> Self {
        self.share_url = url;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_code_stability() {
        // Ensure codes are stable strings
        assert_eq!(DiagnosticCode::FieldExcluded.as_str(), "FIELD_EXCLUDED");
        assert_eq!(DiagnosticCode::MetadataNotFound.as_str(), "METADATA_NOT_FOUND");
        assert_eq!(DiagnosticCode::Info.as_str(), "INFO");
    }

    #[test]
    fn diagnostic_serialization() {
        let diag = Diagnostic::new(
            DiagnosticCode::FieldExcluded,
            Severity::Error,
            "Field 'users.age_tier' causes a SQL error",
        )
        .with_location(Location::explore("ecommerce", "users").with_field("users.age_tier"))
        .with_detail("SQL Error: Unrecognized name: age_tier");

        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("FIELD_EXCLUDED"));
        assert!(json.contains("error"));
        assert!(json.contains("users.age_tier"));
    }

    #[test]
    fn location_display() {
        let loc = Location::explore("ecommerce", "users").with_field("users.id");
        assert_eq!(loc.to_string(), "ecommerce/users [users.id]");
        assert_eq!(Location::model("ecommerce").to_string(), "ecommerce");
    }
}
