//! Collaborator traits the isolation engine consumes

use explorecheck_core::{FieldRef, FieldSet};
use std::fmt;

/// Fields an explore exposes, in metadata order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExploreFields {
    /// Non-aggregated fields
    pub dimensions: Vec<FieldRef>,

    /// Aggregated fields
    pub measures: Vec<FieldRef>,
}

impl ExploreFields {
    /// Create a new field listing
    pub fn new(dimensions: Vec<FieldRef>, measures: Vec<FieldRef>) -> Self {
        Self { dimensions, measures }
    }

    /// Dimensions followed by measures, de-duplicated
    pub fn field_set(&self) -> FieldSet {
        FieldSet::from_parts(self.dimensions.clone(), self.measures.clone())
    }
}

/// A compiled query on the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryHandle {
    /// Backend query id
    pub id: String,

    /// Human-shareable link to the query
    pub share_url: Option<String>,
}

impl QueryHandle {
    pub fn new(id: impl Into<String>, share_url: Option<String>) -> Self {
        Self {
            id: id.into(),
            share_url,
        }
    }
}

/// Result format requested when running a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultFormat {
    /// Compact CSV data probe
    Csv,

    /// JSON rows
    Json,

    /// The generated SQL, without running it
    Sql,
}

impl ResultFormat {
    /// Path segment used by the run endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Sql => "sql",
        }
    }
}

impl fmt::Display for ResultFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur when talking to the backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Empty payload: {0}")]
    EmptyPayload(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl FetchError {
    /// Whether this error means the backend could not be reached or answered nothing usable
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::NetworkError(_) | Self::EmptyPayload(_) | Self::InvalidResponse(_)
        )
    }
}

/// Supplies models, explores and fields
#[async_trait::async_trait]
pub trait MetadataProvider: Send + Sync {
    /// All model names
    async fn list_models(&self) -> Result<Vec<String>, FetchError>;

    /// Explore names of a model; `NotFound` if the model is unknown
    async fn list_explores(&self, model: &str) -> Result<Vec<String>, FetchError>;

    /// Fields of an explore; `NotFound` if the explore is unknown
    async fn list_fields(&self, model: &str, explore: &str) -> Result<ExploreFields, FetchError>;
}

/// Compiles field sets into queries and runs them
///
/// Backend-reported SQL errors are NOT errors at this level: they come back
/// as ordinary text payloads. `Err` is reserved for transport-level failures
/// and missing metadata. `Ok(None)` means the backend answered with no payload.
#[async_trait::async_trait]
pub trait QueryRunner: Send + Sync {
    /// Create a query selecting `fields` from `explore`
    async fn create_query(
        &self,
        model: &str,
        explore: &str,
        fields: &FieldSet,
    ) -> Result<QueryHandle, FetchError>;

    /// Run a query and return its raw textual result
    async fn execute(
        &self,
        query: &QueryHandle,
        format: ResultFormat,
        row_limit: Option<u32>,
    ) -> Result<Option<String>, FetchError>;
}

/// A backend that is both a metadata provider and a query runner
pub trait LookerBackend: MetadataProvider + QueryRunner {}

impl<T: MetadataProvider + QueryRunner> LookerBackend for T {}
