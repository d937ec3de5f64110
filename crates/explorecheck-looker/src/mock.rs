//! In-memory Looker backend for testing
//!
//! This backend answers metadata and query calls without any network access.
//! It's useful for:
//! - Unit testing the isolation engine
//! - Integration testing CLI flows without credentials
//! - Simulating SQL errors, transport failures and absent payloads
//!
//! ## Usage
//!
//! ```rust,ignore
//! use explorecheck_looker::{MockLooker, MetadataProvider};
//!
//! let backend = MockLooker::builder()
//!     .with_explore("ecommerce", "users", &["users.id", "users.age_tier"], &["users.count"])
//!     .fail_field("users.age_tier", "Unrecognized name: age_tier at [3:5]")
//!     .build();
//!
//! let fields = backend.list_fields("ecommerce", "users").await?;
//! ```
//!
//! A CSV probe that includes a failing field answers `SQL Error: <message>`
//! for the first failing field in query order. Any other probe answers a CSV
//! header plus one row. SQL runs answer a `SELECT` with one
//! `view.field AS view_field` line per field, starting on line 2.

use crate::adapter::{ExploreFields, FetchError, MetadataProvider, QueryHandle, QueryRunner, ResultFormat};
use explorecheck_core::{FieldRef, FieldSet};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Custom probe responder: given the probed fields, return the payload
pub type Responder = Arc<dyn Fn(&FieldSet) -> Option<String> + Send + Sync>;

#[derive(Debug, Clone)]
struct StoredQuery {
    model: String,
    explore: String,
    fields: FieldSet,
}

/// One recorded query run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRun {
    pub model: String,
    pub explore: String,
    pub fields: FieldSet,
    pub format: ResultFormat,
    pub row_limit: Option<u32>,
}

/// Mock Looker backend
///
/// Cloning shares the recorded history, so a test can keep a handle while
/// the engine owns another.
#[derive(Clone)]
pub struct MockLooker {
    models: Arc<BTreeMap<String, BTreeMap<String, ExploreFields>>>,
    failing: Arc<Vec<(FieldRef, String)>>,
    responder: Option<Responder>,
    fail_transport: bool,
    empty_payload: bool,
    latency_ms: u64,
    queries: Arc<RwLock<HashMap<String, StoredQuery>>>,
    runs: Arc<RwLock<Vec<RecordedRun>>>,
    next_id: Arc<AtomicUsize>,
}

impl MockLooker {
    /// Start building a mock backend
    pub fn builder() -> MockLookerBuilder {
        MockLookerBuilder::new()
    }

    /// Every query run so far, in order
    pub async fn runs(&self) -> Vec<RecordedRun> {
        self.runs.read().await.clone()
    }

    /// Field sets of every data probe (CSV/JSON runs), in order
    pub async fn probes(&self) -> Vec<FieldSet> {
        self.runs
            .read()
            .await
            .iter()
            .filter(|r| r.format != ResultFormat::Sql)
            .map(|r| r.fields.clone())
            .collect()
    }

    /// Number of data probes executed
    pub async fn probe_count(&self) -> usize {
        self.probes().await.len()
    }

    /// Forget recorded runs
    pub async fn clear_runs(&self) {
        self.runs.write().await.clear();
    }

    /// Payload for a data probe over `fields`
    fn probe_payload(&self, fields: &FieldSet) -> Option<String> {
        if let Some(responder) = &self.responder {
            return responder(fields);
        }

        let failure = fields.iter().find_map(|field| {
            self.failing
                .iter()
                .find(|(failing, _)| failing == field)
                .map(|(_, message)| message)
        });

        Some(match failure {
            Some(message) => format!("SQL Error: {}", message),
            None => csv_payload(fields),
        })
    }

    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }
    }

    fn explore(&self, model: &str, explore: &str) -> Result<&ExploreFields, FetchError> {
        let explores = self
            .models
            .get(model)
            .ok_or_else(|| FetchError::NotFound(format!("model '{}'", model)))?;
        explores
            .get(explore)
            .ok_or_else(|| FetchError::NotFound(format!("explore '{}' in model '{}'", explore, model)))
    }
}

/// CSV header plus one row of placeholder values
fn csv_payload(fields: &FieldSet) -> String {
    let header = fields.names().join(",");
    let row = vec!["1"; fields.len()].join(",");
    format!("{}\n{}\n", header, row)
}

/// `SELECT` statement listing one aliased field per line, starting on line 2
pub fn sql_payload(explore: &str, fields: &FieldSet) -> String {
    let mut sql = String::from("SELECT\n");
    let last = fields.len().saturating_sub(1);
    for (i, field) in fields.iter().enumerate() {
        let separator = if i == last { "" } else { "," };
        sql.push_str(&format!("    {}  AS {}{}\n", field, field.sql_alias(), separator));
    }
    sql.push_str(&format!("FROM {} AS {}\nLIMIT 500\n", explore, explore));
    sql
}

#[async_trait::async_trait]
impl MetadataProvider for MockLooker {
    async fn list_models(&self) -> Result<Vec<String>, FetchError> {
        self.simulate_latency().await;
        Ok(self.models.keys().cloned().collect())
    }

    async fn list_explores(&self, model: &str) -> Result<Vec<String>, FetchError> {
        self.simulate_latency().await;
        self.models
            .get(model)
            .map(|explores| explores.keys().cloned().collect())
            .ok_or_else(|| FetchError::NotFound(format!("model '{}'", model)))
    }

    async fn list_fields(&self, model: &str, explore: &str) -> Result<ExploreFields, FetchError> {
        self.simulate_latency().await;
        self.explore(model, explore).cloned()
    }
}

#[async_trait::async_trait]
impl QueryRunner for MockLooker {
    async fn create_query(
        &self,
        model: &str,
        explore: &str,
        fields: &FieldSet,
    ) -> Result<QueryHandle, FetchError> {
        self.simulate_latency().await;
        self.explore(model, explore)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = id.to_string();
        self.queries.write().await.insert(
            id.clone(),
            StoredQuery {
                model: model.to_string(),
                explore: explore.to_string(),
                fields: fields.clone(),
            },
        );

        let share_url = format!("https://mock.looker.test/x/q{}", id);
        Ok(QueryHandle::new(id, Some(share_url)))
    }

    async fn execute(
        &self,
        query: &QueryHandle,
        format: ResultFormat,
        row_limit: Option<u32>,
    ) -> Result<Option<String>, FetchError> {
        self.simulate_latency().await;

        let stored = self
            .queries
            .read()
            .await
            .get(&query.id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(format!("query {}", query.id)))?;

        self.runs.write().await.push(RecordedRun {
            model: stored.model.clone(),
            explore: stored.explore.clone(),
            fields: stored.fields.clone(),
            format,
            row_limit,
        });

        if self.fail_transport {
            return Err(FetchError::NetworkError("Simulated connection failure".to_string()));
        }

        if self.empty_payload {
            return Ok(None);
        }

        Ok(match format {
            ResultFormat::Sql => Some(sql_payload(&stored.explore, &stored.fields)),
            ResultFormat::Csv | ResultFormat::Json => self.probe_payload(&stored.fields),
        })
    }
}

/// Builder for creating a MockLooker with explores and scripted failures
pub struct MockLookerBuilder {
    models: BTreeMap<String, BTreeMap<String, ExploreFields>>,
    failing: Vec<(FieldRef, String)>,
    responder: Option<Responder>,
    fail_transport: bool,
    empty_payload: bool,
    latency_ms: u64,
}

impl MockLookerBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            models: BTreeMap::new(),
            failing: Vec::new(),
            responder: None,
            fail_transport: false,
            empty_payload: false,
            latency_ms: 0,
        }
    }

    /// Register an explore with its dimensions and measures
    pub fn with_explore(mut self, model: &str, explore: &str, dimensions: &[&str], measures: &[&str]) -> Self {
        let fields = ExploreFields::new(
            dimensions.iter().map(|d| FieldRef::new(*d)).collect(),
            measures.iter().map(|m| FieldRef::new(*m)).collect(),
        );
        self.models
            .entry(model.to_string())
            .or_default()
            .insert(explore.to_string(), fields);
        self
    }

    /// Register a model with no explores
    pub fn with_model(mut self, model: &str) -> Self {
        self.models.entry(model.to_string()).or_default();
        self
    }

    /// Make probes containing `field` fail with `message`
    pub fn fail_field(mut self, field: &str, message: &str) -> Self {
        self.failing.push((FieldRef::new(field), message.to_string()));
        self
    }

    /// Answer every data probe through a custom function
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&FieldSet) -> Option<String> + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Fail every query run with a network error
    pub fn with_transport_failure(mut self) -> Self {
        self.fail_transport = true;
        self
    }

    /// Answer every query run with no payload
    pub fn with_empty_payload(mut self) -> Self {
        self.empty_payload = true;
        self
    }

    /// Simulate latency for all calls
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Build the backend
    pub fn build(self) -> MockLooker {
        MockLooker {
            models: Arc::new(self.models),
            failing: Arc::new(self.failing),
            responder: self.responder,
            fail_transport: self.fail_transport,
            empty_payload: self.empty_payload,
            latency_ms: self.latency_ms,
            queries: Arc::new(RwLock::new(HashMap::new())),
            runs: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Default for MockLookerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
