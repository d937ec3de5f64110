//! Looker REST API client
//!
//! Speaks the subset of the Looker API the explore checks need: login,
//! session workspace, LookML model/explore metadata, query creation and
//! query runs.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let client = LookerClient::new(&config.looker)?;
//! client.login().await?;
//! let me = client.me().await?;
//! client.set_workspace(Workspace::Dev).await?;
//! let models = client.list_models().await?;
//! ```
//!
//! Reference: https://developers.looker.com/api/explorer/4.0/

use crate::adapter::{ExploreFields, FetchError, MetadataProvider, QueryHandle, QueryRunner, ResultFormat};
use explorecheck_core::{FieldRef, FieldSet, LookerConfig};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;

/// Session workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workspace {
    /// The caller's development branch
    Dev,

    /// Deployed production LookML
    Production,
}

impl Workspace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Production => "production",
        }
    }
}

/// Authenticated API user
#[derive(Debug, Clone, Deserialize)]
pub struct LookerUser {
    id: serde_json::Value,

    /// Display name, when the account has one
    #[serde(default)]
    pub display_name: Option<String>,
}

impl LookerUser {
    /// User id as text (API 3.1 returns numbers, 4.0 strings)
    pub fn id(&self) -> String {
        id_string(&self.id)
    }
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct NamedItem {
    name: String,
}

#[derive(Debug, Deserialize)]
struct LookmlModel {
    #[serde(default)]
    explores: Vec<NamedItem>,
}

#[derive(Debug, Deserialize)]
struct LookmlExplore {
    fields: LookmlExploreFields,
}

#[derive(Debug, Default, Deserialize)]
struct LookmlExploreFields {
    #[serde(default)]
    dimensions: Vec<NamedItem>,

    #[serde(default)]
    measures: Vec<NamedItem>,
}

#[derive(Debug, Serialize)]
struct WriteQuery<'a> {
    model: &'a str,
    view: &'a str,
    fields: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedQuery {
    id: serde_json::Value,

    #[serde(default)]
    share_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct WriteApiSession<'a> {
    workspace_id: &'a str,
}

fn id_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Looker API client
pub struct LookerClient {
    http: Client,
    base_url: String,
    api_version: String,
    client_id: String,
    client_secret: String,
    token: RwLock<Option<String>>,
}

impl LookerClient {
    /// Create a client from connection settings. Does not log in.
    pub fn new(config: &LookerConfig) -> Result<Self, FetchError> {
        config
            .validate()
            .map_err(|e| FetchError::ConfigError(e.to_string()))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| FetchError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token: RwLock::new(None),
        })
    }

    /// Full URL of an API path such as `/lookml_models`
    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}{}", self.base_url, self.api_version, path)
    }

    /// API URL built from path segments, each percent-encoded on its own
    ///
    /// A model or explore name containing `/` or `?` stays inside its segment.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.api_url(""))
            .map_err(|e| FetchError::ConfigError(format!("Invalid base URL '{}': {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::ConfigError(format!("Base URL '{}' cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Exchange client credentials for an access token
    pub async fn login(&self) -> Result<(), FetchError> {
        let response = self
            .http
            .post(self.endpoint(&["login"])?)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::AuthenticationError(format!(
                "login returned {}: {}",
                status,
                body.trim()
            )));
        }

        let token: AccessToken = response
            .json()
            .await
            .map_err(|e| FetchError::InvalidResponse(format!("login response: {}", e)))?;

        *self.token.write().await = Some(token.access_token);
        tracing::debug!(base_url = %self.base_url, "logged in to Looker API");
        Ok(())
    }

    /// The authenticated user
    pub async fn me(&self) -> Result<LookerUser, FetchError> {
        self.get_json(&["user"], &[("fields", "id,display_name")], "current user").await
    }

    /// Switch the API session between dev and production
    pub async fn set_workspace(&self, workspace: Workspace) -> Result<(), FetchError> {
        let request = self
            .http
            .patch(self.endpoint(&["session"])?)
            .json(&WriteApiSession {
                workspace_id: workspace.as_str(),
            });
        let response = self.send(request).await?;
        check_status(response, "session").await?;
        tracing::info!(workspace = workspace.as_str(), "session workspace updated");
        Ok(())
    }

    async fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, FetchError> {
        let token = self.token.read().await;
        match token.as_deref() {
            Some(token) => Ok(request.header(reqwest::header::AUTHORIZATION, format!("token {}", token))),
            None => Err(FetchError::AuthenticationError(
                "not logged in; call login() first".to_string(),
            )),
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, FetchError> {
        self.authorize(request)
            .await?
            .send()
            .await
            .map_err(transport_error)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<T, FetchError> {
        let request = self.http.get(self.endpoint(segments)?).query(query);
        let response = check_status(self.send(request).await?, what).await?;
        response
            .json()
            .await
            .map_err(|e| FetchError::InvalidResponse(format!("{}: {}", what, e)))
    }
}

fn transport_error(error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::NetworkError(format!("request timed out: {}", error))
    } else {
        FetchError::NetworkError(error.to_string())
    }
}

/// Map a non-success status to the matching error
pub fn status_error(status: StatusCode, body: &str, what: &str) -> FetchError {
    let body = body.trim();
    match status {
        StatusCode::NOT_FOUND => FetchError::NotFound(what.to_string()),
        StatusCode::UNAUTHORIZED => FetchError::AuthenticationError(format!("{}: {}", what, body)),
        StatusCode::FORBIDDEN => FetchError::PermissionDenied(format!("{}: {}", what, body)),
        s if s.is_server_error() => FetchError::NetworkError(format!("{} returned {}: {}", what, s, body)),
        s => FetchError::QueryError(format!("{} returned {}: {}", what, s, body)),
    }
}

async fn check_status(response: Response, what: &str) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body, what))
}

#[async_trait::async_trait]
impl MetadataProvider for LookerClient {
    async fn list_models(&self) -> Result<Vec<String>, FetchError> {
        let models: Vec<NamedItem> = self
            .get_json(&["lookml_models"], &[("fields", "name")], "models")
            .await?;
        Ok(models.into_iter().map(|m| m.name).collect())
    }

    async fn list_explores(&self, model: &str) -> Result<Vec<String>, FetchError> {
        let what = format!("model '{}'", model);
        let model: LookmlModel = self
            .get_json(&["lookml_models", model], &[("fields", "explores")], &what)
            .await?;
        Ok(model.explores.into_iter().map(|e| e.name).collect())
    }

    async fn list_fields(&self, model: &str, explore: &str) -> Result<ExploreFields, FetchError> {
        let what = format!("explore '{}' in model '{}'", explore, model);
        let explore: LookmlExplore = self
            .get_json(&["lookml_models", model, "explores", explore], &[("fields", "fields")], &what)
            .await?;
        Ok(explore_fields(explore.fields))
    }
}

fn explore_fields(fields: LookmlExploreFields) -> ExploreFields {
    ExploreFields::new(
        fields.dimensions.into_iter().map(|d| FieldRef::new(d.name)).collect(),
        fields.measures.into_iter().map(|m| FieldRef::new(m.name)).collect(),
    )
}

#[async_trait::async_trait]
impl QueryRunner for LookerClient {
    async fn create_query(
        &self,
        model: &str,
        explore: &str,
        fields: &FieldSet,
    ) -> Result<QueryHandle, FetchError> {
        let body = WriteQuery {
            model,
            view: explore,
            fields: fields.names(),
        };
        let request = self.http.post(self.endpoint(&["queries"])?).json(&body);
        let what = format!("query on {}.{}", model, explore);
        let response = check_status(self.send(request).await?, &what).await?;

        let query: CreatedQuery = response
            .json()
            .await
            .map_err(|e| FetchError::InvalidResponse(format!("{}: {}", what, e)))?;

        tracing::debug!(query_id = %id_string(&query.id), fields = fields.len(), "created query");
        Ok(QueryHandle::new(id_string(&query.id), query.share_url))
    }

    async fn execute(
        &self,
        query: &QueryHandle,
        format: ResultFormat,
        row_limit: Option<u32>,
    ) -> Result<Option<String>, FetchError> {
        let url = self.endpoint(&["queries", query.id.as_str(), "run", format.as_str()])?;
        let mut request = self.http.get(url);
        if let Some(limit) = row_limit {
            request = request.query(&[("limit", limit.to_string())]);
        }

        let response = self.send(request).await?;
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            // Non-success bodies are never returned as a payload
            let what = format!("run of query {}", query.id);
            return Err(status_error(status, &body, &what));
        }

        Ok((!body.trim().is_empty()).then_some(body))
    }
}
