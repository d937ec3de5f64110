//! Configuration schema (explorecheck.toml)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use crate::diagnostic::{DiagnosticCode, Severity};

/// Default Looker API version
pub const DEFAULT_API_VERSION: &str = "4.0";

/// Looker API connection settings
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct LookerConfig {
    /// Instance URL, e.g. `https://mycompany.looker.com:19999`
    #[serde(default)]
    pub base_url: String,

    /// API3 client id
    #[serde(default)]
    pub client_id: String,

    /// API3 client secret
    #[serde(default)]
    pub client_secret: String,

    /// API version segment used in request paths
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Verify TLS certificates
    #[serde(default = "default_true")]
    pub verify_ssl: bool,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    120
}

impl Default for LookerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            api_version: default_api_version(),
            verify_ssl: true,
            timeout_secs: default_timeout(),
        }
    }
}

// Secrets stay out of debug output and logs
impl std::fmt::Debug for LookerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookerConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("api_version", &self.api_version)
            .field("verify_ssl", &self.verify_ssl)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl LookerConfig {
    /// Apply `LOOKERSDK_*` environment overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply `LOOKERSDK_*` overrides from an arbitrary lookup
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("LOOKERSDK_BASE_URL") {
            self.base_url = url;
        }
        if let Some(id) = lookup("LOOKERSDK_CLIENT_ID") {
            self.client_id = id;
        }
        if let Some(secret) = lookup("LOOKERSDK_CLIENT_SECRET") {
            self.client_secret = secret;
        }
        if let Some(version) = lookup("LOOKERSDK_API_VERSION") {
            self.api_version = version;
        }
        if let Some(verify) = lookup("LOOKERSDK_VERIFY_SSL") {
            self.verify_ssl = !matches!(verify.trim().to_lowercase().as_str(), "false" | "0" | "no");
        }
        if let Some(timeout) = lookup("LOOKERSDK_TIMEOUT").and_then(|t| t.trim().parse().ok()) {
            self.timeout_secs = timeout;
        }
    }

    /// Check that the settings needed to log in are present
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing: Vec<&str> = [
            ("base_url", self.base_url.is_empty()),
            ("client_id", self.client_id.is_empty()),
            ("client_secret", self.client_secret.is_empty()),
        ]
        .iter()
        .filter(|(_, empty)| *empty)
        .map(|(name, _)| *name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingSetting(missing.join(", ")))
        }
    }
}

/// How many located culprits to exclude per failing probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExclusionPolicy {
    /// Exclude only the first match in field order
    #[default]
    First,

    /// Exclude every match at once
    AllMatches,
}

impl std::str::FromStr for ExclusionPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Self::First),
            "all-matches" | "all" => Ok(Self::AllMatches),
            other => Err(ConfigError::ParseError(format!("unknown exclusion policy '{}'", other))),
        }
    }
}

/// Which culprit locator the engine uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocatorKind {
    /// Unqualified field name appears in the error text
    Substring,

    /// Aliases on the SQL line the error points at
    SqlLine,

    /// SQL line first, then substring
    #[default]
    Chain,
}

impl std::str::FromStr for LocatorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "substring" => Ok(Self::Substring),
            "sql-line" => Ok(Self::SqlLine),
            "chain" => Ok(Self::Chain),
            other => Err(ConfigError::ParseError(format!("unknown locator '{}'", other))),
        }
    }
}

/// Settings for explore checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckConfig {
    /// Isolate culprit fields instead of stopping at the first error
    #[serde(default)]
    pub continue_on_error: bool,

    /// Run against the dev workspace instead of production
    #[serde(default)]
    pub dev: bool,

    /// Fields to exclude up front (exact `view.field` names or globs)
    #[serde(default)]
    pub excludes: Vec<String>,

    /// Culprits excluded per failing probe
    #[serde(default)]
    pub exclusion_policy: ExclusionPolicy,

    /// Culprit locator
    #[serde(default)]
    pub locator: LocatorKind,

    /// Fetch the generated SQL when an explore stays unresolved
    #[serde(default = "default_true")]
    pub capture_sql: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            dev: false,
            excludes: Vec::new(),
            exclusion_policy: ExclusionPolicy::default(),
            locator: LocatorKind::default(),
            capture_sql: true,
        }
    }
}

/// Severity threshold overrides for specific diagnostic codes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityThreshold {
    /// Map of diagnostic code to severity override
    pub overrides: HashMap<String, Severity>,
}

impl SeverityThreshold {
    /// Get severity for a diagnostic code, or default
    pub fn get_severity(&self, code: DiagnosticCode, default: Severity) -> Severity {
        self.overrides
            .get(code.as_str())
            .copied()
            .unwrap_or(default)
    }

    /// Set severity override for a code
    pub fn set_override(&mut self, code: DiagnosticCode, severity: Severity) {
        self.overrides.insert(code.as_str().to_string(), severity);
    }
}

/// Allowlist rules for specific explores
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllowlistRules {
    /// Skip these explores entirely (glob patterns over `model.explore`)
    #[serde(default)]
    pub skip_explores: Vec<String>,
}

impl AllowlistRules {
    /// Check if an explore should be skipped
    pub fn is_explore_skipped(&self, qualified_explore: &str) -> bool {
        self.skip_explores.iter().any(|pattern| {
            if pattern.contains('*') {
                glob_match(pattern, qualified_explore)
            } else {
                pattern == qualified_explore
            }
        })
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Looker connection
    #[serde(default)]
    pub looker: LookerConfig,

    /// Check behaviour
    #[serde(default)]
    pub check: CheckConfig,

    /// Severity thresholds
    #[serde(default)]
    pub severity: SeverityThreshold,

    /// Allowlist rules
    #[serde(default)]
    pub allowlist: AllowlistRules,

    /// Directory for the dated log file
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            looker: LookerConfig::default(),
            check: CheckConfig::default(),
            severity: SeverityThreshold::default(),
            allowlist: AllowlistRules::default(),
            log_dir: default_log_dir(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Log directory, resolved against the project root when relative
    pub fn resolved_log_dir(&self) -> PathBuf {
        if self.log_dir.is_relative() {
            self.project_root.join(&self.log_dir)
        } else {
            self.log_dir.clone()
        }
    }
}

/// Simple glob matching (supports a single `*`)
pub fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" || pattern == "**" {
        return true;
    }

    if let Some(star_pos) = pattern.find('*') {
        let prefix = &pattern[..star_pos];
        let suffix = &pattern[star_pos + 1..];

        text.len() >= prefix.len() + suffix.len()
            && text.starts_with(prefix)
            && text.ends_with(suffix)
    } else {
        pattern == text
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Missing Looker setting(s): {0}")]
    MissingSetting(String),
}
