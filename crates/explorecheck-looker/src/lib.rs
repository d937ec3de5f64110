//! Looker API collaborators for explore checks
//!
//! This crate defines the two contracts the isolation engine consumes and
//! provides implementations of them:
//!
//! - [`MetadataProvider`] lists models, explores and explore fields
//! - [`QueryRunner`] compiles a field set into a query and runs it
//!
//! [`LookerClient`] implements both over the Looker REST API.
//! [`MockLooker`] implements both in memory for tests.
//!
//! ## Example
//!
//! ```rust,ignore
//! use explorecheck_looker::{LookerClient, MetadataProvider};
//!
//! let client = LookerClient::new(&config.looker)?;
//! client.login().await?;
//! let explores = client.list_explores("ecommerce").await?;
//! ```

pub mod adapter;
pub mod looker;
pub mod mock;

pub use adapter::{
    ExploreFields, FetchError, LookerBackend, MetadataProvider, QueryHandle, QueryRunner, ResultFormat,
};
pub use looker::{LookerClient, LookerUser, Workspace};
pub use mock::{MockLooker, MockLookerBuilder, RecordedRun};
