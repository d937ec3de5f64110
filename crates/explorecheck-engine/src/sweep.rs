//! Explore/model sweep
//!
//! Resolves which explores to check and runs one isolation per explore.
//! Explores are independent: each gets its own seeded exclusion set and a
//! failure on one never stops the others.

use explorecheck_core::{AllowlistRules, ExclusionSet, ExploreRef, IsolationOutcome};
use explorecheck_looker::{FetchError, MetadataProvider, QueryRunner};
use tracing::{debug, info, warn};

use crate::isolator::{FaultIsolator, IsolationError, IsolatorOptions};
use crate::locator::CulpritLocator;
use crate::reporter::{IsolationEvent, Reporter, SweepCounts};
use crate::summary::SweepSummary;

/// A requested model or explore does not exist
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("Model '{model}' not found")]
    ModelNotFound { model: String, available: Vec<String> },

    #[error("Explore '{explore}' not found in model '{model}'")]
    ExploreNotFound {
        model: String,
        explore: String,
        available: Vec<String>,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl TargetError {
    /// Names that would have been valid
    pub fn available(&self) -> &[String] {
        match self {
            Self::ModelNotFound { available, .. } | Self::ExploreNotFound { available, .. } => available,
            Self::Fetch(_) => &[],
        }
    }
}

/// Expand model/explore selections into explicit targets
///
/// - No models given: every model the provider lists.
/// - Explores given: used for every selected model, each validated against
///   that model's own explore list.
/// - No explores given: each model's own explores.
pub async fn resolve_targets(
    metadata: &dyn MetadataProvider,
    models: Option<&[String]>,
    explores: Option<&[String]>,
) -> Result<Vec<ExploreRef>, TargetError> {
    let known_models = metadata.list_models().await?;

    let selected: Vec<String> = match models {
        Some(requested) if !requested.is_empty() => {
            for model in requested {
                if !known_models.contains(model) {
                    return Err(TargetError::ModelNotFound {
                        model: model.clone(),
                        available: known_models,
                    });
                }
            }
            requested.to_vec()
        }
        _ => known_models,
    };

    let mut targets = Vec::new();
    for model in &selected {
        let known_explores = match metadata.list_explores(model).await {
            Ok(explores) => explores,
            Err(FetchError::NotFound(_)) => {
                return Err(TargetError::ModelNotFound {
                    model: model.clone(),
                    available: metadata.list_models().await?,
                })
            }
            Err(e) => return Err(e.into()),
        };

        match explores {
            Some(requested) if !requested.is_empty() => {
                for explore in requested {
                    if !known_explores.contains(explore) {
                        return Err(TargetError::ExploreNotFound {
                            model: model.clone(),
                            explore: explore.clone(),
                            available: known_explores,
                        });
                    }
                    targets.push(ExploreRef::new(model.clone(), explore.clone()));
                }
            }
            _ => targets.extend(known_explores.into_iter().map(|e| ExploreRef::new(model.clone(), e))),
        }
    }

    debug!(models = selected.len(), targets = targets.len(), "targets resolved");
    Ok(targets)
}

/// What happened to one explore
#[derive(Debug, Clone, PartialEq)]
pub enum ExploreStatus {
    /// Isolation ran to an outcome
    Checked(IsolationOutcome),

    /// Matched an allowlist skip rule
    Skipped,

    /// Model or explore vanished between resolution and checking
    NotFound(String),

    /// Transport failure
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExploreResult {
    pub target: ExploreRef,
    pub status: ExploreStatus,
}

/// Sweep-wide settings
#[derive(Debug, Clone, Default)]
pub struct SweepOptions {
    pub isolator: IsolatorOptions,

    /// Field names or globs excluded up front in every explore
    pub excludes: Vec<String>,

    pub allowlist: AllowlistRules,
}

/// Runs isolation over a list of explores
pub struct Sweep<'a> {
    metadata: &'a dyn MetadataProvider,
    runner: &'a dyn QueryRunner,
    locator: &'a dyn CulpritLocator,
    reporter: &'a dyn Reporter,
    options: SweepOptions,
}

impl<'a> Sweep<'a> {
    pub fn new(
        metadata: &'a dyn MetadataProvider,
        runner: &'a dyn QueryRunner,
        locator: &'a dyn CulpritLocator,
        reporter: &'a dyn Reporter,
        options: SweepOptions,
    ) -> Self {
        Self {
            metadata,
            runner,
            locator,
            reporter,
            options,
        }
    }

    /// Check every target in order
    pub async fn run(&self, targets: &[ExploreRef]) -> SweepSummary {
        let isolator = FaultIsolator::new(self.runner, self.locator, self.reporter, self.options.isolator);
        let mut results = Vec::with_capacity(targets.len());

        for target in targets {
            let status = self.check(&isolator, target).await;
            results.push(ExploreResult {
                target: target.clone(),
                status,
            });
        }

        let summary = SweepSummary::new(results);
        let counts: SweepCounts = summary.counts();
        info!(
            clean = counts.clean,
            unresolved = counts.unresolved,
            not_found = counts.not_found,
            failed = counts.failed,
            skipped = counts.skipped,
            "sweep finished"
        );
        self.reporter.report(&IsolationEvent::SweepFinished { counts });
        summary
    }

    async fn check(&self, isolator: &FaultIsolator<'_>, target: &ExploreRef) -> ExploreStatus {
        if self.options.allowlist.is_explore_skipped(&target.qualified()) {
            debug!(%target, "explore skipped by allowlist");
            self.reporter.report(&IsolationEvent::Skipped { target: target.clone() });
            return ExploreStatus::Skipped;
        }

        let fields = match self.metadata.list_fields(&target.model, &target.explore).await {
            Ok(explore) => explore.field_set(),
            Err(e) => return self.abandon(IsolationError::from_fetch(target, e)),
        };

        self.reporter.report(&IsolationEvent::ExploreStarted {
            target: target.clone(),
            field_count: fields.len(),
        });

        let seed = ExclusionSet::seeded(&fields, &self.options.excludes);
        if !seed.is_empty() {
            debug!(%target, seeded = seed.len(), "excluding configured fields");
        }

        match isolator.isolate(target, &fields, seed).await {
            Ok(outcome) => ExploreStatus::Checked(outcome),
            Err(e) => self.abandon(e),
        }
    }

    /// Report a failure that ends this explore's check
    fn abandon(&self, error: IsolationError) -> ExploreStatus {
        match error {
            IsolationError::NotFound { target, message } => {
                warn!(%target, %message, "explore not found");
                self.reporter.report(&IsolationEvent::TargetNotFound {
                    target,
                    message: message.clone(),
                });
                ExploreStatus::NotFound(message)
            }
            IsolationError::Transport { target, message: error } => {
                warn!(%target, %error, "explore abandoned");
                self.reporter.report(&IsolationEvent::TargetFailed {
                    target,
                    error: error.clone(),
                });
                ExploreStatus::Failed(error)
            }
        }
    }
}
