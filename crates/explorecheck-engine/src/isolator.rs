//! Fault isolator
//!
//! Drives the probe/classify/exclude loop for one explore. The loop is
//! bounded: every failing probe either ends the run or removes at least one
//! field from the live set, so a run over `n` fields issues at most `n`
//! probes.

use explorecheck_core::{
    ExclusionOrigin, ExclusionPolicy, ExclusionSet, ExploreRef, FieldRef, FieldSet, IsolationOutcome,
    ProbeResult, UnresolvedReason,
};
use explorecheck_looker::{FetchError, QueryHandle, QueryRunner, ResultFormat};
use tracing::{debug, info, warn};

use crate::classifier::{self, Verdict};
use crate::locator::{CulpritLocator, ErrorContext};
use crate::reporter::{IsolationEvent, Reporter};

/// Failures that abandon an explore instead of producing an outcome
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IsolationError {
    /// The model or explore is unknown to the backend
    #[error("{target} not found: {message}")]
    NotFound { target: ExploreRef, message: String },

    /// The backend was unreachable or returned no payload
    #[error("transport failure on {target}: {message}")]
    Transport { target: ExploreRef, message: String },
}

impl IsolationError {
    pub(crate) fn from_fetch(target: &ExploreRef, error: FetchError) -> Self {
        match error {
            FetchError::NotFound(message) => Self::NotFound {
                target: target.clone(),
                message,
            },
            other => Self::Transport {
                target: target.clone(),
                message: other.to_string(),
            },
        }
    }

    pub fn target(&self) -> &ExploreRef {
        match self {
            Self::NotFound { target, .. } | Self::Transport { target, .. } => target,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::NotFound { message, .. } | Self::Transport { message, .. } => message,
        }
    }
}

/// Knobs for one isolation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsolatorOptions {
    /// Locate and exclude culprits instead of stopping at the first error
    pub continue_on_error: bool,

    /// How many located culprits to exclude per failing probe
    pub policy: ExclusionPolicy,

    /// Fetch the generated SQL for unresolved outcomes
    pub capture_sql: bool,

    /// Row limit of the compact probe
    pub probe_row_limit: u32,
}

impl Default for IsolatorOptions {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            policy: ExclusionPolicy::First,
            capture_sql: true,
            probe_row_limit: 1,
        }
    }
}

/// Runs isolation for explores against a query runner
pub struct FaultIsolator<'a> {
    runner: &'a dyn QueryRunner,
    locator: &'a dyn CulpritLocator,
    reporter: &'a dyn Reporter,
    options: IsolatorOptions,
}

impl<'a> FaultIsolator<'a> {
    pub fn new(
        runner: &'a dyn QueryRunner,
        locator: &'a dyn CulpritLocator,
        reporter: &'a dyn Reporter,
        options: IsolatorOptions,
    ) -> Self {
        Self {
            runner,
            locator,
            reporter,
            options,
        }
    }

    pub fn options(&self) -> &IsolatorOptions {
        &self.options
    }

    /// Probe `fields` minus `seed` until a probe succeeds or isolation gives up
    ///
    /// `seed` becomes the run's exclusion set; fields in it are never probed.
    /// Only a missing explore or a transport failure returns `Err`.
    pub async fn isolate(
        &self,
        target: &ExploreRef,
        fields: &FieldSet,
        seed: ExclusionSet,
    ) -> Result<IsolationOutcome, IsolationError> {
        let mut excluded = seed;
        let mut probes = 0usize;
        let mut last_error: Option<String> = None;
        let mut last_share_url: Option<String> = None;
        let mut last_sql: Option<String> = None;

        loop {
            let live = fields.without(&excluded);
            if live.is_empty() {
                warn!(%target, probes, excluded = excluded.len(), "no fields left to probe");
                return Ok(self.finish(
                    target,
                    IsolationOutcome::Unresolved {
                        reason: UnresolvedReason::Exhausted,
                        last_error,
                        excluded,
                        share_url: last_share_url,
                        sql: last_sql,
                        probes,
                    },
                ));
            }

            let query = self
                .runner
                .create_query(&target.model, &target.explore, &live)
                .await
                .map_err(|e| IsolationError::from_fetch(target, e))?;

            probes += 1;
            self.reporter.report(&IsolationEvent::ProbeIssued {
                target: target.clone(),
                probe: probes,
                field_count: live.len(),
            });
            debug!(%target, probe = probes, fields = live.len(), query = %query.id, "probe issued");

            let (raw_message, share_url) = match self.probe(target, &query).await? {
                ProbeResult::Success {
                    row_count_probe,
                    shared_reference,
                } => {
                    info!(%target, probes, rows = row_count_probe, validated = live.len(), "explore clean");
                    return Ok(self.finish(
                        target,
                        IsolationOutcome::Clean {
                            fields_validated: live,
                            excluded,
                            share_url: shared_reference,
                            probes,
                        },
                    ));
                }
                ProbeResult::Error {
                    raw_message,
                    shared_reference,
                } => (raw_message, shared_reference),
            };

            debug!(%target, probe = probes, error = %classifier::headline(&raw_message), "probe failed");

            if !self.options.continue_on_error {
                let sql = if self.options.capture_sql {
                    self.fetch_sql(target, &query).await
                } else {
                    None
                };
                return Ok(self.finish(
                    target,
                    IsolationOutcome::Unresolved {
                        reason: UnresolvedReason::FailFast,
                        last_error: Some(raw_message),
                        excluded,
                        share_url,
                        sql,
                        probes,
                    },
                ));
            }

            let mut sql = if self.locator.needs_sql() {
                self.fetch_sql(target, &query).await
            } else {
                None
            };

            let context = ErrorContext::new(&raw_message).with_sql(sql.as_deref());
            let culprits: Vec<FieldRef> = self
                .locator
                .locate(&context, &live)
                .into_iter()
                .filter(|field| live.contains(field) && !excluded.contains(field))
                .collect();

            if culprits.is_empty() {
                if sql.is_none() && self.options.capture_sql {
                    sql = self.fetch_sql(target, &query).await;
                }
                return Ok(self.finish(
                    target,
                    IsolationOutcome::Unresolved {
                        reason: UnresolvedReason::UnlocatableCulprit,
                        last_error: Some(raw_message),
                        excluded,
                        share_url,
                        sql,
                        probes,
                    },
                ));
            }

            if !excluded.iter().any(|e| e.origin == ExclusionOrigin::Discovered) {
                self.reporter.report(&IsolationEvent::ErrorsFound {
                    target: target.clone(),
                    message: raw_message.clone(),
                });
            }

            let take = match self.options.policy {
                ExclusionPolicy::First => 1,
                ExclusionPolicy::AllMatches => culprits.len(),
            };
            let mut remaining = live.len();
            for field in culprits.into_iter().take(take) {
                if excluded.insert(field.clone(), ExclusionOrigin::Discovered) {
                    remaining -= 1;
                    info!(%target, field = %field, remaining, "excluding field");
                    self.reporter.report(&IsolationEvent::FieldExcluded {
                        target: target.clone(),
                        field,
                        remaining,
                    });
                }
            }

            last_error = Some(raw_message);
            last_share_url = share_url;
            last_sql = sql;
        }
    }

    /// Run the compact probe and classify what came back
    async fn probe(&self, target: &ExploreRef, query: &QueryHandle) -> Result<ProbeResult, IsolationError> {
        let payload = self
            .runner
            .execute(query, ResultFormat::Csv, Some(self.options.probe_row_limit))
            .await
            .map_err(|e| IsolationError::from_fetch(target, e))?;

        let shared_reference = query.share_url.clone();
        match classifier::classify(payload.as_deref()) {
            Verdict::Fatal => Err(IsolationError::Transport {
                target: target.clone(),
                message: format!("query {} returned no payload", query.id),
            }),
            Verdict::Success => Ok(ProbeResult::Success {
                row_count_probe: payload.as_deref().map(classifier::count_probe_rows).unwrap_or(0),
                shared_reference,
            }),
            Verdict::Error => Ok(ProbeResult::Error {
                raw_message: payload.unwrap_or_default(),
                shared_reference,
            }),
        }
    }

    /// Generated SQL of a query; failures only lose the SQL
    async fn fetch_sql(&self, target: &ExploreRef, query: &QueryHandle) -> Option<String> {
        match self.runner.execute(query, ResultFormat::Sql, None).await {
            Ok(sql) => sql,
            Err(e) => {
                warn!(%target, query = %query.id, error = %e, "could not fetch generated SQL");
                None
            }
        }
    }

    fn finish(&self, target: &ExploreRef, outcome: IsolationOutcome) -> IsolationOutcome {
        if let IsolationOutcome::Unresolved { reason, probes, .. } = &outcome {
            warn!(%target, %reason, probes, "explore unresolved");
        }
        self.reporter.report(&IsolationEvent::Finished {
            target: target.clone(),
            outcome: outcome.clone(),
        });
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::SubstringLocator;
    use crate::reporter::{NullReporter, RecordingReporter};
    use explorecheck_looker::MockLooker;
    use pretty_assertions::assert_eq;

    fn target() -> ExploreRef {
        ExploreRef::new("m", "a")
    }

    fn two_dims() -> MockLooker {
        MockLooker::builder()
            .with_explore("m", "a", &["a.dim1", "a.dim2"], &[])
            .fail_field("a.dim1", "column dim1 does not exist")
            .build()
    }

    fn fields(names: &[&str]) -> FieldSet {
        names.iter().map(|n| FieldRef::new(*n)).collect()
    }

    #[tokio::test]
    async fn error_then_clean_in_continue_mode() {
        let backend = two_dims();
        let reporter = RecordingReporter::new();
        let options = IsolatorOptions {
            continue_on_error: true,
            ..Default::default()
        };
        let isolator = FaultIsolator::new(&backend, &SubstringLocator, &reporter, options);

        let outcome = isolator
            .isolate(&target(), &fields(&["a.dim1", "a.dim2"]), ExclusionSet::new())
            .await
            .unwrap();

        match outcome {
            IsolationOutcome::Clean {
                fields_validated,
                excluded,
                probes,
                ..
            } => {
                assert_eq!(fields_validated.names(), vec!["a.dim2"]);
                assert_eq!(excluded.fields(), vec![FieldRef::new("a.dim1")]);
                assert_eq!(probes, 2);
            }
            other => panic!("expected clean outcome, got {:?}", other),
        }

        let errors_found = reporter
            .events()
            .iter()
            .filter(|e| matches!(e, IsolationEvent::ErrorsFound { .. }))
            .count();
        assert_eq!(errors_found, 1);
    }

    #[tokio::test]
    async fn fail_fast_captures_sql() {
        let backend = two_dims();
        let isolator = FaultIsolator::new(&backend, &SubstringLocator, &NullReporter, IsolatorOptions::default());

        let outcome = isolator
            .isolate(&target(), &fields(&["a.dim1", "a.dim2"]), ExclusionSet::new())
            .await
            .unwrap();

        match outcome {
            IsolationOutcome::Unresolved {
                reason, sql, probes, ..
            } => {
                assert_eq!(reason, UnresolvedReason::FailFast);
                assert!(sql.unwrap().contains("AS a_dim1"));
                assert_eq!(probes, 1);
            }
            other => panic!("expected unresolved outcome, got {:?}", other),
        }
        assert_eq!(backend.probe_count().await, 1);
    }

    #[tokio::test]
    async fn substring_locator_skips_sql_fetch_while_isolating() {
        let backend = two_dims();
        let options = IsolatorOptions {
            continue_on_error: true,
            ..Default::default()
        };
        let isolator = FaultIsolator::new(&backend, &SubstringLocator, &NullReporter, options);

        isolator
            .isolate(&target(), &fields(&["a.dim1", "a.dim2"]), ExclusionSet::new())
            .await
            .unwrap();

        assert_eq!(backend.runs().await.len(), backend.probe_count().await);
    }

    #[tokio::test]
    async fn seed_covering_every_field_issues_no_probe() {
        let backend = two_dims();
        let all = fields(&["a.dim1", "a.dim2"]);
        let seed = ExclusionSet::seeded(&all, &["a.*".to_string()]);
        let isolator = FaultIsolator::new(&backend, &SubstringLocator, &NullReporter, IsolatorOptions::default());

        let outcome = isolator.isolate(&target(), &all, seed).await.unwrap();

        assert_eq!(outcome.probes(), 0);
        assert!(matches!(
            outcome,
            IsolationOutcome::Unresolved { reason: UnresolvedReason::Exhausted, last_error: None, .. }
        ));
        assert_eq!(backend.probe_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_explore_is_not_found() {
        let backend = two_dims();
        let isolator = FaultIsolator::new(&backend, &SubstringLocator, &NullReporter, IsolatorOptions::default());

        let err = isolator
            .isolate(&ExploreRef::new("m", "missing"), &fields(&["a.dim1"]), ExclusionSet::new())
            .await
            .unwrap_err();

        assert!(matches!(err, IsolationError::NotFound { .. }));
        assert_eq!(err.target(), &ExploreRef::new("m", "missing"));
    }

    #[test]
    fn fetch_errors_map_to_isolation_errors() {
        let t = target();
        assert!(matches!(
            IsolationError::from_fetch(&t, FetchError::NotFound("x".into())),
            IsolationError::NotFound { .. }
        ));
        assert!(matches!(
            IsolationError::from_fetch(&t, FetchError::NetworkError("x".into())),
            IsolationError::Transport { .. }
        ));
        assert!(matches!(
            IsolationError::from_fetch(&t, FetchError::PermissionDenied("x".into())),
            IsolationError::Transport { .. }
        ));
    }
}
