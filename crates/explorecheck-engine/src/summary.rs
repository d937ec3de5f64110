//! Sweep aggregation and report conversion

use explorecheck_core::{
    Diagnostic, DiagnosticCode, ExclusionOrigin, ExploreRef, FieldRef, IsolationOutcome, Location, Report,
    SeverityThreshold, Severity, UnresolvedReason,
};
use serde_json::json;

use crate::classifier;
use crate::reporter::SweepCounts;
use crate::sweep::{ExploreResult, ExploreStatus};

/// Per-explore results of one sweep, in check order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepSummary {
    results: Vec<ExploreResult>,
}

impl SweepSummary {
    pub fn new(results: Vec<ExploreResult>) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &[ExploreResult] {
        &self.results
    }

    pub fn counts(&self) -> SweepCounts {
        let mut counts = SweepCounts::default();
        for result in &self.results {
            match &result.status {
                ExploreStatus::Checked(outcome) if outcome.is_clean() => counts.clean += 1,
                ExploreStatus::Checked(_) => counts.unresolved += 1,
                ExploreStatus::Skipped => counts.skipped += 1,
                ExploreStatus::NotFound(_) => counts.not_found += 1,
                ExploreStatus::Failed(_) => counts.failed += 1,
            }
        }
        counts
    }

    pub fn has_failures(&self) -> bool {
        self.counts().has_failures()
    }

    /// Culprits found per checked explore, sorted, explores without any left out
    pub fn excluded_by_explore(&self) -> Vec<(ExploreRef, Vec<FieldRef>)> {
        self.results
            .iter()
            .filter_map(|result| match &result.status {
                ExploreStatus::Checked(outcome) => {
                    let fields = outcome.excluded().discovered_sorted();
                    (!fields.is_empty()).then(|| (result.target.clone(), fields))
                }
                _ => None,
            })
            .collect()
    }

    /// Build a report with one diagnostic per finding
    pub fn to_report(&self, severity: &SeverityThreshold) -> Report {
        let mut report = Report::new();
        let mut captured_sql = serde_json::Map::new();

        for result in &self.results {
            let target = &result.target;
            let location = Location::explore(&target.model, &target.explore);

            match &result.status {
                ExploreStatus::Checked(outcome) => {
                    for exclusion in outcome.excluded().iter() {
                        let (code, default, message) = match exclusion.origin {
                            ExclusionOrigin::Discovered => (
                                DiagnosticCode::FieldExcluded,
                                Severity::Error,
                                format!("Field '{}' causes a SQL error in {}", exclusion.field, target),
                            ),
                            ExclusionOrigin::Seeded => (
                                DiagnosticCode::FieldSeededExclude,
                                Severity::Info,
                                format!("Field '{}' excluded by configuration", exclusion.field),
                            ),
                        };
                        report.add_diagnostic(
                            Diagnostic::new(code, severity.get_severity(code, default), message)
                                .with_location(location.clone().with_field(exclusion.field.as_str())),
                        );
                    }

                    report.add_diagnostic(outcome_diagnostic(target, outcome, &location, severity));

                    if let IsolationOutcome::Unresolved { sql: Some(sql), .. } = outcome {
                        captured_sql.insert(target.qualified(), json!(sql));
                    }
                }
                ExploreStatus::Skipped => {
                    report.add_diagnostic(
                        Diagnostic::new(
                            DiagnosticCode::Info,
                            severity.get_severity(DiagnosticCode::Info, Severity::Info),
                            format!("Explore {} skipped by allowlist", target),
                        )
                        .with_location(location),
                    );
                }
                ExploreStatus::NotFound(message) => {
                    let code = DiagnosticCode::MetadataNotFound;
                    report.add_diagnostic(
                        Diagnostic::new(
                            code,
                            severity.get_severity(code, Severity::Error),
                            format!("Explore {} not found", target),
                        )
                        .with_location(location)
                        .with_detail(message.as_str()),
                    );
                }
                ExploreStatus::Failed(error) => {
                    let code = DiagnosticCode::TransportFailure;
                    report.add_diagnostic(
                        Diagnostic::new(
                            code,
                            severity.get_severity(code, Severity::Error),
                            format!("Checking {} failed: {}", target, error),
                        )
                        .with_location(location)
                        .with_detail(error.as_str()),
                    );
                }
            }
        }

        let counts = self.counts();
        report.summary.explores_checked = counts.attempted();
        report.summary.explores_clean = counts.clean;
        report.summary.explores_unresolved = counts.unresolved;
        report.summary.explores_failed = counts.not_found + counts.failed;
        report.summary.fields_excluded = self.excluded_by_explore().iter().map(|(_, f)| f.len()).sum();

        if !captured_sql.is_empty() {
            report.metadata = Some(json!({ "sql": captured_sql }));
        }

        report
    }
}

fn outcome_diagnostic(
    target: &ExploreRef,
    outcome: &IsolationOutcome,
    location: &Location,
    severity: &SeverityThreshold,
) -> Diagnostic {
    match outcome {
        IsolationOutcome::Clean {
            fields_validated,
            share_url,
            probes,
            ..
        } => {
            let code = DiagnosticCode::ExploreClean;
            Diagnostic::new(
                code,
                severity.get_severity(code, Severity::Info),
                format!(
                    "Success for {} fields in {} after {} probe(s)",
                    fields_validated.len(),
                    target,
                    probes
                ),
            )
            .with_location(location.clone())
            .with_share_url(share_url.clone())
        }
        IsolationOutcome::Unresolved {
            reason,
            last_error,
            share_url,
            ..
        } => {
            let code = match reason {
                UnresolvedReason::UnlocatableCulprit => DiagnosticCode::CulpritUnlocatable,
                UnresolvedReason::FailFast | UnresolvedReason::Exhausted => DiagnosticCode::ExploreUnresolved,
            };
            let message = match last_error {
                Some(error) => format!("{} unresolved ({}): {}", target, reason, classifier::headline(error)),
                None => format!("{} unresolved ({})", target, reason),
            };
            let diagnostic = Diagnostic::new(code, severity.get_severity(code, Severity::Error), message)
                .with_location(location.clone())
                .with_share_url(share_url.clone());
            match last_error {
                Some(error) => diagnostic.with_detail(error.as_str()),
                None => diagnostic,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use explorecheck_core::{ExclusionSet, FieldSet};
    use pretty_assertions::assert_eq;

    fn clean_with_culprit() -> ExploreResult {
        let mut excluded = ExclusionSet::new();
        excluded.insert(FieldRef::new("users.zeta"), ExclusionOrigin::Discovered);
        excluded.insert(FieldRef::new("users.raw"), ExclusionOrigin::Seeded);
        excluded.insert(FieldRef::new("users.alpha"), ExclusionOrigin::Discovered);

        ExploreResult {
            target: ExploreRef::new("ecommerce", "users"),
            status: ExploreStatus::Checked(IsolationOutcome::Clean {
                fields_validated: FieldSet::from_iter([FieldRef::new("users.id")]),
                excluded,
                share_url: Some("https://looker.test/x/1".to_string()),
                probes: 3,
            }),
        }
    }

    fn unlocatable() -> ExploreResult {
        ExploreResult {
            target: ExploreRef::new("ecommerce", "orders"),
            status: ExploreStatus::Checked(IsolationOutcome::Unresolved {
                reason: UnresolvedReason::UnlocatableCulprit,
                last_error: Some("SQL Error: division by zero".to_string()),
                excluded: ExclusionSet::new(),
                share_url: None,
                sql: Some("SELECT 1".to_string()),
                probes: 1,
            }),
        }
    }

    fn summary() -> SweepSummary {
        SweepSummary::new(vec![
            clean_with_culprit(),
            unlocatable(),
            ExploreResult {
                target: ExploreRef::new("finance", "ledger"),
                status: ExploreStatus::Failed("Network error: refused".to_string()),
            },
            ExploreResult {
                target: ExploreRef::new("finance", "scratch"),
                status: ExploreStatus::Skipped,
            },
        ])
    }

    #[test]
    fn counts_and_exclusions() {
        let summary = summary();
        let counts = summary.counts();

        assert_eq!(counts.clean, 1);
        assert_eq!(counts.unresolved, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.skipped, 1);
        assert!(summary.has_failures());

        assert_eq!(
            summary.excluded_by_explore(),
            vec![(
                ExploreRef::new("ecommerce", "users"),
                vec![FieldRef::new("users.alpha"), FieldRef::new("users.zeta")]
            )]
        );
    }

    #[test]
    fn report_diagnostics_and_summary() {
        let report = summary().to_report(&SeverityThreshold::default());
        let codes: Vec<DiagnosticCode> = report.diagnostics.iter().map(|d| d.code).collect();

        assert_eq!(
            codes,
            vec![
                DiagnosticCode::FieldExcluded,
                DiagnosticCode::FieldSeededExclude,
                DiagnosticCode::FieldExcluded,
                DiagnosticCode::ExploreClean,
                DiagnosticCode::CulpritUnlocatable,
                DiagnosticCode::TransportFailure,
                DiagnosticCode::Info,
            ]
        );
        assert_eq!(report.summary.explores_checked, 3);
        assert_eq!(report.summary.explores_clean, 1);
        assert_eq!(report.summary.explores_unresolved, 1);
        assert_eq!(report.summary.explores_failed, 1);
        assert_eq!(report.summary.fields_excluded, 2);
        assert_eq!(report.summary.errors, 4);
        assert!(report.metadata.unwrap()["sql"]["ecommerce.orders"] == "SELECT 1");
    }

    #[test]
    fn severity_overrides_apply() {
        let mut severity = SeverityThreshold::default();
        severity.set_override(DiagnosticCode::FieldExcluded, Severity::Warn);

        let report = SweepSummary::new(vec![clean_with_culprit()]).to_report(&severity);
        assert_eq!(report.summary.errors, 0);
        assert_eq!(report.summary.warnings, 2);
        assert!(!report.has_errors());
    }
}
