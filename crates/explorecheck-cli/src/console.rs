//! Terminal rendering of check progress

use colored::Colorize;
use explorecheck_core::IsolationOutcome;
use explorecheck_engine::{headline, IsolationEvent, Reporter};

/// Width of the rule printed under each explore header
const RULE_WIDTH: usize = 79;

fn explore_rule() -> String {
    "_".repeat(RULE_WIDTH)
}

/// Prints isolation events as they happen
pub struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn print_outcome(&self, outcome: &IsolationOutcome) {
        match outcome {
            IsolationOutcome::Clean {
                fields_validated,
                share_url,
                ..
            } => {
                let line = format!(
                    "Success for {} fields: {}",
                    fields_validated.len(),
                    share_url.as_deref().unwrap_or("-")
                );
                println!("{}", line.green());
            }
            IsolationOutcome::Unresolved {
                reason,
                last_error,
                share_url,
                sql,
                ..
            } => {
                match last_error {
                    Some(error) => println!("{}", headline(error).red()),
                    None => println!("{}", format!("Explore unresolved: {}", reason).red()),
                }
                if let Some(url) = share_url {
                    println!("  {} {}", "Query:".bold(), url);
                }
                if self.verbose {
                    if let Some(sql) = sql {
                        println!("{}", "Generated SQL:".bold());
                        println!("{}", sql.dimmed());
                    }
                }
            }
        }

        let failures = outcome.excluded().discovered_sorted();
        if !failures.is_empty() {
            println!("{}", "Failures:".red().bold());
            for field in failures {
                println!("{}", format!("  {}", field).red());
            }
        }
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, event: &IsolationEvent) {
        match event {
            IsolationEvent::ExploreStarted { target, field_count } => {
                println!();
                println!(
                    "{}",
                    format!(
                        "Checking fields for explore: {} in model: {}",
                        target.explore, target.model
                    )
                    .bold()
                );
                println!("{}", explore_rule());
                if self.verbose {
                    println!("  {} fields", field_count);
                }
            }
            IsolationEvent::ProbeIssued { probe, field_count, .. } => {
                if self.verbose {
                    println!("  {} {} ({} fields)", "Probe".cyan(), probe, field_count);
                }
            }
            IsolationEvent::ErrorsFound { .. } => {
                println!("{}", "Errors found, continuing...".yellow());
            }
            IsolationEvent::FieldExcluded { field, remaining, .. } => {
                if self.verbose {
                    println!("  {} {} ({} left)", "Excluding".yellow(), field, remaining);
                }
            }
            IsolationEvent::Finished { outcome, .. } => self.print_outcome(outcome),
            IsolationEvent::TargetNotFound { target, message } => {
                println!("{}", format!("Explore {} not found: {}", target, message).red());
            }
            IsolationEvent::TargetFailed { target, error } => {
                println!("{}", format!("Checking {} failed: {}", target, error).red().bold());
            }
            IsolationEvent::Skipped { target } => {
                println!("{}", format!("Skipping explore {}", target).dimmed());
            }
            IsolationEvent::SweepFinished { counts } => {
                println!();
                let line = format!(
                    "{} clean, {} unresolved, {} not found, {} failed, {} skipped",
                    counts.clean, counts.unresolved, counts.not_found, counts.failed, counts.skipped
                );
                if counts.has_failures() {
                    println!("{}", line.red().bold());
                } else {
                    println!("{}", line.green().bold());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explore_rule_is_underscores() {
        let rule = explore_rule();
        assert_eq!(rule.len(), 79);
        assert!(rule.chars().all(|c| c == '_'));
    }
}
