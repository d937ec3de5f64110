use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use explorecheck_core::{Config, ExclusionPolicy, LocatorKind, Report, Severity};
use explorecheck_engine::{locator_for, resolve_targets, IsolatorOptions, Sweep, SweepOptions, TargetError};
use explorecheck_looker::{LookerClient, Workspace};

mod console;

use console::ConsoleReporter;

/// Exit code when a requested model or explore does not exist
const EXIT_TARGET_NOT_FOUND: i32 = 2;

/// explorecheck - find the fields that break Looker explores
#[derive(Parser, Debug)]
#[command(name = "explorecheck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Models to check (default: all)
    #[arg(short, long, num_args = 1..)]
    models: Vec<String>,

    /// Explores to check in every selected model (default: all)
    #[arg(short, long, num_args = 1..)]
    explores: Vec<String>,

    /// Exclude failing fields and keep probing instead of stopping at the first error
    #[arg(short = 'c', long = "continue")]
    continue_on_error: bool,

    /// Check the dev workspace instead of production
    #[arg(short, long)]
    dev: bool,

    /// Fields to exclude up front (view.field or glob)
    #[arg(short = 'x', long, num_args = 1..)]
    excludes: Vec<String>,

    /// Silence the insecure TLS warning
    #[arg(short, long)]
    silent: bool,

    /// Path to config file (default: explorecheck.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output file for report.json
    #[arg(short, long, default_value = "report.json")]
    output: PathBuf,

    /// Also output markdown report
    #[arg(long)]
    markdown: Option<PathBuf>,

    /// Culprits excluded per failing probe: first | all-matches
    #[arg(long)]
    policy: Option<ExclusionPolicy>,

    /// How culprits are located: substring | sql-line | chain
    #[arg(long)]
    locator: Option<LocatorKind>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // .env is optional
    let _ = dotenvy::dotenv();

    let mut config = load_config(cli.config.as_deref(), cli.verbose)?;
    config.looker.apply_env();
    apply_overrides(&cli, &mut config);

    let log_file = init_logging(&config, cli.verbose)?;
    if cli.verbose {
        eprintln!("{} {}", "Logging to".cyan(), log_file.display());
    }

    if !config.looker.verify_ssl && !cli.silent {
        tracing::warn!("TLS certificate verification is disabled");
        eprintln!("{}", "Warning: TLS certificate verification is disabled".yellow());
    }

    let client = LookerClient::new(&config.looker).context(
        "Looker connection is not configured. Set LOOKERSDK_BASE_URL, LOOKERSDK_CLIENT_ID and \
         LOOKERSDK_CLIENT_SECRET or fill in [looker] in explorecheck.toml",
    )?;

    client
        .login()
        .await
        .context("Could not authenticate with Looker. Check the API client id and secret")?;
    let me = client.me().await.context("Could not fetch the authenticated user")?;
    println!(
        "Authenticated as {} (User ID {})",
        me.display_name.as_deref().unwrap_or("<unnamed>"),
        me.id()
    );
    tracing::info!(user = %me.id(), "authenticated");

    let workspace = if config.check.dev {
        Workspace::Dev
    } else {
        Workspace::Production
    };
    client
        .set_workspace(workspace)
        .await
        .with_context(|| format!("Could not switch to the {} workspace", workspace.as_str()))?;
    match workspace {
        Workspace::Dev => println!("{}", workspace_banner(workspace).yellow()),
        Workspace::Production => println!("{}", workspace_banner(workspace).magenta()),
    }

    let models = (!cli.models.is_empty()).then_some(cli.models.as_slice());
    let explores = (!cli.explores.is_empty()).then_some(cli.explores.as_slice());
    let targets = match resolve_targets(&client, models, explores).await {
        Ok(targets) => targets,
        Err(TargetError::Fetch(e)) => return Err(e).context("Could not list models and explores"),
        Err(e) => {
            print_target_error(&e);
            std::process::exit(EXIT_TARGET_NOT_FOUND);
        }
    };
    tracing::info!(targets = targets.len(), "starting sweep");

    let locator = locator_for(config.check.locator);
    let reporter = ConsoleReporter::new(cli.verbose);
    let options = SweepOptions {
        isolator: IsolatorOptions {
            continue_on_error: config.check.continue_on_error,
            policy: config.check.exclusion_policy,
            capture_sql: config.check.capture_sql,
            ..Default::default()
        },
        excludes: config.check.excludes.clone(),
        allowlist: config.allowlist.clone(),
    };
    let sweep = Sweep::new(&client, &client, locator.as_ref(), &reporter, options);
    let summary = sweep.run(&targets).await;

    let report = summary.to_report(&config.severity);
    report
        .save_to_file(&cli.output)
        .with_context(|| format!("Could not write {}", cli.output.display()))?;

    if let Some(md_path) = &cli.markdown {
        std::fs::write(md_path, generate_markdown_report(&report))
            .with_context(|| format!("Could not write {}", md_path.display()))?;
    }

    print_report_summary(&report, &cli.output);

    if summary.has_failures() {
        std::process::exit(1);
    }

    Ok(())
}

/// Config from `--config`, else `explorecheck.toml` if present, else defaults
fn load_config(path: Option<&Path>, verbose: bool) -> Result<Config> {
    if let Some(path) = path {
        return Config::from_file(path).with_context(|| format!("Could not load {}", path.display()));
    }

    let default_path = Path::new("explorecheck.toml");
    if default_path.exists() {
        return Config::from_file(default_path).context("Could not load explorecheck.toml");
    }

    if verbose {
        eprintln!("{}", "No config file found, using defaults".yellow());
    }
    Ok(Config::default())
}

/// Command-line flags win over the config file
fn apply_overrides(cli: &Cli, config: &mut Config) {
    if cli.continue_on_error {
        config.check.continue_on_error = true;
    }
    if cli.dev {
        config.check.dev = true;
    }
    config.check.excludes.extend(cli.excludes.iter().cloned());
    if let Some(policy) = cli.policy {
        config.check.exclusion_policy = policy;
    }
    if let Some(locator) = cli.locator {
        config.check.locator = locator;
    }
}

/// Send tracing output to `<log_dir>/<YYYY-MM-DD>.log`
fn init_logging(config: &Config, verbose: bool) -> Result<PathBuf> {
    let dir = config.resolved_log_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Could not create log directory {}", dir.display()))?;

    let path = dir.join(format!("{}.log", chrono::Local::now().format("%Y-%m-%d")));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Could not open log file {}", path.display()))?;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .with(filter)
        .try_init()
        .context("Could not initialise logging")?;

    Ok(path)
}

fn workspace_banner(workspace: Workspace) -> &'static str {
    match workspace {
        Workspace::Dev => "Comparing to dev branch",
        Workspace::Production => "Comparing to prod branch",
    }
}

fn print_target_error(error: &TargetError) {
    eprintln!("{}", error.to_string().red().bold());

    let kind = match error {
        TargetError::ModelNotFound { .. } => "models",
        TargetError::ExploreNotFound { .. } => "explores",
        TargetError::Fetch(_) => return,
    };

    if error.available().is_empty() {
        eprintln!("No {} are available", kind);
    } else {
        eprintln!("Available {}:", kind);
        for name in error.available() {
            eprintln!("  {}", name);
        }
    }
}

fn print_report_summary(report: &Report, output: &Path) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Explore Check Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Version: {}", report.version);
    println!("Timestamp: {}", report.timestamp);
    println!("Written to: {}", output.display());
    println!();

    let summary = &report.summary;
    println!("{}", "Summary:".bold());
    println!("  Explores checked:    {}", summary.explores_checked);
    println!("  Clean:               {}", format!("{}", summary.explores_clean).green());

    if summary.explores_unresolved > 0 {
        println!("  Unresolved:          {}", format!("{}", summary.explores_unresolved).red().bold());
    } else {
        println!("  Unresolved:          {}", format!("{}", summary.explores_unresolved).green());
    }

    if summary.explores_failed > 0 {
        println!("  Not found / failed:  {}", format!("{}", summary.explores_failed).red().bold());
    } else {
        println!("  Not found / failed:  {}", format!("{}", summary.explores_failed).green());
    }

    if summary.fields_excluded > 0 {
        println!("  Fields excluded:     {}", format!("{}", summary.fields_excluded).yellow());
    } else {
        println!("  Fields excluded:     {}", format!("{}", summary.fields_excluded).green());
    }
    println!();

    println!(
        "  Diagnostics: {} ({} errors, {} warnings, {} info)",
        summary.total, summary.errors, summary.warnings, summary.info
    );

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}

fn generate_markdown_report(report: &Report) -> String {
    let mut md = String::new();

    md.push_str("# Explore Check Report\n\n");
    md.push_str(&format!("**Version:** {}\n\n", report.version));
    md.push_str(&format!("**Timestamp:** {}\n\n", report.timestamp));

    let summary = &report.summary;
    md.push_str("## Summary\n\n");
    md.push_str(&format!("- Explores checked: {}\n", summary.explores_checked));
    md.push_str(&format!("- Clean: {}\n", summary.explores_clean));
    md.push_str(&format!("- Unresolved: {}\n", summary.explores_unresolved));
    md.push_str(&format!("- Not found / failed: {}\n", summary.explores_failed));
    md.push_str(&format!("- Fields excluded: {}\n", summary.fields_excluded));
    md.push('\n');

    let findings: Vec<_> = report
        .diagnostics
        .iter()
        .filter(|d| d.severity != Severity::Info)
        .collect();

    if findings.is_empty() {
        md.push_str("✅ **No issues found!**\n");
        return md;
    }

    md.push_str("## Findings\n\n");
    for diag in findings {
        let severity_emoji = match diag.severity {
            Severity::Error => "❌",
            Severity::Warn => "⚠️",
            Severity::Info => "ℹ️",
        };

        md.push_str(&format!("### {} {} - {}\n\n", severity_emoji, diag.severity, diag.code));
        md.push_str(&format!("{}\n\n", diag.message));

        if let Some(loc) = &diag.location {
            md.push_str(&format!("**Location:** `{}`\n\n", loc));
        }
        if let Some(url) = &diag.share_url {
            md.push_str(&format!("**Query:** {}\n\n", url));
        }
        if let Some(detail) = &diag.detail {
            md.push_str(&format!("```\n{}\n```\n\n", detail.trim_end()));
        }
    }

    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use explorecheck_core::{Diagnostic, DiagnosticCode, Location};

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn workspace_banners() {
        assert_eq!(workspace_banner(Workspace::Dev), "Comparing to dev branch");
        assert_eq!(workspace_banner(Workspace::Production), "Comparing to prod branch");
    }

    #[test]
    fn flags_parse() {
        let cli = Cli::try_parse_from([
            "explorecheck",
            "-m",
            "ecommerce",
            "finance",
            "-e",
            "users",
            "-c",
            "-x",
            "users.*_raw",
            "--policy",
            "all-matches",
            "--locator",
            "substring",
        ])
        .unwrap();

        assert_eq!(cli.models, vec!["ecommerce", "finance"]);
        assert_eq!(cli.explores, vec!["users"]);
        assert!(cli.continue_on_error);
        assert!(!cli.dev);
        assert_eq!(cli.policy, Some(ExclusionPolicy::AllMatches));
        assert_eq!(cli.locator, Some(LocatorKind::Substring));
        assert_eq!(cli.output, PathBuf::from("report.json"));
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(Cli::try_parse_from(["explorecheck", "--policy", "every"]).is_err());
    }

    #[test]
    fn flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("explorecheck.toml");
        std::fs::write(
            &path,
            "[check]\nexcludes = [\"users.ssn\"]\nlocator = \"sql-line\"\n",
        )
        .unwrap();

        let mut config = load_config(Some(&path), false).unwrap();
        let cli = Cli::try_parse_from(["explorecheck", "--dev", "-x", "orders.raw"]).unwrap();
        apply_overrides(&cli, &mut config);

        assert!(config.check.dev);
        assert!(!config.check.continue_on_error);
        assert_eq!(config.check.excludes, vec!["users.ssn", "orders.raw"]);
        assert_eq!(config.check.locator, LocatorKind::SqlLine);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/explorecheck.toml")), false).is_err());
    }

    #[test]
    fn markdown_lists_findings_only() {
        let report = Report::from_diagnostics(vec![
            Diagnostic::new(DiagnosticCode::ExploreClean, Severity::Info, "Success for 3 fields"),
            Diagnostic::new(
                DiagnosticCode::FieldExcluded,
                Severity::Error,
                "Field 'users.age_tier' causes a SQL error",
            )
            .with_location(Location::explore("ecommerce", "users").with_field("users.age_tier"))
            .with_detail("SQL Error: Unrecognized name: age_tier"),
        ]);

        let md = generate_markdown_report(&report);
        assert!(md.contains("## Findings"));
        assert!(md.contains("FIELD_EXCLUDED"));
        assert!(md.contains("`ecommerce/users [users.age_tier]`"));
        assert!(!md.contains("Success for 3 fields"));
    }

    #[test]
    fn markdown_without_findings() {
        let report = Report::from_diagnostics(vec![Diagnostic::new(
            DiagnosticCode::ExploreClean,
            Severity::Info,
            "Success for 3 fields",
        )]);
        assert!(generate_markdown_report(&report).contains("No issues found"));
    }
}
