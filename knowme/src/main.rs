//! KnowMe CLI Application
//!
//! Batch lookups of document numbers against the validity and debtor
//! services. This binary is a thin front end over knowme-lib: it loads the
//! identifiers, resolves the service configuration, drives a
//! [`BatchRunner`] with a live progress line and renders or exports the
//! resulting table.

mod ui;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::Parser;
use knowme_lib::{
    default_export_name, load_env_config, load_identifiers, parse_timeout_string, plan_jobs,
    resolve_defunciones, resolve_deudores, to_json_string, write_csv, AddressRotator,
    BatchRunner, Classifier, ConfigManager, DefuncionesService, DeudoresService, FileConfig,
    Identifier, KnowMeError, ProgressState, ResultRow, ServiceKind, ServiceSection,
    MAX_CONCURRENCY_LIMIT,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// CLI arguments for knowme
#[derive(Parser, Debug)]
#[command(name = "knowme")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Batch document validity and debtor status lookups")]
#[command(
    long_about = "Look up a batch of document numbers against a verification service.\n\nRequests run concurrently under a fixed in-flight limit; results are shown as a table, or written as CSV or JSON."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// Identifiers (document numbers) to look up
    #[arg(value_name = "IDENTIFIERS", help_heading = "Input")]
    pub identifiers: Vec<String>,

    /// Input file: single-column CSV with a header, or one identifier per line
    #[arg(short = 'f', long = "file", value_name = "FILE", help_heading = "Input")]
    pub file: Option<String>,

    /// Show the planned lookups without sending any request
    #[arg(long = "dry-run", help_heading = "Input")]
    pub dry_run: bool,

    /// Service to query (use --list-services to see all)
    #[arg(short = 's', long = "service", value_name = "NAME", help_heading = "Service")]
    pub service: Option<String>,

    /// List all available services and exit
    #[arg(long = "list-services", help_heading = "Service")]
    pub list_services: bool,

    /// Endpoint URL of the selected service
    #[arg(long = "url", value_name = "URL", help_heading = "Service")]
    pub url: Option<String>,

    /// Max lookups in flight (defaults: defunciones 50, deudores 20)
    #[arg(short = 'c', long = "concurrency", value_name = "N", help_heading = "Performance")]
    pub concurrency: Option<usize>,

    /// Identifiers per synthetic source address (defunciones only, default 100)
    #[arg(long = "ip-interval", value_name = "N", help_heading = "Performance")]
    pub ip_interval: Option<usize>,

    /// Per-request timeout, e.g. "10s", "2m" (defaults: 10s / 30s)
    #[arg(long = "timeout", value_name = "DURATION", help_heading = "Performance")]
    pub timeout: Option<String>,

    /// Use specific config file instead of automatic discovery
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<String>,

    /// Output results in JSON format
    #[arg(short = 'j', long = "json", help_heading = "Output Format")]
    pub json: bool,

    /// Output results in CSV format
    #[arg(long = "csv", help_heading = "Output Format")]
    pub csv: bool,

    /// Save results to resultados_<service>.csv
    #[arg(long = "save", help_heading = "Output Format")]
    pub save: bool,

    /// Save results as CSV to the given path
    #[arg(short = 'o', long = "output", value_name = "FILE", help_heading = "Output Format")]
    pub output: Option<String>,

    /// Do not draw the progress line
    #[arg(long = "no-progress", help_heading = "Output Format")]
    pub no_progress: bool,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose", help_heading = "Debugging")]
    pub verbose: bool,

    /// Show per-request debug logging
    #[arg(short = 'd', long = "debug", help_heading = "Debugging")]
    pub debug: bool,
}

impl Args {
    fn is_structured(&self) -> bool {
        self.json || self.csv
    }

    /// Export target, if any. `--output` wins over `--save`.
    fn export_path(&self, kind: ServiceKind) -> Option<PathBuf> {
        match (&self.output, self.save) {
            (Some(path), _) => Some(PathBuf::from(path)),
            (None, true) => Some(PathBuf::from(default_export_name(kind))),
            (None, false) => None,
        }
    }

    /// Service section built from command-line flags (highest precedence).
    fn overrides(&self) -> ServiceSection {
        ServiceSection {
            url: self.url.clone(),
            max_concurrent: self.concurrency,
            ip_interval: self.ip_interval,
            timeout: self.timeout.clone(),
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    if args.list_services {
        ui::print_services();
        return;
    }

    init_tracing(&args);

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Validate command line arguments
fn validate_args(args: &Args) -> Result<(), String> {
    // --list-services is self-contained, skip other validation
    if args.list_services {
        return Ok(());
    }

    let Some(service) = &args.service else {
        return Err("You must select a service with --service (see --list-services)".to_string());
    };
    let kind: ServiceKind = service.parse().map_err(|e: KnowMeError| e.to_string())?;

    if args.identifiers.is_empty() && args.file.is_none() {
        return Err("You must specify identifiers or a file with --file".to_string());
    }

    if args.json && args.csv {
        return Err("Cannot specify multiple output formats (--json, --csv)".to_string());
    }

    if let Some(concurrency) = args.concurrency {
        if concurrency == 0 || concurrency > MAX_CONCURRENCY_LIMIT {
            return Err(format!(
                "Concurrency must be between 1 and {}",
                MAX_CONCURRENCY_LIMIT
            ));
        }
    }

    if let Some(interval) = args.ip_interval {
        if !kind.rotates_address() {
            return Err(format!("--ip-interval is not supported by '{}'", kind));
        }
        if interval == 0 {
            return Err("--ip-interval must be a positive integer".to_string());
        }
    }

    if let Some(timeout) = &args.timeout {
        if parse_timeout_string(timeout).is_none() {
            return Err(format!(
                "Invalid timeout '{}', use a format like '10s', '2m' or '30'",
                timeout
            ));
        }
    }

    Ok(())
}

/// Install the stderr log subscriber. `RUST_LOG` wins over the flags.
fn init_tracing(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_level(args)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn default_log_level(args: &Args) -> &'static str {
    if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    }
}

/// Main lookup logic
async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let kind: ServiceKind = args.service.as_deref().unwrap_or_default().parse()?;
    let identifiers = collect_identifiers(&args)?;

    let file_config = load_file_config(&args)?;
    let env_config = load_env_config();
    let overrides = args.overrides();

    match kind {
        ServiceKind::Defunciones => {
            let config = resolve_defunciones(&file_config, &env_config, &overrides)?;
            let service = DefuncionesService::new(config)?;
            execute(service, kind, &identifiers, &args).await
        }
        ServiceKind::Deudores => {
            let config = resolve_deudores(&file_config, &env_config, &overrides)?;
            let service = DeudoresService::new(config)?;
            execute(service, kind, &identifiers, &args).await
        }
    }
}

/// Configuration files: `--config`, then `KM_CONFIG`, then discovery.
fn load_file_config(args: &Args) -> Result<FileConfig, Box<dyn std::error::Error>> {
    let config_manager = ConfigManager::new();

    if let Some(path) = &args.config {
        tracing::info!(path = %path, "using explicit config file (--config)");
        return config_manager
            .load_file(path)
            .map_err(|e| format!("Failed to load config file '{}': {}", path, e).into());
    }

    if let Ok(path) = std::env::var("KM_CONFIG") {
        if !path.trim().is_empty() {
            tracing::info!(path = %path, "using explicit config file (KM_CONFIG)");
            return config_manager
                .load_file(&path)
                .map_err(|e| format!("Failed to load config file '{}': {}", path, e).into());
        }
    }

    Ok(config_manager.discover_and_load()?)
}

/// Positional identifiers followed by the ones read from `--file`.
fn collect_identifiers(args: &Args) -> Result<Vec<Identifier>, Box<dyn std::error::Error>> {
    let mut identifiers: Vec<Identifier> = args
        .identifiers
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();

    if let Some(path) = &args.file {
        let from_file = load_identifiers(path)?;
        tracing::info!(path = %path, count = from_file.len(), "loaded identifiers");
        identifiers.extend(from_file);
    }

    if identifiers.is_empty() {
        return Err("No identifiers to look up".into());
    }

    Ok(identifiers)
}

/// Run one service over the identifiers and render the outcome.
async fn execute<C: Classifier>(
    service: C,
    kind: ServiceKind,
    identifiers: &[Identifier],
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    if args.dry_run {
        return print_plan(&service, identifiers, args);
    }

    if !args.is_structured() {
        ui::print_header(kind, identifiers.len(), service.max_concurrent());
    }

    let progress_line = if args.no_progress {
        None
    } else {
        ui::ProgressLine::start()
    };

    let start_time = Instant::now();
    let mut runner = BatchRunner::new(service);
    let result = runner
        .run(identifiers, |state: ProgressState| {
            if let Some(line) = &progress_line {
                line.update(state);
            }
        })
        .await;

    // Clear the progress line before anything else is printed
    if let Some(line) = progress_line {
        line.finish();
    }

    let rows = result?.into_rows();
    let duration = start_time.elapsed();

    display_results(&rows, args, duration)?;

    if let Some(path) = args.export_path(kind) {
        export_csv(&rows, &path)?;
        ui::print_saved(&path, rows.len());
    }

    Ok(())
}

/// Print the lookups that would be sent, with their synthetic addresses.
fn print_plan<C: Classifier>(
    service: &C,
    identifiers: &[Identifier],
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let jobs = plan_jobs(
        identifiers,
        service.rotation_interval(),
        &mut AddressRotator::new(),
    );

    if args.json {
        let plan: Vec<serde_json::Value> = jobs
            .iter()
            .map(|job| {
                serde_json::json!({
                    "identifier": job.identifier,
                    "address": job.address.map(|a| a.to_string()),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        for job in &jobs {
            match job.address {
                Some(address) => println!("{}\t{}", job.identifier, address),
                None => println!("{}", job.identifier),
            }
        }
    }

    eprintln!(
        "{} identifiers would be looked up on '{}'",
        jobs.len(),
        service.name()
    );
    Ok(())
}

/// Display results in the selected format
fn display_results<R: ResultRow>(
    rows: &[R],
    args: &Args,
    duration: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    if args.json {
        println!("{}", to_json_string(rows)?);
    } else if args.csv {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        write_csv(rows, &mut handle)?;
        handle.flush()?;
    } else {
        ui::print_table(rows);
        ui::print_summary(rows.len(), &ui::status_counts(rows), duration);
    }

    Ok(())
}

fn export_csv<R: ResultRow>(rows: &[R], path: &std::path::Path) -> Result<(), KnowMeError> {
    let file = File::create(path).map_err(|e| {
        KnowMeError::file_error(
            path.to_string_lossy(),
            format!("Failed to create export file: {}", e),
        )
    })?;
    let mut writer = BufWriter::new(file);
    write_csv(rows, &mut writer)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_args() -> Args {
        Args {
            identifiers: vec!["1020".to_string()],
            file: None,
            dry_run: false,
            service: Some("deudores".to_string()),
            list_services: false,
            url: None,
            concurrency: None,
            ip_interval: None,
            timeout: None,
            config: None,
            json: false,
            csv: false,
            save: false,
            output: None,
            no_progress: false,
            verbose: false,
            debug: false,
        }
    }

    #[test]
    fn test_validate_args_accepts_minimal() {
        assert!(validate_args(&create_test_args()).is_ok());
    }

    #[test]
    fn test_validate_args_requires_service() {
        let mut args = create_test_args();
        args.service = None;
        let err = validate_args(&args).unwrap_err();
        assert!(err.contains("--service"));
    }

    #[test]
    fn test_validate_args_unknown_service() {
        let mut args = create_test_args();
        args.service = Some("catastro".to_string());
        let err = validate_args(&args).unwrap_err();
        assert!(err.contains("catastro"));
    }

    #[test]
    fn test_validate_args_requires_input() {
        let mut args = create_test_args();
        args.identifiers.clear();
        assert!(validate_args(&args).is_err());

        args.file = Some("ids.csv".to_string());
        assert!(validate_args(&args).is_ok());
    }

    #[test]
    fn test_validate_args_output_format_conflict() {
        let mut args = create_test_args();
        args.json = true;
        args.csv = true;
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_validate_args_concurrency_bounds() {
        let mut args = create_test_args();
        args.concurrency = Some(0);
        assert!(validate_args(&args).is_err());
        args.concurrency = Some(1001);
        assert!(validate_args(&args).is_err());
        args.concurrency = Some(1000);
        assert!(validate_args(&args).is_ok());
    }

    #[test]
    fn test_validate_args_ip_interval_only_for_rotating_service() {
        let mut args = create_test_args();
        args.ip_interval = Some(10);
        assert!(validate_args(&args).is_err());

        args.service = Some("defunciones".to_string());
        assert!(validate_args(&args).is_ok());

        args.ip_interval = Some(0);
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_validate_args_timeout_format() {
        let mut args = create_test_args();
        args.timeout = Some("soon".to_string());
        assert!(validate_args(&args).is_err());
        args.timeout = Some("45s".to_string());
        assert!(validate_args(&args).is_ok());
    }

    #[test]
    fn test_list_services_skips_validation() {
        let mut args = create_test_args();
        args.service = None;
        args.identifiers.clear();
        args.list_services = true;
        assert!(validate_args(&args).is_ok());
    }

    #[test]
    fn test_export_path_precedence() {
        let mut args = create_test_args();
        assert_eq!(args.export_path(ServiceKind::Deudores), None);

        args.save = true;
        assert_eq!(
            args.export_path(ServiceKind::Deudores),
            Some(PathBuf::from("resultados_deudores.csv"))
        );

        args.output = Some("out/ids.csv".to_string());
        assert_eq!(
            args.export_path(ServiceKind::Deudores),
            Some(PathBuf::from("out/ids.csv"))
        );
    }

    #[test]
    fn test_overrides_from_flags() {
        let mut args = create_test_args();
        args.url = Some("http://localhost:8080/api".to_string());
        args.concurrency = Some(5);
        args.timeout = Some("3s".to_string());

        let overrides = args.overrides();
        assert_eq!(overrides.url.as_deref(), Some("http://localhost:8080/api"));
        assert_eq!(overrides.max_concurrent, Some(5));
        assert_eq!(overrides.ip_interval, None);
        assert_eq!(overrides.timeout.as_deref(), Some("3s"));
    }

    #[test]
    fn test_default_log_level() {
        let mut args = create_test_args();
        assert_eq!(default_log_level(&args), "warn");
        args.verbose = true;
        assert_eq!(default_log_level(&args), "info");
        args.debug = true;
        assert_eq!(default_log_level(&args), "debug");
    }

    #[test]
    fn test_collect_identifiers_trims_and_keeps_duplicates() {
        let mut args = create_test_args();
        args.identifiers = vec![" 7 ".to_string(), "".to_string(), "7".to_string()];
        assert_eq!(collect_identifiers(&args).unwrap(), vec!["7", "7"]);
    }

    #[test]
    fn test_collect_identifiers_empty_is_error() {
        let mut args = create_test_args();
        args.identifiers = vec!["   ".to_string()];
        assert!(collect_identifiers(&args).is_err());
    }
}
