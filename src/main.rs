//! Schema Warden CLI - Command-line interface for structural document validation
//!
//! CDD Principle: Application Layer - CLI coordinates user interactions with domain services
//! - Translates user commands to warden, pool and formatter operations
//! - Handles external concerns like file discovery, process exit codes, and terminal output
//! - Plays the host role: it owns the configuration and the worker pool lifecycle

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use schema_warden::{
    CompilationPool, Document, DocumentReport, OutputFormat, ReportFormatter, ReportOptions,
    RuleSetSource, SchemaWarden, Severity, WardenConfig, WardenError,
};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Default configuration file names searched in the working directory
const DEFAULT_CONFIGS: [&str; 3] = ["schema_warden.yaml", "schema_warden.yml", ".schema_warden.yaml"];

/// Schema Warden - Structural validation of documents against compiled rule sets
#[derive(Parser)]
#[command(name = "schema-warden")]
#[command(version)]
#[command(about = "Compile declarative rule sets and validate documents against them")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate documents against the configured rule sets
    Check(CheckArgs),

    /// Compile rule sets and print stage warnings
    Compile {
        /// Rule-set files (defaults to the configured ones)
        rule_sets: Vec<PathBuf>,
    },

    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        config_file: Option<PathBuf>,
    },
}

#[derive(Args)]
struct CheckArgs {
    /// Documents or directories to validate
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Rule-set file; replaces the configured rule sets when given
    #[arg(short, long = "rule-set", action = clap::ArgAction::Append)]
    rule_sets: Vec<PathBuf>,

    /// Only validate documents with this root namespace
    #[arg(long)]
    namespace: Option<String>,

    /// Let documents with warnings but no errors pass
    #[arg(long)]
    suppress_warnings: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    format: OutputFormatArg,

    /// File name glob used when walking directories
    #[arg(short, long, default_value = "*.xml")]
    pattern: String,

    /// Maximum number of violations to show per document
    #[arg(long)]
    max_violations: Option<usize>,

    /// Only show violations at or above this severity
    #[arg(long, value_enum)]
    severity: Option<SeverityArg>,
}

#[derive(Copy, Clone, ValueEnum, PartialEq)]
enum OutputFormatArg {
    Human,
    Json,
    Junit,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Human => OutputFormat::Human,
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Junit => OutputFormat::Junit,
        }
    }
}

#[derive(Copy, Clone, ValueEnum, PartialEq)]
enum SeverityArg {
    Warning,
    Error,
}

impl From<SeverityArg> for Severity {
    fn from(arg: SeverityArg) -> Self {
        match arg {
            SeverityArg::Warning => Severity::Warning,
            SeverityArg::Error => Severity::Error,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    match run_command(cli).await {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

async fn run_command(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Check(args) => run_check(cli.config, args, !cli.no_color).await,
        Commands::Compile { rule_sets } => run_compile(cli.config, rule_sets).await,
        Commands::ValidateConfig { config_file } => run_validate_config(config_file.or(cli.config)),
    }
}

fn load_config(config_path: Option<PathBuf>) -> Result<WardenConfig> {
    if let Some(path) = config_path {
        return Ok(WardenConfig::load_from_file(path)?);
    }

    for name in DEFAULT_CONFIGS {
        if Path::new(name).exists() {
            return Ok(WardenConfig::load_from_file(name)?);
        }
    }

    Ok(WardenConfig::default())
}

/// Rule sets named on the command line win over configured ones
fn select_sources(config: &WardenConfig, cli_rule_sets: Vec<PathBuf>) -> Vec<RuleSetSource> {
    if cli_rule_sets.is_empty() {
        config.resolve_rule_sets()
    } else {
        cli_rule_sets.into_iter().map(RuleSetSource::new).collect()
    }
}

/// Expand files and directories into the documents to validate
fn collect_documents(paths: &[PathBuf], pattern: &str) -> Result<Vec<PathBuf>> {
    let matcher = glob::Pattern::new(pattern).with_context(|| format!("invalid pattern '{}'", pattern))?;
    let mut documents = Vec::new();

    for path in paths {
        if path.is_file() {
            documents.push(path.clone());
        } else if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry.with_context(|| format!("failed to walk {}", path.display()))?;
                let matches = matcher.matches(&entry.file_name().to_string_lossy());
                if entry.file_type().is_file() && matches {
                    documents.push(entry.into_path());
                }
            }
        } else {
            bail!("path does not exist: {}", path.display());
        }
    }

    Ok(documents)
}

async fn run_check(config_path: Option<PathBuf>, args: CheckArgs, use_colors: bool) -> Result<i32> {
    let mut config = load_config(config_path)?;
    let sources = select_sources(&config, args.rule_sets);
    if sources.is_empty() {
        bail!("no rule sets configured; pass --rule-set or list rule_sets in the config file");
    }

    config.rule_sets.clear();
    if args.namespace.is_some() {
        config.namespace = args.namespace;
    }
    config.suppress_warnings |= args.suppress_warnings;

    let warden = SchemaWarden::start(config)?;
    warden.configure(sources)?;

    let documents = collect_documents(&args.paths, &args.pattern)?;
    let mut reports = Vec::with_capacity(documents.len());

    for path in &documents {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let label = path.display().to_string();
        let document = Document::new(content).with_id(label.clone());

        let report = warden
            .generate_report(&document)
            .await
            .with_context(|| format!("failed to validate {}", label))?;
        reports.push(DocumentReport::new(label, report));
    }

    let suppress_warnings = warden.suppress_warnings();
    warden.shutdown();

    let format = OutputFormat::from(args.format);
    let formatter = ReportFormatter::new(ReportOptions {
        use_colors: use_colors && format == OutputFormat::Human,
        suppress_warnings,
        max_violations: args.max_violations,
        min_severity: args.severity.map(Severity::from),
    });
    formatter.write_reports(&reports, format, std::io::stdout().lock())?;

    let failed = reports.iter().any(|entry| !entry.passed(suppress_warnings));
    Ok(if failed { 1 } else { 0 })
}

async fn run_compile(config_path: Option<PathBuf>, rule_sets: Vec<PathBuf>) -> Result<i32> {
    let config = load_config(config_path)?;
    let sources = select_sources(&config, rule_sets);
    if sources.is_empty() {
        bail!("no rule sets to compile");
    }

    let pool = CompilationPool::with_pipeline(config.pool_config())?;
    let handles = sources
        .into_iter()
        .map(|source| pool.submit(source, 1))
        .collect::<Result<Vec<_>, WardenError>>()?;

    let mut failures = 0;
    for handle in &handles {
        match handle.wait(config.compile_timeout()).await {
            Ok(validator) => {
                let warnings = handle.warnings();
                let title = validator.title().map(|t| format!(" - {}", t)).unwrap_or_default();
                println!("✅ {}{} ({} warning(s))", handle.source(), title, warnings.len());
                for warning in warnings {
                    println!("   ⚠️ {}", warning);
                }
            }
            Err(e) => {
                failures += 1;
                println!("❌ {}", e);
            }
        }
    }

    pool.shutdown();
    Ok(if failures > 0 { 1 } else { 0 })
}

fn run_validate_config(config_path: Option<PathBuf>) -> Result<i32> {
    let config_path = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIGS[0]));

    println!("Validating configuration: {}", config_path.display());

    match WardenConfig::load_from_file(&config_path) {
        Ok(config) => {
            println!("✅ Configuration is valid");

            let sources = config.resolve_rule_sets();
            let missing: Vec<&RuleSetSource> = sources.iter().filter(|s| !s.path().exists()).collect();

            println!("📊 Configuration summary:");
            println!("  Id: {}", config.id.as_deref().unwrap_or("<unnamed>"));
            println!("  Rule sets: {} ({} missing)", sources.len(), missing.len());
            println!("  Base directory: {}", config.base_dir.display());
            println!("  Namespace filter: {}", config.namespace.as_deref().unwrap_or("<none>"));
            println!("  Suppress warnings: {}", config.suppress_warnings);
            println!("  Pool size: {}", config.pool_size);
            println!("  Compile timeout: {}s", config.compile_timeout_secs);
            println!("  Priority: {}", config.effective_priority());
            println!("  Fingerprint: {}", config.fingerprint());

            for source in missing {
                println!("  ⚠️ rule set not found: {}", source);
            }

            Ok(0)
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed: {}", e);
            Ok(1)
        }
    }
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
