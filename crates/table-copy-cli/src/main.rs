//! table-copy CLI - dependency-ordered MySQL table copy with foreign-key healing.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use table_copy::{
    Config, CopyError, CopyReport, FkStrategy, Orchestrator, SchemaRegistry, TableOutcome,
};
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "table-copy")]
#[command(about = "Copy a fixed set of MySQL tables in dependency order, healing dangling foreign keys")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (default: SOURCE_DB_* / TARGET_DB_* environment)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long, global = true)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text", global = true)]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info", global = true)]
    verbosity: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy every registered table (the default)
    Run(RunArgs),

    /// Compare row counts between source and target
    Validate,

    /// Test database connections
    HealthCheck,

    /// Print the table registry in processing order
    Plan {
        /// Only show these tables (comma separated)
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,
    },
}

#[derive(Args, Default)]
struct RunArgs {
    /// Override rows per insert statement
    #[arg(long)]
    batch_size: Option<usize>,

    /// Only copy these tables (comma separated)
    #[arg(long, value_delimiter = ',')]
    tables: Vec<String>,

    /// Override foreign-key strategy: prefetch or per_row
    #[arg(long)]
    fk_strategy: Option<String>,

    /// Skip the informational foreign-key summary before cleaning
    #[arg(long)]
    skip_fk_validation: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), CopyError> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default()));

    // The registry is static, so plan needs neither config nor connections
    if let Commands::Plan { tables } = &command {
        let registry = SchemaRegistry::builtin().filtered(tables)?;
        print_plan(&registry, cli.output_json)?;
        return Ok(());
    }

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = load_config(cli.config.as_ref())?;

    match command {
        Commands::Plan { .. } => unreachable!(), // Handled above
        Commands::Run(args) => {
            if let Some(size) = args.batch_size {
                config.copy.batch_size = size;
            }
            if !args.tables.is_empty() {
                config.copy.tables = args.tables;
            }
            if let Some(strategy) = args.fk_strategy {
                config.copy.fk_strategy = FkStrategy::from_str(&strategy)?;
            }
            if args.skip_fk_validation {
                config.copy.validate_foreign_keys = false;
            }
            config.validate()?;

            let registry = SchemaRegistry::builtin().filtered(&config.copy.tables)?;
            let orchestrator = Orchestrator::connect(&config, registry).await?;
            let report = orchestrator.run().await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                print_report(&report);
            }
        }

        Commands::Validate => {
            let registry = SchemaRegistry::builtin().filtered(&config.copy.tables)?;
            let orchestrator = Orchestrator::connect(&config, registry).await?;
            let result = orchestrator.validate().await;
            orchestrator.close().await;
            let checks = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&checks)?);
            } else {
                println!("Row Counts:");
                for check in &checks {
                    println!(
                        "  {:<16} source={:<10} target={:<10} {}",
                        check.table,
                        count_label(check.source_rows),
                        count_label(check.target_rows),
                        if check.matches() { "OK" } else { "MISMATCH" }
                    );
                }
                let mismatches = checks.iter().filter(|c| !c.matches()).count();
                println!("\n  {} table(s), {} mismatch(es)", checks.len(), mismatches);
            }
        }

        Commands::HealthCheck => {
            let result = Orchestrator::health_check(&config).await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source ({}): {} ({}ms)",
                    config.source.display_name(),
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target ({}): {} ({}ms)",
                    config.target.display_name(),
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(CopyError::connection(
                    "health check failed",
                    "health-check",
                ));
            }
        }
    }

    Ok(())
}

/// Load configuration from the given file, or from the environment (after
/// reading a `.env` file if one exists).
fn load_config(path: Option<&PathBuf>) -> Result<Config, CopyError> {
    match path {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            Ok(config)
        }
        None => {
            dotenvy::dotenv().ok();
            let config = Config::from_env()?;
            info!("Loaded configuration from environment");
            Ok(config)
        }
    }
}

fn print_plan(registry: &SchemaRegistry, output_json: bool) -> Result<(), CopyError> {
    if output_json {
        let tables: Vec<serde_json::Value> = registry
            .tables_in_order()
            .iter()
            .map(|spec| {
                let fks: Vec<serde_json::Value> = spec
                    .foreign_keys
                    .iter()
                    .map(|fk| serde_json::json!({ "column": fk.column, "references": fk.references }))
                    .collect();
                serde_json::json!({ "table": spec.name, "foreign_keys": fks })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&tables)?);
        return Ok(());
    }

    println!("Processing order ({} tables):", registry.len());
    for (i, spec) in registry.tables_in_order().iter().enumerate() {
        println!("  {:>2}. {}", i + 1, spec);
    }
    Ok(())
}

fn print_report(report: &CopyReport) {
    println!("\nCopy completed!");
    println!("  Run ID: {}", report.run_id);
    println!("  Duration: {:.2}s", report.duration_seconds);
    println!(
        "  Tables: {} copied, {} skipped",
        report.tables_copied(),
        report.tables_skipped()
    );
    for table in &report.tables {
        match table.outcome {
            TableOutcome::Copied => println!(
                "    {:<16} read {:<8} inserted {:<8} skipped {:<8} fk nullified {}",
                table.table,
                table.stats.rows_read,
                table.stats.rows_inserted,
                table.stats.rows_skipped,
                table.stats.fk_nullified
            ),
            TableOutcome::SkippedMissing => {
                println!("    {:<16} skipped (not in source)", table.table)
            }
            TableOutcome::SkippedEmpty => println!("    {:<16} skipped (empty)", table.table),
        }
    }
    println!(
        "  Rows: read {}, inserted {}, skipped {}",
        report.totals.rows_read, report.totals.rows_inserted, report.totals.rows_skipped
    );
    println!("  Foreign keys set to NULL: {}", report.totals.fk_nullified);
}

fn count_label(count: Option<i64>) -> String {
    count.map_or_else(|| "-".to_string(), |n| n.to_string())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout is reserved for results
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
