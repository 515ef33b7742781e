//! lakeload CLI - bronze-to-warehouse tabular ETL.

use clap::{Parser, Subcommand, ValueEnum};
use lakeload::{Catalog, Config, EtlError, Pipeline};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "lakeload")]
#[command(about = "Extract, clean and load tabular datasets from object storage into PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file; omit to configure from the
    /// environment (AWS_S3_BUCKET, DB_HOST, ...)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the table metadata catalog
    #[arg(long, default_value = "catalog.yaml")]
    catalog: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Log verbosity
    #[arg(long, value_enum, default_value = "info")]
    verbosity: Verbosity,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum Verbosity {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline end to end
    Run {
        /// Override the date classification threshold (0.0 to 1.0)
        #[arg(long)]
        date_threshold: Option<f64>,
    },

    /// Load and validate the configuration and catalog, then exit
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), EtlError> {
    // Local .env files feed the environment-based configuration path.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    setup_logging(cli.verbosity, cli.log_format);

    let mut config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => {
            let config = Config::from_env()?;
            info!("Loaded configuration from the environment");
            config
        }
    };
    let catalog = Catalog::load(&cli.catalog)?;
    info!(
        "Loaded catalog from {:?} ({} tables)",
        cli.catalog,
        catalog.tables.len()
    );

    match cli.command {
        Commands::Run { date_threshold } => {
            if let Some(threshold) = date_threshold {
                config.pipeline.date_threshold = threshold;
                config.validate()?;
            }

            let pipeline = Pipeline::connect(config, catalog).await?;
            let result = pipeline.run().await?;
            pipeline.shutdown().await;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("\nPipeline {}!", result.status);
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Datasets extracted: {}", result.datasets_extracted);
                println!("  Parquet written: {}", result.parquet_written);
                println!(
                    "  Tables: {}/{}",
                    result.tables_loaded, result.tables_total
                );
                println!(
                    "  Constraints: {}/{}",
                    result.constraints_total - result.constraints_failed,
                    result.constraints_total
                );
                if !result.failed_tables.is_empty() {
                    println!("  Failed tables: {:?}", result.failed_tables);
                }
            }
        }

        Commands::Validate => {
            println!("Configuration and catalog are valid");
            println!("  Bucket: {}", config.storage.bucket);
            println!(
                "  Warehouse: {}:{}/{}",
                config.warehouse.host, config.warehouse.port, config.warehouse.database
            );
            println!("  Cataloged tables: {}", catalog.tables.len());
        }
    }

    Ok(())
}

fn setup_logging(verbosity: Verbosity, format: LogFormat) {
    let level = match verbosity {
        Verbosity::Debug => Level::DEBUG,
        Verbosity::Info => Level::INFO,
        Verbosity::Warn => Level::WARN,
        Verbosity::Error => Level::ERROR,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Text => subscriber.init(),
    }
}
