//! MMM Loader: rebuilds the weekly tactic spend table used for marketing mix
//! modeling from campaign results and per-campaign tactic spend.

use clap::{Parser, Subcommand, ValueEnum};
use mmm_core::config::{AppConfig, BackendKind};
use mmm_core::types::parse_date;
use mmm_core::TacticCatalog;
use mmm_reporting::export::{render_breakdown, render_weekly, ExportFormat};
use mmm_reporting::SampleDataConfig;
use mmm_warehouse::{ClickHouseWarehouse, LoadReport, Loader, LocalWarehouse, Validation, Warehouse};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mmm-loader")]
#[command(about = "Weekly tactic spend loader for marketing mix modeling")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "MMM_LOADER_CONFIG")]
    config: Option<PathBuf>,

    /// Catalog holding the tables (overrides config)
    #[arg(long, global = true)]
    catalog: Option<String>,

    /// Schema holding the tables (overrides config)
    #[arg(long, global = true)]
    schema: Option<String>,

    /// Warehouse backend (overrides config)
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendArg>,

    /// Data directory of the local backend (overrides config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate inputs, rebuild the weekly table and preview it (default)
    Run {
        #[arg(long, value_enum, default_value_t = FormatArg::Table)]
        format: FormatArg,
    },

    /// Count input rows and show spend per tactic
    Validate,

    /// Rebuild the weekly table
    Build,

    /// Show the first rows of the weekly table
    Preview {
        /// Number of rows (default: preview_limit from config)
        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(long, value_enum, default_value_t = FormatArg::Table)]
        format: FormatArg,
    },

    /// Replace the input tables with generated sample data
    Seed {
        #[arg(long, default_value = "52")]
        weeks: u32,

        #[arg(long, default_value = "4")]
        campaigns_per_week: u32,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// First campaign week, YYYY-MM-DD
        #[arg(long)]
        start: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendArg {
    Local,
    Clickhouse,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Local => BackendKind::Local,
            BackendArg::Clickhouse => BackendKind::ClickHouse,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Table,
    Csv,
    Json,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Table => ExportFormat::Table,
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Json => ExportFormat::Json,
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mmm_loader=info,mmm_warehouse=info,mmm_reporting=info".into());
    // stdout is reserved for report output
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(catalog) = &cli.catalog {
        config.namespace.catalog = Some(catalog.clone()).filter(|c| !c.is_empty());
    }
    if let Some(schema) = &cli.schema {
        config.namespace.schema = schema.clone();
    }
    if let Some(backend) = cli.backend {
        config.backend = backend.into();
    }
    if let Some(dir) = &cli.data_dir {
        config.local.data_dir = dir.clone();
    }
}

async fn open_warehouse(config: &AppConfig) -> anyhow::Result<Arc<dyn Warehouse>> {
    let namespace = config.namespace();
    let warehouse: Arc<dyn Warehouse> = match config.backend {
        BackendKind::Local => Arc::new(LocalWarehouse::open(
            &config.local.data_dir,
            namespace,
            config.tables.clone(),
        )),
        BackendKind::ClickHouse => Arc::new(
            ClickHouseWarehouse::connect(&config.clickhouse, namespace, config.tables.clone())
                .await?,
        ),
    };
    Ok(warehouse)
}

fn print_validation(validation: &Validation) {
    println!("campaign_results: {} rows", validation.campaign_results);
    println!("campaign_tactics: {} rows", validation.tactic_records);
    println!();
    print!("{}", render_breakdown(&validation.breakdown));
}

fn print_report(report: &LoadReport, format: FormatArg) -> anyhow::Result<()> {
    if format == FormatArg::Json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    print_validation(&report.validation);
    println!();
    println!("{}: {} rows written", report.table, report.rows_written);
    println!();
    print!("{}", render_weekly(&report.preview, &report.tactics, format.into())?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = AppConfig::load(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli);

    info!(
        backend = ?config.backend,
        namespace = %config.namespace(),
        mode = ?config.mode,
        join = ?config.join,
        "Configuration loaded"
    );

    let warehouse = open_warehouse(&config).await?;
    let loader = Loader::new(warehouse, &config);

    match cli.command.unwrap_or(Commands::Run {
        format: FormatArg::Table,
    }) {
        Commands::Run { format } => {
            let report = loader.run().await?;
            print_report(&report, format)?;
        }
        Commands::Validate => {
            let validation = loader.validate().await?;
            print_validation(&validation);
        }
        Commands::Build => {
            let tactics = loader.resolve_tactics().await?;
            let rows = loader.build(&tactics).await?;
            println!(
                "{}: {} rows written",
                config.namespace().qualify(&config.tables.weekly_output),
                rows
            );
        }
        Commands::Preview { limit, format } => {
            let tactics = loader.resolve_tactics().await?;
            let rows = loader
                .preview(&tactics, limit.unwrap_or(loader.preview_limit()))
                .await?;
            print!("{}", render_weekly(&rows, &tactics, format.into())?);
        }
        Commands::Seed {
            weeks,
            campaigns_per_week,
            seed,
            start,
        } => {
            let mut sample = SampleDataConfig {
                weeks,
                campaigns_per_week,
                seed,
                tactics: sample_tactics(&config),
                ..SampleDataConfig::default()
            };
            if let Some(start) = start {
                sample.start = parse_date(&start)?;
            }
            let data = loader.seed(&sample).await?;
            println!(
                "seeded {} campaigns and {} tactic rows into {}",
                data.results.len(),
                data.spends.len(),
                config.namespace()
            );
        }
    }

    Ok(())
}

/// Tactics the generator draws from; discovery has no data to read yet.
fn sample_tactics(config: &AppConfig) -> TacticCatalog {
    if config.tactics.is_empty() {
        TacticCatalog::default()
    } else {
        config.tactics.clone()
    }
}
