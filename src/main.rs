/*!
 * lz-router CLI
 *
 * Routes landing zone arrivals into the data lake or the exception store.
 * Store names come from the config file, then the environment, then flags.
 */

use clap::{Parser, Subcommand, ValueEnum};
use lz_router::{
    backend::RouterStores,
    catalog::{DatasetRecord, PartitioningScheme},
    config::{
        LogLevel, RouterConfig, ENV_AUDIT_STORE, ENV_CATALOG_STORE, ENV_DATA_LAKE_STORE,
        ENV_EXCEPTION_STORE, ENV_SOURCE_STORE,
    },
    error::{Result, RouterError, EXIT_SUCCESS},
    event::EventBatch,
    logging, Router,
};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lz-router")]
#[command(
    version,
    about = "Route landing zone files into a partitioned data lake",
    long_about = None
)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level [default: info, or `log_level` from the config file]
    #[arg(long = "log-level", value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Write JSON logs to this file instead of stderr
    #[arg(long = "log", value_name = "FILE", global = true)]
    log: Option<PathBuf>,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Dataset catalog table
    #[arg(long, env = ENV_CATALOG_STORE, global = true)]
    catalog_store: Option<String>,

    /// Audit log table
    #[arg(long, env = ENV_AUDIT_STORE, global = true)]
    audit_store: Option<String>,

    /// Data lake bucket
    #[arg(long, env = ENV_DATA_LAKE_STORE, global = true)]
    data_lake_store: Option<String>,

    /// Landing zone bucket
    #[arg(long, env = ENV_SOURCE_STORE, global = true)]
    source_store: Option<String>,

    /// Exception bucket
    #[arg(long, env = ENV_EXCEPTION_STORE, global = true)]
    exception_store: Option<String>,

    /// Events processed concurrently within a batch
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Route redeliveries again instead of skipping them
    #[arg(long, global = true)]
    reprocess: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route every record of an S3 notification payload
    Process {
        /// Payload file, or `-` for stdin
        #[arg(long, value_name = "FILE", default_value = "-")]
        event: String,
    },

    /// Settle audit records left pending by interrupted runs
    Reconcile {
        /// Only records pending for longer than this
        #[arg(long = "older-than-secs", default_value = "900")]
        older_than_secs: i64,
    },

    /// Inspect or edit the dataset catalog
    #[command(subcommand)]
    Catalog(CatalogCommand),

    /// Inspect the audit log
    #[command(subcommand)]
    Audit(AuditCommand),
}

#[derive(Subcommand)]
enum CatalogCommand {
    /// Insert or replace a dataset
    Put {
        token: String,

        #[arg(long, value_enum)]
        scheme: SchemeArg,

        /// Data lake prefix, used verbatim (include the trailing `/`)
        #[arg(long)]
        location: String,
    },

    /// Show one dataset
    Get { token: String },
}

#[derive(Subcommand)]
enum AuditCommand {
    /// Print every audit record as JSON lines
    List,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum SchemeArg {
    #[value(name = "YMD", alias = "ymd")]
    Ymd,
    #[value(name = "DEFAULT", alias = "default")]
    Default,
}

impl From<SchemeArg> for PartitioningScheme {
    fn from(arg: SchemeArg) -> Self {
        match arg {
            SchemeArg::Ymd => PartitioningScheme::Ymd,
            SchemeArg::Default => PartitioningScheme::Default,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;

    if let Err(e) = logging::init_logging(&config) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    config.validate()?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let stores = RouterStores::open(&config).await?;
        let router = Router::new(&config, stores);

        match cli.command {
            Commands::Process { event } => process(&router, &event).await,
            Commands::Reconcile { older_than_secs } => {
                let report = router
                    .reconcile(chrono::Duration::seconds(older_than_secs.max(0)))
                    .await?;
                print_json(&report)
            }
            Commands::Catalog(CatalogCommand::Put {
                token,
                scheme,
                location,
            }) => {
                let record = DatasetRecord::new(token, location, scheme.into());
                router.catalog().register(&record).await?;
                print_json(&record)
            }
            Commands::Catalog(CatalogCommand::Get { token }) => {
                match router.catalog().resolve(&token).await? {
                    Some(record) => print_json(&record),
                    None => Err(RouterError::Config(format!(
                        "dataset '{}' is not in the catalog",
                        token
                    ))),
                }
            }
            Commands::Audit(AuditCommand::List) => {
                for record in router.audit().list().await? {
                    print_json(&record)?;
                }
                Ok(())
            }
        }
    })
}

/// Config file first, then environment and flags on top
fn build_config(cli: &Cli) -> Result<RouterConfig> {
    let mut config = match cli.config {
        Some(ref path) => RouterConfig::from_file(path)?,
        None => RouterConfig::default(),
    };

    let overrides = [
        (&mut config.stores.catalog, &cli.catalog_store),
        (&mut config.stores.audit, &cli.audit_store),
        (&mut config.stores.data_lake, &cli.data_lake_store),
        (&mut config.stores.source, &cli.source_store),
        (&mut config.stores.exception, &cli.exception_store),
    ];
    for (slot, value) in overrides {
        if let Some(value) = value {
            *slot = value.clone();
        }
    }

    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    if cli.reprocess {
        config.skip_processed = false;
    }

    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if cli.log.is_some() {
        config.log_file = cli.log.clone();
    }
    config.verbose |= cli.verbose;

    Ok(config)
}

async fn process(router: &Router, source: &str) -> Result<()> {
    let payload = if source == "-" {
        let mut payload = String::new();
        std::io::stdin().read_to_string(&mut payload)?;
        payload
    } else {
        tokio::fs::read_to_string(source).await?
    };

    let batch = EventBatch::from_json(&payload)?;
    let outcome = router.process_batch(&batch).await;

    for (object_id, result) in &outcome.results {
        match result {
            Ok(event_outcome) => print_json(event_outcome)?,
            Err(e) => print_json(&FailedEvent {
                outcome: "failed",
                object: object_id,
                category: e.category().as_str(),
                error: e.to_string(),
            })?,
        }
    }

    outcome.into_result().map(|_| ())
}

#[derive(Serialize)]
struct FailedEvent<'a> {
    outcome: &'static str,
    object: &'a str,
    category: &'static str,
    error: String,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value)
        .map_err(|e| RouterError::Config(format!("Cannot encode output: {}", e)))?;
    println!("{}", line);
    Ok(())
}
