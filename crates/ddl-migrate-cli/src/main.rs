//! ddl-migrate CLI - reversible schema migrations for MySQL, SQL Server and PostgreSQL.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use ddl_migrate::{
    classify, Compiler, Config, ConnectionImpl, Dialect, DialectImpl, MigrateError,
    MigrationRequest, MigrationResult, Migrator, SchemaCache, TableSpec,
};
use serde::Deserialize;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "ddl-migrate")]
#[command(about = "Reversible schema-migration DDL compiler")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Sql,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile up/down statements for an old and new table shape, offline
    Plan {
        /// YAML or JSON file with `old`, `new` and optionally `dialect`
        #[arg(short, long)]
        request: PathBuf,

        /// Dialect: mysql, mssql or postgres (overrides the file)
        #[arg(short, long)]
        dialect: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value = "sql")]
        format: OutputFormat,
    },

    /// Print the canonical category of native type names
    Classify {
        /// Native type names, e.g. varchar nvarchar(max) "double precision"
        #[arg(required = true)]
        types: Vec<String>,
    },

    /// Print signed and unsigned maxima of integer types
    Bounds {
        /// Dialect: mysql, mssql or postgres
        #[arg(short, long)]
        dialect: String,

        /// Integer type names
        #[arg(required = true)]
        types: Vec<String>,
    },

    /// Load the live schema and print it as JSON
    Introspect,

    /// Migrate one table to the shape described in a request file
    Apply {
        /// YAML or JSON migration request
        #[arg(short, long)]
        request: PathBuf,

        /// Compile against the live schema without executing
        #[arg(long)]
        dry_run: bool,
    },
}

/// Offline plan input.
#[derive(Deserialize)]
struct PlanFile {
    #[serde(default)]
    dialect: Option<String>,
    old: TableSpec,
    new: TableSpec,
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

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    match cli.command {
        Commands::Plan {
            request,
            dialect,
            format,
        } => {
            let file: PlanFile = read_document(&request)?;
            let name = dialect.or(file.dialect).ok_or_else(|| {
                MigrateError::Config("no dialect given: pass --dialect or set `dialect`".into())
            })?;
            let dialect = DialectImpl::from_db_type(&name)?;
            let result = Compiler::new(&dialect).compile(&file.old, &file.new)?;
            print_result(&result, cli.output_json || format == OutputFormat::Json)?;
        }

        Commands::Classify { types } => {
            let rows: Vec<(String, &'static str)> = types
                .iter()
                .map(|t| (t.clone(), classify(t).as_str()))
                .collect();
            if cli.output_json {
                let json: Vec<_> = rows
                    .iter()
                    .map(|(t, c)| serde_json::json!({ "type": t, "category": c }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&json)?);
            } else {
                for (t, c) in rows {
                    println!("{}\t{}", t, c);
                }
            }
        }

        Commands::Bounds { dialect, types } => {
            let dialect = DialectImpl::from_db_type(&dialect)?;
            let mut json = Vec::new();
            for t in &types {
                let bounds = dialect.integer_bounds(t);
                if cli.output_json {
                    json.push(serde_json::json!({ "type": t, "bounds": bounds }));
                    continue;
                }
                match bounds {
                    Some(b) => println!("{}\t{}\t{}", t, b.signed_max, b.unsigned_max),
                    None => println!("{}\t-\t-", t),
                }
            }
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
        }

        Commands::Introspect => {
            let config = Config::load(&cli.config)?;
            info!("Loaded configuration from {:?}", cli.config);
            let connection = ConnectionImpl::connect(&config.connection).await?;
            let mut cache = SchemaCache::new();
            cache.load(&connection).await?;
            let tables: Vec<&TableSpec> = cache.tables().collect();
            println!("{}", serde_json::to_string_pretty(&tables)?);
        }

        Commands::Apply { request, dry_run } => {
            let request: MigrationRequest = read_document(&request)?;
            let config = Config::load(&cli.config)?;
            info!("Loaded configuration from {:?}", cli.config);
            let migrator = Migrator::connect(&config).await?;
            let result = if dry_run {
                migrator.plan(&request).await?
            } else {
                migrator.request_migration(&request).await?
            };
            print_result(&result, cli.output_json)?;
        }
    }

    Ok(())
}

/// Read a YAML document. JSON is accepted as a subset of YAML.
fn read_document<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, MigrateError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

fn print_result(result: &MigrationResult, json: bool) -> Result<(), MigrateError> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }
    println!("-- up");
    for statement in &result.up_statements {
        println!("{};", statement);
    }
    println!("-- down");
    for statement in &result.down_statements {
        println!("{};", statement);
    }
    Ok(())
}

/// Logs go to stderr so stdout carries only command output.
fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
