use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use queriums::gate::PolicyDecision;
use queriums::ingest::import_csv_file;
use queriums::{Database, Explorer, ExplorerConfig, QueryGate, QueryReport, RawModelOutput};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "queriums")]
#[command(about = "Ask questions of a SQLite database; only gated, read-only SELECTs ever run")]
struct Cli {
    /// JSON config file (environment variables and flags override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Row limit appended to queries that have none
    #[arg(long, global = true)]
    limit: Option<u64>,

    /// Execution timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Extra keyword to forbid (repeatable)
    #[arg(long = "forbid", global = true)]
    forbid: Vec<String>,

    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Csv,
    Json,
}

#[derive(Args)]
struct DbArg {
    /// SQLite database file (or set QUERIUMS_DB)
    #[arg(long)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run SQL through the gate without executing it
    Check { sql: String },
    /// Gate and execute SQL
    Run {
        #[command(flatten)]
        db: DbArg,
        sql: String,
    },
    /// Ask the model for SQL, then gate and execute it
    Ask {
        #[command(flatten)]
        db: DbArg,
        question: String,
        /// OpenAI API key (or set OPENAI_API_KEY)
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Load a CSV file into a table, replacing it
    Import {
        #[command(flatten)]
        db: DbArg,
        #[arg(long)]
        table: String,
        csv: PathBuf,
    },
    /// Print tables and columns
    Schema {
        #[command(flatten)]
        db: DbArg,
    },
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    match &cli.command {
        Command::Check { sql } => {
            let gate = QueryGate::new(config.gate_config());
            let verdict = gate.check(&RawModelOutput::from(sql.as_str()), None);
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&verdict)?),
                _ => match &verdict.decision {
                    PolicyDecision::Accept(stmt) => println!("accepted: {}", stmt),
                    PolicyDecision::Reject(rejection) => println!("rejected: {}", rejection),
                },
            }
        }
        Command::Run { db, sql } => {
            let explorer = Explorer::new(
                config.configure(open_database(db, &config)?),
                QueryGate::new(config.gate_config()),
            );
            let report = explorer.run_sql(sql).await?;
            print_report(&report, cli.format)?;
        }
        Command::Ask {
            db,
            question,
            api_key,
        } => {
            let mut config = config.clone();
            if let Some(key) = api_key {
                config.llm.api_key = Some(key.clone());
            }
            let explorer = Explorer::from_config(open_database(db, &config)?, &config)?;
            let report = explorer.ask(question).await?;
            info!(request_id = %report.request_id, sql = %report.sql, "answered question");
            print_report(&report, cli.format)?;
        }
        Command::Import { db, table, csv } => {
            let path = db
                .db
                .clone()
                .or_else(|| config.db_path.clone())
                .context("no database given; pass --db or set QUERIUMS_DB")?;
            let database = Database::create(&path)?;
            let summary = import_csv_file(&database, table, csv)
                .await
                .with_context(|| format!("importing {}", csv.display()))?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
                _ => println!(
                    "imported {} rows into {} ({} columns)",
                    summary.rows,
                    summary.table,
                    summary.columns.len()
                ),
            }
        }
        Command::Schema { db } => {
            let explorer = Explorer::new(open_database(db, &config)?, QueryGate::default());
            let schema = explorer.schema().await?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&schema)?),
                _ => println!("{}", schema.to_prompt_text()),
            }
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<ExplorerConfig> {
    let base = match &cli.config {
        Some(path) => ExplorerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ExplorerConfig::default(),
    };
    let mut config = base.with_env(|key| std::env::var(key).ok())?;

    if let Some(limit) = cli.limit {
        config.default_limit = limit;
    }
    if let Some(secs) = cli.timeout_secs {
        config.execution_timeout_secs = secs;
    }
    config.extra_forbidden_keywords.extend(cli.forbid.iter().cloned());
    config.validate()?;
    Ok(config)
}

fn open_database(arg: &DbArg, config: &ExplorerConfig) -> Result<Database> {
    let path = arg
        .db
        .clone()
        .or_else(|| config.db_path.clone())
        .context("no database given; pass --db or set QUERIUMS_DB")?;
    Ok(Database::open(path)?)
}

fn print_report(report: &QueryReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("-- {}", report.sql);
            print!("{}", report.result.render_table());
        }
        OutputFormat::Csv => print!("{}", report.result.to_csv()?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}
