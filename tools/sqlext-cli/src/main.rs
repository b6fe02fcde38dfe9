///
/// sqlext - SQL shell with the built-in native extensions
///
/// Opens a database (in memory unless `--database` is given), enables the
/// functions, collations and tokenizers listed in the config file, then runs
/// each SQL argument in order and prints its rows to stdout:
///
/// - sqlext "SELECT unicode_upper('straße')"
/// - sqlext --config sqlext.toml --database notes.db "SELECT * FROM notes"
/// - sqlext --json "VALUES (1, 'a'), (2, x'ff')"
///

mod config;
mod errors;
mod output;

use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use sqlext::Database;

use config::CliConfig;
use errors::CliError;

#[derive(Parser)]
#[command(name = "sqlext")]
#[command(author, version, about = "SQL shell with native SQLite extensions", long_about = None)]
struct Cli {
    /// Config file selecting the log filter and extensions
    #[arg(long)]
    config: Option<PathBuf>,

    /// Database file (in-memory when omitted)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Print each row as a JSON array
    #[arg(long)]
    json: bool,

    /// SQL statements, run in order
    #[arg(required = true)]
    sql: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    let config = match cli.config.as_deref().map(CliConfig::load).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    init_logging(&config);

    if let Err(e) = run(&cli, &config) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(config: &CliConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn open(path: Option<&Path>) -> Result<Database, CliError> {
    let db = match path {
        Some(path) => {
            info!(path = %path.display(), "opening database");
            Database::open(path)?
        }
        None => Database::open_in_memory()?,
    };
    Ok(db)
}

fn run(cli: &Cli, config: &CliConfig) -> Result<(), CliError> {
    let db = open(cli.database.as_deref())?;
    config.apply(&db)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for sql in &cli.sql {
        let rows = db.fetch_rows(sql, &[])?;
        debug!(rows = rows.len(), "statement finished");
        for row in &rows {
            writeln!(out, "{}", output::format_row(row, cli.json)?)?;
        }
    }
    out.flush()?;

    db.close().map_err(|(_, e)| CliError::Database(e))
}
