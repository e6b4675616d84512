//! sqlrun - run a SQL query and print the result as JSON.

mod cli;

use cli::{Cli, OutputMode, QueryInput};
use sqlrun::config::{Config, ConnectionConfig};
use sqlrun::query::FileSource;
use sqlrun::{logging, Database, Delimiters, QueryError, QueryRunner, Result, Row};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    logging::init_stderr_logging();

    if let Err(e) = run().await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse_args();

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let input = cli.query_input()?;
    let connection = resolve_connection(&cli, &config)?.ok_or_else(|| {
        QueryError::config(
            "No database connection configured. Pass a connection string, use --connection, or set DATABASE_URL",
        )
    })?;

    info!("Connection: {}", connection.display_string());
    let db = Database::connect(&connection).await?;

    let params = cli.query_params();
    let runner = match input {
        QueryInput::Sql(sql) => QueryRunner::new(db.clone(), sql, params),
        QueryInput::File(path) => QueryRunner::from_file(db.clone(), path, params),
    };
    let source = match &config.query.query_dir {
        Some(dir) => FileSource::with_base_dir(dir),
        None => FileSource::new(),
    };
    let mut runner = runner
        .with_source(Arc::new(source))
        .parse_bytes(cli.parse_bytes || config.query.parse_bytes);

    let outcome = print_result(&cli, &mut runner).await;
    info!(origin = %runner.origin(), rows = runner.total(), "Query finished");

    runner.close();
    db.close().await;
    outcome
}

/// Writes the query result to stdout in the requested mode.
async fn print_result(cli: &Cli, runner: &mut QueryRunner) -> Result<()> {
    let mut stdout = tokio::io::stdout();

    match cli.mode {
        OutputMode::Stream => {
            let mut row = Row::new();
            runner
                .write(&mut stdout, Delimiters::new(&cli.start, &cli.end), &mut row)
                .await?;
        }
        OutputMode::List => {
            let rows = runner.to_list().await?;
            let json = serde_json::to_vec(&rows)
                .map_err(|e| QueryError::serialization(e.to_string()))?;
            write_stdout(&mut stdout, &json).await?;
        }
        OutputMode::First => {
            let mut row = Row::new();
            runner.first(&mut row).await?;
            let json = serde_json::to_vec(&row)
                .map_err(|e| QueryError::serialization(e.to_string()))?;
            write_stdout(&mut stdout, &json).await?;
        }
    }

    stdout
        .write_all(b"\n")
        .await
        .map_err(|e| QueryError::sink(format!("Failed to write output: {e}")))?;
    stdout
        .flush()
        .await
        .map_err(|e| QueryError::sink(format!("Failed to flush output: {e}")))
}

async fn write_stdout(stdout: &mut tokio::io::Stdout, bytes: &[u8]) -> Result<()> {
    stdout
        .write_all(bytes)
        .await
        .map_err(|e| QueryError::sink(format!("Failed to write output: {e}")))
}

/// Resolves the final connection configuration from CLI args, config file, and environment.
///
/// Precedence: CLI connection string, named connection, default connection, `DATABASE_URL`.
fn resolve_connection(cli: &Cli, config: &Config) -> Result<Option<ConnectionConfig>> {
    let mut connection = cli.to_connection_config()?;

    if connection.is_none() {
        if let Some(name) = cli.connection_name() {
            connection = config.get_connection(Some(name)).cloned();
            if connection.is_none() {
                return Err(QueryError::config(format!(
                    "Connection '{}' not found in config file",
                    name
                )));
            }
        }
    }

    if connection.is_none() {
        connection = config.get_connection(None).cloned();
    }

    if connection.is_none() {
        connection = ConnectionConfig::from_env()?;
    }

    if let Some(ref mut conn) = connection {
        conn.apply_env_defaults();
    }

    Ok(connection)
}
