//! sqlbridge - run one SQL statement and print the result as JSON.

use sqlbridge::cli::Cli;
use sqlbridge::config::Config;
use sqlbridge::db;
use sqlbridge::error::{BridgeError, Result};
use sqlbridge::executor::{ExecutionOutcome, StatementExecutor};
use sqlbridge::logging;
use tracing::{debug, error, warn};

#[tokio::main]
async fn main() {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    logging::init_stderr_logging();

    match run().await {
        Ok(outcome) => println!("{outcome}"),
        Err(e) => {
            error!("{}: {}", e.category(), e);
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<ExecutionOutcome> {
    let cli = Cli::parse_args();
    let mode = cli.parse_mode()?;
    let sql = cli.statement()?;

    let config_path = cli.config_path();
    debug!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let database_url = std::env::var("DATABASE_URL").ok();
    let connection = cli
        .resolve_connection(&config, database_url.as_deref())?
        .ok_or_else(|| {
            BridgeError::config(
                "No database connection configured. Pass a connection string, \
                 use --connection, or set DATABASE_URL.",
            )
        })?;
    debug!("Connection: {}", connection.display_string());

    let mut conn = db::connect(&connection).await?;
    let outcome = StatementExecutor::new(conn.as_mut())
        .execute_as(mode.kind_for(&sql), &sql, cli.params.as_deref())
        .await;

    if let Err(e) = conn.close().await {
        warn!("{}", e);
    }
    outcome
}
