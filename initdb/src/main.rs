//! Creates or upgrades the session and venue schema.

use std::env;
use std::error::Error;

use movine::Movine;
use postgres::{Client, NoTls};

use log::{info, initialize_logger};

const DEFAULT_MIGRATIONS_DIRECTORY: &str = "./migrations";

fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    let logger = initialize_logger();
    let connection_string = env::var("JAMSESSIONS_DB_CONNECTION_STRING")
        .map_err(|_| "could not read JAMSESSIONS_DB_CONNECTION_STRING")?;
    let migrations = env::var("JAMSESSIONS_SCHEMA_DIRECTORY")
        .unwrap_or_else(|_| DEFAULT_MIGRATIONS_DIRECTORY.to_owned());

    info!(logger, "Connecting to database...");
    let client = Client::connect(&connection_string, NoTls)?;

    let mut movine = Movine::new(client);
    movine.set_migration_dir(&migrations);

    // movine keeps its own bookkeeping table, which a fresh database lacks
    if movine.status().is_err() {
        info!(logger, "Initializing migration table...");
        movine
            .initialize()
            .map_err(|e| format!("failed to initialize movine: {:?}", e))?;
    }

    info!(logger, "Applying migrations..."; "directory" => &migrations);
    movine
        .up()
        .map_err(|e| format!("failed to run migrations: {:?}", e))?;

    info!(logger, "Schema is up to date.");

    Ok(())
}
