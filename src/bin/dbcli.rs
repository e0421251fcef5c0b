use std::error::Error;
use std::sync::Arc;

use dotenv::dotenv;
use log::{info, initialize_logger};
use structopt::StructOpt;
use url::Url;

use jamsessions::apply::{Applier, Command};
use jamsessions::config::{get_variable, get_variable_or};
use jamsessions::db::PgDb;
use jamsessions::geocoding::{NominatimClient, DEFAULT_BASE_URL, DEFAULT_USER_AGENT};
use jamsessions::queue::Table;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "dbcli",
    about = "Apply a reviewed change to the session and venue database"
)]
enum Opt {
    /// Insert a record and print its ID
    Insert {
        /// One of venue, session, comment or rating
        table: Table,
        /// The record as JSON
        payload: String,
    },
    /// Update a venue or session
    Update {
        /// One of venue or session
        table: Table,
        id: i32,
        /// The fields to change as JSON
        payload: String,
    },
    /// Delete a venue or session
    Delete {
        /// One of venue or session
        table: Table,
        id: i32,
    },
}

impl From<Opt> for Command {
    fn from(opt: Opt) -> Self {
        match opt {
            Opt::Insert { table, payload } => Command::Insert { table, payload },
            Opt::Update { table, id, payload } => Command::Update { table, id, payload },
            Opt::Delete { table, id } => Command::Delete { table, id },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    let opt = Opt::from_args();

    let logger = Arc::new(initialize_logger());

    let connection_string = get_variable("JAMSESSIONS_DB_CONNECTION_STRING");
    let pool = sqlx::Pool::connect(&connection_string)
        .await
        .expect("create database pool from JAMSESSIONS_DB_CONNECTION_STRING");
    let db = PgDb::new(pool);

    let geocoding_url = Url::parse(&get_variable_or("JAMSESSIONS_GEOCODING_URL", DEFAULT_BASE_URL))
        .expect("parse JAMSESSIONS_GEOCODING_URL as a URL");
    let geocoder = NominatimClient::new(
        geocoding_url,
        &get_variable_or("JAMSESSIONS_GEOCODING_USER_AGENT", DEFAULT_USER_AGENT),
        logger.clone(),
    )?;

    let command = Command::from(opt);
    info!(logger, "Applying change"; "command" => ?command);

    let applier = Applier::new(&db, &geocoder, &logger);

    // the new ID goes to stdout on its own so that scripts can capture it
    if let Some(id) = applier.run(command).await? {
        print!("{}", id);
    }

    Ok(())
}
