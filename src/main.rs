use std::error::Error;
use std::sync::Arc;

use futures::future::FutureExt;
use log::{info, initialize_logger};
use tokio::sync::mpsc;
use url::Url;
use warp::Filter;

use jamsessions::config::{get_directory, get_variable, get_variable_or};
use jamsessions::db::PgDb;
use jamsessions::environment::{Config, Environment};
use jamsessions::geocoding::{NominatimClient, DEFAULT_BASE_URL, DEFAULT_USER_AGENT};
use jamsessions::queue::DirectoryQueue;
use jamsessions::routes;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    let logger = initialize_logger();

    let main_port: u16 = get_variable("JAMSESSIONS_PORT")
        .parse()
        .expect("parse JAMSESSIONS_PORT as u16");
    let admin_port: u16 = get_variable("JAMSESSIONS_ADMIN_PORT")
        .parse()
        .expect("parse JAMSESSIONS_ADMIN_PORT as u16");

    info!(logger, "Starting..."; "main_port" => main_port, "admin_port" => admin_port);
    let logger = Arc::new(logger);

    info!(logger, "Creating database pool...");
    let connection_string = get_variable("JAMSESSIONS_DB_CONNECTION_STRING");
    let pool = sqlx::Pool::connect(&connection_string)
        .await
        .expect("create database pool from JAMSESSIONS_DB_CONNECTION_STRING");
    let db = Arc::new(PgDb::new(pool));

    let queue = Arc::new(DirectoryQueue::new(
        get_directory("JAMSESSIONS_MIGRATIONS_DIRECTORY"),
        get_directory("JAMSESSIONS_SUGGESTIONS_DIRECTORY"),
        get_variable_or("JAMSESSIONS_DBCLI_COMMAND", "dbcli"),
    ));

    let geocoding_url = Url::parse(&get_variable_or("JAMSESSIONS_GEOCODING_URL", DEFAULT_BASE_URL))
        .expect("parse JAMSESSIONS_GEOCODING_URL as a URL");
    let geocoder = Arc::new(NominatimClient::new(
        geocoding_url,
        &get_variable_or("JAMSESSIONS_GEOCODING_USER_AGENT", DEFAULT_USER_AGENT),
        logger.clone(),
    )?);

    let config = Config::new(
        get_variable_or("JAMSESSIONS_GEOCODE_PROPOSALS", "true")
            .parse()
            .expect("parse JAMSESSIONS_GEOCODE_PROPOSALS as bool"),
    );
    let environment = Environment::new(logger.clone(), db, queue, geocoder, config);

    let (termination_sender, mut termination_receiver) = mpsc::channel::<()>(1);

    let terminate = Arc::new(move || {
        let termination_sender = termination_sender.clone();

        async move {
            // a closed channel means shutdown is already under way
            termination_sender.send(()).await.ok();
        }
        .boxed()
    });

    let should_terminate = async move {
        termination_receiver.recv().await;
    }
    .shared();

    let ctrlc = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let signal = tokio::signal::ctrl_c();

        async move {
            tokio::select! {
                _ = should_terminate => {},
                _ = signal => {
                    terminate().await;
                }
            }
        }
    };

    let main_server = {
        let should_terminate = should_terminate.clone();

        let routes = routes::make_api_routes(environment.clone());

        let (_, main_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], main_port), async {
                should_terminate.await;
            });

        main_server
    };

    let admin_server = {
        let should_terminate = should_terminate.clone();
        let terminate = terminate.clone();

        let routes = routes::admin::make_healthz_route(environment.clone()).or(
            routes::admin::make_termination_route(environment.clone(), terminate),
        );

        let (_, admin_server) =
            warp::serve(routes).bind_with_graceful_shutdown(([0, 0, 0, 0], admin_port), async {
                should_terminate.await;
            });

        admin_server
    };

    tokio::join!(ctrlc, main_server, admin_server);

    info!(logger, "Exiting gracefully...");

    Ok(())
}
