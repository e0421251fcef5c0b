//! Applies the steps of a reviewed script to the store. This is the
//! logic behind the `dbcli` binary.

use log::{info, Logger};
use serde::de::DeserializeOwned;

use crate::comment::{NewComment, NewRating};
use crate::db::Db;
use crate::errors::BackendError;
use crate::geocoding::Geocoder;
use crate::queue::Table;
use crate::session::{NewSession, SessionFields};
use crate::venue::{NewVenue, VenueFields};

const UPDATABLE_TABLES: &str = "venue, session";

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Insert { table: Table, payload: String },
    Update { table: Table, id: i32, payload: String },
    Delete { table: Table, id: i32 },
}

pub struct Applier<'a> {
    db: &'a (dyn Db + Send + Sync),
    geocoder: &'a (dyn Geocoder + Send + Sync),
    logger: &'a Logger,
}

impl<'a> Applier<'a> {
    pub fn new(
        db: &'a (dyn Db + Send + Sync),
        geocoder: &'a (dyn Geocoder + Send + Sync),
        logger: &'a Logger,
    ) -> Self {
        Self {
            db,
            geocoder,
            logger,
        }
    }

    /// Runs a command, returning the ID of the inserted record if any.
    pub async fn run(&self, command: Command) -> Result<Option<i32>, BackendError> {
        match command {
            Command::Insert { table, payload } => self.insert(table, &payload).await.map(Some),
            Command::Update { table, id, payload } => {
                self.update(table, id, &payload).await.map(|_| None)
            }
            Command::Delete { table, id } => self.delete(table, id).await.map(|_| None),
        }
    }

    async fn insert(&self, table: Table, payload: &str) -> Result<i32, BackendError> {
        info!(self.logger, "Inserting record"; "table" => table.as_str());

        let id = match table {
            Table::Venue => {
                let mut fields: VenueFields = parse(payload)?;
                fields.validate_insert()?;

                if fields.location.is_none() {
                    let address = fields.address()?;
                    info!(self.logger, "Obtaining coordinates from address"; "address" => address.to_string());
                    fields.location = Some(self.geocoder.geocode(&address).await?);
                }

                self.db.insert_venue(NewVenue::from_fields(fields)?).await?
            }
            Table::Session => {
                let fields: SessionFields = parse(payload)?;
                self.db.insert_session(NewSession::from_fields(fields)?).await?
            }
            Table::Comment => self.db.insert_comment(parse::<NewComment>(payload)?).await?,
            Table::Rating => self.db.insert_rating(parse::<NewRating>(payload)?).await?,
        };

        info!(self.logger, "Inserted record"; "table" => table.as_str(), "id" => id);
        Ok(id)
    }

    async fn update(&self, table: Table, id: i32, payload: &str) -> Result<(), BackendError> {
        info!(self.logger, "Updating record"; "table" => table.as_str(), "id" => id);

        match table {
            Table::Venue => {
                let mut fields: VenueFields = parse(payload)?;

                if fields.touches_address() && fields.location.is_none() {
                    let stored = self
                        .db
                        .venue(id)
                        .await?
                        .ok_or(BackendError::NonExistentId(id))?;
                    let address = stored.address.merge(&fields);

                    info!(self.logger, "Obtaining coordinates from address"; "address" => address.to_string());
                    fields.location = Some(self.geocoder.geocode(&address).await?);
                }

                self.db.update_venue(id, fields).await
            }
            Table::Session => {
                let fields: SessionFields = parse(payload)?;
                fields.validate_patch()?;

                self.db.update_session(id, fields).await
            }
            other => Err(not_updatable(other)),
        }
    }

    async fn delete(&self, table: Table, id: i32) -> Result<(), BackendError> {
        info!(self.logger, "Deleting record"; "table" => table.as_str(), "id" => id);

        match table {
            Table::Venue => self.db.delete_venue(id).await,
            Table::Session => self.db.delete_session(id).await,
            other => Err(not_updatable(other)),
        }
    }
}

fn parse<T: DeserializeOwned>(payload: &str) -> Result<T, BackendError> {
    serde_json::from_str(payload).map_err(BackendError::MalformedPayload)
}

fn not_updatable(table: Table) -> BackendError {
    BackendError::InvalidTable {
        table: table.as_str().to_owned(),
        valid: UPDATABLE_TABLES,
    }
}
