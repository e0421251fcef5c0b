use futures::future::BoxFuture;

use crate::comment::{Comment, NewComment, NewRating};
use crate::errors::BackendError;
use crate::session::{NewSession, SessionFields, SessionWithVenue};
use crate::venue::{NewVenue, Venue, VenueFields};

pub mod memory;

/// Access to venues, sessions and their comments. Sessions are always
/// returned joined with their venue and in ascending ID order.
pub trait Db {
    fn venues(&self) -> BoxFuture<Result<Vec<Venue>, BackendError>>;

    fn venue(&self, id: i32) -> BoxFuture<Result<Option<Venue>, BackendError>>;

    fn sessions(&self) -> BoxFuture<Result<Vec<SessionWithVenue>, BackendError>>;

    fn session(&self, id: i32) -> BoxFuture<Result<Option<SessionWithVenue>, BackendError>>;

    fn sessions_by_venue(
        &self,
        venue_id: i32,
    ) -> BoxFuture<Result<Vec<SessionWithVenue>, BackendError>>;

    fn comments(&self, session_id: i32) -> BoxFuture<Result<Vec<Comment>, BackendError>>;

    fn insert_venue(&self, venue: NewVenue) -> BoxFuture<Result<i32, BackendError>>;

    fn update_venue(&self, id: i32, fields: VenueFields) -> BoxFuture<Result<(), BackendError>>;

    fn delete_venue(&self, id: i32) -> BoxFuture<Result<(), BackendError>>;

    fn insert_session(&self, session: NewSession) -> BoxFuture<Result<i32, BackendError>>;

    fn update_session(
        &self,
        id: i32,
        fields: SessionFields,
    ) -> BoxFuture<Result<(), BackendError>>;

    fn delete_session(&self, id: i32) -> BoxFuture<Result<(), BackendError>>;

    fn insert_comment(&self, comment: NewComment) -> BoxFuture<Result<i32, BackendError>>;

    fn insert_rating(&self, rating: NewRating) -> BoxFuture<Result<i32, BackendError>>;
}

pub use self::postgres::*;

mod postgres {
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use sqlx::{
        self,
        postgres::{PgPool, PgRow},
    };
    use time::OffsetDateTime;

    use crate::comment::{Comment, NewComment, NewRating};
    use crate::errors::BackendError;
    use crate::recurrence::RecurrenceRule;
    use crate::session::{NewSession, Session, SessionFields, SessionWithVenue};
    use crate::tags::{self, Backline, Genre};
    use crate::venue::{Address, NewVenue, Point, Venue, VenueFields};

    const SESSION_VENUE_CONSTRAINT: &str = "jamsessions_venue_fkey";
    const RATING_SESSION_CONSTRAINT: &str = "session_ratings_session_fkey";
    const COMMENT_SESSION_CONSTRAINT: &str = "session_comments_session_fkey";

    pub struct PgDb {
        pool: PgPool,
    }

    impl PgDb {
        pub fn new(pool: PgPool) -> Self {
            PgDb { pool }
        }

        async fn fetch_sessions(
            &self,
            sql: &'static str,
            id: Option<i32>,
        ) -> Result<Vec<SessionWithVenue>, BackendError> {
            let mut query = sqlx::query(sql);

            if let Some(id) = id {
                query = query.bind(id);
            }

            query
                .try_map(|row: PgRow| session_from_row(&row))
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx_error)
        }
    }

    // these can be simplified once async functions in traits are stabilized
    impl super::Db for PgDb {
        fn venues(&self) -> BoxFuture<Result<Vec<Venue>, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/retrieve_venues.sql"));

                let venues = query
                    .try_map(|row: PgRow| venue_from_row(&row))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(venues)
            }
            .boxed()
        }

        fn venue(&self, id: i32) -> BoxFuture<Result<Option<Venue>, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/retrieve_venue.sql"));

                let venue = query
                    .bind(id)
                    .try_map(|row: PgRow| venue_from_row(&row))
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(venue)
            }
            .boxed()
        }

        fn sessions(&self) -> BoxFuture<Result<Vec<SessionWithVenue>, BackendError>> {
            self.fetch_sessions(include_str!("queries/retrieve_sessions.sql"), None)
                .boxed()
        }

        fn session(&self, id: i32) -> BoxFuture<Result<Option<SessionWithVenue>, BackendError>> {
            async move {
                let sessions = self
                    .fetch_sessions(include_str!("queries/retrieve_session.sql"), Some(id))
                    .await?;

                Ok(sessions.into_iter().next())
            }
            .boxed()
        }

        fn sessions_by_venue(
            &self,
            venue_id: i32,
        ) -> BoxFuture<Result<Vec<SessionWithVenue>, BackendError>> {
            self.fetch_sessions(
                include_str!("queries/retrieve_sessions_by_venue.sql"),
                Some(venue_id),
            )
            .boxed()
        }

        fn comments(&self, session_id: i32) -> BoxFuture<Result<Vec<Comment>, BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/retrieve_comments.sql"));

                let comments = query
                    .bind(session_id)
                    .try_map(|row: PgRow| {
                        Ok(Comment {
                            id: try_get(&row, "comment_id")?,
                            session: try_get(&row, "session")?,
                            author: try_get(&row, "author")?,
                            content: try_get(&row, "content")?,
                            posted_at: try_get(&row, "dt_posted")?,
                            rating: try_get(&row, "rating")?,
                        })
                    })
                    .fetch_all(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(comments)
            }
            .boxed()
        }

        fn insert_venue(&self, venue: NewVenue) -> BoxFuture<Result<i32, BackendError>> {
            async move {
                let query = sqlx::query_as(include_str!("queries/insert_venue.sql"));

                let (id,): (i32,) = query
                    .bind(&venue.name)
                    .bind(&venue.address.first_line)
                    .bind(&venue.address.second_line)
                    .bind(&venue.address.city)
                    .bind(&venue.address.postcode)
                    .bind(venue.location.map(|p| p.longitude))
                    .bind(venue.location.map(|p| p.latitude))
                    .bind(&venue.website)
                    .bind(labels(&venue.backline, Backline::as_str))
                    .bind(&venue.comments)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;

                Ok(id)
            }
            .boxed()
        }

        fn update_venue(&self, id: i32, fields: VenueFields) -> BoxFuture<Result<(), BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/update_venue.sql"));

                let count = query
                    .bind(id)
                    .bind(&fields.name)
                    .bind(&fields.address_first_line)
                    .bind(&fields.address_second_line)
                    .bind(&fields.city)
                    .bind(&fields.postcode)
                    .bind(fields.location.map(|p| p.longitude))
                    .bind(fields.location.map(|p| p.latitude))
                    .bind(&fields.website)
                    .bind(fields.backline.as_ref().map(|b| labels(b, Backline::as_str)))
                    .bind(&fields.comments)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                expect_one(count, id)
            }
            .boxed()
        }

        fn delete_venue(&self, id: i32) -> BoxFuture<Result<(), BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/delete_venue.sql"));

                let count = query
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                expect_one(count, id)
            }
            .boxed()
        }

        fn insert_session(&self, session: NewSession) -> BoxFuture<Result<i32, BackendError>> {
            async move {
                let query = sqlx::query_as(include_str!("queries/insert_session.sql"));
                let venue_id = session.venue_id;

                let (id,): (i32,) = query
                    .bind(&session.name)
                    .bind(session.venue_id)
                    .bind(&session.description)
                    .bind(labels(&session.genres, Genre::as_str))
                    .bind(session.recurrence.anchor())
                    .bind(session.recurrence.kind().as_str())
                    .bind(session.duration_minutes)
                    .bind(&session.website)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| map_reference_error(e, SESSION_VENUE_CONSTRAINT, venue_id))?;

                Ok(id)
            }
            .boxed()
        }

        fn update_session(
            &self,
            id: i32,
            fields: SessionFields,
        ) -> BoxFuture<Result<(), BackendError>> {
            async move {
                fields.validate_patch()?;

                let query = sqlx::query(include_str!("queries/update_session.sql"));
                let venue_id = fields.venue.unwrap_or_default();

                let count = query
                    .bind(id)
                    .bind(&fields.name)
                    .bind(fields.venue)
                    .bind(&fields.description)
                    .bind(fields.genres.as_ref().map(|g| labels(g, Genre::as_str)))
                    .bind(fields.start_time_utc)
                    .bind(fields.interval.map(|kind| kind.as_str()))
                    .bind(fields.duration_minutes)
                    .bind(&fields.website)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| map_reference_error(e, SESSION_VENUE_CONSTRAINT, venue_id))?
                    .rows_affected();

                expect_one(count, id)
            }
            .boxed()
        }

        fn delete_session(&self, id: i32) -> BoxFuture<Result<(), BackendError>> {
            async move {
                let query = sqlx::query(include_str!("queries/delete_session.sql"));

                let count = query
                    .bind(id)
                    .execute(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?
                    .rows_affected();

                expect_one(count, id)
            }
            .boxed()
        }

        fn insert_comment(&self, comment: NewComment) -> BoxFuture<Result<i32, BackendError>> {
            async move {
                let query = sqlx::query_as(include_str!("queries/insert_comment.sql"));

                let (id,): (i32,) = query
                    .bind(comment.session)
                    .bind(&comment.author)
                    .bind(&comment.content)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| map_reference_error(e, COMMENT_SESSION_CONSTRAINT, comment.session))?;

                Ok(id)
            }
            .boxed()
        }

        fn insert_rating(&self, rating: NewRating) -> BoxFuture<Result<i32, BackendError>> {
            async move {
                let query = sqlx::query_as(include_str!("queries/insert_rating.sql"));

                let (id,): (i32,) = query
                    .bind(rating.session)
                    .bind(rating.rating.value())
                    .bind(rating.comment)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| map_reference_error(e, RATING_SESSION_CONSTRAINT, rating.session))?;

                Ok(id)
            }
            .boxed()
        }
    }

    fn venue_from_row(row: &PgRow) -> Result<Venue, sqlx::Error> {
        let longitude: Option<f64> = try_get(row, "longitude")?;
        let latitude: Option<f64> = try_get(row, "latitude")?;
        let backline: Vec<String> = try_get(row, "backline")?;

        Ok(Venue {
            id: try_get(row, "venue_id")?,
            name: try_get(row, "venue_name")?,
            address: Address {
                first_line: try_get(row, "address_first_line")?,
                second_line: try_get(row, "address_second_line")?,
                city: try_get(row, "city")?,
                postcode: try_get(row, "postcode")?,
            },
            location: longitude
                .zip(latitude)
                .map(|(longitude, latitude)| Point::new(longitude, latitude)),
            website: try_get(row, "venue_website")?,
            backline: tags::parse_all(backline).map_err(decode_error)?,
            comments: try_get(row, "venue_comments")?,
            updated_at: try_get(row, "venue_dt_updated_utc")?,
        })
    }

    fn session_from_row(row: &PgRow) -> Result<SessionWithVenue, sqlx::Error> {
        let genres: Vec<String> = try_get(row, "genres")?;
        let interval: String = try_get(row, "interval")?;
        let anchor: OffsetDateTime = try_get(row, "start_time_utc")?;

        let session = Session {
            id: try_get(row, "session_id")?,
            name: try_get(row, "session_name")?,
            venue_id: try_get(row, "venue")?,
            description: try_get(row, "description")?,
            genres: tags::parse_all(genres).map_err(decode_error)?,
            duration_minutes: try_get(row, "duration_minutes")?,
            recurrence: RecurrenceRule::parse(&interval, anchor).map_err(decode_error)?,
            website: try_get(row, "session_website")?,
            updated_at: try_get(row, "dt_updated_utc")?,
            ratings: try_get(row, "ratings")?,
        };

        Ok(SessionWithVenue {
            session,
            venue: venue_from_row(row)?,
        })
    }

    fn labels<T>(values: &[T], label: impl Fn(&T) -> &'static str) -> Vec<String> {
        values.iter().map(|v| label(v).to_owned()).collect()
    }

    fn expect_one(count: u64, id: i32) -> Result<(), BackendError> {
        if count == 0 {
            Err(BackendError::NonExistentId(id))
        } else {
            Ok(())
        }
    }

    // the schema constrains these columns, so this only fires if the
    // constraints and the closed sets drift apart
    fn decode_error(error: BackendError) -> sqlx::Error {
        sqlx::Error::Decode(Box::new(error))
    }

    fn try_get<'a, T: sqlx::Type<sqlx::Postgres> + sqlx::decode::Decode<'a, sqlx::Postgres>>(
        row: &'a PgRow,
        column: &str,
    ) -> Result<T, sqlx::Error> {
        use sqlx::prelude::*;

        row.try_get(column)
    }

    fn map_reference_error(error: sqlx::Error, constraint: &str, id: i32) -> BackendError {
        match error {
            sqlx::Error::Database(ref e) if e.constraint() == Some(constraint) => {
                BackendError::NonExistentId(id)
            }
            _ => map_sqlx_error(error),
        }
    }

    fn map_sqlx_error(error: sqlx::Error) -> BackendError {
        BackendError::Sqlx { source: error }
    }
}
