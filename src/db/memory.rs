//! An in-process store with the same behaviour as the Postgres one.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::future::{self, BoxFuture, FutureExt};
use time::OffsetDateTime;

use super::Db;
use crate::comment::{Comment, NewComment, NewRating};
use crate::errors::BackendError;
use crate::session::{NewSession, Session, SessionFields, SessionWithVenue};
use crate::venue::{NewVenue, Venue, VenueFields};

#[derive(Default)]
struct State {
    last_id: i32,
    venues: BTreeMap<i32, Venue>,
    sessions: BTreeMap<i32, Session>,
    comments: BTreeMap<i32, Comment>,
    ratings: BTreeMap<i32, NewRating>,
}

impl State {
    fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }

    fn with_ratings(&self, session: &Session) -> Session {
        let ratings = self
            .ratings
            .values()
            .filter(|r| r.session == session.id)
            .map(|r| r.rating.value())
            .collect();

        Session {
            ratings,
            ..session.clone()
        }
    }

    fn joined(&self, predicate: impl Fn(&Session) -> bool) -> Vec<SessionWithVenue> {
        self.sessions
            .values()
            .filter(|s| predicate(s))
            .filter_map(|s| {
                let venue = self.venues.get(&s.venue_id)?.clone();

                Some(SessionWithVenue {
                    session: self.with_ratings(s),
                    venue,
                })
            })
            .collect()
    }

    fn require_session(&self, id: i32) -> Result<(), BackendError> {
        if self.sessions.contains_key(&id) {
            Ok(())
        } else {
            Err(BackendError::NonExistentId(id))
        }
    }

    fn require_venue(&self, id: i32) -> Result<(), BackendError> {
        if self.venues.contains_key(&id) {
            Ok(())
        } else {
            Err(BackendError::NonExistentId(id))
        }
    }

    /// Removes a session along with its comments and ratings.
    fn remove_session(&mut self, id: i32) {
        self.sessions.remove(&id);
        self.comments.retain(|_, c| c.session != id);
        self.ratings.retain(|_, r| r.session != id);
    }
}

#[derive(Default)]
pub struct MemoryDb {
    state: RwLock<State>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn ready<T: Send + 'static>(value: Result<T, BackendError>) -> BoxFuture<'static, Result<T, BackendError>> {
    future::ready(value).boxed()
}

impl Db for MemoryDb {
    fn venues(&self) -> BoxFuture<Result<Vec<Venue>, BackendError>> {
        ready(Ok(self.read().venues.values().cloned().collect()))
    }

    fn venue(&self, id: i32) -> BoxFuture<Result<Option<Venue>, BackendError>> {
        ready(Ok(self.read().venues.get(&id).cloned()))
    }

    fn sessions(&self) -> BoxFuture<Result<Vec<SessionWithVenue>, BackendError>> {
        ready(Ok(self.read().joined(|_| true)))
    }

    fn session(&self, id: i32) -> BoxFuture<Result<Option<SessionWithVenue>, BackendError>> {
        ready(Ok(self.read().joined(|s| s.id == id).into_iter().next()))
    }

    fn sessions_by_venue(
        &self,
        venue_id: i32,
    ) -> BoxFuture<Result<Vec<SessionWithVenue>, BackendError>> {
        ready(Ok(self.read().joined(|s| s.venue_id == venue_id)))
    }

    fn comments(&self, session_id: i32) -> BoxFuture<Result<Vec<Comment>, BackendError>> {
        let state = self.read();

        let comments = state
            .comments
            .values()
            .filter(|c| c.session == session_id)
            .map(|c| Comment {
                rating: state
                    .ratings
                    .values()
                    .find(|r| r.comment == Some(c.id))
                    .map(|r| r.rating.value()),
                ..c.clone()
            })
            .collect();

        ready(Ok(comments))
    }

    fn insert_venue(&self, venue: NewVenue) -> BoxFuture<Result<i32, BackendError>> {
        let mut state = self.write();
        let id = state.next_id();

        state
            .venues
            .insert(id, venue.into_venue(id, OffsetDateTime::now_utc()));

        ready(Ok(id))
    }

    fn update_venue(&self, id: i32, fields: VenueFields) -> BoxFuture<Result<(), BackendError>> {
        let mut state = self.write();

        let result = match state.venues.get_mut(&id) {
            Some(venue) => {
                venue.apply(fields, OffsetDateTime::now_utc());
                Ok(())
            }
            None => Err(BackendError::NonExistentId(id)),
        };

        ready(result)
    }

    fn delete_venue(&self, id: i32) -> BoxFuture<Result<(), BackendError>> {
        let mut state = self.write();

        if state.venues.remove(&id).is_none() {
            return ready(Err(BackendError::NonExistentId(id)));
        }

        let orphaned: Vec<i32> = state
            .sessions
            .values()
            .filter(|s| s.venue_id == id)
            .map(|s| s.id)
            .collect();

        for session_id in orphaned {
            state.remove_session(session_id);
        }

        ready(Ok(()))
    }

    fn insert_session(&self, session: NewSession) -> BoxFuture<Result<i32, BackendError>> {
        let mut state = self.write();

        if let Err(e) = state.require_venue(session.venue_id) {
            return ready(Err(e));
        }

        let id = state.next_id();
        state
            .sessions
            .insert(id, session.into_session(id, OffsetDateTime::now_utc()));

        ready(Ok(id))
    }

    fn update_session(
        &self,
        id: i32,
        fields: SessionFields,
    ) -> BoxFuture<Result<(), BackendError>> {
        let mut state = self.write();

        let result = fields
            .validate_patch()
            .and_then(|_| match fields.venue {
                Some(venue_id) => state.require_venue(venue_id),
                None => Ok(()),
            })
            .and_then(|_| match state.sessions.get_mut(&id) {
                Some(session) => {
                    session.apply(fields, OffsetDateTime::now_utc());
                    Ok(())
                }
                None => Err(BackendError::NonExistentId(id)),
            });

        ready(result)
    }

    fn delete_session(&self, id: i32) -> BoxFuture<Result<(), BackendError>> {
        let mut state = self.write();

        let result = state.require_session(id).map(|_| state.remove_session(id));

        ready(result)
    }

    fn insert_comment(&self, comment: NewComment) -> BoxFuture<Result<i32, BackendError>> {
        let mut state = self.write();

        if let Err(e) = state.require_session(comment.session) {
            return ready(Err(e));
        }

        let id = state.next_id();
        state.comments.insert(
            id,
            Comment {
                id,
                session: comment.session,
                author: comment.author,
                content: comment.content,
                posted_at: OffsetDateTime::now_utc(),
                rating: None,
            },
        );

        ready(Ok(id))
    }

    fn insert_rating(&self, rating: NewRating) -> BoxFuture<Result<i32, BackendError>> {
        let mut state = self.write();

        if let Err(e) = state.require_session(rating.session) {
            return ready(Err(e));
        }

        let id = state.next_id();
        state.ratings.insert(id, rating);

        ready(Ok(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::parse_timestamp;
    use crate::rating::Rating;
    use crate::recurrence::{RecurrenceKind, RecurrenceRule};
    use crate::venue::Address;

    fn new_venue() -> NewVenue {
        NewVenue {
            name: "Ronnie Scott's".to_owned(),
            address: Address {
                first_line: "47 Frith Street".to_owned(),
                second_line: None,
                city: "London".to_owned(),
                postcode: "W1D 4HT".to_owned(),
            },
            location: None,
            website: None,
            backline: vec![],
            comments: vec![],
        }
    }

    fn new_session(venue_id: i32) -> NewSession {
        NewSession {
            name: "Late Late Show".to_owned(),
            venue_id,
            description: String::new(),
            genres: vec![],
            duration_minutes: 120,
            recurrence: RecurrenceRule::new(
                RecurrenceKind::Weekly,
                parse_timestamp("2024-08-18T23:00:00Z").unwrap(),
            ),
            website: None,
        }
    }

    #[tokio::test]
    async fn sessions_are_joined_with_their_venue_and_ratings() {
        let db = MemoryDb::new();
        let venue_id = db.insert_venue(new_venue()).await.unwrap();
        let session_id = db.insert_session(new_session(venue_id)).await.unwrap();

        for &value in &[1, 5] {
            db.insert_rating(NewRating {
                session: session_id,
                rating: Rating::new(value).unwrap(),
                comment: None,
            })
            .await
            .unwrap();
        }

        let session = db.session(session_id).await.unwrap().unwrap();

        assert_eq!(session.venue.id, venue_id);
        assert_eq!(session.session.rating(), Some(3.0));
        assert_eq!(db.sessions_by_venue(venue_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sessions_need_an_existing_venue() {
        let db = MemoryDb::new();

        assert!(matches!(
            db.insert_session(new_session(42)).await,
            Err(BackendError::NonExistentId(42))
        ));
    }

    #[tokio::test]
    async fn comments_carry_their_linked_rating() {
        let db = MemoryDb::new();
        let venue_id = db.insert_venue(new_venue()).await.unwrap();
        let session_id = db.insert_session(new_session(venue_id)).await.unwrap();

        let comment_id = db
            .insert_comment(NewComment {
                session: session_id,
                author: "Ella".to_owned(),
                content: "Superb".to_owned(),
            })
            .await
            .unwrap();
        db.insert_rating(NewRating {
            session: session_id,
            rating: Rating::new(4).unwrap(),
            comment: Some(comment_id),
        })
        .await
        .unwrap();

        let comments = db.comments(session_id).await.unwrap();

        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].rating, Some(4));
    }

    #[tokio::test]
    async fn deleting_a_venue_removes_its_sessions() {
        let db = MemoryDb::new();
        let venue_id = db.insert_venue(new_venue()).await.unwrap();
        let session_id = db.insert_session(new_session(venue_id)).await.unwrap();

        db.delete_venue(venue_id).await.unwrap();

        assert!(db.session(session_id).await.unwrap().is_none());
        assert!(matches!(
            db.delete_venue(venue_id).await,
            Err(BackendError::NonExistentId(_))
        ));
    }

    #[tokio::test]
    async fn partial_recurrence_updates_are_rejected() {
        let db = MemoryDb::new();
        let venue_id = db.insert_venue(new_venue()).await.unwrap();
        let session_id = db.insert_session(new_session(venue_id)).await.unwrap();

        let result = db
            .update_session(
                session_id,
                SessionFields {
                    interval: Some(RecurrenceKind::Daily),
                    ..Default::default()
                },
            )
            .await;

        assert!(matches!(result, Err(BackendError::IncompleteRecurrence)));
    }
}
