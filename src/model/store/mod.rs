//! The persistence port.
//!
//! Everything the handlers and the voting service need from storage goes
//! through [`PollStore`], so the business logic never touches a driver directly.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rocket::{
    http::Status,
    request::{self, FromRequest, Request},
};

use crate::error::Result;
use crate::model::{
    db::{Choice, Question, User, Vote, VoteCore, VoteUpsert},
    mongodb::Id,
};

#[cfg(test)]
mod memory;
mod mongo;

#[cfg(test)]
pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Storage of questions, choices, votes and users.
#[rocket::async_trait]
pub trait PollStore: Send + Sync {
    /// Look up a question by ID.
    async fn question(&self, id: Id) -> Result<Option<Question>>;

    /// All questions published at or before `now`, newest first.
    async fn published_questions(&self, now: DateTime<Utc>) -> Result<Vec<Question>>;

    /// The choices of a question, in creation order.
    async fn choices(&self, question_id: Id) -> Result<Vec<Choice>>;

    /// Look up a choice, but only if it belongs to the given question.
    async fn choice_of_question(&self, question_id: Id, choice_id: Id) -> Result<Option<Choice>>;

    /// The user's current vote on a question, if any.
    async fn vote_of_user(&self, user_id: Id, question_id: Id) -> Result<Option<Vote>>;

    /// Atomically create the (user, question) vote or repoint the existing
    /// one at `vote.choice_id`. Never produces a second vote for the pair.
    async fn upsert_vote(&self, vote: VoteCore) -> Result<VoteUpsert>;

    /// Number of votes per choice of a question. Choices without votes are absent.
    async fn vote_counts(&self, question_id: Id) -> Result<HashMap<Id, u64>>;

    /// Look up a user by ID.
    async fn user(&self, id: Id) -> Result<Option<User>>;

    /// Look up a user by username.
    async fn user_by_username(&self, username: &str) -> Result<Option<User>>;
}

/// A shared handle on the configured [`PollStore`], kept in managed state.
#[derive(Clone)]
pub struct Store(Arc<dyn PollStore>);

impl Store {
    pub fn new(store: Arc<dyn PollStore>) -> Self {
        Self(store)
    }
}

impl Deref for Store {
    type Target = dyn PollStore;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Store {
    type Error = ();

    /// Get the store from the managed state.
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match req.rocket().state::<Store>() {
            Some(store) => request::Outcome::Success(store.clone()),
            None => request::Outcome::Failure((Status::InternalServerError, ())),
        }
    }
}
