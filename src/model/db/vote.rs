use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core vote data. At most one exists per (user, question) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCore {
    /// Foreign Key user ID.
    pub user_id: Id,
    /// Foreign Key question ID.
    pub question_id: Id,
    /// Foreign Key choice ID. The choice always belongs to `question_id`.
    pub choice_id: Id,
}

/// A vote from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub vote: VoteCore,
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.vote
    }
}

/// What an upsert did to the (user, question) vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteUpsert {
    /// No vote existed; one was created.
    Created,
    /// The existing vote was pointed at the new choice, which may be the
    /// same as the previous one.
    Updated { previous_choice: Id },
}
