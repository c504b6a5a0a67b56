//! The voting service: decides whether a ballot may be recorded, records it,
//! and audits it. Transport-neutral; handlers translate the outcome.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::audit::{AuditEvent, AuditSink};
use crate::error::Error;
use crate::model::{
    api::origin::ClientOrigin,
    db::{Choice, Question, VoteCore, VoteUpsert},
    mongodb::Id,
    store::PollStore,
};

/// A request to vote, as submitted by an authenticated user.
#[derive(Debug, Clone)]
pub struct BallotRequest {
    pub user_id: Id,
    pub username: String,
    pub origin: ClientOrigin,
    pub question_id: Id,
    /// The selected choice. Absent if nothing was selected or the selection
    /// could not be parsed.
    pub choice_id: Option<Id>,
}

/// A successfully recorded vote.
#[derive(Debug, Clone)]
pub struct VoteReceipt {
    pub question: Question,
    pub choice: Choice,
    pub change: VoteUpsert,
}

/// Reasons a ballot was not recorded. None of these produce an audit record.
#[derive(Debug, Error)]
pub enum VoteError {
    #[error("Question {0} not found")]
    QuestionNotFound(Id),
    #[error("You didn't select a choice.")]
    NoSelection { question: Question },
    #[error("Voting is not open for this poll.")]
    PollClosed { question: Question },
    #[error(transparent)]
    Store(#[from] Error),
}

/// Record the user's vote on a question.
///
/// The question must exist and the choice must belong to it; only then is the
/// voting window checked against `now`. On success the (user, question) vote
/// points at the new choice, creating it if needed, and exactly one
/// [`AuditEvent::VoteCast`] is recorded. Voting for the current choice again
/// still counts as a vote and is audited.
pub async fn cast_vote(
    store: &dyn PollStore,
    audit: &dyn AuditSink,
    ballot: BallotRequest,
    now: DateTime<Utc>,
) -> Result<VoteReceipt, VoteError> {
    let question = store
        .question(ballot.question_id)
        .await?
        .ok_or(VoteError::QuestionNotFound(ballot.question_id))?;

    let choice = match ballot.choice_id {
        Some(choice_id) => store.choice_of_question(question.id, choice_id).await?,
        None => None,
    };
    let Some(choice) = choice else {
        return Err(VoteError::NoSelection { question });
    };

    if !question.can_vote(now) {
        return Err(VoteError::PollClosed { question });
    }

    let change = store
        .upsert_vote(VoteCore {
            user_id: ballot.user_id,
            question_id: question.id,
            choice_id: choice.id,
        })
        .await?;

    audit.record(AuditEvent::VoteCast {
        username: ballot.username,
        question_id: question.id,
        origin: ballot.origin,
    });

    Ok(VoteReceipt {
        question,
        choice,
        change,
    })
}
