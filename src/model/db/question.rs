use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Duration, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::mongodb::Id;

/// Maximum length of the question text, in characters.
pub const MAX_QUESTION_TEXT_LEN: usize = 200;

/// Reasons a question cannot be stored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidQuestion {
    #[error("Question text is {0} characters long; the maximum is {max}", max = MAX_QUESTION_TEXT_LEN)]
    TextTooLong(usize),
    #[error("Question closes before it is published")]
    EndsBeforePublished,
}

/// Core question data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionCore {
    pub question_text: String,
    /// When the question becomes visible and open for voting.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub pub_date: DateTime<Utc>,
    /// When voting closes. Inclusive.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_date: DateTime<Utc>,
}

impl QuestionCore {
    /// Create a new question, enforcing the text length limit and that the
    /// voting window is not inverted.
    pub fn new(
        question_text: impl Into<String>,
        pub_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<Self, InvalidQuestion> {
        let question_text = question_text.into();
        let length = question_text.chars().count();
        if length > MAX_QUESTION_TEXT_LEN {
            return Err(InvalidQuestion::TextTooLong(length));
        }
        if end_date < pub_date {
            return Err(InvalidQuestion::EndsBeforePublished);
        }
        Ok(Self {
            question_text,
            pub_date,
            end_date,
        })
    }

    /// Is the question visible at `now`?
    pub fn is_published(&self, now: DateTime<Utc>) -> bool {
        self.pub_date <= now
    }

    /// Was the question published within the last day?
    pub fn was_published_recently(&self, now: DateTime<Utc>) -> bool {
        now - Duration::days(1) <= self.pub_date && self.pub_date <= now
    }

    /// Is voting open at `now`? The window is closed at both ends.
    pub fn can_vote(&self, now: DateTime<Utc>) -> bool {
        self.pub_date <= now && now <= self.end_date
    }
}

/// A question without an ID.
pub type NewQuestion = QuestionCore;

/// A question from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub question: QuestionCore,
}

impl Deref for Question {
    type Target = QuestionCore;

    fn deref(&self) -> &Self::Target {
        &self.question
    }
}

impl DerefMut for Question {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.question
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> (DateTime<Utc>, DateTime<Utc>, QuestionCore) {
        let pub_date = Utc::now();
        let end_date = pub_date + Duration::hours(2);
        let question = QuestionCore::new("Open?", pub_date, end_date).unwrap();
        (pub_date, end_date, question)
    }

    #[test]
    fn can_vote_is_closed_interval() {
        let (pub_date, end_date, question) = window();
        assert!(question.can_vote(pub_date));
        assert!(question.can_vote(pub_date + Duration::hours(1)));
        assert!(question.can_vote(end_date));
        assert!(!question.can_vote(pub_date - Duration::milliseconds(1)));
        assert!(!question.can_vote(end_date + Duration::milliseconds(1)));
    }

    #[test]
    fn published_iff_pub_date_not_in_future() {
        let (pub_date, _, question) = window();
        assert!(question.is_published(pub_date));
        assert!(question.is_published(pub_date + Duration::days(30)));
        assert!(!question.is_published(pub_date - Duration::seconds(1)));
    }

    #[test]
    fn recently_published_window() {
        let (pub_date, _, question) = window();
        assert!(question.was_published_recently(pub_date));
        assert!(question.was_published_recently(pub_date + Duration::hours(23)));
        assert!(question.was_published_recently(pub_date + Duration::days(1)));
        assert!(!question.was_published_recently(pub_date + Duration::days(1) + Duration::seconds(1)));
        assert!(!question.was_published_recently(pub_date - Duration::seconds(1)));
    }

    #[test]
    fn rejects_inverted_window() {
        let now = Utc::now();
        assert_eq!(
            QuestionCore::new("Backwards", now, now - Duration::seconds(1)),
            Err(InvalidQuestion::EndsBeforePublished)
        );
        // A zero-length window is allowed.
        assert!(QuestionCore::new("Instant", now, now).is_ok());
    }

    #[test]
    fn text_limit_counts_characters() {
        let now = Utc::now();
        let at_limit = "é".repeat(MAX_QUESTION_TEXT_LEN);
        assert!(QuestionCore::new(at_limit, now, now).is_ok());

        let too_long = "x".repeat(MAX_QUESTION_TEXT_LEN + 1);
        assert_eq!(
            QuestionCore::new(too_long, now, now),
            Err(InvalidQuestion::TextTooLong(MAX_QUESTION_TEXT_LEN + 1))
        );
    }
}
