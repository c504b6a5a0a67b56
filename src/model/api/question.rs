use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rocket::request::FlashMessage;
use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    db::{Choice, Question},
    mongodb::Id,
};

/// A question as listed in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSummary {
    pub id: ApiId,
    pub question_text: String,
    pub pub_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub was_published_recently: bool,
    pub can_vote: bool,
}

impl QuestionSummary {
    /// Describe the question as seen at `now`.
    pub fn new(question: &Question, now: DateTime<Utc>) -> Self {
        Self {
            id: question.id.into(),
            question_text: question.question_text.clone(),
            pub_date: question.pub_date,
            end_date: question.end_date,
            was_published_recently: question.was_published_recently(now),
            can_vote: question.can_vote(now),
        }
    }
}

/// A selectable option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceDescription {
    pub id: ApiId,
    pub choice_text: String,
}

impl From<Choice> for ChoiceDescription {
    fn from(choice: Choice) -> Self {
        Self {
            id: choice.id.into(),
            choice_text: choice.choice.choice_text,
        }
    }
}

/// A one-shot message carried over a redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// `success`, `warning` or `error`.
    pub kind: String,
    pub message: String,
}

impl From<FlashMessage<'_>> for Notice {
    fn from(flash: FlashMessage<'_>) -> Self {
        Self {
            kind: flash.kind().to_string(),
            message: flash.message().to_string(),
        }
    }
}

/// Everything needed to display a question and its ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDetail {
    #[serde(flatten)]
    pub question: QuestionSummary,
    pub choices: Vec<ChoiceDescription>,
    /// The requesting user's current choice, if they are logged in and have voted.
    pub selected_choice: Option<ApiId>,
    pub notice: Option<Notice>,
    /// Inline error for a rejected ballot.
    pub error_message: Option<String>,
}

impl QuestionDetail {
    pub fn new(question: &Question, choices: Vec<Choice>, now: DateTime<Utc>) -> Self {
        Self {
            question: QuestionSummary::new(question, now),
            choices: choices.into_iter().map(Into::into).collect(),
            selected_choice: None,
            notice: None,
            error_message: None,
        }
    }
}

/// The number of votes for one choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceTally {
    pub id: ApiId,
    pub choice_text: String,
    pub votes: u64,
}

/// The current results of a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionResults {
    #[serde(flatten)]
    pub question: QuestionSummary,
    pub choices: Vec<ChoiceTally>,
    pub total_votes: u64,
    pub notice: Option<Notice>,
}

impl QuestionResults {
    /// Combine the choices with their counts. Choices nobody voted for get zero.
    pub fn new(
        question: &Question,
        choices: Vec<Choice>,
        counts: &HashMap<Id, u64>,
        now: DateTime<Utc>,
    ) -> Self {
        let choices = choices
            .into_iter()
            .map(|choice| ChoiceTally {
                id: choice.id.into(),
                votes: counts.get(&choice.id).copied().unwrap_or(0),
                choice_text: choice.choice.choice_text,
            })
            .collect::<Vec<_>>();
        let total_votes = choices.iter().map(|tally| tally.votes).sum();
        Self {
            question: QuestionSummary::new(question, now),
            choices,
            total_votes,
            notice: None,
        }
    }
}
