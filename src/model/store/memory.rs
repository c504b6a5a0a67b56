use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{
    db::{Choice, ChoiceCore, NewQuestion, NewUser, Question, User, Vote, VoteCore, VoteUpsert},
    mongodb::Id,
};

use super::PollStore;

/// An in-process [`PollStore`] for tests. Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore(Arc<Mutex<Tables>>);

#[derive(Default)]
struct Tables {
    questions: Vec<Question>,
    choices: Vec<Choice>,
    votes: Vec<Vote>,
    users: Vec<User>,
}

impl MemoryStore {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.0.lock().unwrap()
    }

    pub fn insert_question(&self, question: NewQuestion) -> Question {
        let question = Question {
            id: Id::new(),
            question,
        };
        self.tables().questions.push(question.clone());
        question
    }

    pub fn insert_choice(&self, question_id: Id, choice_text: &str) -> Choice {
        let choice = Choice {
            id: Id::new(),
            choice: ChoiceCore {
                question_id,
                choice_text: choice_text.to_string(),
            },
        };
        self.tables().choices.push(choice.clone());
        choice
    }

    pub fn insert_user(&self, user: NewUser) -> Id {
        let id = Id::new();
        self.tables().users.push(User { id, user });
        id
    }

    /// A snapshot of every stored vote.
    pub fn votes(&self) -> Vec<Vote> {
        self.tables().votes.clone()
    }
}

#[rocket::async_trait]
impl PollStore for MemoryStore {
    async fn question(&self, id: Id) -> Result<Option<Question>> {
        Ok(self.tables().questions.iter().find(|q| q.id == id).cloned())
    }

    async fn published_questions(&self, now: DateTime<Utc>) -> Result<Vec<Question>> {
        let mut questions = self
            .tables()
            .questions
            .iter()
            .filter(|q| q.is_published(now))
            .cloned()
            .collect::<Vec<_>>();
        questions.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));
        Ok(questions)
    }

    async fn choices(&self, question_id: Id) -> Result<Vec<Choice>> {
        Ok(self
            .tables()
            .choices
            .iter()
            .filter(|c| c.question_id == question_id)
            .cloned()
            .collect())
    }

    async fn choice_of_question(&self, question_id: Id, choice_id: Id) -> Result<Option<Choice>> {
        Ok(self
            .tables()
            .choices
            .iter()
            .find(|c| c.id == choice_id && c.question_id == question_id)
            .cloned())
    }

    async fn vote_of_user(&self, user_id: Id, question_id: Id) -> Result<Option<Vote>> {
        Ok(self
            .tables()
            .votes
            .iter()
            .find(|v| v.user_id == user_id && v.question_id == question_id)
            .cloned())
    }

    async fn upsert_vote(&self, vote: VoteCore) -> Result<VoteUpsert> {
        // The lock is held across the lookup and the write.
        let mut tables = self.tables();
        let existing = tables
            .votes
            .iter()
            .position(|v| v.user_id == vote.user_id && v.question_id == vote.question_id);
        Ok(match existing {
            Some(index) => {
                let existing = &mut tables.votes[index].vote;
                let previous_choice = existing.choice_id;
                existing.choice_id = vote.choice_id;
                VoteUpsert::Updated { previous_choice }
            }
            None => {
                tables.votes.push(Vote { id: Id::new(), vote });
                VoteUpsert::Created
            }
        })
    }

    async fn vote_counts(&self, question_id: Id) -> Result<HashMap<Id, u64>> {
        let mut counts = HashMap::new();
        for vote in self.tables().votes.iter().filter(|v| v.question_id == question_id) {
            *counts.entry(vote.choice_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn user(&self, id: Id) -> Result<Option<User>> {
        Ok(self.tables().users.iter().find(|u| u.id == id).cloned())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .tables()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }
}
