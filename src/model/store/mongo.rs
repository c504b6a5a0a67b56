use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::debug;
use mongodb::{
    bson::{doc, Bson, DateTime as BsonDateTime, Document},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument},
    Database,
};
use rocket::{futures::TryStreamExt, http::Status};

use crate::error::{Error, Result};
use crate::model::{
    db::{Choice, NewUser, Question, User, Vote, VoteCore, VoteUpsert},
    mongodb::{is_duplicate_key_error, Coll, Id},
};

use super::PollStore;

/// A [`PollStore`] backed by MongoDB collections.
pub struct MongoStore {
    questions: Coll<Question>,
    choices: Coll<Choice>,
    votes: Coll<Vote>,
    users: Coll<User>,
    new_users: Coll<NewUser>,
}

impl MongoStore {
    pub fn new(db: &Database) -> Self {
        Self {
            questions: Coll::from_db(db),
            choices: Coll::from_db(db),
            votes: Coll::from_db(db),
            users: Coll::from_db(db),
            new_users: Coll::from_db(db),
        }
    }

    /// Insert a new user, returning its ID. Fails if the username is taken.
    pub async fn insert_user(&self, user: &NewUser) -> Result<Id> {
        let result = self.new_users.insert_one(user, None).await?;
        result
            .inserted_id
            .as_object_id()
            .map(Id::from)
            .ok_or_else(|| {
                Error::Status(
                    Status::InternalServerError,
                    "Inserted user has a non-ObjectId key".to_string(),
                )
            })
    }

    /// Point the existing (user, question) vote at a new choice, returning the
    /// vote as it was before.
    async fn update_vote(&self, vote: &VoteCore, upsert: bool) -> Result<Option<Vote>> {
        let filter = doc! {
            "user_id": vote.user_id,
            "question_id": vote.question_id,
        };
        let update = doc! {
            "$set": { "choice_id": vote.choice_id },
        };
        let options = FindOneAndUpdateOptions::builder()
            .upsert(upsert)
            .return_document(ReturnDocument::Before)
            .build();
        let previous = self
            .votes
            .find_one_and_update(filter, update, options)
            .await?;
        Ok(previous)
    }
}

/// Read one `{ _id: choice_id, count }` group of the tally pipeline.
fn tally_entry(group: &Document) -> Result<(Id, u64)> {
    let malformed = |what: String| {
        Error::Status(
            Status::InternalServerError,
            format!("Malformed vote tally: {what}"),
        )
    };
    let choice_id = group
        .get_object_id("_id")
        .map_err(|e| malformed(e.to_string()))?;
    let count = match group.get("count") {
        Some(Bson::Int32(n)) => u64::try_from(*n).ok(),
        Some(Bson::Int64(n)) => u64::try_from(*n).ok(),
        _ => None,
    }
    .ok_or_else(|| malformed(format!("bad count in {group}")))?;
    Ok((Id::from(choice_id), count))
}

#[rocket::async_trait]
impl PollStore for MongoStore {
    async fn question(&self, id: Id) -> Result<Option<Question>> {
        Ok(self.questions.find_one(id.as_doc(), None).await?)
    }

    async fn published_questions(&self, now: DateTime<Utc>) -> Result<Vec<Question>> {
        let filter = doc! {
            "pub_date": { "$lte": BsonDateTime::from_chrono(now) },
        };
        let options = FindOptions::builder()
            .sort(doc! { "pub_date": -1 })
            .build();
        let questions = self
            .questions
            .find(filter, options)
            .await?
            .try_collect()
            .await?;
        Ok(questions)
    }

    async fn choices(&self, question_id: Id) -> Result<Vec<Choice>> {
        let filter = doc! {
            "question_id": question_id,
        };
        let options = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let choices = self
            .choices
            .find(filter, options)
            .await?
            .try_collect()
            .await?;
        Ok(choices)
    }

    async fn choice_of_question(&self, question_id: Id, choice_id: Id) -> Result<Option<Choice>> {
        let filter = doc! {
            "_id": choice_id,
            "question_id": question_id,
        };
        Ok(self.choices.find_one(filter, None).await?)
    }

    async fn vote_of_user(&self, user_id: Id, question_id: Id) -> Result<Option<Vote>> {
        let filter = doc! {
            "user_id": user_id,
            "question_id": question_id,
        };
        Ok(self.votes.find_one(filter, None).await?)
    }

    async fn upsert_vote(&self, vote: VoteCore) -> Result<VoteUpsert> {
        let previous = match self.update_vote(&vote, true).await {
            Ok(previous) => previous,
            Err(Error::Db(e)) if is_duplicate_key_error(&e) => {
                // A concurrent request inserted the vote between our match and
                // our insert; the unique index stopped a duplicate, so the row
                // now exists and a plain update applies.
                debug!(
                    "Lost vote insert race for user {} on question {}",
                    vote.user_id, vote.question_id
                );
                self.update_vote(&vote, false).await?
            }
            Err(e) => return Err(e),
        };
        Ok(match previous {
            Some(previous) => VoteUpsert::Updated {
                previous_choice: previous.choice_id,
            },
            None => VoteUpsert::Created,
        })
    }

    async fn vote_counts(&self, question_id: Id) -> Result<HashMap<Id, u64>> {
        let pipeline = [
            doc! { "$match": { "question_id": question_id } },
            doc! { "$group": { "_id": "$choice_id", "count": { "$sum": 1 } } },
        ];
        let groups = self
            .votes
            .aggregate(pipeline, None)
            .await?
            .try_collect::<Vec<_>>()
            .await?;
        groups.iter().map(tally_entry).collect()
    }

    async fn user(&self, id: Id) -> Result<Option<User>> {
        Ok(self.users.find_one(id.as_doc(), None).await?)
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        let filter = doc! {
            "username": username,
        };
        Ok(self.users.find_one(filter, None).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use mongodb::bson::oid::ObjectId;

    use super::*;
    use crate::model::{
        api::auth::UserCredentials,
        db::{NewChoice, NewQuestion, QuestionCore},
    };

    async fn insert_question(questions: &Coll<NewQuestion>, question: QuestionCore) -> Id {
        let result = questions.insert_one(question, None).await.unwrap();
        Id::from(result.inserted_id.as_object_id().unwrap())
    }

    async fn insert_choice(choices: &Coll<NewChoice>, question_id: Id, choice_text: &str) -> Id {
        let choice = NewChoice {
            question_id,
            choice_text: choice_text.to_string(),
        };
        let result = choices.insert_one(choice, None).await.unwrap();
        Id::from(result.inserted_id.as_object_id().unwrap())
    }

    fn vote(user_id: Id, question_id: Id, choice_id: Id) -> VoteCore {
        VoteCore {
            user_id,
            question_id,
            choice_id,
        }
    }

    #[test]
    fn tally_entry_reads_int32_and_int64_counts() {
        let choice_id = ObjectId::new();
        let small = doc! { "_id": choice_id, "count": 3_i32 };
        let large = doc! { "_id": choice_id, "count": 5_i64 };

        assert_eq!(tally_entry(&small).unwrap(), (Id::from(choice_id), 3));
        assert_eq!(tally_entry(&large).unwrap(), (Id::from(choice_id), 5));
    }

    #[test]
    fn malformed_tally_is_an_internal_error() {
        let malformed = [
            doc! { "_id": ObjectId::new(), "count": -1_i32 },
            doc! { "_id": ObjectId::new(), "count": "7" },
            doc! { "_id": ObjectId::new() },
            doc! { "count": 1_i32 },
        ];
        for group in &malformed {
            match tally_entry(group) {
                Err(Error::Status(status, _)) => assert_eq!(status, Status::InternalServerError),
                other => panic!("expected an internal error for {group}, got {other:?}"),
            }
        }
    }

    #[backend_test(mongo)]
    async fn upsert_updates_the_single_vote(
        store: MongoStore,
        questions: Coll<NewQuestion>,
        choices: Coll<NewChoice>,
        votes: Coll<Vote>,
    ) {
        let question_id = insert_question(&questions, QuestionCore::open_example()).await;
        let first = insert_choice(&choices, question_id, "Rust").await;
        let second = insert_choice(&choices, question_id, "Go").await;
        let user_id = Id::new();

        let created = store.upsert_vote(vote(user_id, question_id, first)).await.unwrap();
        assert_eq!(created, VoteUpsert::Created);

        let updated = store.upsert_vote(vote(user_id, question_id, second)).await.unwrap();
        assert_eq!(
            updated,
            VoteUpsert::Updated {
                previous_choice: first
            }
        );

        assert_eq!(votes.count_documents(None, None).await.unwrap(), 1);
        let stored = store.vote_of_user(user_id, question_id).await.unwrap().unwrap();
        assert_eq!(stored.choice_id, second);
    }

    #[backend_test(mongo)]
    async fn concurrent_upserts_keep_one_vote(
        store: MongoStore,
        questions: Coll<NewQuestion>,
        choices: Coll<NewChoice>,
        votes: Coll<Vote>,
    ) {
        let question_id = insert_question(&questions, QuestionCore::open_example()).await;
        let first = insert_choice(&choices, question_id, "Rust").await;
        let second = insert_choice(&choices, question_id, "Go").await;
        let user_id = Id::new();

        let (a, b) = rocket::tokio::join!(
            store.upsert_vote(vote(user_id, question_id, first)),
            store.upsert_vote(vote(user_id, question_id, second)),
        );
        let mut outcomes = [a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|outcome| matches!(outcome, VoteUpsert::Updated { .. }));
        assert_eq!(outcomes[0], VoteUpsert::Created);
        assert!(matches!(outcomes[1], VoteUpsert::Updated { .. }));

        assert_eq!(votes.count_documents(None, None).await.unwrap(), 1);
    }

    #[backend_test(mongo)]
    async fn vote_counts_group_by_choice(
        store: MongoStore,
        questions: Coll<NewQuestion>,
        choices: Coll<NewChoice>,
    ) {
        let question_id = insert_question(&questions, QuestionCore::open_example()).await;
        let other_question = insert_question(&questions, QuestionCore::open_example()).await;
        let first = insert_choice(&choices, question_id, "Rust").await;
        let second = insert_choice(&choices, question_id, "Go").await;
        let elsewhere = insert_choice(&choices, other_question, "Zig").await;

        for choice_id in [first, first, second] {
            store.upsert_vote(vote(Id::new(), question_id, choice_id)).await.unwrap();
        }
        store.upsert_vote(vote(Id::new(), other_question, elsewhere)).await.unwrap();

        let counts = store.vote_counts(question_id).await.unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts.get(&first), Some(&2));
        assert_eq!(counts.get(&second), Some(&1));
    }

    #[backend_test(mongo)]
    async fn published_questions_are_newest_first(
        store: MongoStore,
        questions: Coll<NewQuestion>,
    ) {
        let now = Utc::now();
        let older = QuestionCore::new("Older?", now - Duration::days(2), now + Duration::days(1)).unwrap();
        let newer = QuestionCore::new("Newer?", now - Duration::hours(1), now + Duration::days(1)).unwrap();

        let older_id = insert_question(&questions, older).await;
        let newer_id = insert_question(&questions, newer).await;
        insert_question(&questions, QuestionCore::future_example()).await;

        let published = store.published_questions(now).await.unwrap();
        let ids: Vec<Id> = published.iter().map(|question| question.id).collect();
        assert_eq!(ids, vec![newer_id, older_id]);
    }

    #[backend_test(mongo)]
    async fn choices_are_scoped_to_their_question(
        store: MongoStore,
        questions: Coll<NewQuestion>,
        choices: Coll<NewChoice>,
    ) {
        let question_id = insert_question(&questions, QuestionCore::open_example()).await;
        let other_question = insert_question(&questions, QuestionCore::open_example()).await;
        let first = insert_choice(&choices, question_id, "Rust").await;
        let second = insert_choice(&choices, question_id, "Go").await;
        let foreign = insert_choice(&choices, other_question, "Zig").await;

        let listed: Vec<Id> = store
            .choices(question_id)
            .await
            .unwrap()
            .iter()
            .map(|choice| choice.id)
            .collect();
        assert_eq!(listed, vec![first, second]);

        assert!(store.choice_of_question(question_id, first).await.unwrap().is_some());
        assert!(store.choice_of_question(question_id, foreign).await.unwrap().is_none());
    }

    #[backend_test(mongo)]
    async fn usernames_are_unique(store: MongoStore) {
        let user = NewUser::try_from(UserCredentials::example()).unwrap();

        let id = store.insert_user(&user).await.unwrap();
        let found = store.user_by_username(&user.username).await.unwrap().unwrap();
        assert_eq!(found.id, id);

        match store.insert_user(&user).await {
            Err(Error::Db(err)) => assert!(is_duplicate_key_error(&err)),
            other => panic!("expected a duplicate key error, got {other:?}"),
        }
    }

    #[backend_test(mongo)]
    async fn inverted_window_is_rejected_by_the_database(db: Database) {
        let now = Utc::now();
        let inverted = doc! {
            "question_text": "Backwards?",
            "pub_date": BsonDateTime::from_chrono(now),
            "end_date": BsonDateTime::from_chrono(now - Duration::hours(1)),
        };

        let result = db
            .collection::<Document>("questions")
            .insert_one(inverted, None)
            .await;
        assert!(result.is_err());
    }
}
