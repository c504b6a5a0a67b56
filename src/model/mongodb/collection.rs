use std::ops::Deref;

use log::debug;
use mongodb::{
    bson::{doc, Document},
    error::Error as DbError,
    options::{CreateCollectionOptions, IndexOptions},
    Collection, Database, IndexModel,
};

use crate::model::db::{
    Choice, NewChoice, NewQuestion, NewUser, Question, User, Vote,
    MAX_QUESTION_TEXT_LEN,
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Question collections
const QUESTIONS: &str = "questions";
impl MongoCollection for Question {
    const NAME: &'static str = QUESTIONS;
}
impl MongoCollection for NewQuestion {
    const NAME: &'static str = QUESTIONS;
}

// Choice collections
const CHOICES: &str = "choices";
impl MongoCollection for Choice {
    const NAME: &'static str = CHOICES;
}
impl MongoCollection for NewChoice {
    const NAME: &'static str = CHOICES;
}

// Vote collections
const VOTES: &str = "votes";
impl MongoCollection for Vote {
    const NAME: &'static str = VOTES;
}

// User collections
const USERS: &str = "users";
impl MongoCollection for User {
    const NAME: &'static str = USERS;
}
impl MongoCollection for NewUser {
    const NAME: &'static str = USERS;
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Vote collection: one vote per user per question.
    let vote_index = IndexModel::builder()
        .keys(doc! {"user_id": 1, "question_id": 1})
        .options(unique.clone())
        .build();
    Coll::<Vote>::from_db(db)
        .create_index(vote_index, None)
        .await?;

    // Choice collection.
    let choice_index = IndexModel::builder()
        .keys(doc! {"question_id": 1})
        .build();
    Coll::<Choice>::from_db(db)
        .create_index(choice_index, None)
        .await?;

    // User collection.
    let user_index = IndexModel::builder()
        .keys(doc! {"username": 1})
        .options(unique)
        .build();
    Coll::<User>::from_db(db)
        .create_index(user_index, None)
        .await?;

    Ok(())
}

/// The validator enforced on every question document, whoever writes it.
fn question_validator() -> Document {
    doc! {
        "$jsonSchema": {
            "bsonType": "object",
            "required": ["question_text", "pub_date", "end_date"],
            "properties": {
                "question_text": {
                    "bsonType": "string",
                    "maxLength": (MAX_QUESTION_TEXT_LEN as i64),
                },
                "pub_date": { "bsonType": "date" },
                "end_date": { "bsonType": "date" },
            },
        },
        "$expr": { "$gte": ["$end_date", "$pub_date"] },
    }
}

/// Ensure the question collection exists and carries the current validator.
///
/// This operation is idempotent.
pub async fn ensure_question_schema(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring question schema is up to date");

    let existing = db
        .list_collection_names(doc! { "name": QUESTIONS })
        .await?;
    if existing.is_empty() {
        let options = CreateCollectionOptions::builder()
            .validator(question_validator())
            .build();
        db.create_collection(QUESTIONS, options).await?;
    } else {
        let command = doc! {
            "collMod": QUESTIONS,
            "validator": question_validator(),
        };
        db.run_command(command, None).await?;
    }

    Ok(())
}
