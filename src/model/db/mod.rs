//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs and datetimes are serialised in MongoDB's own format.

mod choice;
pub use choice::{Choice, ChoiceCore, NewChoice};

mod question;
pub use question::{InvalidQuestion, NewQuestion, Question, QuestionCore, MAX_QUESTION_TEXT_LEN};

mod user;
pub use user::{NewUser, User, UserCore};

mod vote;
pub use vote::{Vote, VoteCore, VoteUpsert};
