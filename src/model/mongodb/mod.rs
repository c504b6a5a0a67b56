mod bson;
mod collection;
mod errors;

pub use bson::Id;
pub use collection::{ensure_indexes_exist, ensure_question_schema, Coll, MongoCollection};
pub use errors::is_duplicate_key_error;
