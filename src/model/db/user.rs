use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core user data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCore {
    pub username: String,
    pub password_hash: String,
}

impl UserCore {
    /// Check whether the given password is correct.
    /// A malformed stored hash never verifies.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        argon2::verify_encoded(&self.password_hash, password.as_ref()).unwrap_or(false)
    }
}

/// A user without an ID.
pub type NewUser = UserCore;

/// A user from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub user: UserCore,
}

impl Deref for User {
    type Target = UserCore;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl DerefMut for User {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.user
    }
}
