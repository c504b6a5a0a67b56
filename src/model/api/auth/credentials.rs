use argon2::Config;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::db::NewUser;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Reasons credentials cannot become a stored user.
#[derive(Debug, Error)]
pub enum InvalidCredentials {
    #[error("Username must not be empty")]
    EmptyUsername,
    #[error("Password must be at least {min} characters", min = MIN_PASSWORD_LENGTH)]
    PasswordTooShort,
    #[error(transparent)]
    Hash(#[from] argon2::Error),
}

/// Raw user credentials, received from a user. These are never stored directly,
/// since the password is in plaintext.
#[derive(Clone, Deserialize, Serialize)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
}

impl TryFrom<UserCredentials> for NewUser {
    type Error = InvalidCredentials;

    /// Convert [`UserCredentials`] to a new user by hashing the password.
    /// This enforces that the username is non-empty, and the password meets minimum length.
    fn try_from(cred: UserCredentials) -> Result<Self, Self::Error> {
        if cred.username.trim().is_empty() {
            return Err(InvalidCredentials::EmptyUsername);
        }
        if cred.password.len() < MIN_PASSWORD_LENGTH {
            return Err(InvalidCredentials::PasswordTooShort);
        }

        // 16 bytes is recommended for password hashing:
        //  https://en.wikipedia.org/wiki/Argon2
        let mut salt = [0_u8; 16];
        rand::thread_rng().fill(&mut salt);
        let password_hash = argon2::hash_encoded(cred.password.as_bytes(), &salt, &Config::default())?;
        Ok(Self {
            username: cred.username,
            password_hash,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_weak_credentials() {
        let short = UserCredentials {
            username: "ron".into(),
            password: "scabbers".chars().take(5).collect(),
        };
        assert!(matches!(
            NewUser::try_from(short),
            Err(InvalidCredentials::PasswordTooShort)
        ));

        let anonymous = UserCredentials {
            username: "  ".into(),
            password: "long enough password".into(),
        };
        assert!(matches!(
            NewUser::try_from(anonymous),
            Err(InvalidCredentials::EmptyUsername)
        ));
    }

    #[test]
    fn never_stores_plaintext() {
        let user = NewUser::try_from(UserCredentials::example()).unwrap();
        assert_eq!(user.username, "harry");
        assert!(!user.password_hash.contains(&UserCredentials::example().password));
        assert!(user.password_hash.starts_with("$argon2"));
    }
}
