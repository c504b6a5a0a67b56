mod credentials;
mod token;

pub use credentials::{InvalidCredentials, UserCredentials, MIN_PASSWORD_LENGTH};
pub use token::{AuthToken, AUTH_TOKEN_COOKIE};
