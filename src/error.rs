use jsonwebtoken::errors::Error as JwtError;
use log::{error, warn};
use mongodb::error::Error as DbError;
use rocket::{http::Status, response::Responder, Request};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    /// Construct a `NotFound` error for the described resource.
    pub fn not_found(what: impl AsRef<str>) -> Self {
        Self::Status(Status::NotFound, format!("{} not found", what.as_ref()))
    }

    /// The HTTP status this error maps to.
    pub fn status(&self) -> Status {
        match self {
            Self::Db(_) => Status::InternalServerError,
            Self::Jwt(_) => Status::Unauthorized,
            Self::Status(status, _) => *status,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        match self {
            Self::Status(_, message) => {
                warn!("{status}: {message}");
                (status, message).respond_to(req)
            }
            err => {
                error!("{err}");
                Err(status)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_the_resource() {
        let err = Error::not_found("Question 42");
        assert_eq!(err.status(), Status::NotFound);
        assert_eq!(err.to_string(), "Question 42 not found");
    }

    #[test]
    fn explicit_status_is_preserved() {
        let err = Error::Status(Status::Conflict, "busy".to_string());
        assert_eq!(err.status(), Status::Conflict);
        assert_eq!(err.to_string(), "busy");
    }
}
