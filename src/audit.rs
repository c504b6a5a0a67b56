//! The audit port: security-relevant events, recorded with who did what and
//! from where.

use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::sync::Arc;

use log::Level;
use rocket::{
    http::Status,
    request::{self, FromRequest, Request},
};

use crate::model::{api::origin::ClientOrigin, mongodb::Id};

/// Log target that audit records are written to.
pub const AUDIT_TARGET: &str = "polls_backend::audit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    LoggedIn {
        username: String,
        origin: ClientOrigin,
    },
    LoginFailed {
        username: String,
        origin: ClientOrigin,
    },
    LoggedOut {
        username: String,
        origin: ClientOrigin,
    },
    VoteCast {
        username: String,
        question_id: Id,
        origin: ClientOrigin,
    },
}

impl AuditEvent {
    /// Failed logins are warnings; everything else is informational.
    pub fn level(&self) -> Level {
        match self {
            Self::LoginFailed { .. } => Level::Warn,
            _ => Level::Info,
        }
    }
}

impl Display for AuditEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoggedIn { username, origin } => {
                write!(f, "User {username} logged in from {origin}")
            }
            Self::LoginFailed { username, origin } => {
                write!(f, "User {username} login failed from {origin}")
            }
            Self::LoggedOut { username, origin } => {
                write!(f, "User {username} logged out from {origin}")
            }
            Self::VoteCast {
                username,
                question_id,
                origin,
            } => write!(
                f,
                "User {username} voted for question id number {question_id} from {origin}"
            ),
        }
    }
}

/// Somewhere audit records can be sent.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// The production sink: every event becomes a log record on [`AUDIT_TARGET`],
/// which `log4rs.yaml` routes to its own appender.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record(&self, event: AuditEvent) {
        log::log!(target: AUDIT_TARGET, event.level(), "{event}");
    }
}

/// A shared handle on the configured [`AuditSink`], kept in managed state.
#[derive(Clone)]
pub struct Audit(Arc<dyn AuditSink>);

impl Audit {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self(sink)
    }
}

impl Deref for Audit {
    type Target = dyn AuditSink;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Audit {
    type Error = ();

    /// Get the audit sink from the managed state.
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match req.rocket().state::<Audit>() {
            Some(audit) => request::Outcome::Success(audit.clone()),
            None => request::Outcome::Failure((Status::InternalServerError, ())),
        }
    }
}

/// A sink that remembers everything, for tests.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct AuditTrail(Arc<std::sync::Mutex<Vec<AuditEvent>>>);

#[cfg(test)]
impl AuditTrail {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.0.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl AuditSink for AuditTrail {
    fn record(&self, event: AuditEvent) {
        self.0.lock().unwrap().push(event);
    }
}
