#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use std::sync::Arc;

use rocket::{Build, Rocket};

use crate::audit::{Audit, LogAuditSink};
use crate::config::{ConfigFairing, DatabaseFairing};
use crate::logging::LoggerFairing;

pub mod api;
pub mod audit;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod voting;

pub use config::Config;

/// Build the server: configuration, a MongoDB-backed store, and audit records
/// written to the log.
pub fn build() -> Rocket<Build> {
    with_routes(rocket::build())
        .attach(DatabaseFairing)
        .manage(Audit::new(Arc::new(LogAuditSink)))
}

fn with_routes(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/", api::routes())
        .attach(ConfigFairing)
        .attach(LoggerFairing)
}

/// A server over the given in-memory store, auditing into the given trail.
#[cfg(test)]
pub(crate) fn rocket_for_store(
    store: model::store::MemoryStore,
    audit: audit::AuditTrail,
) -> Rocket<Build> {
    let figment = rocket::Config::figment()
        .merge(("jwt_secret", "test jwt secret"))
        .merge(("auth_ttl", 3600));
    with_routes(rocket::custom(figment))
        .manage(model::store::Store::new(Arc::new(store)))
        .manage(Audit::new(Arc::new(audit)))
}
