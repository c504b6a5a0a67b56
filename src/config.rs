use std::sync::Arc;

use chrono::Duration;
use log::{error, info};
use mongodb::{Client as MongoClient, Database};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::{
    mongodb::{ensure_indexes_exist, ensure_question_schema},
    store::{MongoStore, Store},
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    auth_ttl: i64,
    // secrets
    jwt_secret: String,
}

impl Config {
    pub fn new(jwt_secret: impl Into<String>, auth_ttl: Duration) -> Self {
        Self {
            auth_ttl: auth_ttl.num_seconds(),
            jwt_secret: jwt_secret.into(),
        }
    }

    /// Valid lifetime of auth token cookies in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl)
    }

    /// Secret key used to encrypt JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the database fairing and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // non-secrets
    #[serde(default = "default_db_name")]
    db_name: String,
    // secrets
    db_uri: String,
}

fn default_db_name() -> String {
    "polls".to_string()
}

/// A fairing that loads the MongoDB config, connects to the database,
/// performs any setup necessary, and places a [`Store`] over it into managed
/// state.
pub struct DatabaseFairing;

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        let client = match MongoClient::with_uri_str(&config.db_uri).await {
            Ok(client) => client,
            Err(e) => {
                error!("Failed to connect to database: {e}");
                return Err(rocket);
            }
        };
        let db = client.database(&config.db_name);

        // Ensure the schema and required indexes exist.
        if let Err(e) = prepare_database(&db).await {
            error!("Failed to prepare database: {e}");
            return Err(rocket);
        }
        info!("...database connection online!");

        // Manage the state.
        let store = Store::new(Arc::new(MongoStore::new(&db)));
        rocket = rocket.manage(store);
        Ok(rocket)
    }
}

/// Bring a database up to the current schema.
///
/// This operation is idempotent.
pub async fn prepare_database(db: &Database) -> Result<(), mongodb::error::Error> {
    ensure_question_schema(db).await?;
    ensure_indexes_exist(db).await
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Config {
        pub fn example() -> Self {
            Self::new("example jwt secret", Duration::hours(1))
        }
    }
}
