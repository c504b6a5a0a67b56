//! A small CLI tool for provisioning the users who may log in and vote.

use clap::{Arg, ArgAction, ArgMatches, Command};
use mongodb::Client as MongoClient;

use polls_backend::{
    config::prepare_database,
    error::Error as BackendError,
    model::{
        api::auth::{InvalidCredentials, UserCredentials},
        db::NewUser,
        mongodb::is_duplicate_key_error,
        store::MongoStore,
    },
};

const PROGRAM_NAME: &str = "polls-users";

const ABOUT_TEXT: &str = "Create a user account for the polls server.

EXIT CODES:
     0: User created.
     1: Invalid credentials, or the username is taken.
 Other: Error.";

const DB_URI: &str = "DB_URI";
const DB_NAME: &str = "DB_NAME";
const USERNAME: &str = "USERNAME";
const PASSWORD: &str = "PASSWORD";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .arg(
            Arg::new(DB_URI)
                .long("db-uri")
                .help("MongoDB connection string, e.g. mongodb://localhost:27017")
                .action(ArgAction::Set)
                .required(true),
        )
        .arg(
            Arg::new(DB_NAME)
                .long("db-name")
                .help("Database the server uses")
                .action(ArgAction::Set)
                .default_value("polls"),
        )
        .arg(
            Arg::new(USERNAME)
                .help("Username of the new account")
                .action(ArgAction::Set)
                .required(true),
        )
        .arg(
            Arg::new(PASSWORD)
                .help("Password of the new account")
                .action(ArgAction::Set)
                .required(true),
        )
}

/// Errors that this program may produce.
#[derive(Debug)]
enum Error {
    /// The credentials cannot be used.
    Credentials(InvalidCredentials),
    /// A user with this name already exists.
    Taken(String),
    /// Talking to the database failed.
    Db(String),
}

impl Error {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Credentials(_) | Self::Taken(_) => 1,
            Self::Db(_) => 2,
        }
    }
}

impl From<mongodb::error::Error> for Error {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Db(err.to_string())
    }
}

async fn create_user(args: &ArgMatches) -> Result<(), Error> {
    let get = |id: &str| args.get_one::<String>(id).cloned().unwrap_or_default();

    let credentials = UserCredentials {
        username: get(USERNAME),
        password: get(PASSWORD),
    };
    let user = NewUser::try_from(credentials).map_err(Error::Credentials)?;

    let client = MongoClient::with_uri_str(get(DB_URI)).await?;
    let db = client.database(&get(DB_NAME));
    prepare_database(&db).await?;

    match MongoStore::new(&db).insert_user(&user).await {
        Ok(id) => {
            println!("Created user {} with ID {id}", user.username);
            Ok(())
        }
        Err(BackendError::Db(err)) if is_duplicate_key_error(&err) => {
            Err(Error::Taken(user.username))
        }
        Err(err) => Err(Error::Db(err.to_string())),
    }
}

fn run(args: &ArgMatches) -> u8 {
    let runtime = match rocket::tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Failed to start async runtime: {err}");
            return 3;
        }
    };
    match runtime.block_on(create_user(args)) {
        Ok(()) => 0,
        Err(err) => {
            match &err {
                Error::Credentials(reason) => eprintln!("Invalid credentials: {reason}"),
                Error::Taken(username) => eprintln!("Username {username} is already taken"),
                Error::Db(reason) => eprintln!("Database error: {reason}"),
            }
            err.exit_code()
        }
    }
}

fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args);
    std::process::exit(exit_code.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_db_uri_and_credentials() {
        assert!(cli().try_get_matches_from([PROGRAM_NAME, "harry"]).is_err());

        let args = cli()
            .try_get_matches_from([
                PROGRAM_NAME,
                "--db-uri",
                "mongodb://localhost:27017",
                "harry",
                "correct horse battery staple",
            ])
            .unwrap();
        assert_eq!(args.get_one::<String>(DB_NAME).map(String::as_str), Some("polls"));
        assert_eq!(args.get_one::<String>(USERNAME).map(String::as_str), Some("harry"));
    }

    #[test]
    fn short_password_is_rejected_before_connecting() {
        let args = cli()
            .try_get_matches_from([
                PROGRAM_NAME,
                "--db-uri",
                "mongodb://unreachable.invalid:27017",
                "harry",
                "short",
            ])
            .unwrap();
        assert_eq!(run(&args), 1);
    }
}
