use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::{Cookie, SameSite, Status},
    outcome::{try_outcome, IntoOutcome},
    request::{FromRequest, Outcome},
    time::Duration,
    Request,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::{db::User, mongodb::Id, store::Store};

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// An authentication token representing a specific logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub id: Id,
    #[serde(rename = "usr")]
    pub username: String,
}

impl AuthToken {
    /// Create a new [`AuthToken`] for the given user.
    pub fn new(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
        }
    }

    /// Serialize this token into a cookie.
    pub fn into_cookie(self, config: &Config) -> Result<Cookie<'static>, Error> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?;

        Ok(Cookie::build(AUTH_TOKEN_COOKIE, token)
            .max_age(Duration::seconds(config.auth_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .finish())
    }

    /// Deserialize a token from a cookie.
    pub fn from_cookie(cookie: &Cookie<'_>, config: &Config) -> Result<Self, Error> {
        let token = jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims>| claims.claims.token)?;
        Ok(token)
    }
}

/// Cookie claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    token: AuthToken,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthToken {
    type Error = Error;

    /// Get an [`AuthToken`] from the cookie and check the user still exists.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let (config, store) = match (req.rocket().state::<Config>(), req.rocket().state::<Store>()) {
            (Some(config), Some(store)) => (config, store),
            _ => {
                let err = Error::Status(
                    Status::InternalServerError,
                    "Authentication state is not managed".to_string(),
                );
                return Outcome::Failure((Status::InternalServerError, err));
            }
        };

        // Forward to any routes that do not require an authentication token.
        let cookie = try_outcome!(req.cookies().get(AUTH_TOKEN_COOKIE).or_forward(()));

        // Decode the token.
        let token: Self = try_outcome!(Self::from_cookie(cookie, config).or_forward(()));

        // Check the user actually exists.
        match store.user(token.id).await {
            Ok(Some(_)) => Outcome::Success(token),
            Ok(None) => Outcome::Forward(()),
            Err(e) => Outcome::Failure((Status::InternalServerError, e)),
        }
    }
}
