use rocket::{
    http::{Cookie, CookieJar, Status},
    request::FlashMessage,
    serde::json::Json,
    Route, State,
};
use serde::{Deserialize, Serialize};

use crate::{
    audit::{Audit, AuditEvent},
    config::Config,
    error::{Error, Result},
    model::{
        api::{
            auth::{AuthToken, UserCredentials, AUTH_TOKEN_COOKIE},
            origin::ClientOrigin,
            question::Notice,
        },
        store::Store,
    },
};

pub fn routes() -> Vec<Route> {
    routes![authenticate, login_prompt, logout]
}

/// What a client needs to show a login form.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginPrompt {
    /// Where to go once logged in.
    pub next: Option<String>,
    pub notice: Option<Notice>,
}

#[post("/auth/login", data = "<credentials>", format = "json")]
pub async fn authenticate(
    cookies: &CookieJar<'_>,
    credentials: Json<UserCredentials>,
    origin: ClientOrigin,
    store: Store,
    audit: Audit,
    config: &State<Config>,
) -> Result<()> {
    let user = store
        .user_by_username(&credentials.username)
        .await?
        .filter(|user| user.verify_password(&credentials.password));

    let Some(user) = user else {
        audit.record(AuditEvent::LoginFailed {
            username: credentials.into_inner().username,
            origin,
        });
        return Err(Error::Status(
            Status::Unauthorized,
            "No user found with the provided username and password combination.".to_string(),
        ));
    };

    let token = AuthToken::new(&user);
    cookies.add(token.into_cookie(config)?);
    audit.record(AuditEvent::LoggedIn {
        username: user.user.username,
        origin,
    });

    Ok(())
}

#[get("/auth/login?<next>")]
pub fn login_prompt(next: Option<String>, flash: Option<FlashMessage<'_>>) -> Json<LoginPrompt> {
    Json(LoginPrompt {
        next,
        notice: flash.map(Notice::from),
    })
}

#[delete("/auth")]
pub fn logout(
    token: Option<AuthToken>,
    origin: ClientOrigin,
    cookies: &CookieJar<'_>,
    audit: Audit,
) -> Status {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
    if let Some(token) = token {
        audit.record(AuditEvent::LoggedOut {
            username: token.username,
            origin,
        });
    }
    Status::Ok
}
