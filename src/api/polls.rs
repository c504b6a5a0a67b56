use chrono::Utc;
use log::info;
use rocket::{
    form::Form,
    request::FlashMessage,
    response::{Flash, Redirect},
    serde::json::Json,
    Route,
};

use crate::{
    audit::Audit,
    error::{Error, Result},
    model::{
        api::{
            auth::AuthToken,
            ballot::BallotForm,
            origin::ClientOrigin,
            question::{Notice, QuestionDetail, QuestionResults, QuestionSummary},
        },
        db::Question,
        mongodb::Id,
        store::{PollStore, Store},
    },
    voting::{self, BallotRequest, VoteError},
};

pub const VOTE_SUCCESS_MESSAGE: &str = "Vote successful, thank you for voting.";
pub const LOGIN_REQUIRED_MESSAGE: &str = "Please log in to vote.";

pub fn routes() -> Vec<Route> {
    routes![index, detail, results, vote, vote_requires_login]
}

/// Either bounce the browser elsewhere with a notice, or redisplay the ballot.
#[derive(Responder)]
pub enum VoteResponse {
    Redirect(Flash<Redirect>),
    Ballot(Json<QuestionDetail>),
}

#[get("/polls")]
async fn index(store: Store) -> Result<Json<Vec<QuestionSummary>>> {
    let now = Utc::now();
    let questions = store
        .published_questions(now)
        .await?
        .iter()
        .map(|question| QuestionSummary::new(question, now))
        .collect();
    Ok(Json(questions))
}

#[get("/polls/<question_id>")]
async fn detail(
    question_id: Id,
    token: Option<AuthToken>,
    flash: Option<FlashMessage<'_>>,
    store: Store,
) -> Result<Json<QuestionDetail>> {
    let question = find_question(&*store, question_id).await?;
    let mut detail = ballot_for(&*store, &question, token.as_ref()).await?;
    detail.notice = flash.map(Notice::from);
    Ok(Json(detail))
}

#[get("/polls/<question_id>/results")]
async fn results(
    question_id: Id,
    flash: Option<FlashMessage<'_>>,
    store: Store,
) -> Result<Json<QuestionResults>> {
    let question = find_question(&*store, question_id).await?;
    let choices = store.choices(question.id).await?;
    let counts = store.vote_counts(question.id).await?;
    let mut results = QuestionResults::new(&question, choices, &counts, Utc::now());
    results.notice = flash.map(Notice::from);
    Ok(Json(results))
}

#[post("/polls/<question_id>/vote", data = "<ballot>")]
async fn vote(
    question_id: Id,
    ballot: Option<Form<BallotForm>>,
    token: AuthToken,
    origin: ClientOrigin,
    store: Store,
    audit: Audit,
) -> Result<VoteResponse> {
    let request = BallotRequest {
        user_id: token.id,
        username: token.username.clone(),
        origin,
        question_id,
        // A body that is missing or not a form selects nothing.
        choice_id: ballot.and_then(|ballot| ballot.choice_id()),
    };

    match voting::cast_vote(&*store, &*audit, request, Utc::now()).await {
        Ok(receipt) => {
            info!(
                "Recorded vote of user {} on question {} ({:?})",
                token.id, receipt.question.id, receipt.change
            );
            Ok(VoteResponse::Redirect(Flash::success(
                Redirect::to(uri!(results(receipt.question.id))),
                VOTE_SUCCESS_MESSAGE,
            )))
        }
        Err(err @ VoteError::PollClosed { .. }) => {
            let message = err.to_string();
            Ok(VoteResponse::Redirect(Flash::warning(
                Redirect::to(uri!(detail(question_id))),
                message,
            )))
        }
        Err(VoteError::NoSelection { question }) => {
            let mut detail = ballot_for(&*store, &question, Some(&token)).await?;
            detail.error_message = Some(VoteError::NoSelection { question }.to_string());
            Ok(VoteResponse::Ballot(Json(detail)))
        }
        Err(VoteError::QuestionNotFound(_)) => Err(Error::not_found("Question")),
        Err(VoteError::Store(err)) => Err(err),
    }
}

/// Anonymous ballots are sent to log in first, then back here.
#[post("/polls/<question_id>/vote", rank = 2)]
fn vote_requires_login(question_id: Id) -> Flash<Redirect> {
    let next = uri!(vote(question_id)).to_string();
    Flash::error(
        Redirect::to(uri!(super::auth::login_prompt(Some(next)))),
        LOGIN_REQUIRED_MESSAGE,
    )
}

async fn find_question(store: &dyn PollStore, question_id: Id) -> Result<Question> {
    store
        .question(question_id)
        .await?
        .ok_or_else(|| Error::not_found("Question"))
}

/// The question with its choices, and the voter's current selection if known.
async fn ballot_for(
    store: &dyn PollStore,
    question: &Question,
    voter: Option<&AuthToken>,
) -> Result<QuestionDetail> {
    let choices = store.choices(question.id).await?;
    let mut detail = QuestionDetail::new(question, choices, Utc::now());
    if let Some(voter) = voter {
        detail.selected_choice = store
            .vote_of_user(voter.id, question.id)
            .await?
            .map(|vote| vote.choice_id.into());
    }
    Ok(detail)
}
