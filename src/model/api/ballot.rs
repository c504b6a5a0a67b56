use crate::model::mongodb::Id;

/// A submitted ballot form. The choice is kept raw so that a missing and a
/// malformed selection are treated alike.
#[derive(Debug, Default, FromForm)]
pub struct BallotForm {
    pub choice: Option<String>,
}

impl BallotForm {
    /// The selected choice, if one was given and is a well-formed ID.
    pub fn choice_id(&self) -> Option<Id> {
        self.choice.as_deref().and_then(|raw| raw.parse().ok())
    }
}
