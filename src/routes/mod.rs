use rocket::{
    request::FlashMessage,
    response::{Flash, Redirect},
    Route,
};
use rocket_dyn_templates::Template;
use serde::Serialize;

pub mod authflow;
pub mod dashboard;
pub mod error;
pub mod forms;
pub mod home;
pub mod registration;

#[must_use]
pub fn routes() -> Vec<Route> {
    crate::flatten_routes([
        authflow::routes(),
        home::routes(),
        registration::routes(),
        error::routes(),
    ])
}

/// What submitting a form leads to.
#[derive(Responder)]
pub enum FormOutcome {
    /// Stored (or failed on the server side), continue elsewhere.
    Saved(Flash<Redirect>),
    /// Shown again with the offending fields marked.
    #[response(status = 422)]
    Invalid(Template),
}

/// A flash message as handed to templates.
#[derive(Debug, Serialize)]
pub struct FlashView {
    pub kind: String,
    pub message: String,
}

impl FlashView {
    pub fn from_flash(flash: Option<FlashMessage<'_>>) -> Option<Self> {
        flash.map(|flash| Self {
            kind: flash.kind().to_string(),
            message: flash.message().to_string(),
        })
    }
}
