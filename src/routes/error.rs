use rocket::{
    http::Status,
    request::FlashMessage,
    response::{Flash, Redirect},
    Catcher, Request, Route,
};
use rocket_dyn_templates::{context, Template};

use crate::session::Denial;

#[must_use]
pub fn routes() -> Vec<Route> {
    routes![server_error_panel]
}

#[must_use]
pub fn catchers() -> Vec<Catcher> {
    catchers![
        login_required,
        permission_denied,
        not_found,
        unprocessable,
        internal_error
    ]
}

#[get("/servererror")]
pub fn server_error_panel(flash: Option<FlashMessage<'_>>) -> Template {
    Template::render(
        "server-error",
        context! {
            error: flash.map(|flash| flash.message().to_string()),
        },
    )
}

fn denied(denial: Denial) -> Flash<Redirect> {
    Flash::error(
        Redirect::to(denial.redirect_target()),
        denial.user_message(),
    )
}

#[catch(401)]
fn login_required() -> Flash<Redirect> {
    denied(Denial::LoginRequired)
}

#[catch(403)]
fn permission_denied() -> Flash<Redirect> {
    denied(Denial::PermissionDenied)
}

#[catch(404)]
fn not_found(req: &Request<'_>) -> Template {
    Template::render(
        "not-found",
        context! {
            path: req.uri().path().to_string(),
        },
    )
}

#[catch(422)]
fn unprocessable(status: Status, req: &Request<'_>) -> Template {
    log::warn!("Malformed form submitted to {}: {status}", req.uri());
    Template::render(
        "server-error",
        context! {
            error: "the submitted form was incomplete, please go back and try again",
        },
    )
}

#[catch(500)]
fn internal_error() -> Template {
    Template::render("server-error", context! { error: Option::<String>::None })
}
