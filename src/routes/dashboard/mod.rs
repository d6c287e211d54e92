//! Management dashboards, mounted at both `/organizer` and `/admin`.
//!
//! The same handlers serve both areas. [`Area`] tells them which one they're in, so links and
//! redirects stay within it.

mod crew;
mod crud;
mod profile;
mod rally;
mod stage;
mod timing_point;

use rocket::{
    http::Status,
    request::{FlashMessage, FromRequest, Outcome, Request},
    response::{Flash, Redirect},
    Route,
};
use rocket_dyn_templates::{context, Template};
use serde::Serialize;

use crate::{
    routes::{authflow::Organizer, FlashView},
    server_error, sql_interface, RallyDbConn,
};

#[must_use]
pub fn routes() -> Vec<Route> {
    crate::flatten_routes([
        rally::routes(),
        stage::routes(),
        timing_point::routes(),
        crew::routes(),
        profile::routes(),
        routes![panel],
    ])
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Area {
    Admin,
    Organizer,
}

impl Area {
    /// Where this area is mounted.
    #[must_use]
    pub fn base(self) -> &'static str {
        match self {
            Area::Admin => "/admin",
            Area::Organizer => "/organizer",
        }
    }

    /// An absolute path within this area.
    #[must_use]
    pub fn path(self, rest: &str) -> String {
        format!("{}{rest}", self.base())
    }

    #[must_use]
    pub fn redirect(self, rest: &str) -> Redirect {
        Redirect::to(self.path(rest))
    }
}

#[async_trait]
impl<'r> FromRequest<'r> for Area {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match req.uri().path().segments().next() {
            Some("admin") => Outcome::Success(Area::Admin),
            Some("organizer") => Outcome::Success(Area::Organizer),
            _ => Outcome::Forward(Status::NotFound),
        }
    }
}

#[get("/")]
pub async fn panel(
    organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    flash: Option<FlashMessage<'_>>,
) -> Result<Template, Flash<Redirect>> {
    let rallies = conn.run(sql_interface::list_rallies).await.map_err(|err| {
        server_error(
            format!("Error while listing rallies: {err}"),
            "an error occured while loading the rallies",
        )
    })?;
    let Organizer(session) = organizer;

    Ok(Template::render(
        "dashboard",
        context! {
            area,
            flash: FlashView::from_flash(flash),
            show_profiles: session.is_admin(),
            session,
            rallies,
        },
    ))
}
