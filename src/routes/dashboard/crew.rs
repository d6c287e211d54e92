use rocket::{
    form::Form,
    request::FlashMessage,
    response::{Flash, Redirect},
    Route,
};
use rocket_dyn_templates::{context, Template};
use serde::Serialize;

use super::{crud::choices, Area};
use crate::{
    date_helpers::format_datetime,
    routes::{
        authflow::Organizer,
        forms::{FieldView, SelectOption},
        FlashView,
    },
    server_error,
    sql_interface::{self, Crew, ModifyError, RegistrationStatus},
    RallyDbConn,
};

#[must_use]
pub fn routes() -> Vec<Route> {
    routes![list, change_status]
}

#[derive(Debug, Serialize)]
struct TemplateCrew {
    #[serde(flatten)]
    crew: Crew,
    co_driver_label: String,
    pretty_created_at: String,
    status_options: Vec<SelectOption>,
}

impl From<Crew> for TemplateCrew {
    fn from(crew: Crew) -> Self {
        let co_driver_label = match (&crew.co_driver, &crew.co_driver_name) {
            (Some(profile), _) => format!("{} {}", profile.first_name, profile.last_name),
            (None, Some(name)) => format!("{name} (no account)"),
            (None, None) => String::new(),
        };
        let status_options = FieldView::select(
            "status",
            "Status",
            choices(RegistrationStatus::ALL),
            crew.status.as_str(),
        )
        .options;
        Self {
            co_driver_label,
            pretty_created_at: format_datetime(crew.created_at),
            status_options,
            crew,
        }
    }
}

#[get("/rallies/<rally_id>/crews")]
pub async fn list(
    organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    flash: Option<FlashMessage<'_>>,
    rally_id: i64,
) -> Result<Template, Flash<Redirect>> {
    let (rally, crews) = conn
        .run(move |c| -> rusqlite::Result<_> {
            let Some(rally) = sql_interface::get_rally(c, rally_id)? else {
                return Ok(None);
            };
            Ok(Some((rally, sql_interface::list_crews(c, rally_id)?)))
        })
        .await
        .map_err(|err| {
            server_error(
                format!("Error while listing crews of rally {rally_id}: {err}"),
                "an error occured while loading the crews",
            )
        })?
        .ok_or_else(|| {
            Flash::error(
                area.redirect("/rallies"),
                "This rally doesn't exist (anymore).",
            )
        })?;

    let crews: Vec<TemplateCrew> = crews.into_iter().map(TemplateCrew::from).collect();
    Ok(Template::render(
        "crews",
        context! {
            area,
            flash: FlashView::from_flash(flash),
            session: organizer.0,
            rally,
            crews,
        },
    ))
}

#[derive(Debug, FromForm)]
pub struct StatusForm {
    status: String,
}

#[post("/rallies/<rally_id>/crews/<id>/status", data = "<form>")]
pub async fn change_status(
    _organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    rally_id: i64,
    id: i64,
    form: Form<StatusForm>,
) -> Flash<Redirect> {
    let back = area.redirect(&format!("/rallies/{rally_id}/crews"));
    let Ok(status) = form.status.parse::<RegistrationStatus>() else {
        return Flash::error(back, format!("Unknown status '{}'.", form.status));
    };

    match conn
        .run(move |c| sql_interface::set_registration_status(c, rally_id, id, status))
        .await
    {
        Ok(()) => {
            log::info!("Registration {id} is now {status}");
            Flash::success(back, format!("Registration marked as {status}."))
        }
        Err(ModifyError::NotFound) => {
            Flash::error(back, "This rally has no such registration.")
        }
        Err(err) => server_error(
            format!("Error while setting status of registration {id}: {err}"),
            "an error occured while updating the registration",
        ),
    }
}
