use rocket::{
    request::FlashMessage,
    response::{Flash, Redirect},
    Route, State,
};
use rocket_dyn_templates::{context, Template};
use serde::Serialize;

use crate::{
    config::Config,
    date_helpers::{format_date, format_datetime},
    map::{MapSlot, MapView},
    routes::{registration::registration_possible, FlashView},
    server_error,
    session::Session,
    sql_interface::{self, Rally, Stage, TimingPoint},
    RallyDbConn,
};

#[must_use]
pub fn routes() -> Vec<Route> {
    routes![home, rally_detail]
}

#[derive(Debug, Serialize)]
struct TemplateRally {
    #[serde(flatten)]
    rally: Rally,
    pretty_start: String,
    pretty_end: String,
    pretty_deadline: Option<String>,
    locked_reason: Option<String>,
}

impl From<Rally> for TemplateRally {
    fn from(rally: Rally) -> Self {
        let details = &rally.details;
        Self {
            pretty_start: format_date(details.start_date),
            pretty_end: format_date(details.end_date),
            pretty_deadline: details.registration_deadline.map(format_datetime),
            locked_reason: registration_possible(details)
                .err()
                .map(|reason| reason.to_string()),
            rally,
        }
    }
}

#[get("/")]
pub async fn home(
    conn: RallyDbConn,
    session: Option<Session>,
    flash: Option<FlashMessage<'_>>,
) -> Result<Template, Flash<Redirect>> {
    let rallies: Vec<TemplateRally> = conn
        .run(sql_interface::list_rallies)
        .await
        .map_err(|err| {
            server_error(
                format!("Error while listing rallies: {err}"),
                "an error occured while loading the rallies",
            )
        })?
        .into_iter()
        .map(TemplateRally::from)
        .collect();

    let own_registrations = match &session {
        Some(session) => {
            let profile_id = session.profile_id;
            conn.run(move |c| sql_interface::list_own_registrations(c, profile_id))
                .await
                .map_err(|err| {
                    server_error(
                        format!("Error while listing registrations of {profile_id}: {err}"),
                        "an error occured while loading your registrations",
                    )
                })?
        }
        None => Vec::new(),
    };

    Ok(Template::render(
        "index",
        context! {
            flash: FlashView::from_flash(flash),
            session,
            rallies,
            own_registrations,
        },
    ))
}

#[derive(Debug, Serialize)]
struct TemplateStage {
    #[serde(flatten)]
    stage: Stage,
    pretty_start_time: Option<String>,
    timing_points: Vec<TimingPoint>,
    map: MapSlot,
}

#[get("/rally/<id>")]
pub async fn rally_detail(
    conn: RallyDbConn,
    config: &State<Config>,
    session: Option<Session>,
    flash: Option<FlashMessage<'_>>,
    id: i64,
) -> Result<Option<Template>, Flash<Redirect>> {
    let loaded = conn
        .run(move |c| -> rusqlite::Result<_> {
            let Some(rally) = sql_interface::get_rally(c, id)? else {
                return Ok(None);
            };
            let mut stages = Vec::new();
            for stage in sql_interface::list_stages(c, id)? {
                let timing_points = sql_interface::fetch_timing_points(c, stage.id)?;
                stages.push((stage, timing_points));
            }
            Ok(Some((rally, stages)))
        })
        .await
        .map_err(|err| {
            server_error(
                format!("Error while loading rally {id}: {err}"),
                "an error occured while loading the rally",
            )
        })?;
    let Some((rally, stages)) = loaded else {
        return Ok(None);
    };

    let access_token = config.map_access_token.as_deref();
    let stages: Vec<_> = stages
        .into_iter()
        .map(|(stage, timing_points)| TemplateStage {
            pretty_start_time: stage.details.start_time.map(format_datetime),
            map: MapView::for_stage(access_token, Some(&stage), &timing_points, Vec::new()).into(),
            stage,
            timing_points,
        })
        .collect();

    Ok(Some(Template::render(
        "rally",
        context! {
            flash: FlashView::from_flash(flash),
            session,
            rally: TemplateRally::from(rally),
            stages,
        },
    )))
}
