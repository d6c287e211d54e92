use rocket::{
    form::Form,
    request::FlashMessage,
    response::{Flash, Redirect},
    Route, State,
};
use rocket_dyn_templates::Template;

use super::{
    crud::{choices, DeleteConfirmation, FormPage, Link, ListPage, ListRow},
    Area,
};
use crate::{
    config::Config,
    date_helpers::format_datetime,
    map::{MapSlot, MapTarget, MapView},
    routes::{
        authflow::Organizer,
        forms::{FieldKind, FieldView, FormSection},
        FormOutcome,
    },
    schemas::StageForm,
    server_error,
    sql_interface::{self, InsertChildError, ModifyError, Rally, Stage, StageStatus, TimingPoint},
    validation::FieldErrors,
    RallyDbConn,
};

#[must_use]
pub fn routes() -> Vec<Route> {
    routes![
        list,
        new_form,
        create,
        edit_form,
        update,
        delete_form,
        delete
    ]
}

fn sections(form: &StageForm) -> Vec<FormSection> {
    let number = |name: &str, label: &str, value: &str, step: &'static str| {
        FieldView::new(FieldKind::Number, name, label, value).step(step)
    };
    vec![
        FormSection::new(
            "Stage",
            vec![
                FieldView::text("name", "Name", &form.name).required(),
                FieldView::text("location", "Location", &form.location).required(),
                FieldView::new(
                    FieldKind::Textarea,
                    "description",
                    "Description",
                    &form.description,
                ),
                number("distance", "Distance (km)", &form.distance, "any").required(),
                FieldView::new(
                    FieldKind::DateTime,
                    "start_time",
                    "Start time",
                    &form.start_time,
                ),
                FieldView::select(
                    "status",
                    "Status",
                    choices(StageStatus::ALL),
                    &form.status,
                ),
                number("stage_order", "Order", &form.stage_order, "1"),
                number(
                    "max_participants",
                    "Maximum participants",
                    &form.max_participants,
                    "1",
                ),
            ],
        ),
        FormSection::new(
            "Classification",
            vec![
                FieldView::text("difficulty_level", "Difficulty level", &form.difficulty_level),
                FieldView::text("route_type", "Route type", &form.route_type),
            ],
        ),
        FormSection::new(
            "Location on the map",
            vec![
                number("start_latitude", "Start latitude", &form.start_latitude, "any"),
                number("start_longitude", "Start longitude", &form.start_longitude, "any"),
                number("finish_latitude", "Finish latitude", &form.finish_latitude, "any"),
                number("finish_longitude", "Finish longitude", &form.finish_longitude, "any"),
                number("map_zoom", "Zoom level", &form.map_zoom, "any"),
            ],
        ),
    ]
}

fn map_targets() -> Vec<MapTarget> {
    vec![
        MapTarget::new("Start", "start_latitude", "start_longitude"),
        MapTarget::new("Finish", "finish_latitude", "finish_longitude"),
    ]
}

fn stages_of(area: Area, rally_id: i64) -> String {
    area.path(&format!("/rallies/{rally_id}/stages"))
}

fn missing(area: Area) -> Flash<Redirect> {
    Flash::error(
        area.redirect("/rallies"),
        "This stage or its rally doesn't exist (anymore).",
    )
}

async fn fetch_rally(conn: &RallyDbConn, area: Area, id: i64) -> Result<Rally, Flash<Redirect>> {
    conn.run(move |c| sql_interface::get_rally(c, id))
        .await
        .map_err(|err| {
            server_error(
                format!("Error while loading rally {id}: {err}"),
                "an error occured while loading the rally",
            )
        })?
        .ok_or_else(|| missing(area))
}

async fn fetch_stage(
    conn: &RallyDbConn,
    area: Area,
    id: i64,
) -> Result<(Stage, Vec<TimingPoint>), Flash<Redirect>> {
    conn.run(move |c| -> rusqlite::Result<_> {
        let Some(stage) = sql_interface::get_stage(c, id)? else {
            return Ok(None);
        };
        let timing_points = sql_interface::fetch_timing_points(c, id)?;
        Ok(Some((stage, timing_points)))
    })
    .await
    .map_err(|err| {
        server_error(
            format!("Error while loading stage {id}: {err}"),
            "an error occured while loading the stage",
        )
    })?
    .ok_or_else(|| missing(area))
}

#[get("/rallies/<rally_id>/stages")]
pub async fn list(
    organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    flash: Option<FlashMessage<'_>>,
    rally_id: i64,
) -> Result<Template, Flash<Redirect>> {
    let rally = fetch_rally(&conn, area, rally_id).await?;
    let stages = conn
        .run(move |c| sql_interface::list_stages(c, rally_id))
        .await
        .map_err(|err| {
            server_error(
                format!("Error while listing stages of rally {rally_id}: {err}"),
                "an error occured while loading the stages",
            )
        })?;

    let rows = stages
        .into_iter()
        .map(|stage| {
            let details = &stage.details;
            ListRow {
                cells: vec![
                    details
                        .stage_order
                        .map(|order| order.to_string())
                        .unwrap_or_default(),
                    details.name.clone(),
                    details.location.clone(),
                    format!("{:.2} km", details.distance),
                    details.start_time.map(format_datetime).unwrap_or_default(),
                    details.status.to_string(),
                ],
                links: vec![
                    Link::new(
                        "Timing points",
                        area.path(&format!("/stages/{}/timing-points", stage.id)),
                    ),
                    Link::new("Edit", area.path(&format!("/stages/{}/edit", stage.id))),
                    Link::new("Delete", area.path(&format!("/stages/{}/delete", stage.id))),
                ],
            }
        })
        .collect();

    let mut page = ListPage::new(
        format!("Stages of {}", rally.details.name),
        vec!["#", "Name", "Location", "Distance", "Start", "Status"],
        rows,
    );
    page.new_link = Some(Link::new(
        "New stage",
        area.path(&format!("/rallies/{rally_id}/stages/new")),
    ));
    page.back = Some(Link::new("Rallies", area.path("/rallies")));
    page.empty_message = "This rally has no stages yet.";
    Ok(page.render(area, flash, &organizer.0))
}

#[get("/rallies/<rally_id>/stages/new")]
pub async fn new_form(
    organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    config: &State<Config>,
    flash: Option<FlashMessage<'_>>,
    rally_id: i64,
) -> Result<Template, Flash<Redirect>> {
    let rally = fetch_rally(&conn, area, rally_id).await?;
    let map = MapView::for_stage(config.map_access_token.as_deref(), None, &[], map_targets());
    Ok(FormPage::new(
        format!("New stage of {}", rally.details.name),
        area.path(&format!("/rallies/{rally_id}/stages/new")),
        sections(&StageForm::default()),
        stages_of(area, rally_id),
    )
    .with_map(MapSlot::from(map))
    .render(area, &FieldErrors::new(), flash, &organizer.0))
}

#[post("/rallies/<rally_id>/stages/new", data = "<form>")]
pub async fn create(
    organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    config: &State<Config>,
    rally_id: i64,
    form: Form<StageForm>,
) -> Result<FormOutcome, Flash<Redirect>> {
    let form = form.into_inner();
    let details = match form.validate() {
        Ok(details) => details,
        Err(errors) => {
            let map =
                MapView::for_stage(config.map_access_token.as_deref(), None, &[], map_targets());
            return Ok(FormOutcome::Invalid(
                FormPage::new(
                    "New stage".to_string(),
                    area.path(&format!("/rallies/{rally_id}/stages/new")),
                    sections(&form),
                    stages_of(area, rally_id),
                )
                .with_map(MapSlot::from(map))
                .render(area, &errors, None, &organizer.0),
            ));
        }
    };

    let name = details.name.clone();
    match conn
        .run(move |c| sql_interface::insert_new_stage(c, rally_id, &details))
        .await
    {
        Ok(_) => Ok(FormOutcome::Saved(Flash::success(
            Redirect::to(stages_of(area, rally_id)),
            format!("Stage '{name}' created."),
        ))),
        Err(InsertChildError::UnknownParent) => Err(missing(area)),
        Err(err) => Err(server_error(
            format!("Error while inserting stage '{name}' into rally {rally_id}: {err}"),
            "an error occured while saving the stage",
        )),
    }
}

fn edit_page(
    area: Area,
    config: &Config,
    stage: &Stage,
    timing_points: &[TimingPoint],
    form: &StageForm,
) -> FormPage {
    let map = MapView::for_stage(
        config.map_access_token.as_deref(),
        Some(stage),
        timing_points,
        map_targets(),
    );
    FormPage::new(
        format!("Edit {}", stage.details.name),
        area.path(&format!("/stages/{}/edit", stage.id)),
        sections(form),
        stages_of(area, stage.rally_id),
    )
    .with_map(MapSlot::from(map))
}

#[get("/stages/<id>/edit")]
pub async fn edit_form(
    organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    config: &State<Config>,
    flash: Option<FlashMessage<'_>>,
    id: i64,
) -> Result<Template, Flash<Redirect>> {
    let (stage, timing_points) = fetch_stage(&conn, area, id).await?;
    Ok(
        edit_page(area, config, &stage, &timing_points, &StageForm::from(&stage)).render(
            area,
            &FieldErrors::new(),
            flash,
            &organizer.0,
        ),
    )
}

#[post("/stages/<id>/edit", data = "<form>")]
pub async fn update(
    organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    config: &State<Config>,
    id: i64,
    form: Form<StageForm>,
) -> Result<FormOutcome, Flash<Redirect>> {
    let (stage, timing_points) = fetch_stage(&conn, area, id).await?;
    let form = form.into_inner();
    let details = match form.validate() {
        Ok(details) => details,
        Err(errors) => {
            return Ok(FormOutcome::Invalid(
                edit_page(area, config, &stage, &timing_points, &form).render(
                    area,
                    &errors,
                    None,
                    &organizer.0,
                ),
            ))
        }
    };

    match conn
        .run(move |c| sql_interface::update_stage(c, id, &details))
        .await
    {
        Ok(()) => Ok(FormOutcome::Saved(Flash::success(
            Redirect::to(stages_of(area, stage.rally_id)),
            "Stage updated.",
        ))),
        Err(ModifyError::NotFound) => Err(missing(area)),
        Err(err) => Err(server_error(
            format!("Error while updating stage {id}: {err}"),
            "an error occured while saving the stage",
        )),
    }
}

#[get("/stages/<id>/delete")]
pub async fn delete_form(
    organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    flash: Option<FlashMessage<'_>>,
    id: i64,
) -> Result<Template, Flash<Redirect>> {
    let (stage, _) = fetch_stage(&conn, area, id).await?;
    Ok(FormPage::delete_confirmation(
        &format!("stage '{}' with all its timing points", stage.details.name),
        area.path(&format!("/stages/{id}/delete")),
        stages_of(area, stage.rally_id),
    )
    .render(area, &FieldErrors::new(), flash, &organizer.0))
}

#[post("/stages/<id>/delete", data = "<form>")]
pub async fn delete(
    _organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    id: i64,
    form: Form<DeleteConfirmation>,
) -> Flash<Redirect> {
    if !form.confirm {
        return Flash::error(
            area.redirect(&format!("/stages/{id}/delete")),
            "Please confirm the deletion.",
        );
    }

    let (stage, _) = match fetch_stage(&conn, area, id).await {
        Ok(found) => found,
        Err(flash) => return flash,
    };
    match conn
        .run(move |c| sql_interface::delete_stage(c, id))
        .await
    {
        Ok(()) => Flash::success(
            Redirect::to(stages_of(area, stage.rally_id)),
            "Stage deleted.",
        ),
        Err(ModifyError::NotFound) => missing(area),
        Err(err) => server_error(
            format!("Error while deleting stage {id}: {err}"),
            "an error occured while deleting the stage",
        ),
    }
}
