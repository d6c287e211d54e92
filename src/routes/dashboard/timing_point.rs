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
    map::{MapSlot, MapTarget, MapView},
    routes::{
        authflow::Organizer,
        forms::{FieldKind, FieldView, FormSection},
        FormOutcome,
    },
    schemas::TimingPointForm,
    server_error,
    sql_interface::{self, InsertChildError, ModifyError, PointType, Stage, TimingPoint},
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

fn sections(form: &TimingPointForm) -> Vec<FormSection> {
    vec![FormSection::new(
        "Timing point",
        vec![
            FieldView::text("name", "Name", &form.name).required(),
            FieldView::new(
                FieldKind::Textarea,
                "description",
                "Description",
                &form.description,
            ),
            FieldView::select(
                "point_type",
                "Type",
                choices(PointType::ALL),
                &form.point_type,
            ),
            FieldView::new(FieldKind::Number, "order_index", "Order", &form.order_index)
                .step("1")
                .required(),
            FieldView::new(FieldKind::Number, "latitude", "Latitude", &form.latitude)
                .step("any")
                .required(),
            FieldView::new(FieldKind::Number, "longitude", "Longitude", &form.longitude)
                .step("any")
                .required(),
        ],
    )]
}

fn points_of(area: Area, stage_id: i64) -> String {
    area.path(&format!("/stages/{stage_id}/timing-points"))
}

fn missing(area: Area) -> Flash<Redirect> {
    Flash::error(
        area.redirect("/rallies"),
        "This timing point or its stage doesn't exist (anymore).",
    )
}

/// Loads a stage together with its timing points in display order.
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

async fn fetch_point(
    conn: &RallyDbConn,
    area: Area,
    id: i64,
) -> Result<TimingPoint, Flash<Redirect>> {
    conn.run(move |c| sql_interface::get_timing_point(c, id))
        .await
        .map_err(|err| {
            server_error(
                format!("Error while loading timing point {id}: {err}"),
                "an error occured while loading the timing point",
            )
        })?
        .ok_or_else(|| missing(area))
}

fn form_page(
    area: Area,
    config: &Config,
    title: String,
    action: String,
    (stage, timing_points): (&Stage, &[TimingPoint]),
    form: &TimingPointForm,
) -> FormPage {
    let map = MapView::for_stage(
        config.map_access_token.as_deref(),
        Some(stage),
        timing_points,
        vec![MapTarget::new("Position", "latitude", "longitude")],
    );
    FormPage::new(title, action, sections(form), points_of(area, stage.id))
        .with_map(MapSlot::from(map))
}

#[get("/stages/<stage_id>/timing-points")]
pub async fn list(
    organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    config: &State<Config>,
    flash: Option<FlashMessage<'_>>,
    stage_id: i64,
) -> Result<Template, Flash<Redirect>> {
    let (stage, timing_points) = fetch_stage(&conn, area, stage_id).await?;

    let rows = timing_points
        .iter()
        .map(|point| {
            let details = &point.details;
            ListRow {
                cells: vec![
                    details.order_index.to_string(),
                    details.name.clone(),
                    details.point_type.to_string(),
                    format!("{:.6}", details.latitude),
                    format!("{:.6}", details.longitude),
                ],
                links: vec![
                    Link::new(
                        "Edit",
                        area.path(&format!("/timing-points/{}/edit", point.id)),
                    ),
                    Link::new(
                        "Delete",
                        area.path(&format!("/timing-points/{}/delete", point.id)),
                    ),
                ],
            }
        })
        .collect();

    let mut page = ListPage::new(
        format!("Timing points of {}", stage.details.name),
        vec!["#", "Name", "Type", "Latitude", "Longitude"],
        rows,
    );
    page.new_link = Some(Link::new(
        "New timing point",
        area.path(&format!("/stages/{stage_id}/timing-points/new")),
    ));
    page.back = Some(Link::new(
        "Stages",
        area.path(&format!("/rallies/{}/stages", stage.rally_id)),
    ));
    page.empty_message = "This stage has no timing points yet.";
    page.map = Some(MapSlot::from(MapView::for_stage(
        config.map_access_token.as_deref(),
        Some(&stage),
        &timing_points,
        Vec::new(),
    )));
    Ok(page.render(area, flash, &organizer.0))
}

#[get("/stages/<stage_id>/timing-points/new")]
pub async fn new_form(
    organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    config: &State<Config>,
    flash: Option<FlashMessage<'_>>,
    stage_id: i64,
) -> Result<Template, Flash<Redirect>> {
    let (stage, timing_points) = fetch_stage(&conn, area, stage_id).await?;

    // suggest the slot after the last point
    let mut form = TimingPointForm::default();
    if let Some(last) = timing_points.last() {
        form.order_index = (last.details.order_index + 1).to_string();
    }

    Ok(form_page(
        area,
        config,
        format!("New timing point of {}", stage.details.name),
        area.path(&format!("/stages/{stage_id}/timing-points/new")),
        (&stage, &timing_points),
        &form,
    )
    .render(area, &FieldErrors::new(), flash, &organizer.0))
}

#[post("/stages/<stage_id>/timing-points/new", data = "<form>")]
pub async fn create(
    organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    config: &State<Config>,
    stage_id: i64,
    form: Form<TimingPointForm>,
) -> Result<FormOutcome, Flash<Redirect>> {
    let form = form.into_inner();
    let details = match form.validate() {
        Ok(details) => details,
        Err(errors) => {
            let (stage, timing_points) = fetch_stage(&conn, area, stage_id).await?;
            return Ok(FormOutcome::Invalid(
                form_page(
                    area,
                    config,
                    format!("New timing point of {}", stage.details.name),
                    area.path(&format!("/stages/{stage_id}/timing-points/new")),
                    (&stage, &timing_points),
                    &form,
                )
                .render(area, &errors, None, &organizer.0),
            ));
        }
    };

    let name = details.name.clone();
    match conn
        .run(move |c| sql_interface::add_timing_point(c, stage_id, &details))
        .await
    {
        Ok(_) => Ok(FormOutcome::Saved(Flash::success(
            Redirect::to(points_of(area, stage_id)),
            format!("Timing point '{name}' added."),
        ))),
        Err(InsertChildError::UnknownParent) => Err(missing(area)),
        Err(err) => Err(server_error(
            format!("Error while adding timing point '{name}' to stage {stage_id}: {err}"),
            "an error occured while saving the timing point",
        )),
    }
}

#[get("/timing-points/<id>/edit")]
pub async fn edit_form(
    organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    config: &State<Config>,
    flash: Option<FlashMessage<'_>>,
    id: i64,
) -> Result<Template, Flash<Redirect>> {
    let point = fetch_point(&conn, area, id).await?;
    let (stage, timing_points) = fetch_stage(&conn, area, point.stage_id).await?;
    Ok(form_page(
        area,
        config,
        format!("Edit {}", point.details.name),
        area.path(&format!("/timing-points/{id}/edit")),
        (&stage, &timing_points),
        &TimingPointForm::from(&point),
    )
    .render(area, &FieldErrors::new(), flash, &organizer.0))
}

#[post("/timing-points/<id>/edit", data = "<form>")]
pub async fn update(
    organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    config: &State<Config>,
    id: i64,
    form: Form<TimingPointForm>,
) -> Result<FormOutcome, Flash<Redirect>> {
    let point = fetch_point(&conn, area, id).await?;
    let form = form.into_inner();
    let details = match form.validate() {
        Ok(details) => details,
        Err(errors) => {
            let (stage, timing_points) = fetch_stage(&conn, area, point.stage_id).await?;
            return Ok(FormOutcome::Invalid(
                form_page(
                    area,
                    config,
                    format!("Edit {}", point.details.name),
                    area.path(&format!("/timing-points/{id}/edit")),
                    (&stage, &timing_points),
                    &form,
                )
                .render(area, &errors, None, &organizer.0),
            ));
        }
    };

    match conn
        .run(move |c| sql_interface::update_timing_point(c, id, &details))
        .await
    {
        Ok(()) => Ok(FormOutcome::Saved(Flash::success(
            Redirect::to(points_of(area, point.stage_id)),
            "Timing point updated.",
        ))),
        Err(ModifyError::NotFound) => Err(missing(area)),
        Err(err) => Err(server_error(
            format!("Error while updating timing point {id}: {err}"),
            "an error occured while saving the timing point",
        )),
    }
}

#[get("/timing-points/<id>/delete")]
pub async fn delete_form(
    organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    flash: Option<FlashMessage<'_>>,
    id: i64,
) -> Result<Template, Flash<Redirect>> {
    let point = fetch_point(&conn, area, id).await?;
    Ok(FormPage::delete_confirmation(
        &format!("timing point '{}'", point.details.name),
        area.path(&format!("/timing-points/{id}/delete")),
        points_of(area, point.stage_id),
    )
    .render(area, &FieldErrors::new(), flash, &organizer.0))
}

#[post("/timing-points/<id>/delete", data = "<form>")]
pub async fn delete(
    _organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    id: i64,
    form: Form<DeleteConfirmation>,
) -> Flash<Redirect> {
    if !form.confirm {
        return Flash::error(
            area.redirect(&format!("/timing-points/{id}/delete")),
            "Please confirm the deletion.",
        );
    }

    let point = match fetch_point(&conn, area, id).await {
        Ok(point) => point,
        Err(flash) => return flash,
    };
    match conn
        .run(move |c| sql_interface::delete_timing_point(c, id))
        .await
    {
        Ok(()) => Flash::success(
            Redirect::to(points_of(area, point.stage_id)),
            "Timing point deleted.",
        ),
        Err(ModifyError::NotFound) => missing(area),
        Err(err) => server_error(
            format!("Error while deleting timing point {id}: {err}"),
            "an error occured while deleting the timing point",
        ),
    }
}
