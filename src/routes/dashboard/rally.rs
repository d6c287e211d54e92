use rocket::{
    form::Form,
    request::FlashMessage,
    response::{Flash, Redirect},
    Route,
};
use rocket_dyn_templates::Template;

use super::{
    crud::{choices, DeleteConfirmation, FormPage, Link, ListPage, ListRow},
    Area,
};
use crate::{
    date_helpers::{format_date, format_datetime},
    routes::{
        authflow::Organizer,
        forms::{FieldKind, FieldView, FormSection},
        FormOutcome,
    },
    schemas::RallyForm,
    server_error,
    sql_interface::{self, ModifyError, Rally, RallyStatus},
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

fn sections(form: &RallyForm) -> Vec<FormSection> {
    vec![
        FormSection::new(
            "Rally",
            vec![
                FieldView::text("name", "Name", &form.name).required(),
                FieldView::text("location", "Location", &form.location).required(),
                FieldView::new(
                    FieldKind::Textarea,
                    "description",
                    "Description",
                    &form.description,
                ),
                FieldView::new(FieldKind::Date, "start_date", "Start date", &form.start_date)
                    .required(),
                FieldView::new(FieldKind::Date, "end_date", "End date", &form.end_date)
                    .required(),
                FieldView::select(
                    "status",
                    "Status",
                    choices(RallyStatus::ALL),
                    &form.status,
                ),
            ],
        ),
        FormSection::new(
            "Registration",
            vec![
                FieldView::checkbox(
                    "registration_open",
                    "Registration open",
                    form.registration_open,
                ),
                FieldView::new(
                    FieldKind::DateTime,
                    "registration_deadline",
                    "Registration deadline",
                    &form.registration_deadline,
                ),
            ],
        ),
    ]
}

fn form_page(area: Area, title: String, action: String, form: &RallyForm) -> FormPage {
    FormPage::new(title, action, sections(form), area.path("/rallies"))
}

fn missing_rally(area: Area) -> Flash<Redirect> {
    Flash::error(
        area.redirect("/rallies"),
        "This rally doesn't exist (anymore).",
    )
}

async fn fetch(conn: &RallyDbConn, area: Area, id: i64) -> Result<Rally, Flash<Redirect>> {
    conn.run(move |c| sql_interface::get_rally(c, id))
        .await
        .map_err(|err| {
            server_error(
                format!("Error while loading rally {id}: {err}"),
                "an error occured while loading the rally",
            )
        })?
        .ok_or_else(|| missing_rally(area))
}

#[get("/rallies")]
pub async fn list(
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

    let rows = rallies
        .into_iter()
        .map(|rally| {
            let details = &rally.details;
            let registration = match (details.registration_open, details.registration_deadline) {
                (false, _) => "closed".to_string(),
                (true, Some(deadline)) => format!("open until {}", format_datetime(deadline)),
                (true, None) => "open".to_string(),
            };
            ListRow {
                cells: vec![
                    details.name.clone(),
                    details.location.clone(),
                    format!(
                        "{} – {}",
                        format_date(details.start_date),
                        format_date(details.end_date)
                    ),
                    registration,
                    details.status.to_string(),
                ],
                links: vec![
                    Link::new("Stages", area.path(&format!("/rallies/{}/stages", rally.id))),
                    Link::new("Crews", area.path(&format!("/rallies/{}/crews", rally.id))),
                    Link::new("Edit", area.path(&format!("/rallies/{}/edit", rally.id))),
                    Link::new("Delete", area.path(&format!("/rallies/{}/delete", rally.id))),
                ],
            }
        })
        .collect();

    let mut page = ListPage::new(
        "Rallies".to_string(),
        vec!["Name", "Location", "Dates", "Registration", "Status"],
        rows,
    );
    page.new_link = Some(Link::new("New rally", area.path("/rallies/new")));
    page.back = Some(Link::new("Dashboard", area.path("/")));
    page.empty_message = "No rallies yet.";
    Ok(page.render(area, flash, &organizer.0))
}

#[get("/rallies/new")]
pub fn new_form(organizer: Organizer, area: Area, flash: Option<FlashMessage<'_>>) -> Template {
    form_page(
        area,
        "New rally".to_string(),
        area.path("/rallies/new"),
        &RallyForm::default(),
    )
    .render(area, &FieldErrors::new(), flash, &organizer.0)
}

#[post("/rallies/new", data = "<form>")]
pub async fn create(
    organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    form: Form<RallyForm>,
) -> Result<FormOutcome, Flash<Redirect>> {
    let form = form.into_inner();
    let details = match form.validate() {
        Ok(details) => details,
        Err(errors) => {
            return Ok(FormOutcome::Invalid(
                form_page(area, "New rally".to_string(), area.path("/rallies/new"), &form)
                    .render(area, &errors, None, &organizer.0),
            ))
        }
    };

    let name = details.name.clone();
    conn.run(move |c| sql_interface::insert_new_rally(c, &details))
        .await
        .map_err(|err| {
            server_error(
                format!("Error while inserting rally '{name}': {err}"),
                "an error occured while saving the rally",
            )
        })?;
    Ok(FormOutcome::Saved(Flash::success(
        area.redirect("/rallies"),
        format!("Rally '{name}' created."),
    )))
}

#[get("/rallies/<id>/edit")]
pub async fn edit_form(
    organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    flash: Option<FlashMessage<'_>>,
    id: i64,
) -> Result<Template, Flash<Redirect>> {
    let rally = fetch(&conn, area, id).await?;
    Ok(form_page(
        area,
        format!("Edit {}", rally.details.name),
        area.path(&format!("/rallies/{id}/edit")),
        &RallyForm::from(&rally),
    )
    .render(area, &FieldErrors::new(), flash, &organizer.0))
}

#[post("/rallies/<id>/edit", data = "<form>")]
pub async fn update(
    organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    id: i64,
    form: Form<RallyForm>,
) -> Result<FormOutcome, Flash<Redirect>> {
    let form = form.into_inner();
    let details = match form.validate() {
        Ok(details) => details,
        Err(errors) => {
            return Ok(FormOutcome::Invalid(
                form_page(
                    area,
                    "Edit rally".to_string(),
                    area.path(&format!("/rallies/{id}/edit")),
                    &form,
                )
                .render(area, &errors, None, &organizer.0),
            ))
        }
    };

    match conn
        .run(move |c| sql_interface::update_rally(c, id, &details))
        .await
    {
        Ok(()) => Ok(FormOutcome::Saved(Flash::success(
            area.redirect("/rallies"),
            "Rally updated.",
        ))),
        Err(ModifyError::NotFound) => Err(missing_rally(area)),
        Err(err) => Err(server_error(
            format!("Error while updating rally {id}: {err}"),
            "an error occured while saving the rally",
        )),
    }
}

#[get("/rallies/<id>/delete")]
pub async fn delete_form(
    organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    flash: Option<FlashMessage<'_>>,
    id: i64,
) -> Result<Template, Flash<Redirect>> {
    let rally = fetch(&conn, area, id).await?;
    Ok(FormPage::delete_confirmation(
        &format!(
            "rally '{}' with all its stages, timing points and registrations",
            rally.details.name
        ),
        area.path(&format!("/rallies/{id}/delete")),
        area.path("/rallies"),
    )
    .render(area, &FieldErrors::new(), flash, &organizer.0))
}

#[post("/rallies/<id>/delete", data = "<form>")]
pub async fn delete(
    _organizer: Organizer,
    area: Area,
    conn: RallyDbConn,
    id: i64,
    form: Form<DeleteConfirmation>,
) -> Flash<Redirect> {
    if !form.confirm {
        return Flash::error(
            area.redirect(&format!("/rallies/{id}/delete")),
            "Please confirm the deletion.",
        );
    }

    match conn
        .run(move |c| sql_interface::delete_rally(c, id))
        .await
    {
        Ok(()) => Flash::success(area.redirect("/rallies"), "Rally deleted."),
        Err(ModifyError::NotFound) => missing_rally(area),
        Err(err) => server_error(
            format!("Error while deleting rally {id}: {err}"),
            "an error occured while deleting the rally",
        ),
    }
}
