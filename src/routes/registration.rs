//! The registration wizard pages.
//!
//! The draft lives in the database between requests. Every handler loads it, lets
//! [`RegistrationDraft`] decide about the transition, stores it again and redirects back to
//! `/registration`, which always shows the current step.

use std::fmt;

use chrono::{NaiveDateTime, Utc};
use rocket::{
    form::Form,
    request::FlashMessage,
    response::{Flash, Redirect},
    Route,
};
use rocket_dyn_templates::{context, Template};
use serde::Serialize;

use crate::{
    routes::{
        forms::{attach_errors, FieldKind, FieldView, FormSection, SummarySection},
        FlashView, FormOutcome,
    },
    server_error,
    session::Session,
    sql_interface::{self, ApplyRegistrationError, Rally, RallyDetails, RallyStatus},
    validation::FieldErrors,
    wizard::{
        CompleteRegistration, CrewMember, EquipmentInfo, Homologated, PersonalInfo,
        RegistrationDraft, Step, StepForm, StepRejected, VehicleInfo, WizardError,
    },
    RallyDbConn,
};

#[must_use]
pub fn routes() -> Vec<Route> {
    routes![
        wizard,
        submit_personal,
        submit_vehicle,
        submit_equipment,
        previous_step,
        jump_to_step,
        submit_registration,
        restart,
        done
    ]
}

/// Why registering for a rally is not possible (anymore).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImpossibleReason {
    RegistrationClosed,
    DeadlineExpired,
    RallyCompleted,
    RallyCancelled,
}

impl fmt::Display for ImpossibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegistrationClosed => write!(f, "Registration is closed"),
            Self::DeadlineExpired => write!(f, "The registration deadline has passed"),
            Self::RallyCompleted => write!(f, "The rally is already over"),
            Self::RallyCancelled => write!(f, "The rally was cancelled"),
        }
    }
}

fn possible_to_register_at(
    rally: &RallyDetails,
    now: NaiveDateTime,
) -> Result<(), ImpossibleReason> {
    match rally.status {
        RallyStatus::Cancelled => return Err(ImpossibleReason::RallyCancelled),
        RallyStatus::Completed => return Err(ImpossibleReason::RallyCompleted),
        RallyStatus::Upcoming | RallyStatus::Active => (),
    }
    if !rally.registration_open {
        Err(ImpossibleReason::RegistrationClosed)
    } else if rally
        .registration_deadline
        .map_or(false, |deadline| deadline < now)
    {
        Err(ImpossibleReason::DeadlineExpired)
    } else {
        Ok(())
    }
}

/// Whether crews may currently register for the rally.
pub fn registration_possible(rally: &RallyDetails) -> Result<(), ImpossibleReason> {
    possible_to_register_at(rally, Utc::now().naive_utc())
}

async fn load_draft(
    conn: &RallyDbConn,
    session: &Session,
) -> Result<RegistrationDraft, Flash<Redirect>> {
    let profile_id = session.profile_id;
    let stored = conn
        .run(move |c| sql_interface::load_draft(c, profile_id))
        .await
        .map_err(|err| {
            server_error(
                format!("Error while loading the draft of {profile_id}: {err}"),
                "an error occured while loading your registration",
            )
        })?;
    Ok(stored.unwrap_or_else(|| RegistrationDraft::new(None)))
}

async fn save_draft(
    conn: &RallyDbConn,
    session: &Session,
    draft: &RegistrationDraft,
) -> Result<(), Flash<Redirect>> {
    let profile_id = session.profile_id;
    let draft = draft.clone();
    conn.run(move |c| sql_interface::save_draft(c, profile_id, &draft))
        .await
        .map_err(|err| {
            server_error(
                format!("Error while saving the draft of {profile_id}: {err}"),
                "an error occured while saving your registration",
            )
        })
}

fn to_wizard() -> Redirect {
    Redirect::to(uri!(wizard(rally = _)))
}

fn wizard_error_flash(err: WizardError) -> Flash<Redirect> {
    let message = match err {
        WizardError::ForwardJump { .. } => {
            "You can't skip ahead, please complete the current step first."
        }
        WizardError::NotCurrentStep { .. } => {
            "That step isn't open right now, please continue with the current one."
        }
        WizardError::AtFirstStep => "You are already at the first step.",
        WizardError::Incomplete(_) => "Please complete all steps before submitting.",
    };
    Flash::error(to_wizard(), message)
}

/// A wizard step form that knows its inputs.
trait StepPage: StepForm + Send + 'static {
    fn sections(&self) -> Vec<FormSection>;
}

fn crew_member_fields(prefix: &str, member: &CrewMember) -> Vec<FieldView> {
    let name = |field: &str| format!("{prefix}.{field}");
    vec![
        FieldView::text(&name("first_name"), "First name", &member.first_name).required(),
        FieldView::text(&name("last_name"), "Last name", &member.last_name).required(),
        FieldView::new(FieldKind::Email, &name("email"), "Email", &member.email).required(),
        FieldView::new(FieldKind::Tel, &name("phone"), "Phone", &member.phone).required(),
        FieldView::text(&name("license_number"), "License number", &member.license_number)
            .required(),
        FieldView::text(
            &name("license_category"),
            "License category",
            &member.license_category,
        )
        .required(),
    ]
}

impl StepPage for PersonalInfo {
    fn sections(&self) -> Vec<FormSection> {
        vec![
            FormSection::new("Driver", crew_member_fields("driver", &self.driver)),
            FormSection::new("Co-driver", crew_member_fields("co_driver", &self.co_driver)),
        ]
    }
}

impl StepPage for VehicleInfo {
    fn sections(&self) -> Vec<FormSection> {
        let fields = [
            ("make", "Make", &self.make),
            ("model", "Model", &self.model),
            ("year", "Year", &self.year),
            ("registration_number", "Registration number", &self.registration_number),
            ("chassis_number", "Chassis number", &self.chassis_number),
            ("engine_number", "Engine number", &self.engine_number),
            ("engine_capacity", "Engine capacity", &self.engine_capacity),
            ("homologation_number", "Homologation number", &self.homologation_number),
            ("technical_passport", "Technical passport", &self.technical_passport),
            ("category", "Category", &self.category),
            ("group", "Group", &self.group),
            ("class", "Class", &self.class),
        ]
        .into_iter()
        .map(|(name, label, value)| FieldView::text(name, label, value).required())
        .collect();
        vec![FormSection::new("Vehicle", fields)]
    }
}

fn gear_title(prefix: &str) -> &'static str {
    match prefix {
        "driver_helmet" => "Driver helmet",
        "driver_suit" => "Driver suit",
        "co_driver_helmet" => "Co-driver helmet",
        "co_driver_suit" => "Co-driver suit",
        "seats" => "Seats",
        "belts" => "Belts",
        _ => "Equipment",
    }
}

fn flag_label(name: &str) -> &'static str {
    match name {
        "hans_device" => "HANS device",
        "fire_extinguisher" => "Fire extinguisher",
        "roll_cage" => "Roll cage",
        "first_aid_kit" => "First aid kit",
        _ => "Safety equipment",
    }
}

fn gear_fields(prefix: &str, gear: &Homologated) -> Vec<FieldView> {
    vec![
        FieldView::text(&format!("{prefix}.brand"), "Brand", &gear.brand).required(),
        FieldView::text(
            &format!("{prefix}.homologation"),
            "Homologation",
            &gear.homologation,
        )
        .required(),
        FieldView::new(
            FieldKind::Date,
            &format!("{prefix}.expiration"),
            "Expiration",
            &gear.expiration,
        )
        .required(),
    ]
}

impl StepPage for EquipmentInfo {
    fn sections(&self) -> Vec<FormSection> {
        let mut sections: Vec<_> = self
            .gear()
            .into_iter()
            .map(|(prefix, gear)| FormSection::new(gear_title(prefix), gear_fields(prefix, gear)))
            .collect();
        sections.push(FormSection::new(
            "Safety equipment",
            self.flags()
                .into_iter()
                .map(|(name, checked)| FieldView::checkbox(name, flag_label(name), checked))
                .collect(),
        ));
        sections
    }
}

#[derive(Debug, Serialize)]
struct StepIndicator {
    number: u8,
    title: &'static str,
    current: bool,
    reachable: bool,
}

fn step_indicators(draft: &RegistrationDraft) -> Vec<StepIndicator> {
    let current = draft.current_step();
    Step::ALL
        .iter()
        .map(|step| StepIndicator {
            number: step.number(),
            title: step.title(),
            current: *step == current,
            reachable: *step <= current,
        })
        .collect()
}

fn action_for(step: Step) -> &'static str {
    match step {
        Step::Personal => "/registration/personal",
        Step::Vehicle => "/registration/vehicle",
        Step::Equipment | Step::Summary => "/registration/equipment",
    }
}

fn step_page<F: StepPage>(
    draft: &RegistrationDraft,
    rally: Option<&Rally>,
    form: &F,
    errors: &FieldErrors,
    flash: Option<FlashMessage<'_>>,
    session: &Session,
) -> Template {
    let mut sections = form.sections();
    attach_errors(&mut sections, errors);
    Template::render(
        "wizard",
        context! {
            flash: FlashView::from_flash(flash),
            session,
            rally,
            steps: step_indicators(draft),
            step_title: F::STEP.title(),
            step_number: F::STEP.number(),
            action: action_for(F::STEP),
            has_previous: F::STEP.previous().is_some(),
            has_errors: !errors.is_empty(),
            sections,
        },
    )
}

fn summary_sections(registration: &CompleteRegistration) -> Vec<SummarySection> {
    registration
        .personal_info
        .sections()
        .into_iter()
        .chain(registration.vehicle_info.sections())
        .chain(registration.equipment_info.sections())
        .map(SummarySection::from)
        .collect()
}

fn summary_page(
    draft: &RegistrationDraft,
    registration: &CompleteRegistration,
    rallies: &[Rally],
    flash: Option<FlashMessage<'_>>,
    session: &Session,
) -> Template {
    let selected = draft.rally_id.map(|id| id.to_string()).unwrap_or_default();
    let rally_choice = FieldView::select(
        "rally_id",
        "Rally",
        rallies
            .iter()
            .map(|rally| (rally.id.to_string(), rally.details.name.clone())),
        &selected,
    )
    .required();

    Template::render(
        "wizard",
        context! {
            flash: FlashView::from_flash(flash),
            session,
            steps: step_indicators(draft),
            step_title: Step::Summary.title(),
            step_number: Step::Summary.number(),
            summary: summary_sections(registration),
            rally_choice,
            has_previous: true,
        },
    )
}

async fn open_rallies(conn: &RallyDbConn) -> Result<Vec<Rally>, Flash<Redirect>> {
    let rallies = conn.run(sql_interface::list_rallies).await.map_err(|err| {
        server_error(
            format!("Error while listing rallies: {err}"),
            "an error occured while loading the rallies",
        )
    })?;
    Ok(rallies
        .into_iter()
        .filter(|rally| registration_possible(&rally.details).is_ok())
        .collect())
}

async fn find_rally(
    conn: &RallyDbConn,
    id: Option<i64>,
) -> Result<Option<Rally>, Flash<Redirect>> {
    let Some(id) = id else {
        return Ok(None);
    };
    conn.run(move |c| sql_interface::get_rally(c, id))
        .await
        .map_err(|err| {
            server_error(
                format!("Error while loading rally {id}: {err}"),
                "an error occured while loading the rally",
            )
        })
}

#[get("/registration?<rally>")]
pub async fn wizard(
    conn: RallyDbConn,
    session: Session,
    flash: Option<FlashMessage<'_>>,
    rally: Option<i64>,
) -> Result<Template, Flash<Redirect>> {
    let mut draft = load_draft(&conn, &session).await?;
    if rally.is_some() && rally != draft.rally_id {
        draft.rally_id = rally;
        save_draft(&conn, &session, &draft).await?;
    }

    let no_errors = FieldErrors::new();
    Ok(match draft.current_step() {
        Step::Personal | Step::Vehicle | Step::Equipment => {
            let rally = find_rally(&conn, draft.rally_id).await?;
            match draft.current_step() {
                Step::Personal => step_page(
                    &draft,
                    rally.as_ref(),
                    &PersonalInfo::initial_data(&draft),
                    &no_errors,
                    flash,
                    &session,
                ),
                Step::Vehicle => step_page(
                    &draft,
                    rally.as_ref(),
                    &VehicleInfo::initial_data(&draft),
                    &no_errors,
                    flash,
                    &session,
                ),
                _ => step_page(
                    &draft,
                    rally.as_ref(),
                    &EquipmentInfo::initial_data(&draft),
                    &no_errors,
                    flash,
                    &session,
                ),
            }
        }
        Step::Summary => {
            let registration = draft.assemble().map_err(wizard_error_flash)?;
            let rallies = open_rallies(&conn).await?;
            summary_page(&draft, &registration, &rallies, flash, &session)
        }
    })
}

/// Validates a step form and advances the wizard, or shows the form again with its errors.
async fn submit_step<F: StepPage>(
    conn: RallyDbConn,
    session: Session,
    form: F,
) -> Result<FormOutcome, Flash<Redirect>> {
    let mut draft = load_draft(&conn, &session).await?;
    match form.clone().submit(&mut draft) {
        Ok(_) => {
            save_draft(&conn, &session, &draft).await?;
            Ok(FormOutcome::Saved(Flash::success(
                to_wizard(),
                format!("{} saved.", F::STEP.title()),
            )))
        }
        Err(StepRejected::Invalid(errors)) => {
            let rally = find_rally(&conn, draft.rally_id).await?;
            Ok(FormOutcome::Invalid(step_page(
                &draft,
                rally.as_ref(),
                &form,
                &errors,
                None,
                &session,
            )))
        }
        Err(StepRejected::Wizard(err)) => Err(wizard_error_flash(err)),
    }
}

#[post("/registration/personal", data = "<form>")]
pub async fn submit_personal(
    conn: RallyDbConn,
    session: Session,
    form: Form<PersonalInfo>,
) -> Result<FormOutcome, Flash<Redirect>> {
    submit_step(conn, session, form.into_inner()).await
}

#[post("/registration/vehicle", data = "<form>")]
pub async fn submit_vehicle(
    conn: RallyDbConn,
    session: Session,
    form: Form<VehicleInfo>,
) -> Result<FormOutcome, Flash<Redirect>> {
    submit_step(conn, session, form.into_inner()).await
}

#[post("/registration/equipment", data = "<form>")]
pub async fn submit_equipment(
    conn: RallyDbConn,
    session: Session,
    form: Form<EquipmentInfo>,
) -> Result<FormOutcome, Flash<Redirect>> {
    submit_step(conn, session, form.into_inner()).await
}

#[post("/registration/previous")]
pub async fn previous_step(
    conn: RallyDbConn,
    session: Session,
) -> Result<Redirect, Flash<Redirect>> {
    let mut draft = load_draft(&conn, &session).await?;
    draft.previous().map_err(wizard_error_flash)?;
    save_draft(&conn, &session, &draft).await?;
    Ok(to_wizard())
}

#[get("/registration/step/<number>")]
pub async fn jump_to_step(
    conn: RallyDbConn,
    session: Session,
    number: u8,
) -> Result<Redirect, Flash<Redirect>> {
    let Some(target) = Step::from_number(number) else {
        return Err(Flash::error(to_wizard(), "There is no such step."));
    };
    let mut draft = load_draft(&conn, &session).await?;
    draft.jump_to(target).map_err(wizard_error_flash)?;
    save_draft(&conn, &session, &draft).await?;
    Ok(to_wizard())
}

#[derive(Debug, FromForm)]
pub struct FinalSubmission {
    rally_id: Option<i64>,
}

#[post("/registration/submit", data = "<form>")]
pub async fn submit_registration(
    conn: RallyDbConn,
    session: Session,
    form: Form<FinalSubmission>,
) -> Result<Flash<Redirect>, Flash<Redirect>> {
    let draft = load_draft(&conn, &session).await?;
    let registration = draft.assemble().map_err(wizard_error_flash)?;

    let Some(rally) = find_rally(&conn, form.rally_id.or(draft.rally_id)).await? else {
        return Err(Flash::error(
            to_wizard(),
            "Please choose the rally you want to register for.",
        ));
    };
    registration_possible(&rally.details)
        .map_err(|reason| Flash::error(to_wizard(), reason.to_string()))?;

    let profile_id = session.profile_id;
    let rally_id = rally.id;
    match conn
        .run(move |c| sql_interface::submit_registration(c, profile_id, rally_id, &registration))
        .await
    {
        Ok(registration_id) => {
            log::info!("Profile {profile_id} registered for rally {rally_id} ({registration_id})");
            Ok(Flash::success(
                Redirect::to(uri!(done(rally = Some(rally_id)))),
                "Registration submitted.",
            ))
        }
        Err(ApplyRegistrationError::AlreadyRegistered) => Err(Flash::error(
            to_wizard(),
            format!("You are already registered for {}.", rally.details.name),
        )),
        Err(ApplyRegistrationError::UnknownRally) => Err(Flash::error(
            to_wizard(),
            format!("{} was just removed, please choose another rally.", rally.details.name),
        )),
        Err(err) => Err(server_error(
            format!("Error while submitting registration of {profile_id} for {rally_id}: {err}"),
            "an error occured while submitting your registration",
        )),
    }
}

#[post("/registration/restart")]
pub async fn restart(
    conn: RallyDbConn,
    session: Session,
) -> Result<Flash<Redirect>, Flash<Redirect>> {
    let mut draft = load_draft(&conn, &session).await?;
    draft.restart();
    save_draft(&conn, &session, &draft).await?;
    Ok(Flash::success(to_wizard(), "Registration restarted."))
}

#[get("/registration/done?<rally>")]
pub async fn done(
    conn: RallyDbConn,
    session: Session,
    flash: Option<FlashMessage<'_>>,
    rally: Option<i64>,
) -> Result<Template, Flash<Redirect>> {
    let rally = find_rally(&conn, rally).await?;
    Ok(Template::render(
        "registration-done",
        context! {
            flash: FlashView::from_flash(flash),
            session,
            rally,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn rally() -> RallyDetails {
        RallyDetails {
            name: "Rallye du Var".to_string(),
            location: "Sainte-Maxime".to_string(),
            description: None,
            start_date: NaiveDate::from_ymd_opt(2025, 11, 20).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 11, 23).unwrap(),
            registration_open: true,
            registration_deadline: NaiveDate::from_ymd_opt(2025, 11, 1)
                .unwrap()
                .and_hms_opt(18, 0, 0),
            status: RallyStatus::Upcoming,
        }
    }

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn open_rally_accepts_registrations() {
        assert_eq!(possible_to_register_at(&rally(), at(15)), Ok(()));

        let mut without_deadline = rally();
        without_deadline.registration_deadline = None;
        assert_eq!(possible_to_register_at(&without_deadline, at(31)), Ok(()));
    }

    #[test]
    fn closed_rallies_refuse_registrations() {
        let mut closed = rally();
        closed.registration_open = false;
        assert_eq!(
            possible_to_register_at(&closed, at(15)),
            Err(ImpossibleReason::RegistrationClosed)
        );

        let late = NaiveDate::from_ymd_opt(2025, 11, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(
            possible_to_register_at(&rally(), late),
            Err(ImpossibleReason::DeadlineExpired)
        );

        let mut cancelled = rally();
        cancelled.status = RallyStatus::Cancelled;
        assert_eq!(
            possible_to_register_at(&cancelled, at(15)),
            Err(ImpossibleReason::RallyCancelled)
        );
    }

    #[test]
    fn equipment_page_lists_all_gear_and_flags() {
        let sections = EquipmentInfo::default().sections();
        assert_eq!(sections.len(), 7);
        assert_eq!(sections[0].fields[0].name, "driver_helmet.brand");
        let flags = &sections[6].fields;
        assert!(flags.iter().all(|field| field.checked));
    }
}
