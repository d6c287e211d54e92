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
    routes::{
        authflow::Admin,
        forms::{FieldView, SelectOption},
        FlashView,
    },
    server_error,
    sql_interface::{self, ModifyError, Profile, Role},
    RallyDbConn,
};

#[must_use]
pub fn routes() -> Vec<Route> {
    routes![list, change_role]
}

#[derive(Debug, Serialize)]
struct TemplateProfile {
    #[serde(flatten)]
    profile: Profile,
    is_self: bool,
    role_options: Vec<SelectOption>,
}

#[get("/profiles")]
pub async fn list(
    admin: Admin,
    area: Area,
    conn: RallyDbConn,
    flash: Option<FlashMessage<'_>>,
) -> Result<Template, Flash<Redirect>> {
    let profiles = conn
        .run(sql_interface::list_all_profiles)
        .await
        .map_err(|err| {
            server_error(
                format!("Error while listing profiles: {err}"),
                "an error occured while loading the profiles",
            )
        })?;
    let Admin(session) = admin;

    let profiles: Vec<TemplateProfile> = profiles
        .into_iter()
        .map(|profile| TemplateProfile {
            is_self: profile.id == session.profile_id,
            role_options: FieldView::select("role", "Role", choices(Role::ALL), profile.role.as_str())
                .options,
            profile,
        })
        .collect();

    Ok(Template::render(
        "profiles",
        context! {
            area,
            flash: FlashView::from_flash(flash),
            session,
            profiles,
        },
    ))
}

#[derive(Debug, FromForm)]
pub struct RoleForm {
    role: String,
}

#[post("/profiles/<id>/role", data = "<form>")]
pub async fn change_role(
    admin: Admin,
    area: Area,
    conn: RallyDbConn,
    id: i64,
    form: Form<RoleForm>,
) -> Flash<Redirect> {
    let Ok(role) = form.role.parse::<Role>() else {
        return Flash::error(
            area.redirect("/profiles"),
            format!("Unknown role '{}'.", form.role),
        );
    };
    if id == admin.0.profile_id && role != Role::Admin {
        return Flash::error(
            area.redirect("/profiles"),
            "You can't take away your own admin rights.",
        );
    }

    match conn.run(move |c| sql_interface::set_role(c, id, role)).await {
        Ok(()) => {
            log::info!(
                "Profile {id} was given the role {role} by profile {}",
                admin.0.profile_id
            );
            Flash::success(area.redirect("/profiles"), format!("Role changed to {role}."))
        }
        Err(ModifyError::NotFound) => Flash::error(
            area.redirect("/profiles"),
            "This profile doesn't exist (anymore).",
        ),
        Err(err) => server_error(
            format!("Error while changing the role of profile {id}: {err}"),
            "an error occured while changing the role",
        ),
    }
}
