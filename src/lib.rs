#![allow(
    clippy::no_effect_underscore_binding, // Rocket heavily uses those in macros
    clippy::needless_pass_by_value,  // The request guards should take them by value anyways
)]

#[macro_use]
extern crate rocket;

pub mod config;
pub mod date_helpers;
pub mod map;
pub mod routes;
pub mod schemas;
pub mod session;
pub mod sql_interface;
pub mod validation;
pub mod wizard;
#[cfg(test)]
mod tests;

use std::fmt;

use rocket::{
    fairing::AdHoc,
    fs::{relative, FileServer},
    response::{Flash, Redirect},
    Build, Rocket, Route,
};
use rocket_dyn_templates::{handlebars::handlebars_helper, Template};
use rocket_sync_db_pools::database;

pub use routes::routes;

/// A shorthand function for logging an internal server error and redirecting to the page for that.
#[inline]
pub fn server_error(admin_err: impl fmt::Display, user_err: impl AsRef<str>) -> Flash<Redirect> {
    log::error!("{}", admin_err);
    Flash::error(
        Redirect::to(uri!(routes::error::server_error_panel)),
        user_err.as_ref(),
    )
}

/// Merges the route lists of several modules into one.
pub fn flatten_routes(route_lists: impl IntoIterator<Item = Vec<Route>>) -> Vec<Route> {
    route_lists.into_iter().flatten().collect()
}

#[database("rally_engage")]
pub struct RallyDbConn(rusqlite::Connection);

/// Assembles the whole application on top of the given configuration source.
pub fn build(figment: figment::Figment) -> Rocket<Build> {
    rocket::custom(figment)
        .attach(Template::custom(|engines| {
            engines
                .handlebars
                .register_escape_fn(ammonia::clean_text);

            handlebars_helper!(equals: |left_hand: String, right_hand: String| left_hand == right_hand);

            engines.handlebars.register_helper("equals", Box::new(equals));
        }))
        .attach(AdHoc::config::<config::Config>())
        .attach(RallyDbConn::fairing())
        .attach(AdHoc::try_on_ignite("Database schema", |rocket| async move {
            let Some(conn) = RallyDbConn::get_one(&rocket).await else {
                log::error!("Database fairing not attached, cannot set up the schema");
                return Err(rocket);
            };
            match conn
                .run(sql_interface::init_db_if_necessary)
                .await
            {
                Ok(sql_interface::DatabaseStatus::Created) => {
                    log::info!("Created a fresh database schema");
                    Ok(rocket)
                }
                Ok(sql_interface::DatabaseStatus::AlreadyExistent) => Ok(rocket),
                Err(err) => {
                    log::error!("Could not set up the database schema: {err}");
                    Err(rocket)
                }
            }
        }))
        .mount("/", routes())
        .mount("/admin", routes::dashboard::routes())
        .mount("/organizer", routes::dashboard::routes())
        .mount("/static", FileServer::from(relative!("/static")))
        .register("/", routes::error::catchers())
}
