use std::{
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
};

use chrono::NaiveDate;
use figment::providers::Serialized;
use rocket::{
    http::{ContentType, Status},
    local::blocking::{Client, LocalResponse},
};
use rusqlite::Connection;

use crate::{
    routes::authflow::hash_secret,
    sql_interface::{self, NewProfile, RallyDetails, RallyStatus, Role},
};

const PASSWORD: &str = "correct horse battery";

/// A running application on top of its own database file.
struct TestApp {
    client: Client,
    db_path: PathBuf,
}

impl TestApp {
    fn start() -> Self {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let db_path = std::env::temp_dir().join(format!(
            "rally-engage-test-{}-{}.sqlite",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = std::fs::remove_file(&db_path);

        let figment = rocket::Config::figment().merge(Serialized::globals(serde_json::json!({
            "template_dir": concat!(env!("CARGO_MANIFEST_DIR"), "/templates"),
            "databases": {
                "rally_engage": {
                    "url": db_path.to_string_lossy(),
                    "pool_size": 2,
                    "timeout": 5,
                },
            },
            "jwt_key": "cmFsbHktZW5nYWdlLXRlc3Qtc2lnbmluZy1rZXktMDAwMQ==",
            "email": "no-reply@rally-engage.test",
            "email_creds": "",
            "smtp_server": "localhost",
            "public_url": "http://localhost:8000",
            "log_level": "off",
        })));

        let client = Client::tracked(crate::build(figment)).unwrap();
        Self { client, db_path }
    }

    fn db(&self) -> Connection {
        Connection::open(&self.db_path).unwrap()
    }

    /// Inserts a profile with [`PASSWORD`], confirmed or not.
    fn profile(&self, email: &str, role: Role, confirmed: bool) -> i64 {
        let mut conn = self.db();
        let id = sql_interface::insert_new_profile(
            &mut conn,
            &NewProfile {
                first_name: "Sébastien".to_string(),
                last_name: "Ogier".to_string(),
                email: email.parse().unwrap(),
                password_hash: hash_secret(PASSWORD.as_bytes()).unwrap(),
                role,
            },
        )
        .unwrap();
        if confirmed {
            sql_interface::confirm_email(&mut conn, id).unwrap();
        }
        id
    }

    fn rally(&self, name: &str) -> i64 {
        sql_interface::insert_new_rally(
            &mut self.db(),
            &RallyDetails {
                name: name.to_string(),
                location: "Gap".to_string(),
                description: None,
                start_date: NaiveDate::from_ymd_opt(2099, 1, 20).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2099, 1, 23).unwrap(),
                registration_open: true,
                registration_deadline: None,
                status: RallyStatus::Upcoming,
            },
        )
        .unwrap()
    }

    fn sign_in(&self, email: &str) -> LocalResponse<'_> {
        self.client
            .post("/auth/signin")
            .header(ContentType::Form)
            .body(format!("email={email}&password={}", PASSWORD.replace(' ', "+")))
            .dispatch()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_path);
    }
}

fn location<'a>(response: &'a LocalResponse<'_>) -> Option<&'a str> {
    response.headers().get_one("Location")
}

/// Whether a rendered page contains `text`, escaped the way templates escape it.
fn shows(page: &str, text: &str) -> bool {
    page.contains(&ammonia::clean_text(text))
}

#[test]
fn home_lists_rallies_to_anyone() {
    let app = TestApp::start();
    app.rally("Montecarlo");

    let response = app.client.get("/").dispatch();
    assert_eq!(response.status(), Status::Ok);
    assert!(response.into_string().unwrap().contains("Montecarlo"));
}

#[test]
fn unknown_rally_is_not_found() {
    let app = TestApp::start();
    let response = app.client.get("/rally/4711").dispatch();
    assert_eq!(response.status(), Status::NotFound);
}

#[test]
fn registration_requires_sign_in() {
    let app = TestApp::start();

    for path in ["/registration", "/organizer"] {
        let response = app.client.get(path).dispatch();
        assert_eq!(response.status(), Status::SeeOther, "{path}");
        assert_eq!(location(&response), Some("/auth"), "{path}");
        drop(response);

        let page = app.client.get("/auth").dispatch().into_string().unwrap();
        assert!(shows(&page, "Please sign in to continue."), "{path}");
    }
}

#[test]
fn sign_in_lands_on_the_role_home() {
    let app = TestApp::start();
    app.profile("driver@rally.test", Role::Driver, true);
    app.profile("organizer@rally.test", Role::Organizer, true);

    let response = app.sign_in("organizer@rally.test");
    assert_eq!(response.status(), Status::SeeOther);
    assert_eq!(location(&response), Some("/organizer"));
    drop(response);

    let response = app.client.get("/organizer").dispatch();
    assert_eq!(response.status(), Status::Ok);
    drop(response);

    app.client.post("/auth/signout").dispatch();
    let response = app.sign_in("driver@rally.test");
    assert_eq!(location(&response), Some("/"));
}

#[test]
fn unconfirmed_email_is_refused() {
    let app = TestApp::start();
    app.profile("new@rally.test", Role::Driver, false);

    let response = app.sign_in("new@rally.test");
    assert_eq!(location(&response), Some("/auth"));
    drop(response);
    let response = app.client.get("/registration").dispatch();
    assert_eq!(location(&response), Some("/auth"));
}

#[test]
fn sign_up_can_be_repeated_until_confirmed() {
    let app = TestApp::start();
    let sign_up = |first_name: &str, password: &str| {
        app.client
            .post("/auth/signup")
            .header(ContentType::Form)
            .body(format!(
                "first_name={first_name}&last_name=Loeb&email=seb@rally.test&password={password}"
            ))
            .dispatch()
    };

    // there is no mail server in tests, so the confirmation mail never arrives
    let response = sign_up("Seb", "first-password");
    assert_eq!(location(&response), Some("/servererror"));
    drop(response);
    let response = sign_up("Sebastien", "correct+horse+battery");
    assert_eq!(response.status(), Status::SeeOther);
    assert_eq!(location(&response), Some("/servererror"));
    drop(response);

    let profiles = sql_interface::list_all_profiles(&mut app.db()).unwrap();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].first_name, "Sebastien");

    sql_interface::confirm_email(&mut app.db(), profiles[0].id).unwrap();
    let response = app.sign_in("seb@rally.test");
    assert_eq!(location(&response), Some("/"));
    drop(response);

    app.client.post("/auth/signout").dispatch();
    let response = sign_up("Other", "another-password");
    assert_eq!(response.status(), Status::UnprocessableEntity);
    assert!(shows(
        &response.into_string().unwrap(),
        "this email address is already registered"
    ));
}

#[test]
fn wrong_password_is_refused() {
    let app = TestApp::start();
    app.profile("driver@rally.test", Role::Driver, true);

    let response = app
        .client
        .post("/auth/signin")
        .header(ContentType::Form)
        .body("email=driver@rally.test&password=nope")
        .dispatch();
    assert_eq!(location(&response), Some("/auth"));
}

#[test]
fn drivers_are_kept_out_of_the_dashboards() {
    let app = TestApp::start();
    app.profile("driver@rally.test", Role::Driver, true);
    app.sign_in("driver@rally.test");

    for path in ["/organizer", "/admin", "/organizer/rallies", "/admin/profiles"] {
        let response = app.client.get(path).dispatch();
        assert_eq!(response.status(), Status::SeeOther, "{path}");
        assert_eq!(location(&response), Some("/"), "{path}");
        drop(response);

        let page = app.client.get("/").dispatch().into_string().unwrap();
        assert!(
            shows(&page, "You don't have permission to access this page."),
            "{path}"
        );
    }

    let response = app.client.get("/registration").dispatch();
    assert_eq!(response.status(), Status::Ok);
}

#[test]
fn organizers_cannot_manage_roles() {
    let app = TestApp::start();
    app.profile("organizer@rally.test", Role::Organizer, true);
    app.sign_in("organizer@rally.test");

    let response = app.client.get("/organizer/profiles").dispatch();
    assert_eq!(location(&response), Some("/"));
}

#[test]
fn organizer_manages_rallies() {
    let app = TestApp::start();
    app.profile("organizer@rally.test", Role::Organizer, true);
    app.sign_in("organizer@rally.test");

    let response = app
        .client
        .post("/organizer/rallies/new")
        .header(ContentType::Form)
        .body(
            "name=Turini&location=Sospel&description=&start_date=2099-03-01&end_date=2099-03-02\
            &registration_open=true&registration_deadline=2099-02-15T18:00&status=upcoming",
        )
        .dispatch();
    assert_eq!(response.status(), Status::SeeOther);
    assert_eq!(location(&response), Some("/organizer/rallies"));
    drop(response);

    let rallies = sql_interface::list_rallies(&mut app.db()).unwrap();
    assert_eq!(rallies.len(), 1);
    let rally = &rallies[0];
    assert_eq!(rally.details.name, "Turini");
    assert!(rally.details.registration_open);

    let response = app.client.get("/organizer/rallies").dispatch();
    assert_eq!(response.status(), Status::Ok);
    assert!(response.into_string().unwrap().contains("Turini"));

    // without the confirmation nothing is deleted
    let response = app
        .client
        .post(format!("/organizer/rallies/{}/delete", rally.id))
        .header(ContentType::Form)
        .body("")
        .dispatch();
    assert_eq!(
        location(&response),
        Some(format!("/organizer/rallies/{}/delete", rally.id).as_str())
    );
    drop(response);
    assert!(sql_interface::get_rally(&mut app.db(), rally.id)
        .unwrap()
        .is_some());

    let response = app
        .client
        .post(format!("/organizer/rallies/{}/delete", rally.id))
        .header(ContentType::Form)
        .body("confirm=true")
        .dispatch();
    assert_eq!(location(&response), Some("/organizer/rallies"));
    drop(response);
    assert!(sql_interface::get_rally(&mut app.db(), rally.id)
        .unwrap()
        .is_none());
}

#[test]
fn invalid_rally_form_is_shown_again() {
    let app = TestApp::start();
    app.profile("admin@rally.test", Role::Admin, true);
    app.sign_in("admin@rally.test");

    let response = app
        .client
        .post("/admin/rallies/new")
        .header(ContentType::Form)
        .body(
            "name=&location=Sospel&description=&start_date=2099-03-02&end_date=2099-03-01\
            &registration_deadline=&status=upcoming",
        )
        .dispatch();
    assert_eq!(response.status(), Status::UnprocessableEntity);
    let body = response.into_string().unwrap();
    assert!(body.contains("Sospel"));
    assert!(body.contains("field-error"));
    assert!(sql_interface::list_rallies(&mut app.db()).unwrap().is_empty());
}

#[test]
fn admin_changes_roles_but_not_their_own() {
    let app = TestApp::start();
    let admin = app.profile("admin@rally.test", Role::Admin, true);
    let driver = app.profile("driver@rally.test", Role::Driver, true);
    app.sign_in("admin@rally.test");

    let response = app
        .client
        .post(format!("/admin/profiles/{driver}/role"))
        .header(ContentType::Form)
        .body("role=organizer")
        .dispatch();
    assert_eq!(location(&response), Some("/admin/profiles"));
    drop(response);

    let response = app
        .client
        .post(format!("/admin/profiles/{admin}/role"))
        .header(ContentType::Form)
        .body("role=driver")
        .dispatch();
    assert_eq!(location(&response), Some("/admin/profiles"));
    drop(response);

    let mut conn = app.db();
    let role_of = |conn: &mut Connection, id: i64| {
        sql_interface::search_profile(conn, &sql_interface::SearchProfileBy::Id(id))
            .unwrap()
            .role
    };
    assert_eq!(role_of(&mut conn, driver), Role::Organizer);
    assert_eq!(role_of(&mut conn, admin), Role::Admin);
}

#[test]
fn wizard_refuses_to_skip_ahead() {
    let app = TestApp::start();
    app.profile("driver@rally.test", Role::Driver, true);
    app.sign_in("driver@rally.test");

    let response = app.client.get("/registration/step/3").dispatch();
    assert_eq!(response.status(), Status::SeeOther);
    assert_eq!(location(&response), Some("/registration"));
    drop(response);

    let response = app
        .client
        .post("/registration/submit")
        .header(ContentType::Form)
        .body("")
        .dispatch();
    assert_eq!(location(&response), Some("/registration"));
}

fn crew_member(prefix: &str, email: &str) -> String {
    format!(
        "{prefix}.first_name=Julien&{prefix}.last_name=Ingrassia&{prefix}.email={email}\
        &{prefix}.phone=0612345678&{prefix}.license_number=FR-2231\
        &{prefix}.license_category=International"
    )
}

#[test]
fn crew_registers_through_the_wizard() {
    let app = TestApp::start();
    let rally = app.rally("Lyon-Charbonnieres");
    let driver = app.profile("driver@rally.test", Role::Driver, true);
    app.sign_in("driver@rally.test");

    let post = |path: &str, body: String| {
        let response = app
            .client
            .post(path)
            .header(ContentType::Form)
            .body(body)
            .dispatch();
        (response.status(), location(&response).map(str::to_string))
    };
    let to_wizard = (Status::SeeOther, Some("/registration".to_string()));

    // an invalid step stays where it is
    assert_eq!(
        post("/registration/personal", crew_member("driver", "driver@rally.test")).0,
        Status::UnprocessableEntity
    );

    let personal = format!(
        "{}&{}",
        crew_member("driver", "driver@rally.test"),
        crew_member("co_driver", "codriver@rally.test")
    );
    assert_eq!(post("/registration/personal", personal), to_wizard);

    let vehicle = "make=Toyota&model=Yaris&year=2022&registration_number=AB-123-CD\
        &chassis_number=JTD123&engine_number=G16E&engine_capacity=1618\
        &homologation_number=A-5752&technical_passport=TP-001&category=Rally2&group=R\
        &class=RC2"
        .to_string();
    assert_eq!(post("/registration/vehicle", vehicle), to_wizard);

    let mut equipment: Vec<String> = [
        "driver_helmet",
        "driver_suit",
        "co_driver_helmet",
        "co_driver_suit",
        "seats",
        "belts",
    ]
    .iter()
    .map(|gear| {
        format!("{gear}.brand=Stilo&{gear}.homologation=FIA-8860&{gear}.expiration=2030-12-31")
    })
    .collect();
    for flag in ["hans_device", "fire_extinguisher", "roll_cage", "first_aid_kit"] {
        equipment.push(format!("{flag}=true"));
    }
    assert_eq!(post("/registration/equipment", equipment.join("&")), to_wizard);

    let summary = app.client.get("/registration").dispatch();
    assert_eq!(summary.status(), Status::Ok);
    let summary = summary.into_string().unwrap();
    assert!(summary.contains("Toyota"));
    assert!(summary.contains("Lyon-Charbonnieres"));

    assert_eq!(
        post("/registration/submit", format!("rally_id={rally}")),
        (
            Status::SeeOther,
            Some(format!("/registration/done?rally={rally}"))
        )
    );

    let crews = sql_interface::list_crews(&mut app.db(), rally).unwrap();
    assert_eq!(crews.len(), 1);
    assert_eq!(crews[0].status, sql_interface::RegistrationStatus::Pending);
    assert_eq!(crews[0].driver.email, "driver@rally.test");
    assert!(crews[0].co_driver.is_none());
    assert_eq!(
        crews[0].vehicle.as_ref().map(|vehicle| vehicle.make.as_str()),
        Some("Toyota")
    );

    // the draft is gone, a new registration starts from the first step
    assert!(sql_interface::load_draft(&mut app.db(), driver)
        .unwrap()
        .is_none());

    let home = app.client.get("/").dispatch().into_string().unwrap();
    assert!(home.contains("pending"));

    app.client.post("/auth/signout").dispatch();
    app.profile("organizer@rally.test", Role::Organizer, true);
    app.sign_in("organizer@rally.test");
    let registration_id = crews[0].registration_id;
    let set_status = |rally: i64| {
        let response = app
            .client
            .post(format!(
                "/organizer/rallies/{rally}/crews/{registration_id}/status"
            ))
            .header(ContentType::Form)
            .body("status=approved")
            .dispatch();
        location(&response).map(str::to_string)
    };

    let other_rally = app.rally("Sanremo");
    assert_eq!(
        set_status(other_rally),
        Some(format!("/organizer/rallies/{other_rally}/crews"))
    );
    assert_eq!(
        sql_interface::list_crews(&mut app.db(), rally).unwrap()[0].status,
        sql_interface::RegistrationStatus::Pending
    );

    assert_eq!(
        set_status(rally),
        Some(format!("/organizer/rallies/{rally}/crews"))
    );
    assert_eq!(
        sql_interface::list_crews(&mut app.db(), rally).unwrap()[0].status,
        sql_interface::RegistrationStatus::Approved
    );
}

#[test]
fn stage_with_zero_distance_is_not_stored() {
    let app = TestApp::start();
    let rally = app.rally("Turini");
    app.profile("organizer@rally.test", Role::Organizer, true);
    app.sign_in("organizer@rally.test");

    let stage = |distance: &str| {
        format!(
            "name=ES1&location=Sospel&description=&distance={distance}&start_time=\
            &status=planned&start_latitude=&start_longitude=&finish_latitude=\
            &finish_longitude=&map_zoom=&difficulty_level=&route_type=&stage_order=1\
            &max_participants="
        )
    };

    let response = app
        .client
        .post(format!("/organizer/rallies/{rally}/stages/new"))
        .header(ContentType::Form)
        .body(stage("0"))
        .dispatch();
    assert_eq!(response.status(), Status::UnprocessableEntity);
    let page = response.into_string().unwrap();
    assert!(page.contains("field-error"));
    assert!(shows(&page, "distance must be positive"));
    assert!(sql_interface::list_stages(&mut app.db(), rally)
        .unwrap()
        .is_empty());

    let response = app
        .client
        .post(format!("/organizer/rallies/{rally}/stages/new"))
        .header(ContentType::Form)
        .body(stage("12.5"))
        .dispatch();
    assert_eq!(
        location(&response),
        Some(format!("/organizer/rallies/{rally}/stages").as_str())
    );
    drop(response);
    assert_eq!(
        sql_interface::list_stages(&mut app.db(), rally).unwrap().len(),
        1
    );
}
