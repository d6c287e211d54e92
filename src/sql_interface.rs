mod sql_struct;
mod types;

use {
    crate::{
        date_helpers::relative_to_absolute,
        wizard::{CompleteRegistration, RegistrationDraft},
    },
    rusqlite::{named_params, OptionalExtension},
    std::time::Duration,
    thiserror::Error,
};

pub use {
    sql_struct::{select_list, SqlStruct},
    types::*,
};

macro_rules! match_constraint_violation {
    ($statement:expr, $custom_error:expr) => {
        match $statement {
            Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: rusqlite::ErrorCode::ConstraintViolation,
                    ..
                },
                _,
            )) => Err($custom_error),
            Err(err) => Err(err.into()),
            Ok(value) => Ok(value),
        }
    };
}

/// SQLite only enforces foreign keys (and thus cascades) if asked to, per connection.
fn enforce_foreign_keys(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", true)
}

pub enum DatabaseStatus {
    AlreadyExistent,
    Created,
}

pub fn init_db_if_necessary(
    conn: &mut rusqlite::Connection,
) -> Result<DatabaseStatus, rusqlite::Error> {
    // dummy query to see if the db has a table in it
    // yeah, we could query sqlite_master, but this way we can also directly ask for the
    // columns
    if conn
        .execute(
            "SELECT profile_id, email, role
            FROM profile
            WHERE false",
            [],
        )
        .is_err()
    {
        conn.execute_batch(include_str!("./init_db.sql"))?;
        Ok(DatabaseStatus::Created)
    } else {
        Ok(DatabaseStatus::AlreadyExistent)
    }
}

/// Generic "the thing to update wasn't there" outcome of updates and deletes.
#[derive(Debug, Error)]
pub enum ModifyError {
    #[error("Database or query error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("No such entry")]
    NotFound,
}

fn expect_one_row(changed: usize) -> Result<(), ModifyError> {
    if changed == 0 {
        Err(ModifyError::NotFound)
    } else {
        Ok(())
    }
}

// ---------------------------------------------------------------------------------------------
// profiles

pub enum SearchProfileBy {
    /// Searches by email. Returns only one result because emails are unique.
    Email(String),

    Id(i64),
}

#[derive(Error, Debug)]
pub enum SearchProfileError {
    #[error("Database or query error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("Criteria not found")]
    NotFound,
}

/// Searches for a profile in the database by the given criteria. Returns
/// [`SearchProfileError`]`::NotFound` if the search criteria is not present.
pub fn search_profile(
    conn: &mut rusqlite::Connection,
    by: &SearchProfileBy,
) -> Result<Profile, SearchProfileError> {
    let (condition, value): (&str, &dyn rusqlite::ToSql) = match by {
        SearchProfileBy::Email(email) => ("profile.email == :value", email),
        SearchProfileBy::Id(id) => ("profile.profile_id == :value", id),
    };
    let mut statement = conn.prepare(&format!(
        "SELECT {}
        FROM profile
        WHERE {condition}",
        select_list::<Profile>(),
    ))?;
    statement
        .query_row(named_params! { ":value": value }, |row| Profile::from_row(row, 0))
        .optional()?
        .ok_or(SearchProfileError::NotFound)
}

#[derive(Debug, Error)]
pub enum ProfileCreationError {
    #[error("Email is already used")]
    EmailAlreadyInUse,
    #[error("Database or query error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
}

#[derive(Clone, Debug)]
pub struct NewProfile {
    pub first_name: String,
    pub last_name: String,
    pub email: lettre::Address,
    pub password_hash: String,
    pub role: Role,
}

fn insert_profile_row(
    conn: &rusqlite::Connection,
    profile: &NewProfile,
) -> Result<i64, ProfileCreationError> {
    match_constraint_violation!(
        conn.execute(
            "INSERT INTO profile (first_name, last_name, email, role, email_confirmed,
                password_hash)
            VALUES (:first_name, :last_name, :email, :role, false, :password_hash)",
            named_params! {
                ":first_name": profile.first_name,
                ":last_name": profile.last_name,
                ":email": profile.email.to_string(),
                ":role": profile.role,
                ":password_hash": profile.password_hash,
            },
        ),
        ProfileCreationError::EmailAlreadyInUse
    )?;
    Ok(conn.last_insert_rowid())
}

/// Inserts a new, unconfirmed profile and returns its ID.
pub fn insert_new_profile(
    conn: &mut rusqlite::Connection,
    profile: &NewProfile,
) -> Result<i64, ProfileCreationError> {
    insert_profile_row(conn, profile)
}

/// Stores the profile of somebody signing up and returns its ID.
///
/// An unconfirmed profile with the same email is taken over: names, password hash and role are
/// replaced and any pending token is dropped. Confirmed addresses are refused.
pub fn sign_up_profile(
    conn: &mut rusqlite::Connection,
    profile: &NewProfile,
) -> Result<i64, ProfileCreationError> {
    let transaction = conn.transaction()?;
    let existing: Option<(i64, bool)> = transaction
        .query_row(
            "SELECT profile_id, email_confirmed FROM profile WHERE email == :email",
            named_params! { ":email": profile.email.to_string() },
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let id = match existing {
        Some((_, true)) => return Err(ProfileCreationError::EmailAlreadyInUse),
        Some((id, false)) => {
            transaction.execute(
                "UPDATE profile
                SET first_name = :first_name, last_name = :last_name, role = :role,
                    password_hash = :password_hash, token = NULL, token_expiration = NULL
                WHERE profile_id == :profile_id",
                named_params! {
                    ":profile_id": id,
                    ":first_name": profile.first_name,
                    ":last_name": profile.last_name,
                    ":role": profile.role,
                    ":password_hash": profile.password_hash,
                },
            )?;
            id
        }
        None => insert_profile_row(&transaction, profile)?,
    };
    transaction.commit()?;
    Ok(id)
}

/// Lists all profiles, sorted by last name.
pub fn list_all_profiles(conn: &mut rusqlite::Connection) -> rusqlite::Result<Vec<Profile>> {
    let mut statement = conn.prepare(&format!(
        "SELECT {}
        FROM profile
        ORDER BY profile.last_name, profile.first_name",
        select_list::<Profile>(),
    ))?;
    let profiles = statement
        .query_map([], |row| Profile::from_row(row, 0))?
        .collect();
    profiles
}

/// Updates the confirmation token for a profile and sets the expiration time to one day from now
/// if `new_token` is [`Option::Some`], else the token is set to NULL.
pub fn update_token(
    conn: &mut rusqlite::Connection,
    profile_id: i64,
    new_token: Option<String>,
) -> Result<(), rusqlite::Error> {
    let (new_token, expiration_timepoint) = new_token.map_or((None, None), |new_token| {
        let expiration_timepoint = relative_to_absolute(Duration::from_secs(60 * 60 * 24));
        (Some(new_token), Some(expiration_timepoint))
    });

    conn.execute(
        "UPDATE profile
        SET token = :new_token, token_expiration = :expiration_timepoint
        WHERE profile_id == :profile_id",
        named_params! {
            ":profile_id": profile_id,
            ":new_token": new_token,
            ":expiration_timepoint": expiration_timepoint,
        },
    )?;
    Ok(())
}

/// Marks the email of a profile as confirmed and drops the now useless token.
pub fn confirm_email(
    conn: &mut rusqlite::Connection,
    profile_id: i64,
) -> Result<(), ModifyError> {
    let changed = conn.execute(
        "UPDATE profile
        SET email_confirmed = true, token = NULL, token_expiration = NULL
        WHERE profile_id == :profile_id",
        named_params! { ":profile_id": profile_id },
    )?;
    expect_one_row(changed)
}

pub fn set_role(
    conn: &mut rusqlite::Connection,
    profile_id: i64,
    role: Role,
) -> Result<(), ModifyError> {
    let changed = conn.execute(
        "UPDATE profile
        SET role = :role
        WHERE profile_id == :profile_id",
        named_params! { ":profile_id": profile_id, ":role": role },
    )?;
    expect_one_row(changed)
}

// ---------------------------------------------------------------------------------------------
// rallies

/// Lists all rallies. Ongoing and upcoming ones come first, each group by start date.
pub fn list_rallies(conn: &mut rusqlite::Connection) -> rusqlite::Result<Vec<Rally>> {
    let mut statement = conn.prepare(&format!(
        "SELECT {}
        FROM rally
        ORDER BY rally.status IN ('completed', 'cancelled'), rally.start_date, rally.name",
        select_list::<Rally>(),
    ))?;
    let rallies = statement.query_map([], |row| Rally::from_row(row, 0))?.collect();
    rallies
}

pub fn get_rally(conn: &mut rusqlite::Connection, id: i64) -> rusqlite::Result<Option<Rally>> {
    conn.query_row(
        &format!(
            "SELECT {}
            FROM rally
            WHERE rally.rally_id == :id",
            select_list::<Rally>(),
        ),
        named_params! { ":id": id },
        |row| Rally::from_row(row, 0),
    )
    .optional()
}

/// Inserts a new rally and returns its ID.
pub fn insert_new_rally(
    conn: &mut rusqlite::Connection,
    rally: &RallyDetails,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO rally (name, location, description, start_date, end_date,
            registration_open, registration_deadline, status)
        VALUES (:name, :location, :description, :start_date, :end_date,
            :registration_open, :registration_deadline, :status)",
        named_params! {
            ":name": rally.name,
            ":location": rally.location,
            ":description": rally.description,
            ":start_date": rally.start_date,
            ":end_date": rally.end_date,
            ":registration_open": rally.registration_open,
            ":registration_deadline": rally.registration_deadline,
            ":status": rally.status,
        },
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_rally(
    conn: &mut rusqlite::Connection,
    id: i64,
    rally: &RallyDetails,
) -> Result<(), ModifyError> {
    let changed = conn.execute(
        "UPDATE rally
        SET name = :name, location = :location, description = :description,
            start_date = :start_date, end_date = :end_date,
            registration_open = :registration_open,
            registration_deadline = :registration_deadline, status = :status
        WHERE rally_id == :id",
        named_params! {
            ":id": id,
            ":name": rally.name,
            ":location": rally.location,
            ":description": rally.description,
            ":start_date": rally.start_date,
            ":end_date": rally.end_date,
            ":registration_open": rally.registration_open,
            ":registration_deadline": rally.registration_deadline,
            ":status": rally.status,
        },
    )?;
    expect_one_row(changed)
}

/// Deletes a rally by ID together with its stages, timing points and registrations.
/// **This action is irreversible.**
pub fn delete_rally(conn: &mut rusqlite::Connection, id: i64) -> Result<(), ModifyError> {
    enforce_foreign_keys(conn)?;
    let changed = conn.execute(
        "DELETE FROM rally
        WHERE rally_id == :id",
        named_params! { ":id": id },
    )?;
    expect_one_row(changed)
}

// ---------------------------------------------------------------------------------------------
// stages

/// Lists the stages of a rally in their canonical order: by `stage_order`, stages without one
/// last, ties broken by creation.
pub fn list_stages(conn: &mut rusqlite::Connection, rally_id: i64) -> rusqlite::Result<Vec<Stage>> {
    let mut statement = conn.prepare(&format!(
        "SELECT {}
        FROM rally_stage
        WHERE rally_stage.rally_id == :rally_id
        ORDER BY rally_stage.stage_order IS NULL, rally_stage.stage_order,
            rally_stage.created_at, rally_stage.stage_id",
        select_list::<Stage>(),
    ))?;
    let stages = statement
        .query_map(named_params! { ":rally_id": rally_id }, |row| {
            Stage::from_row(row, 0)
        })?
        .collect();
    stages
}

pub fn get_stage(conn: &mut rusqlite::Connection, id: i64) -> rusqlite::Result<Option<Stage>> {
    conn.query_row(
        &format!(
            "SELECT {}
            FROM rally_stage
            WHERE rally_stage.stage_id == :id",
            select_list::<Stage>(),
        ),
        named_params! { ":id": id },
        |row| Stage::from_row(row, 0),
    )
    .optional()
}

#[derive(Debug, Error)]
pub enum InsertChildError {
    #[error("Database or query error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("The parent entry doesn't exist")]
    UnknownParent,
}

/// Inserts a new stage into a rally and returns its ID.
pub fn insert_new_stage(
    conn: &mut rusqlite::Connection,
    rally_id: i64,
    stage: &StageDetails,
) -> Result<i64, InsertChildError> {
    enforce_foreign_keys(conn)?;
    match_constraint_violation!(
        conn.execute(
            "INSERT INTO rally_stage (rally_id, name, location, description, distance, start_time,
                status, start_latitude, start_longitude, finish_latitude, finish_longitude,
                map_zoom, difficulty_level, route_type, stage_order, max_participants)
            VALUES (:rally_id, :name, :location, :description, :distance, :start_time,
                :status, :start_latitude, :start_longitude, :finish_latitude, :finish_longitude,
                :map_zoom, :difficulty_level, :route_type, :stage_order, :max_participants)",
            named_params! {
                ":rally_id": rally_id,
                ":name": stage.name,
                ":location": stage.location,
                ":description": stage.description,
                ":distance": stage.distance,
                ":start_time": stage.start_time,
                ":status": stage.status,
                ":start_latitude": stage.start_latitude,
                ":start_longitude": stage.start_longitude,
                ":finish_latitude": stage.finish_latitude,
                ":finish_longitude": stage.finish_longitude,
                ":map_zoom": stage.map_zoom,
                ":difficulty_level": stage.difficulty_level,
                ":route_type": stage.route_type,
                ":stage_order": stage.stage_order,
                ":max_participants": stage.max_participants,
            },
        ),
        InsertChildError::UnknownParent
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_stage(
    conn: &mut rusqlite::Connection,
    id: i64,
    stage: &StageDetails,
) -> Result<(), ModifyError> {
    let changed = conn.execute(
        "UPDATE rally_stage
        SET name = :name, location = :location, description = :description,
            distance = :distance, start_time = :start_time, status = :status,
            start_latitude = :start_latitude, start_longitude = :start_longitude,
            finish_latitude = :finish_latitude, finish_longitude = :finish_longitude,
            map_zoom = :map_zoom, difficulty_level = :difficulty_level,
            route_type = :route_type, stage_order = :stage_order,
            max_participants = :max_participants
        WHERE stage_id == :id",
        named_params! {
            ":id": id,
            ":name": stage.name,
            ":location": stage.location,
            ":description": stage.description,
            ":distance": stage.distance,
            ":start_time": stage.start_time,
            ":status": stage.status,
            ":start_latitude": stage.start_latitude,
            ":start_longitude": stage.start_longitude,
            ":finish_latitude": stage.finish_latitude,
            ":finish_longitude": stage.finish_longitude,
            ":map_zoom": stage.map_zoom,
            ":difficulty_level": stage.difficulty_level,
            ":route_type": stage.route_type,
            ":stage_order": stage.stage_order,
            ":max_participants": stage.max_participants,
        },
    )?;
    expect_one_row(changed)
}

/// Deletes a stage by ID and all its timing points. **This action is irreversible.**
pub fn delete_stage(conn: &mut rusqlite::Connection, id: i64) -> Result<(), ModifyError> {
    enforce_foreign_keys(conn)?;
    let changed = conn.execute(
        "DELETE FROM rally_stage
        WHERE stage_id == :id",
        named_params! { ":id": id },
    )?;
    expect_one_row(changed)
}

// ---------------------------------------------------------------------------------------------
// timing points

/// Fetches the timing points of a stage, sorted by `order_index`. Repeated indices keep their
/// creation order.
pub fn fetch_timing_points(
    conn: &mut rusqlite::Connection,
    stage_id: i64,
) -> rusqlite::Result<Vec<TimingPoint>> {
    let mut statement = conn.prepare(&format!(
        "SELECT {}
        FROM timing_point
        WHERE timing_point.stage_id == :stage_id
        ORDER BY timing_point.order_index, timing_point.timing_point_id",
        select_list::<TimingPoint>(),
    ))?;
    let points = statement
        .query_map(named_params! { ":stage_id": stage_id }, |row| {
            TimingPoint::from_row(row, 0)
        })?
        .collect();
    points
}

pub fn get_timing_point(
    conn: &mut rusqlite::Connection,
    id: i64,
) -> rusqlite::Result<Option<TimingPoint>> {
    conn.query_row(
        &format!(
            "SELECT {}
            FROM timing_point
            WHERE timing_point.timing_point_id == :id",
            select_list::<TimingPoint>(),
        ),
        named_params! { ":id": id },
        |row| TimingPoint::from_row(row, 0),
    )
    .optional()
}

/// Adds a timing point to a stage and returns its ID.
pub fn add_timing_point(
    conn: &mut rusqlite::Connection,
    stage_id: i64,
    point: &TimingPointDetails,
) -> Result<i64, InsertChildError> {
    enforce_foreign_keys(conn)?;
    match_constraint_violation!(
        conn.execute(
            "INSERT INTO timing_point (stage_id, name, description, latitude, longitude,
                point_type, order_index)
            VALUES (:stage_id, :name, :description, :latitude, :longitude,
                :point_type, :order_index)",
            named_params! {
                ":stage_id": stage_id,
                ":name": point.name,
                ":description": point.description,
                ":latitude": point.latitude,
                ":longitude": point.longitude,
                ":point_type": point.point_type,
                ":order_index": point.order_index,
            },
        ),
        InsertChildError::UnknownParent
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_timing_point(
    conn: &mut rusqlite::Connection,
    id: i64,
    point: &TimingPointDetails,
) -> Result<(), ModifyError> {
    let changed = conn.execute(
        "UPDATE timing_point
        SET name = :name, description = :description, latitude = :latitude,
            longitude = :longitude, point_type = :point_type, order_index = :order_index
        WHERE timing_point_id == :id",
        named_params! {
            ":id": id,
            ":name": point.name,
            ":description": point.description,
            ":latitude": point.latitude,
            ":longitude": point.longitude,
            ":point_type": point.point_type,
            ":order_index": point.order_index,
        },
    )?;
    expect_one_row(changed)
}

pub fn delete_timing_point(conn: &mut rusqlite::Connection, id: i64) -> Result<(), ModifyError> {
    let changed = conn.execute(
        "DELETE FROM timing_point
        WHERE timing_point_id == :id",
        named_params! { ":id": id },
    )?;
    expect_one_row(changed)
}

// ---------------------------------------------------------------------------------------------
// registrations

#[derive(Debug, Error)]
pub enum ApplyRegistrationError {
    #[error("Database or query error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("Serializing the registration failed: {0}")]
    SerializeError(#[from] serde_json::Error),
    #[error("Driver is already registered for this rally")]
    AlreadyRegistered,
    #[error("The rally doesn't exist (anymore)")]
    UnknownRally,
}

/// Stores a finished wizard as a pending registration of `driver_id` for `rally_id`, together
/// with the vehicle. The co-driver is linked to a profile if one with their email exists.
pub fn submit_registration(
    conn: &mut rusqlite::Connection,
    driver_id: i64,
    rally_id: i64,
    registration: &CompleteRegistration,
) -> Result<i64, ApplyRegistrationError> {
    enforce_foreign_keys(conn)?;
    let details = serde_json::to_string(registration)?;
    let vehicle_details = serde_json::to_string(&registration.vehicle_info)?;
    let vehicle = &registration.vehicle_info;
    let co_driver = &registration.personal_info.co_driver;

    let transaction = conn.transaction()?;
    transaction.execute(
        "INSERT INTO vehicle (owner_id, make, model, year, registration_number, category,
            group_name, class, details)
        VALUES (:owner_id, :make, :model, :year, :registration_number, :category,
            :group_name, :class, :details)",
        named_params! {
            ":owner_id": driver_id,
            ":make": vehicle.make.trim(),
            ":model": vehicle.model.trim(),
            ":year": vehicle.year,
            ":registration_number": vehicle.registration_number.trim(),
            ":category": vehicle.category.trim(),
            ":group_name": vehicle.group.trim(),
            ":class": vehicle.class.trim(),
            ":details": vehicle_details,
        },
    )?;
    let vehicle_id = transaction.last_insert_rowid();

    let co_driver_id: Option<i64> = transaction
        .query_row(
            "SELECT profile_id FROM profile WHERE email == :email",
            named_params! { ":email": co_driver.email.trim().to_lowercase() },
            |row| row.get(0),
        )
        .optional()?;

    let inserted = transaction.execute(
        "INSERT INTO registration (rally_id, driver_id, co_driver_id, co_driver_name,
            vehicle_id, status, details)
        VALUES (:rally_id, :driver_id, :co_driver_id, :co_driver_name,
            :vehicle_id, 'pending', :details)",
        named_params! {
            ":rally_id": rally_id,
            ":driver_id": driver_id,
            ":co_driver_id": co_driver_id,
            ":co_driver_name": co_driver.full_name(),
            ":vehicle_id": vehicle_id,
            ":details": details,
        },
    );
    // the driver and the vehicle are known by now, so a broken reference can only be the rally
    match inserted {
        Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::ConstraintViolation,
                extended_code,
            },
            _,
        )) => {
            return Err(if extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
                ApplyRegistrationError::UnknownRally
            } else {
                ApplyRegistrationError::AlreadyRegistered
            })
        }
        Err(err) => return Err(err.into()),
        Ok(_) => (),
    }
    let registration_id = transaction.last_insert_rowid();

    transaction.execute(
        "DELETE FROM registration_draft WHERE profile_id == :profile_id",
        named_params! { ":profile_id": driver_id },
    )?;
    transaction.commit()?;
    Ok(registration_id)
}

/// Lists the crews registered for a rally, sorted by driver name.
pub fn list_crews(conn: &mut rusqlite::Connection, rally_id: i64) -> rusqlite::Result<Vec<Crew>> {
    let mut statement = conn.prepare(
        "SELECT registration.registration_id, registration.rally_id, registration.status,
            driver.profile_id, driver.first_name, driver.last_name, driver.email,
            co_driver.profile_id, co_driver.first_name, co_driver.last_name, co_driver.email,
            registration.co_driver_name,
            vehicle.vehicle_id, vehicle.make, vehicle.model, vehicle.year,
            vehicle.registration_number, vehicle.category, vehicle.group_name, vehicle.class,
            registration.created_at
        FROM registration
        JOIN profile AS driver ON (driver.profile_id == registration.driver_id)
        LEFT OUTER JOIN profile AS co_driver ON (co_driver.profile_id == registration.co_driver_id)
        LEFT OUTER JOIN vehicle ON (vehicle.vehicle_id == registration.vehicle_id)
        WHERE registration.rally_id == :rally_id
        ORDER BY driver.last_name, driver.first_name",
    )?;
    let crews = statement
        .query_map(named_params! { ":rally_id": rally_id }, |row| {
            let co_driver = match row.get::<_, Option<i64>>(7)? {
                Some(id) => Some(ProfileSummary {
                    id,
                    first_name: row.get(8)?,
                    last_name: row.get(9)?,
                    email: row.get(10)?,
                }),
                None => None,
            };
            let vehicle = match row.get::<_, Option<i64>>(12)? {
                Some(id) => Some(VehicleSummary {
                    id,
                    make: row.get(13)?,
                    model: row.get(14)?,
                    year: row.get(15)?,
                    registration_number: row.get(16)?,
                    category: row.get(17)?,
                    group: row.get(18)?,
                    class: row.get(19)?,
                }),
                None => None,
            };
            Ok(Crew {
                registration_id: row.get(0)?,
                rally_id: row.get(1)?,
                status: row.get(2)?,
                driver: ProfileSummary {
                    id: row.get(3)?,
                    first_name: row.get(4)?,
                    last_name: row.get(5)?,
                    email: row.get(6)?,
                },
                co_driver,
                co_driver_name: row.get(11)?,
                vehicle,
                created_at: row.get(20)?,
            })
        })?
        .collect();
    crews
}

/// Lists what a profile registered for, newest first.
pub fn list_own_registrations(
    conn: &mut rusqlite::Connection,
    profile_id: i64,
) -> rusqlite::Result<Vec<OwnRegistration>> {
    let mut statement = conn.prepare(
        "SELECT registration.registration_id, rally.rally_id, rally.name, registration.status
        FROM registration
        JOIN rally ON (rally.rally_id == registration.rally_id)
        WHERE registration.driver_id == :profile_id OR registration.co_driver_id == :profile_id
        ORDER BY registration.created_at DESC, registration.registration_id DESC",
    )?;
    let registrations = statement
        .query_map(named_params! { ":profile_id": profile_id }, |row| {
            Ok(OwnRegistration {
                registration_id: row.get(0)?,
                rally_id: row.get(1)?,
                rally_name: row.get(2)?,
                status: row.get(3)?,
            })
        })?
        .collect();
    registrations
}

pub fn set_registration_status(
    conn: &mut rusqlite::Connection,
    rally_id: i64,
    registration_id: i64,
    status: RegistrationStatus,
) -> Result<(), ModifyError> {
    let changed = conn.execute(
        "UPDATE registration
        SET status = :status
        WHERE registration_id == :id AND rally_id == :rally_id",
        named_params! { ":id": registration_id, ":rally_id": rally_id, ":status": status },
    )?;
    expect_one_row(changed)
}

// ---------------------------------------------------------------------------------------------
// drafts

#[derive(Debug, Error)]
pub enum DraftError {
    #[error("Database or query error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("Stored draft is unreadable: {0}")]
    SerdeError(#[from] serde_json::Error),
}

/// Loads the wizard draft of a profile, if one was saved.
pub fn load_draft(
    conn: &mut rusqlite::Connection,
    profile_id: i64,
) -> Result<Option<RegistrationDraft>, DraftError> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT draft FROM registration_draft WHERE profile_id == :profile_id",
            named_params! { ":profile_id": profile_id },
            |row| row.get(0),
        )
        .optional()?;
    Ok(stored.map(|json| serde_json::from_str(&json)).transpose()?)
}

/// Stores the wizard draft of a profile, replacing the previous one.
pub fn save_draft(
    conn: &mut rusqlite::Connection,
    profile_id: i64,
    draft: &RegistrationDraft,
) -> Result<(), DraftError> {
    conn.execute(
        "INSERT INTO registration_draft (profile_id, draft, updated_at)
        VALUES (:profile_id, :draft, CURRENT_TIMESTAMP)
        ON CONFLICT(profile_id)
            DO UPDATE SET draft = :draft, updated_at = CURRENT_TIMESTAMP",
        named_params! {
            ":profile_id": profile_id,
            ":draft": serde_json::to_string(draft)?,
        },
    )?;
    Ok(())
}
