use std::{fmt, str::FromStr};

use rusqlite::{
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
    Row, ToSql,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::sql_struct::SqlStruct;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown value '{0}'")]
pub struct UnknownVariant(pub String);

/// Declares an enum stored as lowercase text, both in SQL and in forms.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant(other.to_string())),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|err| FromSqlError::Other(Box::new(err)))
            }
        }
    };
}

text_enum! {
    /// What a profile is allowed to do. Organizers and admins manage rallies.
    Role {
        Driver => "driver",
        Organizer => "organizer",
        Admin => "admin",
    }
}

impl Role {
    /// Whether this role grants access to the management dashboards.
    #[must_use]
    pub fn is_organizer(self) -> bool {
        matches!(self, Role::Organizer | Role::Admin)
    }
}

text_enum! {
    /// Set by organizers, never derived from the dates.
    RallyStatus {
        Upcoming => "upcoming",
        Active => "active",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

text_enum! {
    StageStatus {
        Planned => "planned",
        Active => "active",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

text_enum! {
    PointType {
        Start => "start",
        Split => "split",
        Finish => "finish",
    }
}

text_enum! {
    RegistrationStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

/// A registered account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: lettre::Address,
    pub role: Role,

    /// Sign-in is refused until the confirmation link was followed.
    pub email_confirmed: bool,

    #[serde(skip_serializing)]
    pub password_hash: String,

    /// Hash of the pending email confirmation token, if any.
    #[serde(skip_serializing)]
    pub token: Option<String>,

    /// A UNIX timestamp in seconds after which the token is not accepted anymore.
    #[serde(skip_serializing)]
    pub token_expiration: Option<i64>,
}

impl Profile {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl SqlStruct for Profile {
    fn select_exprs() -> &'static [&'static str] {
        &[
            "profile.profile_id",
            "profile.first_name",
            "profile.last_name",
            "profile.email",
            "profile.role",
            "profile.email_confirmed",
            "profile.password_hash",
            "profile.token",
            "profile.token_expiration",
        ]
    }

    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            first_name: row.get(offset + 1)?,
            last_name: row.get(offset + 2)?,
            email: parse_address(row, offset + 3)?,
            role: row.get(offset + 4)?,
            email_confirmed: row.get(offset + 5)?,
            password_hash: row.get(offset + 6)?,
            token: row.get(offset + 7)?,
            token_expiration: row.get(offset + 8)?,
        })
    }
}

fn parse_address(row: &Row<'_>, index: usize) -> rusqlite::Result<lettre::Address> {
    row.get::<_, String>(index)?.parse().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(err))
    })
}

/// The part of a profile shown in crew lists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProfileSummary {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Everything about a rally an organizer can edit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RallyDetails {
    pub name: String,
    pub location: String,
    pub description: Option<String>,
    pub start_date: chrono::NaiveDate,
    pub end_date: chrono::NaiveDate,
    pub registration_open: bool,
    pub registration_deadline: Option<chrono::NaiveDateTime>,
    pub status: RallyStatus,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Rally {
    pub id: i64,
    #[serde(flatten)]
    pub details: RallyDetails,
}

impl SqlStruct for Rally {
    fn select_exprs() -> &'static [&'static str] {
        &[
            "rally.rally_id",
            "rally.name",
            "rally.location",
            "rally.description",
            "rally.start_date",
            "rally.end_date",
            "rally.registration_open",
            "rally.registration_deadline",
            "rally.status",
        ]
    }

    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            details: RallyDetails {
                name: row.get(offset + 1)?,
                location: row.get(offset + 2)?,
                description: row.get(offset + 3)?,
                start_date: row.get(offset + 4)?,
                end_date: row.get(offset + 5)?,
                registration_open: row.get(offset + 6)?,
                registration_deadline: row.get(offset + 7)?,
                status: row.get(offset + 8)?,
            },
        })
    }
}

/// Everything about a special stage an organizer can edit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageDetails {
    pub name: String,
    pub location: String,
    pub description: Option<String>,
    /// Length in kilometers, always positive.
    pub distance: f64,
    pub start_time: Option<chrono::NaiveDateTime>,
    pub status: StageStatus,
    pub start_latitude: Option<f64>,
    pub start_longitude: Option<f64>,
    pub finish_latitude: Option<f64>,
    pub finish_longitude: Option<f64>,
    pub map_zoom: Option<f64>,
    pub difficulty_level: Option<String>,
    pub route_type: Option<String>,
    pub stage_order: Option<i64>,
    pub max_participants: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Stage {
    pub id: i64,
    pub rally_id: i64,
    #[serde(flatten)]
    pub details: StageDetails,
}

impl SqlStruct for Stage {
    fn select_exprs() -> &'static [&'static str] {
        &[
            "rally_stage.stage_id",
            "rally_stage.rally_id",
            "rally_stage.name",
            "rally_stage.location",
            "rally_stage.description",
            "rally_stage.distance",
            "rally_stage.start_time",
            "rally_stage.status",
            "rally_stage.start_latitude",
            "rally_stage.start_longitude",
            "rally_stage.finish_latitude",
            "rally_stage.finish_longitude",
            "rally_stage.map_zoom",
            "rally_stage.difficulty_level",
            "rally_stage.route_type",
            "rally_stage.stage_order",
            "rally_stage.max_participants",
        ]
    }

    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            rally_id: row.get(offset + 1)?,
            details: StageDetails {
                name: row.get(offset + 2)?,
                location: row.get(offset + 3)?,
                description: row.get(offset + 4)?,
                distance: row.get(offset + 5)?,
                start_time: row.get(offset + 6)?,
                status: row.get(offset + 7)?,
                start_latitude: row.get(offset + 8)?,
                start_longitude: row.get(offset + 9)?,
                finish_latitude: row.get(offset + 10)?,
                finish_longitude: row.get(offset + 11)?,
                map_zoom: row.get(offset + 12)?,
                difficulty_level: row.get(offset + 13)?,
                route_type: row.get(offset + 14)?,
                stage_order: row.get(offset + 15)?,
                max_participants: row.get(offset + 16)?,
            },
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimingPointDetails {
    pub name: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub point_type: PointType,
    /// Display order within the stage. Neither unique nor contiguous.
    pub order_index: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimingPoint {
    pub id: i64,
    pub stage_id: i64,
    #[serde(flatten)]
    pub details: TimingPointDetails,
}

impl SqlStruct for TimingPoint {
    fn select_exprs() -> &'static [&'static str] {
        &[
            "timing_point.timing_point_id",
            "timing_point.stage_id",
            "timing_point.name",
            "timing_point.description",
            "timing_point.latitude",
            "timing_point.longitude",
            "timing_point.point_type",
            "timing_point.order_index",
        ]
    }

    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            stage_id: row.get(offset + 1)?,
            details: TimingPointDetails {
                name: row.get(offset + 2)?,
                description: row.get(offset + 3)?,
                latitude: row.get(offset + 4)?,
                longitude: row.get(offset + 5)?,
                point_type: row.get(offset + 6)?,
                order_index: row.get(offset + 7)?,
            },
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VehicleSummary {
    pub id: i64,
    pub make: String,
    pub model: String,
    pub year: String,
    pub registration_number: String,
    pub category: String,
    pub group: String,
    pub class: String,
}

/// A driver and optional co-driver registered together for a rally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Crew {
    pub registration_id: i64,
    pub rally_id: i64,
    pub status: RegistrationStatus,
    pub driver: ProfileSummary,
    /// Only set when the co-driver has an account of their own.
    pub co_driver: Option<ProfileSummary>,
    /// The co-driver's name as given in the registration form.
    pub co_driver_name: Option<String>,
    pub vehicle: Option<VehicleSummary>,
    pub created_at: chrono::NaiveDateTime,
}

/// A registration as seen by the person who submitted it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OwnRegistration {
    pub registration_id: i64,
    pub rally_id: i64,
    pub rally_name: String,
    pub status: RegistrationStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_enums_roundtrip_through_strings() {
        for status in StageStatus::ALL {
            assert_eq!(status.as_str().parse::<StageStatus>(), Ok(*status));
        }
        assert_eq!(
            "sprint".parse::<PointType>(),
            Err(UnknownVariant("sprint".to_string()))
        );
        assert_eq!(RallyStatus::Cancelled.to_string(), "cancelled");
        assert_eq!(
            serde_json::to_string(&PointType::Split).unwrap(),
            "\"split\""
        );
    }

    #[test]
    fn organizer_capability() {
        assert!(!Role::Driver.is_organizer());
        assert!(Role::Organizer.is_organizer());
        assert!(Role::Admin.is_organizer());
    }
}
