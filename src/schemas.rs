//! Forms of the management dashboards and how they turn into storable details.
//!
//! Every form keeps the raw text the browser sent, so an invalid submission can be shown again
//! exactly as typed. Building a form from a stored entity and validating it unchanged yields the
//! same details again.

use serde::Serialize;

use crate::{
    date_helpers::{parse_form_date, parse_form_datetime, to_form_datetime},
    sql_interface::{
        PointType, Rally, RallyDetails, RallyStatus, Stage, StageDetails, StageStatus,
        TimingPoint, TimingPointDetails,
    },
    validation::{self, optional_text, FieldErrors},
};

fn optional_number(value: Option<f64>) -> String {
    value.map(|number| number.to_string()).unwrap_or_default()
}

fn optional_integer(value: Option<i64>) -> String {
    value.map(|number| number.to_string()).unwrap_or_default()
}

fn parse_status<T: std::str::FromStr>(value: &str) -> Result<T, &'static str> {
    value.trim().parse().map_err(|_| "please choose a valid status")
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, FromForm)]
pub struct RallyForm {
    pub name: String,
    pub location: String,
    pub description: String,
    pub start_date: String,
    pub end_date: String,
    pub registration_open: bool,
    pub registration_deadline: String,
    pub status: String,
}

impl Default for RallyForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            location: String::new(),
            description: String::new(),
            start_date: String::new(),
            end_date: String::new(),
            registration_open: true,
            registration_deadline: String::new(),
            status: RallyStatus::Upcoming.to_string(),
        }
    }
}

impl From<&Rally> for RallyForm {
    fn from(rally: &Rally) -> Self {
        let details = &rally.details;
        Self {
            name: details.name.clone(),
            location: details.location.clone(),
            description: details.description.clone().unwrap_or_default(),
            start_date: details.start_date.to_string(),
            end_date: details.end_date.to_string(),
            registration_open: details.registration_open,
            registration_deadline: details
                .registration_deadline
                .map(to_form_datetime)
                .unwrap_or_default(),
            status: details.status.to_string(),
        }
    }
}

impl RallyForm {
    pub fn validate(&self) -> Result<RallyDetails, FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.check("name", validation::required(&self.name));
        errors.check("location", validation::required(&self.location));

        let start_date = errors.parse(
            "start_date",
            parse_form_date(&self.start_date)
                .map_err(|_| "must be a date")
                .and_then(|date| date.ok_or("this field is required")),
        );
        let end_date = errors.parse(
            "end_date",
            parse_form_date(&self.end_date)
                .map_err(|_| "must be a date")
                .and_then(|date| date.ok_or("this field is required")),
        );
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                errors.add("end_date", "must not be before the start date");
            }
        }
        let registration_deadline = errors.parse(
            "registration_deadline",
            parse_form_datetime(&self.registration_deadline).map_err(|_| "must be a date and time"),
        );
        let status = errors.parse("status", parse_status::<RallyStatus>(&self.status));

        match (start_date, end_date, registration_deadline, status) {
            (Some(start_date), Some(end_date), Some(registration_deadline), Some(status))
                if errors.is_empty() =>
            {
                Ok(RallyDetails {
                    name: self.name.trim().to_string(),
                    location: self.location.trim().to_string(),
                    description: optional_text(&self.description),
                    start_date,
                    end_date,
                    registration_open: self.registration_open,
                    registration_deadline,
                    status,
                })
            }
            _ => Err(errors),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, FromForm)]
pub struct StageForm {
    pub name: String,
    pub location: String,
    pub description: String,
    pub distance: String,
    pub start_time: String,
    pub status: String,
    pub start_latitude: String,
    pub start_longitude: String,
    pub finish_latitude: String,
    pub finish_longitude: String,
    pub map_zoom: String,
    pub difficulty_level: String,
    pub route_type: String,
    pub stage_order: String,
    pub max_participants: String,
}

impl Default for StageForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            location: String::new(),
            description: String::new(),
            distance: String::new(),
            start_time: String::new(),
            status: StageStatus::Planned.to_string(),
            start_latitude: String::new(),
            start_longitude: String::new(),
            finish_latitude: String::new(),
            finish_longitude: String::new(),
            map_zoom: String::new(),
            difficulty_level: String::new(),
            route_type: String::new(),
            stage_order: String::new(),
            max_participants: String::new(),
        }
    }
}

impl From<&Stage> for StageForm {
    fn from(stage: &Stage) -> Self {
        let details = &stage.details;
        Self {
            name: details.name.clone(),
            location: details.location.clone(),
            description: details.description.clone().unwrap_or_default(),
            distance: details.distance.to_string(),
            start_time: details.start_time.map(to_form_datetime).unwrap_or_default(),
            status: details.status.to_string(),
            start_latitude: optional_number(details.start_latitude),
            start_longitude: optional_number(details.start_longitude),
            finish_latitude: optional_number(details.finish_latitude),
            finish_longitude: optional_number(details.finish_longitude),
            map_zoom: optional_number(details.map_zoom),
            difficulty_level: details.difficulty_level.clone().unwrap_or_default(),
            route_type: details.route_type.clone().unwrap_or_default(),
            stage_order: optional_integer(details.stage_order),
            max_participants: optional_integer(details.max_participants),
        }
    }
}

/// Validates a latitude/longitude input pair, which has to be given completely or not at all.
fn coordinate_pair(
    errors: &mut FieldErrors,
    (latitude_field, latitude): (&str, &str),
    (longitude_field, longitude): (&str, &str),
) -> (Option<f64>, Option<f64>) {
    let lat = errors.parse(latitude_field, validation::latitude(latitude)).flatten();
    let lon = errors.parse(longitude_field, validation::longitude(longitude)).flatten();
    match (lat, lon) {
        (Some(_), None) if longitude.trim().is_empty() => {
            errors.add(longitude_field, "latitude and longitude must be given together");
        }
        (None, Some(_)) if latitude.trim().is_empty() => {
            errors.add(latitude_field, "latitude and longitude must be given together");
        }
        _ => (),
    }
    (lat, lon)
}

impl StageForm {
    pub fn validate(&self) -> Result<StageDetails, FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.check("name", validation::required(&self.name));
        errors.check("location", validation::required(&self.location));
        let distance = errors.parse("distance", validation::positive_distance(&self.distance));
        let start_time = errors
            .parse(
                "start_time",
                parse_form_datetime(&self.start_time).map_err(|_| "must be a date and time"),
            )
            .flatten();
        let status = errors.parse("status", parse_status::<StageStatus>(&self.status));
        let (start_latitude, start_longitude) = coordinate_pair(
            &mut errors,
            ("start_latitude", &self.start_latitude),
            ("start_longitude", &self.start_longitude),
        );
        let (finish_latitude, finish_longitude) = coordinate_pair(
            &mut errors,
            ("finish_latitude", &self.finish_latitude),
            ("finish_longitude", &self.finish_longitude),
        );
        let map_zoom = errors
            .parse(
                "map_zoom",
                validation::number(&self.map_zoom).and_then(|zoom| match zoom {
                    Some(zoom) if !(0.0..=22.0).contains(&zoom) => {
                        Err("zoom must be between 0 and 22")
                    }
                    zoom => Ok(zoom),
                }),
            )
            .flatten();
        let stage_order = errors
            .parse("stage_order", validation::non_negative_integer(&self.stage_order))
            .flatten();
        let max_participants = errors
            .parse(
                "max_participants",
                validation::non_negative_integer(&self.max_participants),
            )
            .flatten();

        match (distance, status) {
            (Some(distance), Some(status)) if errors.is_empty() => Ok(StageDetails {
                name: self.name.trim().to_string(),
                location: self.location.trim().to_string(),
                description: optional_text(&self.description),
                distance,
                start_time,
                status,
                start_latitude,
                start_longitude,
                finish_latitude,
                finish_longitude,
                map_zoom,
                difficulty_level: optional_text(&self.difficulty_level),
                route_type: optional_text(&self.route_type),
                stage_order,
                max_participants,
            }),
            _ => Err(errors),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, FromForm)]
pub struct TimingPointForm {
    pub name: String,
    pub description: String,
    pub latitude: String,
    pub longitude: String,
    pub point_type: String,
    pub order_index: String,
}

impl Default for TimingPointForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            latitude: String::new(),
            longitude: String::new(),
            point_type: PointType::Split.to_string(),
            order_index: "0".to_string(),
        }
    }
}

impl From<&TimingPoint> for TimingPointForm {
    fn from(point: &TimingPoint) -> Self {
        let details = &point.details;
        Self {
            name: details.name.clone(),
            description: details.description.clone().unwrap_or_default(),
            latitude: details.latitude.to_string(),
            longitude: details.longitude.to_string(),
            point_type: details.point_type.to_string(),
            order_index: details.order_index.to_string(),
        }
    }
}

impl TimingPointForm {
    pub fn validate(&self) -> Result<TimingPointDetails, FieldErrors> {
        let mut errors = FieldErrors::new();
        errors.check("name", validation::required(&self.name));
        let latitude = errors.parse(
            "latitude",
            validation::latitude(&self.latitude).and_then(|lat| lat.ok_or("latitude is required")),
        );
        let longitude = errors.parse(
            "longitude",
            validation::longitude(&self.longitude)
                .and_then(|lon| lon.ok_or("longitude is required")),
        );
        let point_type = errors.parse(
            "point_type",
            self.point_type
                .trim()
                .parse::<PointType>()
                .map_err(|_| "must be start, split or finish"),
        );
        let order_index = errors.parse(
            "order_index",
            validation::non_negative_integer(&self.order_index)
                .and_then(|index| index.ok_or("this field is required")),
        );

        match (latitude, longitude, point_type, order_index) {
            (Some(latitude), Some(longitude), Some(point_type), Some(order_index))
                if errors.is_empty() =>
            {
                Ok(TimingPointDetails {
                    name: self.name.trim().to_string(),
                    description: optional_text(&self.description),
                    latitude,
                    longitude,
                    point_type,
                    order_index,
                })
            }
            _ => Err(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_stage_form() -> StageForm {
        StageForm {
            name: "ES3 Sisteron".to_string(),
            location: "Sisteron".to_string(),
            description: "Gravel and tarmac".to_string(),
            distance: "18.42".to_string(),
            start_time: "2025-01-24T08:15".to_string(),
            status: "planned".to_string(),
            start_latitude: "44.195".to_string(),
            start_longitude: "5.943".to_string(),
            finish_latitude: "44.25".to_string(),
            finish_longitude: "5.99".to_string(),
            map_zoom: "12".to_string(),
            difficulty_level: "hard".to_string(),
            route_type: "mixed".to_string(),
            stage_order: "3".to_string(),
            max_participants: "80".to_string(),
        }
    }

    #[test]
    fn zero_distance_is_rejected() {
        let form = StageForm {
            distance: "0".to_string(),
            ..filled_stage_form()
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.get("distance"), Some("distance must be positive"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn unchanged_stage_edit_roundtrips() {
        let details = filled_stage_form().validate().unwrap();
        let stage = Stage {
            id: 4,
            rally_id: 2,
            details: details.clone(),
        };

        let reopened = StageForm::from(&stage);
        assert_eq!(reopened.validate().unwrap(), details);
    }

    #[test]
    fn stage_requires_name_location_and_complete_coordinates() {
        let form = StageForm {
            name: " ".to_string(),
            location: String::new(),
            finish_longitude: String::new(),
            ..filled_stage_form()
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.get("name"), Some("this field is required"));
        assert_eq!(errors.get("location"), Some("this field is required"));
        assert_eq!(
            errors.get("finish_longitude"),
            Some("latitude and longitude must be given together")
        );

        let minimal = StageForm {
            name: "ES1".to_string(),
            location: "Gap".to_string(),
            distance: "9".to_string(),
            ..<StageForm as Default>::default()
        };
        let details = minimal.validate().unwrap();
        assert_eq!(details.status, StageStatus::Planned);
        assert_eq!(details.start_latitude, None);
        assert_eq!(details.stage_order, None);
    }

    #[test]
    fn timing_point_rules() {
        let form = TimingPointForm {
            name: "Split 1".to_string(),
            latitude: "44.2".to_string(),
            longitude: String::new(),
            point_type: "checkpoint".to_string(),
            order_index: "-1".to_string(),
            ..<TimingPointForm as Default>::default()
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.get("longitude"), Some("longitude is required"));
        assert_eq!(errors.get("point_type"), Some("must be start, split or finish"));
        assert_eq!(errors.get("order_index"), Some("must not be negative"));

        let valid = TimingPointForm {
            longitude: "5.9".to_string(),
            point_type: "finish".to_string(),
            order_index: "2".to_string(),
            ..form
        };
        let details = valid.validate().unwrap();
        assert_eq!(details.point_type, PointType::Finish);
        assert_eq!(details.order_index, 2);
    }

    #[test]
    fn rally_dates_must_be_ordered() {
        let form = RallyForm {
            name: "Rallye Monte-Carlo".to_string(),
            location: "Monaco".to_string(),
            start_date: "2025-01-26".to_string(),
            end_date: "2025-01-23".to_string(),
            ..<RallyForm as Default>::default()
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(errors.get("end_date"), Some("must not be before the start date"));

        let fixed = RallyForm {
            start_date: "2025-01-23".to_string(),
            end_date: "2025-01-26".to_string(),
            registration_deadline: "2025-01-10T23:59".to_string(),
            ..form
        };
        let details = fixed.validate().unwrap();
        assert_eq!(details.status, RallyStatus::Upcoming);
        assert!(details.registration_open);

        let rally = Rally {
            id: 1,
            details: details.clone(),
        };
        assert_eq!(RallyForm::from(&rally).validate().unwrap(), details);
    }
}
