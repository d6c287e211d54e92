//! What the browser-side map widget is told to draw.
//!
//! The map itself is rendered client-side by the tile provider. The server decides the
//! markers, the viewport and which form inputs a click should fill, and hands that over as
//! JSON. Without an access token no map can be drawn and the page shows an error panel with a
//! retry link instead.

use serde::Serialize;
use thiserror::Error;

use crate::sql_interface::{PointType, Stage, TimingPoint};

/// Roughly the middle of metropolitan France, used when nothing else is known.
const FALLBACK_CENTER: Coordinate = Coordinate {
    latitude: 46.6,
    longitude: 2.4,
};
const FALLBACK_ZOOM: f64 = 5.0;
const STAGE_ZOOM: f64 = 12.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    #[must_use]
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        Some(Self {
            latitude: latitude?,
            longitude: longitude?,
        })
    }

    #[must_use]
    pub fn midpoint(points: &[Coordinate]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let count = points.len() as f64;
        Some(Self {
            latitude: points.iter().map(|c| c.latitude).sum::<f64>() / count,
            longitude: points.iter().map(|c| c.longitude).sum::<f64>() / count,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    StageStart,
    StageFinish,
    Start,
    Split,
    Finish,
}

impl From<PointType> for MarkerKind {
    fn from(point_type: PointType) -> Self {
        match point_type {
            PointType::Start => MarkerKind::Start,
            PointType::Split => MarkerKind::Split,
            PointType::Finish => MarkerKind::Finish,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MapMarker {
    pub kind: MarkerKind,
    pub label: String,
    #[serde(flatten)]
    pub position: Coordinate,
}

/// A pair of form inputs a map click writes into.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MapTarget {
    pub label: String,
    pub latitude_input: String,
    pub longitude_input: String,
}

impl MapTarget {
    #[must_use]
    pub fn new(label: &str, latitude_input: &str, longitude_input: &str) -> Self {
        Self {
            label: label.to_string(),
            latitude_input: latitude_input.to_string(),
            longitude_input: longitude_input.to_string(),
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    #[error("No map access token configured")]
    MissingAccessToken,
}

impl MapError {
    /// What the error panel tells the user.
    #[must_use]
    pub fn user_message(self) -> &'static str {
        match self {
            MapError::MissingAccessToken => "The map is currently unavailable.",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MapView {
    pub access_token: String,
    pub center: Coordinate,
    pub zoom: f64,
    pub markers: Vec<MapMarker>,
    /// Empty for read-only maps.
    pub targets: Vec<MapTarget>,
}

impl MapView {
    /// A map of a stage with its start, finish and timing points.
    ///
    /// Timing points are expected in display order; their labels carry the position.
    pub fn for_stage(
        access_token: Option<&str>,
        stage: Option<&Stage>,
        timing_points: &[TimingPoint],
        targets: Vec<MapTarget>,
    ) -> Result<Self, MapError> {
        let access_token = access_token
            .filter(|token| !token.trim().is_empty())
            .ok_or(MapError::MissingAccessToken)?
            .to_string();

        let mut markers = Vec::new();
        if let Some(stage) = stage {
            let details = &stage.details;
            if let Some(start) =
                Coordinate::from_parts(details.start_latitude, details.start_longitude)
            {
                markers.push(MapMarker {
                    kind: MarkerKind::StageStart,
                    label: format!("{} (start)", details.name),
                    position: start,
                });
            }
            if let Some(finish) =
                Coordinate::from_parts(details.finish_latitude, details.finish_longitude)
            {
                markers.push(MapMarker {
                    kind: MarkerKind::StageFinish,
                    label: format!("{} (finish)", details.name),
                    position: finish,
                });
            }
        }
        markers.extend(timing_points.iter().map(|point| MapMarker {
            kind: point.details.point_type.into(),
            label: format!("{}. {}", point.details.order_index, point.details.name),
            position: Coordinate {
                latitude: point.details.latitude,
                longitude: point.details.longitude,
            },
        }));

        let positions: Vec<_> = markers.iter().map(|marker| marker.position).collect();
        let (center, zoom) = match Coordinate::midpoint(&positions) {
            Some(center) => (
                center,
                stage
                    .and_then(|stage| stage.details.map_zoom)
                    .unwrap_or(STAGE_ZOOM),
            ),
            None => (FALLBACK_CENTER, FALLBACK_ZOOM),
        };

        Ok(Self {
            access_token,
            center,
            zoom,
            markers,
            targets,
        })
    }

    /// Serializes for embedding in a `<script type="application/json">` element.
    ///
    /// `<` is escaped so no marker label can close the element.
    #[must_use]
    pub fn to_embedded_json(&self) -> String {
        serde_json::to_string(self)
            .map(|json| json.replace('<', "\\u003c"))
            .unwrap_or_else(|_| "null".to_string())
    }
}

/// What templates get for a map: either a drawable view or the reason there is none.
#[derive(Clone, Debug, Serialize)]
pub struct MapSlot {
    pub json: Option<String>,
    pub error: Option<&'static str>,
}

impl From<Result<MapView, MapError>> for MapSlot {
    fn from(result: Result<MapView, MapError>) -> Self {
        match result {
            Ok(view) => Self {
                json: Some(view.to_embedded_json()),
                error: None,
            },
            Err(err) => {
                log::warn!("Cannot render map: {err}");
                Self {
                    json: None,
                    error: Some(err.user_message()),
                }
            }
        }
    }
}
