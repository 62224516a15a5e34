//! Failure taxonomy for the map engine
//!
//! Almost everything here is absorbed: logged where it happens and turned
//! into an empty or unchanged map. Only [`MapError::UnknownMap`] is meant for
//! the caller.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum MapError {
    /// The mapping library is not loaded; no map is rendered
    MissingDependency(String),
    /// A viewport fit was requested for an empty point set
    InvalidBounds,
    /// A border geometry file could not be fetched
    FetchFailure { descriptor_id: String, reason: String },
    /// A border geometry file was fetched but is not usable geometry
    InvalidGeometry { descriptor_id: String, reason: String },
    /// An async result arrived for a map that was destroyed or replaced
    StaleCallback { map_id: String },
    /// No live map is registered under this identifier
    UnknownMap(String),
}

impl MapError {
    /// Whether the engine logs and swallows this error instead of returning it
    pub fn is_absorbed(&self) -> bool {
        match self {
            MapError::MissingDependency(_) => true,
            MapError::InvalidBounds => true,
            MapError::FetchFailure { .. } => true,
            MapError::InvalidGeometry { .. } => true,
            MapError::StaleCallback { .. } => true,
            MapError::UnknownMap(_) => false,
        }
    }

    /// Classify a fetch error for a border descriptor
    pub fn from_reqwest_error(descriptor_id: &str, error: &reqwest::Error) -> Self {
        let reason = if error.is_timeout() {
            "request timed out".to_string()
        } else if error.is_connect() {
            "connection failed".to_string()
        } else if let Some(status) = error.status() {
            format!("HTTP {}", status.as_u16())
        } else if error.is_decode() {
            return MapError::InvalidGeometry {
                descriptor_id: descriptor_id.to_string(),
                reason: error.to_string(),
            };
        } else {
            error.to_string()
        };

        MapError::FetchFailure {
            descriptor_id: descriptor_id.to_string(),
            reason,
        }
    }
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::MissingDependency(what) => write!(f, "mapping surface unavailable: {}", what),
            MapError::InvalidBounds => write!(f, "cannot fit viewport to an empty bounding region"),
            MapError::FetchFailure { descriptor_id, reason } => {
                write!(f, "failed to fetch border layer '{}': {}", descriptor_id, reason)
            }
            MapError::InvalidGeometry { descriptor_id, reason } => {
                write!(f, "border layer '{}' is not valid geometry: {}", descriptor_id, reason)
            }
            MapError::StaleCallback { map_id } => {
                write!(f, "discarded result for replaced or destroyed map '{}'", map_id)
            }
            MapError::UnknownMap(map_id) => write!(f, "map '{}' not found", map_id),
        }
    }
}

impl std::error::Error for MapError {}
