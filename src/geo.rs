//! Plain latitude/longitude primitives
//!
//! No projections and no spatial indexing: a point is a lat/lon pair and a
//! bounding region is the smallest rectangle around the points fed into it.

use serde::{Deserialize, Serialize};

/// A WGS84 coordinate pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lon: f64,
}

impl LatLng {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl From<(f64, f64)> for LatLng {
    fn from((lat, lon): (f64, f64)) -> Self {
        Self::new(lat, lon)
    }
}

/// A non-empty rectangle, the only thing a viewport can be fitted to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl Region {
    pub fn contains(&self, point: LatLng) -> bool {
        point.lat >= self.south_west.lat
            && point.lat <= self.north_east.lat
            && point.lon >= self.south_west.lon
            && point.lon <= self.north_east.lon
    }
}

/// Bounding region accumulated from points
///
/// Starts empty. An empty region is invalid and must never be handed to a
/// viewport fit; check [`Bounds::is_valid`] first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Bounds {
    corners: Option<(LatLng, LatLng)>,
}

impl Bounds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grow the region so it contains `point`
    pub fn extend(&mut self, point: LatLng) {
        self.corners = Some(match self.corners {
            None => (point, point),
            Some((sw, ne)) => (
                LatLng::new(sw.lat.min(point.lat), sw.lon.min(point.lon)),
                LatLng::new(ne.lat.max(point.lat), ne.lon.max(point.lon)),
            ),
        });
    }

    /// True once at least one point has been added
    pub fn is_valid(&self) -> bool {
        self.corners.is_some()
    }

    /// The fit-able region, `None` while empty
    pub fn region(&self) -> Option<Region> {
        self.corners.map(|(south_west, north_east)| Region {
            south_west,
            north_east,
        })
    }

    pub fn south_west(&self) -> Option<LatLng> {
        self.corners.map(|(sw, _)| sw)
    }

    pub fn north_east(&self) -> Option<LatLng> {
        self.corners.map(|(_, ne)| ne)
    }

    pub fn contains(&self, point: LatLng) -> bool {
        self.region().is_some_and(|region| region.contains(point))
    }
}

impl FromIterator<LatLng> for Bounds {
    fn from_iter<I: IntoIterator<Item = LatLng>>(iter: I) -> Self {
        let mut bounds = Bounds::new();
        for point in iter {
            bounds.extend(point);
        }
        bounds
    }
}
