//! Great-circle distance between coordinates.

use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> CoreResult<Self> {
        let coords = Self { lat, lng };
        coords.validate()?;
        Ok(coords)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(CoreError::Validation(format!("Invalid latitude: {}", self.lat)));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(CoreError::Validation(format!("Invalid longitude: {}", self.lng)));
        }
        Ok(())
    }
}

/// Distance in kilometers using the spherical law of cosines.
///
/// The `acos` argument is clamped: rounding can push it past 1.0 for
/// coincident points, which would otherwise yield NaN.
pub fn great_circle_km(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlng = b.lng.to_radians() - a.lng.to_radians();
    let cos_c = lat1.cos() * lat2.cos() * dlng.cos() + lat1.sin() * lat2.sin();
    EARTH_RADIUS_KM * cos_c.clamp(-1.0, 1.0).acos()
}
