use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::{great_circle_km, Coordinates};
use crate::ride::{Ride, RideStatus};
use crate::user::{DriverSummary, Vehicle};
use crate::{CoreError, CoreResult};

pub const DEFAULT_RADIUS_KM: f64 = 50.0;
pub const MAX_RADIUS_KM: f64 = 500.0;
pub const MAX_RESULTS: usize = 50;

/// Search limits, loaded from configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchPolicy {
    pub default_radius_km: f64,
    pub max_radius_km: f64,
    pub max_results: usize,
}

impl Default for SearchPolicy {
    fn default() -> Self {
        Self {
            default_radius_km: DEFAULT_RADIUS_KM,
            max_radius_km: MAX_RADIUS_KM,
            max_results: MAX_RESULTS,
        }
    }
}

impl SearchPolicy {
    /// Rejects limits under which no search could ever return a ride.
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_results == 0 {
            return Err(CoreError::Validation("search.max_results must be at least 1".to_string()));
        }
        if !self.default_radius_km.is_finite() || self.default_radius_km <= 0.0 {
            return Err(CoreError::Validation(format!(
                "search.default_radius_km must be positive, got {}",
                self.default_radius_km
            )));
        }
        if !self.max_radius_km.is_finite() || self.max_radius_km < self.default_radius_km {
            return Err(CoreError::Validation(format!(
                "search.max_radius_km must be at least the default radius, got {}",
                self.max_radius_km
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NearbyQuery {
    pub origin: Coordinates,
    pub radius_km: f64,
    /// The querier; their own rides are never returned.
    pub exclude_user: Option<Uuid>,
    pub limit: usize,
}

impl NearbyQuery {
    pub fn new(
        lat: Option<f64>,
        lng: Option<f64>,
        radius_km: Option<f64>,
        exclude_user: Option<Uuid>,
        policy: &SearchPolicy,
    ) -> CoreResult<Self> {
        let (lat, lng) = match (lat, lng) {
            (Some(lat), Some(lng)) => (lat, lng),
            _ => {
                return Err(CoreError::Validation(
                    "Latitude and longitude are required".to_string(),
                ))
            }
        };
        let origin = Coordinates::new(lat, lng)?;

        let radius_km = radius_km.unwrap_or(policy.default_radius_km);
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(CoreError::Validation(format!("Invalid radius: {}", radius_km)));
        }

        Ok(Self {
            origin,
            radius_km: radius_km.min(policy.max_radius_km),
            exclude_user,
            limit: policy.max_results.min(MAX_RESULTS),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NearbyRide {
    pub ride: Ride,
    pub driver: DriverSummary,
    pub vehicle: Option<Vehicle>,
    pub distance_km: f64,
}

/// Filters `rides` down to bookable ones inside the query radius and ranks
/// them by distance, then departure time.
pub fn rank_nearby<'a, I>(rides: I, query: &NearbyQuery, now: DateTime<Utc>) -> Vec<(&'a Ride, f64)>
where
    I: IntoIterator<Item = &'a Ride>,
{
    let mut hits: Vec<(&Ride, f64)> = rides
        .into_iter()
        .filter(|ride| {
            ride.status == RideStatus::Open
                && ride.seats_available > 0
                && ride.departure_time > now
                && Some(ride.driver_id) != query.exclude_user
        })
        .map(|ride| (ride, great_circle_km(query.origin, ride.origin.coordinates())))
        .filter(|(_, distance)| *distance <= query.radius_km)
        .collect();

    hits.sort_by(|(a, da), (b, db)| {
        da.total_cmp(db).then_with(|| a.departure_time.cmp(&b.departure_time))
    });
    hits.truncate(query.limit);
    hits
}
