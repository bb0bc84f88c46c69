use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::geo::Coordinates;
use crate::user::{DriverSummary, Vehicle};
use crate::{CoreError, CoreResult};

/// Seat bounds shared by ride posting and booking requests.
pub const MIN_SEATS: i32 = 1;
pub const MAX_SEATS: i32 = 8;

pub const DEFAULT_CURRENCY: &str = "USD";

/// Upper bound on a per-seat price so totals stay within `i32`.
pub const MAX_PRICE_AMOUNT: i32 = 10_000_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    Open,
    Full,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Open => "open",
            RideStatus::Full => "full",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RideStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(RideStatus::Open),
            "full" => Ok(RideStatus::Full),
            "completed" => Ok(RideStatus::Completed),
            "cancelled" => Ok(RideStatus::Cancelled),
            other => Err(CoreError::Store(format!("Unknown ride status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub label: String,
    pub lat: f64,
    pub lng: f64,
}

impl Place {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates { lat: self.lat, lng: self.lng }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub origin: Place,
    pub destination: Place,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: Option<DateTime<Utc>>,
    /// Per-seat price in minor currency units.
    pub price_amount: i32,
    pub currency: String,
    pub seats_total: i32,
    pub seats_available: i32,
    pub status: RideStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ride {
    /// Builds an open ride from an already validated request.
    pub fn new(driver_id: Uuid, new_ride: NewRide, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            driver_id,
            origin: trim_label(new_ride.origin),
            destination: trim_label(new_ride.destination),
            departure_time: new_ride.departure_time,
            arrival_time: new_ride.arrival_time,
            price_amount: new_ride.price_amount,
            currency: new_ride
                .currency
                .map(|c| c.trim().to_ascii_uppercase())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            seats_total: new_ride.seats_total,
            seats_available: new_ride.seats_total,
            status: RideStatus::Open,
            created_at: now,
            updated_at: now,
        }
    }

    /// Takes `seats` off the ride, flipping it to `Full` at zero.
    ///
    /// Callers check bookability first; this only guards the capacity
    /// invariant.
    pub fn reserve(&mut self, seats: i32, now: DateTime<Utc>) -> CoreResult<()> {
        if seats < MIN_SEATS || seats > self.seats_available || self.status != RideStatus::Open {
            return Err(CoreError::Conflict(format!(
                "Cannot reserve {} seats on a {} ride with {} available",
                seats, self.status, self.seats_available
            )));
        }
        self.seats_available -= seats;
        if self.seats_available == 0 {
            self.status = RideStatus::Full;
        }
        self.updated_at = now;
        Ok(())
    }
}

fn trim_label(place: Place) -> Place {
    Place { label: place.label.trim().to_string(), ..place }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRide {
    pub origin: Place,
    pub destination: Place,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: Option<DateTime<Utc>>,
    pub seats_total: i32,
    pub price_amount: i32,
    pub currency: Option<String>,
}

impl NewRide {
    pub fn validate(&self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.origin.label.trim().is_empty() {
            return Err(CoreError::Validation("Origin location is required".to_string()));
        }
        if self.destination.label.trim().is_empty() {
            return Err(CoreError::Validation("Destination location is required".to_string()));
        }
        self.origin.coordinates().validate()?;
        self.destination.coordinates().validate()?;

        if !(MIN_SEATS..=MAX_SEATS).contains(&self.seats_total) {
            return Err(CoreError::Validation(format!(
                "Seats must be between {} and {}",
                MIN_SEATS, MAX_SEATS
            )));
        }
        if self.price_amount <= 0 {
            return Err(CoreError::Validation("Price must be a positive number".to_string()));
        }
        if self.price_amount > MAX_PRICE_AMOUNT {
            return Err(CoreError::Validation("Price is too high".to_string()));
        }
        if let Some(currency) = &self.currency {
            let currency = currency.trim();
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(CoreError::Validation(format!("Invalid currency: {}", currency)));
            }
        }
        if self.departure_time <= now {
            return Err(CoreError::Validation("Departure time must be in the future".to_string()));
        }
        if let Some(arrival) = self.arrival_time {
            if arrival <= self.departure_time {
                return Err(CoreError::Validation(
                    "Arrival time must be after departure time".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// A ride together with its driver and vehicle, as shown to riders.
#[derive(Debug, Clone, Serialize)]
pub struct RideDetails {
    pub ride: Ride,
    pub driver: DriverSummary,
    pub vehicle: Option<Vehicle>,
}
