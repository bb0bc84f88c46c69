use chrono::{DateTime, Utc};
use ridepool_shared::pii::Masked;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::ride::{Ride, RideStatus, MAX_SEATS, MIN_SEATS};
use crate::user::{DriverSummary, Vehicle};
use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Paid,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Paid => "paid",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Active bookings count against the one-booking-per-ride rule.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Paid)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "paid" => Ok(BookingStatus::Paid),
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(CoreError::Store(format!("Unknown booking status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub rider_id: Uuid,
    pub seats_booked: i32,
    pub price_per_seat: i32,
    pub total_price: i32,
    pub currency: String,
    pub status: BookingStatus,
    pub payment_reference: Option<Masked<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Prices the booking from the ride. Paid up front when a payment
    /// reference came with the request.
    pub fn for_ride(ride: &Ride, cmd: &BookingCommand, now: DateTime<Utc>) -> Self {
        let status = if cmd.payment_reference.is_some() {
            BookingStatus::Paid
        } else {
            BookingStatus::Pending
        };

        Self {
            id: Uuid::new_v4(),
            ride_id: ride.id,
            rider_id: cmd.rider_id,
            seats_booked: cmd.seats,
            price_per_seat: ride.price_amount,
            total_price: ride.price_amount * cmd.seats,
            currency: ride.currency.clone(),
            status,
            payment_reference: cmd.payment_reference.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition: Pending → Paid.
    ///
    /// Returns `Ok(false)` when the booking is already paid with the same
    /// reference, so retried confirmations are harmless.
    pub fn confirm_payment(&mut self, reference: &str, now: DateTime<Utc>) -> CoreResult<bool> {
        match self.status {
            BookingStatus::Pending => {
                self.status = BookingStatus::Paid;
                self.payment_reference = Some(Masked::new(reference.to_string()));
                self.updated_at = now;
                Ok(true)
            }
            BookingStatus::Paid
                if self.payment_reference.as_ref().map(|r| r.expose().as_str()) == Some(reference) =>
            {
                Ok(false)
            }
            status => Err(CoreError::Conflict(format!(
                "Booking is {} and cannot be marked paid",
                status
            ))),
        }
    }
}

/// A booking request after the rider identity has been resolved.
#[derive(Debug, Clone)]
pub struct BookingCommand {
    pub ride_id: Uuid,
    pub rider_id: Uuid,
    pub seats: i32,
    pub payment_reference: Option<Masked<String>>,
}

/// Seat counts are checked before anything touches the store.
pub fn validate_seat_count(seats_requested: i64) -> CoreResult<i32> {
    if seats_requested < MIN_SEATS as i64 || seats_requested > MAX_SEATS as i64 {
        return Err(CoreError::Validation("Invalid number of seats".to_string()));
    }
    Ok(seats_requested as i32)
}

/// Ride-side booking preconditions, in the order they are reported: the ride
/// must be open, have enough seats, and not belong to the rider.
pub fn check_bookable(ride: &Ride, cmd: &BookingCommand) -> CoreResult<()> {
    if ride.status != RideStatus::Open {
        return Err(CoreError::Conflict(format!(
            "Ride is {} and cannot accept bookings",
            ride.status
        )));
    }
    if ride.seats_available < cmd.seats {
        return Err(CoreError::Conflict(format!(
            "Only {} seats available, you requested {}",
            ride.seats_available, cmd.seats
        )));
    }
    if ride.driver_id == cmd.rider_id {
        return Err(CoreError::Conflict("Driver cannot book their own ride".to_string()));
    }
    Ok(())
}

pub fn duplicate_booking() -> CoreError {
    CoreError::Conflict("You already have a booking for this ride".to_string())
}

#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub booking: Booking,
    /// False when the booking was already paid with this reference.
    pub newly_paid: bool,
}

/// One row of a rider's trip history.
#[derive(Debug, Clone, Serialize)]
pub struct BookingHistoryEntry {
    pub booking: Booking,
    pub ride: Ride,
    pub driver: DriverSummary,
    pub vehicle: Option<Vehicle>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ride::{NewRide, Place};
    use chrono::Duration;

    fn ride(seats_total: i32, seats_available: i32) -> Ride {
        let now = Utc::now();
        let mut ride = Ride::new(
            Uuid::new_v4(),
            NewRide {
                origin: Place { label: "A".to_string(), lat: 40.0, lng: -74.0 },
                destination: Place { label: "B".to_string(), lat: 40.1, lng: -74.1 },
                departure_time: now + Duration::hours(1),
                arrival_time: None,
                seats_total,
                price_amount: 1200,
                currency: Some("usd".to_string()),
            },
            now,
        );
        ride.seats_available = seats_available;
        ride
    }

    fn command(ride: &Ride, seats: i32) -> BookingCommand {
        BookingCommand {
            ride_id: ride.id,
            rider_id: Uuid::new_v4(),
            seats,
            payment_reference: None,
        }
    }

    #[test]
    fn test_seat_count_bounds() {
        assert!(validate_seat_count(0).is_err());
        assert!(validate_seat_count(9).is_err());
        assert!(validate_seat_count(-1).is_err());
        assert_eq!(validate_seat_count(1).unwrap(), 1);
        assert_eq!(validate_seat_count(8).unwrap(), 8);
    }

    #[test]
    fn test_check_order_reports_status_before_seats() {
        let mut r = ride(4, 0);
        r.status = RideStatus::Full;
        let err = check_bookable(&r, &command(&r, 1)).unwrap_err();
        assert_eq!(err, CoreError::Conflict("Ride is full and cannot accept bookings".to_string()));
    }

    #[test]
    fn test_insufficient_seats() {
        let r = ride(4, 2);
        let err = check_bookable(&r, &command(&r, 3)).unwrap_err();
        assert_eq!(
            err,
            CoreError::Conflict("Only 2 seats available, you requested 3".to_string())
        );
    }

    #[test]
    fn test_driver_cannot_book_own_ride() {
        let r = ride(4, 4);
        let mut cmd = command(&r, 1);
        cmd.rider_id = r.driver_id;
        assert_eq!(
            check_bookable(&r, &cmd),
            Err(CoreError::Conflict("Driver cannot book their own ride".to_string()))
        );
    }

    #[test]
    fn test_status_follows_payment_reference() {
        let r = ride(4, 4);
        let now = Utc::now();

        let pending = Booking::for_ride(&r, &command(&r, 2), now);
        assert_eq!(pending.status, BookingStatus::Pending);
        assert_eq!(pending.total_price, 2400);
        assert_eq!(pending.currency, "USD");

        let mut cmd = command(&r, 1);
        cmd.payment_reference = Some(Masked::new("pi_123".to_string()));
        let paid = Booking::for_ride(&r, &cmd, now);
        assert_eq!(paid.status, BookingStatus::Paid);
    }

    #[test]
    fn test_confirm_payment_transitions() {
        let r = ride(4, 4);
        let now = Utc::now();
        let mut booking = Booking::for_ride(&r, &command(&r, 1), now);

        assert!(booking.confirm_payment("pi_1", now).unwrap());
        assert_eq!(booking.status, BookingStatus::Paid);

        // Same reference again is a no-op.
        assert!(!booking.confirm_payment("pi_1", now).unwrap());
        assert!(booking.confirm_payment("pi_2", now).is_err());

        booking.status = BookingStatus::Cancelled;
        assert!(booking.confirm_payment("pi_1", now).is_err());
    }
}
