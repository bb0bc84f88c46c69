use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::booking::{Booking, BookingCommand, BookingHistoryEntry, PaymentConfirmation};
use crate::ride::{Ride, RideDetails};
use crate::search::{NearbyQuery, NearbyRide};
use crate::user::{NewUser, User, Vehicle};
use crate::CoreResult;

/// Repository trait for user records
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_auth_id(&self, auth_id: &str) -> CoreResult<Option<User>>;

    /// Inserts the user, or returns the existing one for the same `auth_id`.
    async fn create_user(&self, new_user: &NewUser) -> CoreResult<User>;

    async fn upgrade_to_driver(&self, user_id: Uuid, vehicle: &Vehicle) -> CoreResult<User>;
}

/// Repository trait for rides and nearby search
#[async_trait]
pub trait RideRepository: Send + Sync {
    async fn create_ride(&self, ride: &Ride) -> CoreResult<()>;

    async fn get_ride(&self, id: Uuid) -> CoreResult<Option<RideDetails>>;

    async fn search_nearby(
        &self,
        query: &NearbyQuery,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<NearbyRide>>;
}

/// Repository trait for bookings.
///
/// Implementations must run `create_booking` as one atomic unit per ride:
/// ride lookup, `check_bookable`, the active-booking check, the insert and
/// the seat decrement either all happen or none do.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn create_booking(
        &self,
        cmd: &BookingCommand,
        now: DateTime<Utc>,
    ) -> CoreResult<Booking>;

    async fn confirm_payment(
        &self,
        booking_id: Uuid,
        rider_id: Uuid,
        reference: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<PaymentConfirmation>;

    /// Newest booking first.
    async fn list_for_rider(&self, rider_id: Uuid) -> CoreResult<Vec<BookingHistoryEntry>>;
}
