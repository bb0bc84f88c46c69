use std::sync::Arc;

use chrono::{Datelike, Utc};
use ridepool_shared::pii::Masked;
use tracing::{debug, info};
use uuid::Uuid;

use crate::booking::{self, Booking, BookingCommand, BookingHistoryEntry, PaymentConfirmation};
use crate::repository::{BookingRepository, RideRepository, UserRepository};
use crate::ride::{NewRide, Ride, RideDetails};
use crate::search::{NearbyQuery, NearbyRide, SearchPolicy};
use crate::user::{NewUser, User, Vehicle};
use crate::{CoreError, CoreResult};

/// Booking request as received from a rider.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub ride_id: Uuid,
    pub seats_requested: i64,
    pub payment_reference: Option<Masked<String>>,
}

/// Entry point for every rider and driver operation. Holds the stores
/// explicitly; nothing here is global.
#[derive(Clone)]
pub struct RideService {
    users: Arc<dyn UserRepository>,
    rides: Arc<dyn RideRepository>,
    bookings: Arc<dyn BookingRepository>,
    policy: SearchPolicy,
}

impl RideService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        rides: Arc<dyn RideRepository>,
        bookings: Arc<dyn BookingRepository>,
        policy: SearchPolicy,
    ) -> Self {
        Self { users, rides, bookings, policy }
    }

    pub fn policy(&self) -> &SearchPolicy {
        &self.policy
    }

    pub async fn register_user(&self, new_user: NewUser) -> CoreResult<User> {
        new_user.validate()?;
        let user = self.users.create_user(&new_user).await?;
        info!("User registered: {} ({})", user.id, user.auth_id);
        Ok(user)
    }

    pub async fn driver_status(&self, auth_id: &str) -> CoreResult<bool> {
        Ok(self.resolve_user(auth_id).await?.is_driver)
    }

    pub async fn upgrade_to_driver(&self, auth_id: &str, vehicle: Vehicle) -> CoreResult<User> {
        vehicle.validate(Utc::now().year())?;
        let user = self.resolve_user(auth_id).await?;
        let user = self.users.upgrade_to_driver(user.id, &vehicle).await?;
        info!("User {} upgraded to driver ({})", user.id, vehicle.display_name());
        Ok(user)
    }

    pub async fn post_ride(&self, auth_id: &str, new_ride: NewRide) -> CoreResult<Ride> {
        let now = Utc::now();
        new_ride.validate(now)?;

        let driver = self.resolve_user(auth_id).await?;
        if !driver.is_driver {
            return Err(CoreError::Conflict(
                "Only verified drivers can post rides".to_string(),
            ));
        }

        let ride = Ride::new(driver.id, new_ride, now);
        self.rides.create_ride(&ride).await?;
        info!("Ride posted: {} by driver {}", ride.id, driver.id);
        Ok(ride)
    }

    pub async fn get_ride(&self, ride_id: Uuid) -> CoreResult<RideDetails> {
        self.rides
            .get_ride(ride_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("Ride not found".to_string()))
    }

    /// Unknown identities still search; they just exclude nobody.
    pub async fn search_nearby(
        &self,
        auth_id: &str,
        lat: Option<f64>,
        lng: Option<f64>,
        radius_km: Option<f64>,
    ) -> CoreResult<(NearbyQuery, Vec<NearbyRide>)> {
        let mut query = NearbyQuery::new(lat, lng, radius_km, None, &self.policy)?;
        query.exclude_user = self.users.find_by_auth_id(auth_id).await?.map(|u| u.id);

        let rides = self.rides.search_nearby(&query, Utc::now()).await?;
        debug!(
            "Found {} rides within {} km of ({}, {})",
            rides.len(),
            query.radius_km,
            query.origin.lat,
            query.origin.lng
        );
        Ok((query, rides))
    }

    pub async fn create_booking(&self, auth_id: &str, req: BookingRequest) -> CoreResult<Booking> {
        let seats = booking::validate_seat_count(req.seats_requested)?;
        let rider = self.resolve_user(auth_id).await?;

        let cmd = BookingCommand {
            ride_id: req.ride_id,
            rider_id: rider.id,
            seats,
            payment_reference: req.payment_reference,
        };
        debug!("Booking request: {:?}", cmd);

        let booking = self.bookings.create_booking(&cmd, Utc::now()).await?;
        info!(
            "Booking {} created on ride {}: {} seats, {}",
            booking.id, booking.ride_id, booking.seats_booked, booking.status
        );
        Ok(booking)
    }

    pub async fn confirm_payment(
        &self,
        auth_id: &str,
        booking_id: Uuid,
        reference: &str,
    ) -> CoreResult<PaymentConfirmation> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(CoreError::Validation("Payment reference is required".to_string()));
        }
        let rider = self.resolve_user(auth_id).await?;

        let confirmation = self
            .bookings
            .confirm_payment(booking_id, rider.id, reference, Utc::now())
            .await?;
        if confirmation.newly_paid {
            info!("Booking {} marked paid", booking_id);
        }
        Ok(confirmation)
    }

    pub async fn rider_bookings(&self, auth_id: &str) -> CoreResult<Vec<BookingHistoryEntry>> {
        let rider = self.resolve_user(auth_id).await?;
        self.bookings.list_for_rider(rider.id).await
    }

    async fn resolve_user(&self, auth_id: &str) -> CoreResult<User> {
        self.users
            .find_by_auth_id(auth_id)
            .await?
            .ok_or_else(|| CoreError::NotFound("User not found".to_string()))
    }
}
