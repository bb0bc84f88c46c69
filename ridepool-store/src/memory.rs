//! In-memory backend for tests and local runs without Postgres.
//!
//! All state sits behind one async `RwLock`; a booking holds the write lock
//! for its whole check-and-write sequence, so bookings on the same ride are
//! serialized exactly like the row lock does in Postgres.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ridepool_core::booking::{
    check_bookable, duplicate_booking, Booking, BookingCommand, BookingHistoryEntry,
    PaymentConfirmation,
};
use ridepool_core::repository::{BookingRepository, RideRepository, UserRepository};
use ridepool_core::ride::{Ride, RideDetails};
use ridepool_core::search::{rank_nearby, NearbyQuery, NearbyRide};
use ridepool_core::user::{NewUser, User, Vehicle};
use ridepool_core::{CoreError, CoreResult};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    rides: HashMap<Uuid, Ride>,
    /// Insertion order, oldest first.
    bookings: Vec<Booking>,
}

impl State {
    fn user_by_auth_id(&self, auth_id: &str) -> Option<&User> {
        self.users.values().find(|u| u.auth_id == auth_id)
    }

    fn details(&self, ride: &Ride) -> CoreResult<RideDetails> {
        let driver = self.users.get(&ride.driver_id).ok_or_else(|| {
            CoreError::Store(format!("Driver {} missing for ride {}", ride.driver_id, ride.id))
        })?;
        Ok(RideDetails {
            ride: ride.clone(),
            driver: driver.driver_summary(),
            vehicle: driver.vehicle.clone(),
        })
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a ride as-is, skipping request validation. Seeds rides in
    /// states a driver cannot post directly.
    #[cfg(any(test, feature = "test-util"))]
    pub async fn insert_ride(&self, ride: Ride) {
        self.state.write().await.rides.insert(ride.id, ride);
    }

    pub async fn ride(&self, id: Uuid) -> Option<Ride> {
        self.state.read().await.rides.get(&id).cloned()
    }

    pub async fn bookings_for_ride(&self, ride_id: Uuid) -> Vec<Booking> {
        self.state
            .read()
            .await
            .bookings
            .iter()
            .filter(|b| b.ride_id == ride_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn find_by_auth_id(&self, auth_id: &str) -> CoreResult<Option<User>> {
        Ok(self.state.read().await.user_by_auth_id(auth_id).cloned())
    }

    async fn create_user(&self, new_user: &NewUser) -> CoreResult<User> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.user_by_auth_id(&new_user.auth_id) {
            return Ok(existing.clone());
        }
        let user = User::new(new_user, Utc::now());
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn upgrade_to_driver(&self, user_id: Uuid, vehicle: &Vehicle) -> CoreResult<User> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| CoreError::NotFound("User not found".to_string()))?;

        user.is_driver = true;
        user.vehicle = Some(Vehicle {
            make: vehicle.make.trim().to_string(),
            model: vehicle.model.trim().to_string(),
            year: vehicle.year,
            color: vehicle.color.trim().to_string(),
            plate: vehicle.plate.trim().to_string(),
        });
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

#[async_trait]
impl RideRepository for InMemoryStore {
    async fn create_ride(&self, ride: &Ride) -> CoreResult<()> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&ride.driver_id) {
            return Err(CoreError::NotFound("User not found".to_string()));
        }
        state.rides.insert(ride.id, ride.clone());
        Ok(())
    }

    async fn get_ride(&self, id: Uuid) -> CoreResult<Option<RideDetails>> {
        let state = self.state.read().await;
        state.rides.get(&id).map(|ride| state.details(ride)).transpose()
    }

    async fn search_nearby(
        &self,
        query: &NearbyQuery,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<NearbyRide>> {
        let state = self.state.read().await;
        rank_nearby(state.rides.values(), query, now)
            .into_iter()
            .map(|(ride, distance_km)| {
                let details = state.details(ride)?;
                Ok(NearbyRide {
                    ride: details.ride,
                    driver: details.driver,
                    vehicle: details.vehicle,
                    distance_km,
                })
            })
            .collect()
    }
}

#[async_trait]
impl BookingRepository for InMemoryStore {
    async fn create_booking(
        &self,
        cmd: &BookingCommand,
        now: DateTime<Utc>,
    ) -> CoreResult<Booking> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let ride = state
            .rides
            .get_mut(&cmd.ride_id)
            .ok_or_else(|| CoreError::NotFound("Ride not found".to_string()))?;

        check_bookable(ride, cmd)?;

        let has_active = state
            .bookings
            .iter()
            .any(|b| b.ride_id == cmd.ride_id && b.rider_id == cmd.rider_id && b.status.is_active());
        if has_active {
            return Err(duplicate_booking());
        }

        let booking = Booking::for_ride(ride, cmd, now);
        ride.reserve(cmd.seats, now)?;
        state.bookings.push(booking.clone());
        Ok(booking)
    }

    async fn confirm_payment(
        &self,
        booking_id: Uuid,
        rider_id: Uuid,
        reference: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<PaymentConfirmation> {
        let mut state = self.state.write().await;
        let booking = state
            .bookings
            .iter_mut()
            .find(|b| b.id == booking_id && b.rider_id == rider_id)
            .ok_or_else(|| CoreError::NotFound("Booking not found".to_string()))?;

        let newly_paid = booking.confirm_payment(reference, now)?;
        Ok(PaymentConfirmation { booking: booking.clone(), newly_paid })
    }

    async fn list_for_rider(&self, rider_id: Uuid) -> CoreResult<Vec<BookingHistoryEntry>> {
        let state = self.state.read().await;
        let mut entries = state
            .bookings
            .iter()
            .rev()
            .filter(|b| b.rider_id == rider_id)
            .map(|booking| {
                let ride = state.rides.get(&booking.ride_id).ok_or_else(|| {
                    CoreError::Store(format!("Ride {} missing for booking {}", booking.ride_id, booking.id))
                })?;
                let details = state.details(ride)?;
                Ok(BookingHistoryEntry {
                    booking: booking.clone(),
                    ride: details.ride,
                    driver: details.driver,
                    vehicle: details.vehicle,
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        entries.sort_by(|a, b| b.booking.created_at.cmp(&a.booking.created_at));
        Ok(entries)
    }
}
