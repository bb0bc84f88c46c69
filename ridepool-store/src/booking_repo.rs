use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ridepool_core::booking::{
    check_bookable, duplicate_booking, Booking, BookingCommand, BookingHistoryEntry,
    PaymentConfirmation,
};
use ridepool_core::repository::BookingRepository;
use ridepool_core::{CoreError, CoreResult};
use ridepool_shared::pii::Masked;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::database::{is_constraint_violation, store_err};
use crate::ride_repo::{RideRow, RIDE_COLUMNS};

const ACTIVE_BOOKING_INDEX: &str = "bookings_one_active_per_rider";

const BOOKING_COLUMNS: &str = "id, ride_id, rider_id, seats_booked, price_per_seat, total_price, \
    currency, status, payment_reference, created_at, updated_at";

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    ride_id: Uuid,
    rider_id: Uuid,
    seats_booked: i32,
    price_per_seat: i32,
    total_price: i32,
    currency: String,
    status: String,
    payment_reference: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BookingRow {
    fn into_booking(self) -> CoreResult<Booking> {
        Ok(Booking {
            id: self.id,
            ride_id: self.ride_id,
            rider_id: self.rider_id,
            seats_booked: self.seats_booked,
            price_per_seat: self.price_per_seat,
            total_price: self.total_price,
            currency: self.currency,
            status: self.status.parse()?,
            payment_reference: self.payment_reference.map(Masked::new),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Booking columns are prefixed so they don't collide with the ride's.
#[derive(sqlx::FromRow)]
struct HistoryRow {
    booking_id: Uuid,
    booking_rider_id: Uuid,
    seats_booked: i32,
    price_per_seat: i32,
    total_price: i32,
    booking_currency: String,
    booking_status: String,
    payment_reference: Option<String>,
    booking_created_at: DateTime<Utc>,
    booking_updated_at: DateTime<Utc>,
    #[sqlx(flatten)]
    ride: RideRow,
}

impl HistoryRow {
    fn into_entry(self) -> CoreResult<BookingHistoryEntry> {
        let details = self.ride.into_details()?;
        let booking = Booking {
            id: self.booking_id,
            ride_id: details.ride.id,
            rider_id: self.booking_rider_id,
            seats_booked: self.seats_booked,
            price_per_seat: self.price_per_seat,
            total_price: self.total_price,
            currency: self.booking_currency,
            status: self.booking_status.parse()?,
            payment_reference: self.payment_reference.map(Masked::new),
            created_at: self.booking_created_at,
            updated_at: self.booking_updated_at,
        };
        Ok(BookingHistoryEntry {
            booking,
            ride: details.ride,
            driver: details.driver,
            vehicle: details.vehicle,
        })
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn create_booking(
        &self,
        cmd: &BookingCommand,
        now: DateTime<Utc>,
    ) -> CoreResult<Booking> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        // 1. Lock the ride row; concurrent bookings on this ride queue here.
        let sql = format!(
            "SELECT {} FROM rides r JOIN users u ON r.driver_id = u.id WHERE r.id = $1 FOR UPDATE OF r",
            RIDE_COLUMNS
        );
        let ride = sqlx::query_as::<_, RideRow>(&sql)
            .bind(cmd.ride_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::NotFound("Ride not found".to_string()))?
            .into_details()?
            .ride;

        // 2. Status, seats, self-booking
        check_bookable(&ride, cmd)?;

        // 3. One active booking per rider per ride
        let has_active: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM bookings
                WHERE ride_id = $1 AND rider_id = $2 AND status IN ('pending', 'paid')
            )
            "#,
        )
        .bind(cmd.ride_id)
        .bind(cmd.rider_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err)?;

        if has_active {
            return Err(duplicate_booking());
        }

        // 4. Insert booking
        let booking = Booking::for_ride(&ride, cmd, now);
        sqlx::query(
            r#"
            INSERT INTO bookings (
                id, ride_id, rider_id, seats_booked, price_per_seat, total_price,
                currency, status, payment_reference, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            "#,
        )
        .bind(booking.id)
        .bind(booking.ride_id)
        .bind(booking.rider_id)
        .bind(booking.seats_booked)
        .bind(booking.price_per_seat)
        .bind(booking.total_price)
        .bind(&booking.currency)
        .bind(booking.status.as_str())
        .bind(booking.payment_reference.as_ref().map(|r| r.expose().as_str()))
        .bind(booking.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_constraint_violation(&e, ACTIVE_BOOKING_INDEX) {
                duplicate_booking()
            } else {
                store_err(e)
            }
        })?;

        // 5. Conditional decrement; must touch exactly one row
        let updated = sqlx::query(
            r#"
            UPDATE rides
            SET seats_available = seats_available - $2,
                status = CASE WHEN seats_available - $2 = 0 THEN 'full' ELSE status END,
                updated_at = $3
            WHERE id = $1 AND status = 'open' AND seats_available >= $2
            "#,
        )
        .bind(cmd.ride_id)
        .bind(cmd.seats)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        if updated.rows_affected() != 1 {
            warn!("Seat decrement lost a race on ride {}", cmd.ride_id);
            return Err(CoreError::Conflict(format!(
                "Ride no longer has {} seats available",
                cmd.seats
            )));
        }

        tx.commit().await.map_err(store_err)?;
        Ok(booking)
    }

    async fn confirm_payment(
        &self,
        booking_id: Uuid,
        rider_id: Uuid,
        reference: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<PaymentConfirmation> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let sql = format!(
            "SELECT {} FROM bookings WHERE id = $1 AND rider_id = $2 FOR UPDATE",
            BOOKING_COLUMNS
        );
        let mut booking = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(booking_id)
            .bind(rider_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::NotFound("Booking not found".to_string()))?
            .into_booking()?;

        let newly_paid = booking.confirm_payment(reference, now)?;
        if newly_paid {
            sqlx::query(
                "UPDATE bookings SET status = $2, payment_reference = $3, updated_at = $4 WHERE id = $1",
            )
            .bind(booking.id)
            .bind(booking.status.as_str())
            .bind(reference)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        }

        tx.commit().await.map_err(store_err)?;
        Ok(PaymentConfirmation { booking, newly_paid })
    }

    async fn list_for_rider(&self, rider_id: Uuid) -> CoreResult<Vec<BookingHistoryEntry>> {
        let sql = format!(
            r#"
            SELECT
                b.id AS booking_id,
                b.rider_id AS booking_rider_id,
                b.seats_booked,
                b.price_per_seat,
                b.total_price,
                b.currency AS booking_currency,
                b.status AS booking_status,
                b.payment_reference,
                b.created_at AS booking_created_at,
                b.updated_at AS booking_updated_at,
                {}
            FROM bookings b
            JOIN rides r ON b.ride_id = r.id
            JOIN users u ON r.driver_id = u.id
            WHERE b.rider_id = $1
            ORDER BY b.created_at DESC
            "#,
            RIDE_COLUMNS
        );
        let rows = sqlx::query_as::<_, HistoryRow>(&sql)
            .bind(rider_id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        rows.into_iter().map(HistoryRow::into_entry).collect()
    }
}
