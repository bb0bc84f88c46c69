use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ridepool_core::repository::RideRepository;
use ridepool_core::ride::{Place, Ride, RideDetails};
use ridepool_core::search::{NearbyQuery, NearbyRide};
use ridepool_core::user::DriverSummary;
use ridepool_core::CoreResult;
use ridepool_shared::pii::Masked;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::store_err;
use crate::user_repo::vehicle_from_columns;

/// Ride columns joined with the driver, aliased so they map onto `RideRow`.
/// Expects `rides r JOIN users u ON r.driver_id = u.id`.
pub(crate) const RIDE_COLUMNS: &str = "r.id, r.driver_id, \
    r.origin_label, r.origin_lat, r.origin_lng, \
    r.destination_label, r.destination_lat, r.destination_lng, \
    r.departure_time, r.arrival_time, r.price_amount, r.currency, \
    r.seats_total, r.seats_available, r.status, r.created_at, r.updated_at, \
    u.name AS driver_name, u.avatar_url AS driver_avatar, u.phone AS driver_phone, \
    u.driver_rating, u.vehicle_make, u.vehicle_model, u.vehicle_year, \
    u.vehicle_color, u.vehicle_plate";

pub struct PgRideRepository {
    pool: PgPool,
}

impl PgRideRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RideRow {
    id: Uuid,
    driver_id: Uuid,
    origin_label: String,
    origin_lat: f64,
    origin_lng: f64,
    destination_label: String,
    destination_lat: f64,
    destination_lng: f64,
    departure_time: DateTime<Utc>,
    arrival_time: Option<DateTime<Utc>>,
    price_amount: i32,
    currency: String,
    seats_total: i32,
    seats_available: i32,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    driver_name: String,
    driver_avatar: Option<String>,
    driver_phone: Option<String>,
    driver_rating: f64,
    vehicle_make: Option<String>,
    vehicle_model: Option<String>,
    vehicle_year: Option<i32>,
    vehicle_color: Option<String>,
    vehicle_plate: Option<String>,
}

impl RideRow {
    pub(crate) fn into_details(self) -> CoreResult<RideDetails> {
        let ride = Ride {
            id: self.id,
            driver_id: self.driver_id,
            origin: Place {
                label: self.origin_label,
                lat: self.origin_lat,
                lng: self.origin_lng,
            },
            destination: Place {
                label: self.destination_label,
                lat: self.destination_lat,
                lng: self.destination_lng,
            },
            departure_time: self.departure_time,
            arrival_time: self.arrival_time,
            price_amount: self.price_amount,
            currency: self.currency,
            seats_total: self.seats_total,
            seats_available: self.seats_available,
            status: self.status.parse()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };
        let driver = DriverSummary {
            id: self.driver_id,
            name: self.driver_name,
            avatar_url: self.driver_avatar,
            phone: self.driver_phone.map(Masked::new),
            rating: self.driver_rating,
        };
        let vehicle = vehicle_from_columns(
            self.vehicle_make,
            self.vehicle_model,
            self.vehicle_year,
            self.vehicle_color,
            self.vehicle_plate,
        );
        Ok(RideDetails { ride, driver, vehicle })
    }
}

#[derive(sqlx::FromRow)]
struct NearbyRow {
    #[sqlx(flatten)]
    ride: RideRow,
    distance_km: f64,
}

#[async_trait]
impl RideRepository for PgRideRepository {
    async fn create_ride(&self, ride: &Ride) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO rides (
                id, driver_id,
                origin_label, origin_lat, origin_lng,
                destination_label, destination_lat, destination_lng,
                departure_time, arrival_time, price_amount, currency,
                seats_total, seats_available, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $16)
            "#,
        )
        .bind(ride.id)
        .bind(ride.driver_id)
        .bind(&ride.origin.label)
        .bind(ride.origin.lat)
        .bind(ride.origin.lng)
        .bind(&ride.destination.label)
        .bind(ride.destination.lat)
        .bind(ride.destination.lng)
        .bind(ride.departure_time)
        .bind(ride.arrival_time)
        .bind(ride.price_amount)
        .bind(&ride.currency)
        .bind(ride.seats_total)
        .bind(ride.seats_available)
        .bind(ride.status.as_str())
        .bind(ride.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }

    async fn get_ride(&self, id: Uuid) -> CoreResult<Option<RideDetails>> {
        let sql = format!(
            "SELECT {} FROM rides r JOIN users u ON r.driver_id = u.id WHERE r.id = $1",
            RIDE_COLUMNS
        );
        let row = sqlx::query_as::<_, RideRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        row.map(RideRow::into_details).transpose()
    }

    async fn search_nearby(
        &self,
        query: &NearbyQuery,
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<NearbyRide>> {
        // Spherical law of cosines, clamped so acos never sees |x| > 1.
        let sql = format!(
            r#"
            SELECT * FROM (
                SELECT {},
                    6371 * acos(LEAST(1.0, GREATEST(-1.0,
                        cos(radians($1)) * cos(radians(r.origin_lat))
                            * cos(radians(r.origin_lng) - radians($2))
                        + sin(radians($1)) * sin(radians(r.origin_lat))
                    ))) AS distance_km
                FROM rides r
                JOIN users u ON r.driver_id = u.id
                WHERE r.status = 'open'
                    AND r.seats_available > 0
                    AND r.departure_time > $4
                    AND ($5::uuid IS NULL OR r.driver_id <> $5)
            ) nearby
            WHERE distance_km <= $3
            ORDER BY distance_km ASC, departure_time ASC
            LIMIT $6
            "#,
            RIDE_COLUMNS
        );

        let rows = sqlx::query_as::<_, NearbyRow>(&sql)
            .bind(query.origin.lat)
            .bind(query.origin.lng)
            .bind(query.radius_km)
            .bind(now)
            .bind(query.exclude_user)
            .bind(query.limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)?;

        rows.into_iter()
            .map(|row| {
                let details = row.ride.into_details()?;
                Ok(NearbyRide {
                    ride: details.ride,
                    driver: details.driver,
                    vehicle: details.vehicle,
                    distance_km: row.distance_km,
                })
            })
            .collect()
    }
}
