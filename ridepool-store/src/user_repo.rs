use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ridepool_core::repository::UserRepository;
use ridepool_core::user::{NewUser, User, Vehicle};
use ridepool_core::{CoreError, CoreResult};
use ridepool_shared::pii::Masked;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::store_err;

const USER_COLUMNS: &str = "id, auth_id, name, email, phone, avatar_url, is_driver, driver_rating, \
    vehicle_make, vehicle_model, vehicle_year, vehicle_color, vehicle_plate, created_at, updated_at";

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    auth_id: String,
    name: String,
    email: String,
    phone: Option<String>,
    avatar_url: Option<String>,
    is_driver: bool,
    driver_rating: f64,
    vehicle_make: Option<String>,
    vehicle_model: Option<String>,
    vehicle_year: Option<i32>,
    vehicle_color: Option<String>,
    vehicle_plate: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let vehicle = vehicle_from_columns(
            row.vehicle_make,
            row.vehicle_model,
            row.vehicle_year,
            row.vehicle_color,
            row.vehicle_plate,
        );
        User {
            id: row.id,
            auth_id: row.auth_id,
            name: row.name,
            email: Masked::new(row.email),
            phone: row.phone.map(Masked::new),
            avatar_url: row.avatar_url,
            is_driver: row.is_driver,
            driver_rating: row.driver_rating,
            vehicle,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// A vehicle exists once the driver has a make on file; the upgrade writes
/// all five columns together.
pub(crate) fn vehicle_from_columns(
    make: Option<String>,
    model: Option<String>,
    year: Option<i32>,
    color: Option<String>,
    plate: Option<String>,
) -> Option<Vehicle> {
    let make = make?;
    Some(Vehicle {
        make,
        model: model.unwrap_or_default(),
        year: year.unwrap_or_default(),
        color: color.unwrap_or_default(),
        plate: plate.unwrap_or_default(),
    })
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_auth_id(&self, auth_id: &str) -> CoreResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE auth_id = $1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(auth_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(row.map(User::from))
    }

    async fn create_user(&self, new_user: &NewUser) -> CoreResult<User> {
        let user = User::new(new_user, Utc::now());

        let sql = format!(
            r#"
            INSERT INTO users (id, auth_id, name, email, is_driver, driver_rating, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            ON CONFLICT (auth_id) DO NOTHING
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let inserted = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user.id)
            .bind(&user.auth_id)
            .bind(&user.name)
            .bind(user.email.expose())
            .bind(user.is_driver)
            .bind(user.driver_rating)
            .bind(user.created_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        match inserted {
            Some(row) => Ok(row.into()),
            // Signup retried: hand back the row that won.
            None => self.find_by_auth_id(&new_user.auth_id).await?.ok_or_else(|| {
                CoreError::Store(format!("User {} vanished after insert conflict", new_user.auth_id))
            }),
        }
    }

    async fn upgrade_to_driver(&self, user_id: Uuid, vehicle: &Vehicle) -> CoreResult<User> {
        let sql = format!(
            r#"
            UPDATE users
            SET is_driver = TRUE,
                vehicle_make = $2,
                vehicle_model = $3,
                vehicle_year = $4,
                vehicle_color = $5,
                vehicle_plate = $6,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user_id)
            .bind(vehicle.make.trim())
            .bind(vehicle.model.trim())
            .bind(vehicle.year)
            .bind(vehicle.color.trim())
            .bind(vehicle.plate.trim())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        row.map(User::from)
            .ok_or_else(|| CoreError::NotFound("User not found".to_string()))
    }
}
