use chrono::{DateTime, Utc};
use ridepool_shared::pii::Masked;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CoreError, CoreResult};

pub const DEFAULT_DRIVER_RATING: f64 = 5.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Subject of the identity provider's token.
    pub auth_id: String,
    pub name: String,
    pub email: Masked<String>,
    pub phone: Option<Masked<String>>,
    pub avatar_url: Option<String>,
    pub is_driver: bool,
    pub driver_rating: f64,
    pub vehicle: Option<Vehicle>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(new_user: &NewUser, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            auth_id: new_user.auth_id.clone(),
            name: new_user.name.trim().to_string(),
            email: Masked::new(new_user.email.expose().trim().to_string()),
            phone: None,
            avatar_url: None,
            is_driver: false,
            driver_rating: DEFAULT_DRIVER_RATING,
            vehicle: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn driver_summary(&self) -> DriverSummary {
        DriverSummary {
            id: self.id,
            name: self.name.clone(),
            avatar_url: self.avatar_url.clone(),
            phone: self.phone.clone(),
            rating: self.driver_rating,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub auth_id: String,
    pub name: String,
    pub email: Masked<String>,
}

impl NewUser {
    pub fn validate(&self) -> CoreResult<()> {
        if self.auth_id.trim().is_empty() {
            return Err(CoreError::Validation("Identity is required".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation("Name is required".to_string()));
        }
        let email = self.email.expose().trim();
        if email.is_empty() || !email.contains('@') {
            return Err(CoreError::Validation("A valid email is required".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub make: String,
    pub model: String,
    pub year: i32,
    pub color: String,
    pub plate: String,
}

impl Vehicle {
    /// Model years run from 1900 to next year's models.
    pub fn validate(&self, current_year: i32) -> CoreResult<()> {
        let fields = [&self.make, &self.model, &self.color, &self.plate];
        if fields.iter().any(|f| f.trim().is_empty()) {
            return Err(CoreError::Validation("All fields are required".to_string()));
        }
        if self.year < 1900 || self.year > current_year + 1 {
            return Err(CoreError::Validation("Invalid vehicle year".to_string()));
        }
        Ok(())
    }

    pub fn display_name(&self) -> String {
        format!("{} {} {}", self.year, self.make, self.model)
    }
}

/// Public view of a ride's driver.
#[derive(Debug, Clone, Serialize)]
pub struct DriverSummary {
    pub id: Uuid,
    pub name: String,
    pub avatar_url: Option<String>,
    pub phone: Option<Masked<String>>,
    pub rating: f64,
}
