use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const RIDE_POSTED_TOPIC: &str = "ride.posted";
pub const BOOKING_CREATED_TOPIC: &str = "booking.created";
pub const BOOKING_PAID_TOPIC: &str = "booking.paid";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RidePostedEvent {
    pub ride_id: Uuid,
    pub driver_id: Uuid,
    pub seats_total: i32,
    pub departure_time: DateTime<Utc>,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BookingCreatedEvent {
    pub booking_id: Uuid,
    pub ride_id: Uuid,
    pub rider_id: Uuid,
    pub seats_booked: i32,
    pub total_price: i32,
    pub status: String,
    pub timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BookingPaidEvent {
    pub booking_id: Uuid,
    pub ride_id: Uuid,
    pub rider_id: Uuid,
    pub total_price: i32,
    pub currency: String,
    pub timestamp: i64,
}
