use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use ridepool_core::booking::{Booking, BookingHistoryEntry, BookingStatus};
use ridepool_core::service::BookingRequest;
use ridepool_shared::events::{
    BookingCreatedEvent, BookingPaidEvent, BOOKING_CREATED_TOPIC, BOOKING_PAID_TOPIC,
};
use ridepool_shared::pii::Masked;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Identity;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct CreateBookingRequest {
    ride_id: Uuid,
    seats_requested: i64,
    payment_reference: Option<Masked<String>>,
}

#[derive(Debug, Deserialize)]
struct ConfirmPaymentRequest {
    payment_reference: Masked<String>,
}

#[derive(Debug, Serialize)]
struct BookingResponse {
    booking_id: Uuid,
    status: BookingStatus,
    seats_booked: i32,
    total_price: i32,
    currency: String,
}

#[derive(Debug, Serialize)]
struct BookingHistoryResponse {
    bookings: Vec<BookingHistoryEntry>,
    count: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking))
        .route("/v1/bookings/{id}/confirm-payment", post(confirm_payment))
        .route("/v1/me/bookings", get(my_bookings))
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(Identity(auth_id)): Extension<Identity>,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let Json(req) = payload?;
    let booking = state
        .service
        .create_booking(
            &auth_id,
            BookingRequest {
                ride_id: req.ride_id,
                seats_requested: req.seats_requested,
                payment_reference: req.payment_reference,
            },
        )
        .await?;

    let event = BookingCreatedEvent {
        booking_id: booking.id,
        ride_id: booking.ride_id,
        rider_id: booking.rider_id,
        seats_booked: booking.seats_booked,
        total_price: booking.total_price,
        status: booking.status.to_string(),
        timestamp: Utc::now().timestamp(),
    };
    if let Err(e) = state
        .events
        .publish_json(BOOKING_CREATED_TOPIC, &booking.id.to_string(), &event)
        .await
    {
        warn!("Failed to publish {} for booking {}: {}", BOOKING_CREATED_TOPIC, booking.id, e);
    }
    if booking.status == BookingStatus::Paid {
        publish_paid(&state, &booking).await;
    }

    Ok((
        StatusCode::CREATED,
        Json(BookingResponse {
            booking_id: booking.id,
            status: booking.status,
            seats_booked: booking.seats_booked,
            total_price: booking.total_price,
            currency: booking.currency,
        }),
    ))
}

async fn confirm_payment(
    State(state): State<AppState>,
    Extension(Identity(auth_id)): Extension<Identity>,
    booking_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<ConfirmPaymentRequest>, JsonRejection>,
) -> Result<Json<Booking>, AppError> {
    let Path(booking_id) = booking_id?;
    let Json(req) = payload?;
    let confirmation = state
        .service
        .confirm_payment(&auth_id, booking_id, req.payment_reference.expose())
        .await?;

    // Repeated confirmations with the same reference are not re-announced.
    if confirmation.newly_paid {
        publish_paid(&state, &confirmation.booking).await;
    }
    Ok(Json(confirmation.booking))
}

async fn my_bookings(
    State(state): State<AppState>,
    Extension(Identity(auth_id)): Extension<Identity>,
) -> Result<Json<BookingHistoryResponse>, AppError> {
    let bookings = state.service.rider_bookings(&auth_id).await?;
    Ok(Json(BookingHistoryResponse { count: bookings.len(), bookings }))
}

async fn publish_paid(state: &AppState, booking: &Booking) {
    let event = BookingPaidEvent {
        booking_id: booking.id,
        ride_id: booking.ride_id,
        rider_id: booking.rider_id,
        total_price: booking.total_price,
        currency: booking.currency.clone(),
        timestamp: Utc::now().timestamp(),
    };
    if let Err(e) = state
        .events
        .publish_json(BOOKING_PAID_TOPIC, &booking.id.to_string(), &event)
        .await
    {
        warn!("Failed to publish {} for booking {}: {}", BOOKING_PAID_TOPIC, booking.id, e);
    }
}
