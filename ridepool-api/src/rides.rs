use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use ridepool_core::geo::Coordinates;
use ridepool_core::ride::{NewRide, Ride, RideDetails};
use ridepool_core::search::NearbyRide;
use ridepool_shared::events::{RidePostedEvent, RIDE_POSTED_TOPIC};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Identity;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct NearbyParams {
    lat: Option<f64>,
    lng: Option<f64>,
    radius_km: Option<f64>,
}

#[derive(Debug, Serialize)]
struct NearbyResponse {
    rides: Vec<NearbyRide>,
    count: usize,
    origin: Coordinates,
    radius_km: f64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/rides", post(post_ride))
        .route("/v1/rides/nearby", get(search_nearby))
        .route("/v1/rides/{id}", get(get_ride))
}

async fn post_ride(
    State(state): State<AppState>,
    Extension(Identity(auth_id)): Extension<Identity>,
    payload: Result<Json<NewRide>, JsonRejection>,
) -> Result<(StatusCode, Json<Ride>), AppError> {
    let Json(new_ride) = payload?;
    let ride = state.service.post_ride(&auth_id, new_ride).await?;

    let event = RidePostedEvent {
        ride_id: ride.id,
        driver_id: ride.driver_id,
        seats_total: ride.seats_total,
        departure_time: ride.departure_time,
        timestamp: Utc::now().timestamp(),
    };
    if let Err(e) = state.events.publish_json(RIDE_POSTED_TOPIC, &ride.id.to_string(), &event).await {
        warn!("Failed to publish {} for ride {}: {}", RIDE_POSTED_TOPIC, ride.id, e);
    }

    Ok((StatusCode::CREATED, Json(ride)))
}

async fn get_ride(
    State(state): State<AppState>,
    ride_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<RideDetails>, AppError> {
    let Path(ride_id) = ride_id?;
    Ok(Json(state.service.get_ride(ride_id).await?))
}

async fn search_nearby(
    State(state): State<AppState>,
    Extension(Identity(auth_id)): Extension<Identity>,
    params: Result<Query<NearbyParams>, QueryRejection>,
) -> Result<Json<NearbyResponse>, AppError> {
    let Query(params) = params?;
    let (query, rides) = state
        .service
        .search_nearby(&auth_id, params.lat, params.lng, params.radius_km)
        .await?;

    Ok(Json(NearbyResponse {
        count: rides.len(),
        rides,
        origin: query.origin,
        radius_km: query.radius_km,
    }))
}
