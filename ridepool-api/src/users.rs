use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Extension, Json, Router,
};
use ridepool_core::user::{NewUser, User, Vehicle};
use ridepool_shared::pii::Masked;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::Identity;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct RegisterUserRequest {
    name: String,
    email: Masked<String>,
}

#[derive(Debug, Serialize)]
struct DriverStatusResponse {
    is_driver: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/users", post(register_user))
        .route("/v1/me/driver-status", get(driver_status))
        .route("/v1/driver/upgrade", post(upgrade_to_driver))
}

async fn register_user(
    State(state): State<AppState>,
    Extension(Identity(auth_id)): Extension<Identity>,
    payload: Result<Json<RegisterUserRequest>, JsonRejection>,
) -> Result<Json<User>, AppError> {
    let Json(req) = payload?;
    let user = state
        .service
        .register_user(NewUser { auth_id, name: req.name, email: req.email })
        .await?;
    Ok(Json(user))
}

async fn driver_status(
    State(state): State<AppState>,
    Extension(Identity(auth_id)): Extension<Identity>,
) -> Result<Json<DriverStatusResponse>, AppError> {
    let is_driver = state.service.driver_status(&auth_id).await?;
    Ok(Json(DriverStatusResponse { is_driver }))
}

async fn upgrade_to_driver(
    State(state): State<AppState>,
    Extension(Identity(auth_id)): Extension<Identity>,
    payload: Result<Json<Vehicle>, JsonRejection>,
) -> Result<Json<User>, AppError> {
    let Json(vehicle) = payload?;
    let user = state.service.upgrade_to_driver(&auth_id, vehicle).await?;
    Ok(Json(user))
}
