use std::sync::Arc;

use ridepool_core::RideService;
use ridepool_store::app_config::RateLimitConfig;
use ridepool_store::{EventProducer, RedisClient};

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub service: RideService,
    /// Rate limiting is skipped when no Redis is configured.
    pub redis: Option<Arc<RedisClient>>,
    pub events: EventProducer,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
}
