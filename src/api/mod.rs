mod routes;
mod types;

pub use routes::create_router;

use crate::service::InferenceService;

/// Shared application state
pub struct AppState {
    pub service: InferenceService,
}
