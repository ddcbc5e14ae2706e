//! Operational routes of the storage daemon.
//!
//! - `GET /healthz`: liveness
//! - `GET /readyz`: readiness of the SQLite index, payload directory and bucket listing
//!
//! File operations are consumed in-process through `FileService` and
//! `SyncReconciler`; there is no file API over HTTP.

use crate::{
    handlers::health_handlers::{healthz, readyz},
    state::AppState,
};
use axum::{Router, routing::get};

/// Build the router. Handlers share `AppState`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
}
