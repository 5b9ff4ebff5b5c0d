//! HTTP API of the BFF.

pub mod documents;
pub mod health;
pub mod media;
pub mod questions;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Build the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::router())
        .merge(questions::router())
        .merge(media::router())
        .merge(documents::router())
}
