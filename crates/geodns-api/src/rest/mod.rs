pub mod health;
pub mod records;
pub mod zones;

use crate::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(zones::router())
        .merge(records::router())
        .merge(health::router())
}
