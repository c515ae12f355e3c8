use axum::Router;

use crate::state::AppState;

pub mod auth;
pub mod doc;
pub mod employees;
pub mod health;
pub mod orders;
pub mod params;
pub mod payments;

// Build the API router without binding state; it is provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/orders", orders::router())
        .nest("/payments", payments::router())
        .nest("/employees", employees::router())
}
