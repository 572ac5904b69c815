use axum::{routing::get, Router};

use crate::state::AppState;

pub mod common;
pub mod expense_types;
pub mod expenses;
pub mod fine_types;
pub mod fines;
pub mod health;
pub mod inspection_types;
pub mod inspections;
pub mod lease_payments;
pub mod leases;
pub mod lookups;
pub mod payment_categories;
pub mod payment_types;
pub mod properties;
pub mod residents;
pub mod units;
pub mod utilities;
pub mod utility_types;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(properties::router())
        .merge(units::router())
        .merge(leases::router())
        .merge(lease_payments::router())
        .merge(residents::router())
        .merge(expenses::router())
        .merge(fines::router())
        .merge(inspections::router())
        .merge(utilities::router())
        .merge(payment_types::router())
        .merge(payment_categories::router())
        .merge(expense_types::router())
        .merge(fine_types::router())
        .merge(inspection_types::router())
        .merge(utility_types::router())
}
