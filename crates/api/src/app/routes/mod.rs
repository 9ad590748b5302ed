use axum::Router;

pub mod inventory;
pub mod system;

/// Router for all tenant-scoped endpoints.
pub fn router() -> Router {
    Router::new().nest("/characters/:character_id/inventory", inventory::router())
}
