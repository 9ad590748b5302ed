use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use stowage_core::{CharacterId, CompartmentId, TransactionId};
use stowage_infra::RequestContext;
use stowage_inventory::InventoryType;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route(
            "/",
            get(get_inventory)
                .post(create_inventory)
                .delete(delete_inventory),
        )
        .route("/compartments", get(find_compartment))
        .route("/compartments/:compartment_id", get(get_compartment))
}

pub async fn get_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(character_id): Path<u32>,
) -> axum::response::Response {
    let character_id = CharacterId(character_id);
    let compartments = match services
        .engine
        .list_compartments(tenant.tenant_id(), character_id)
    {
        Ok(c) => c,
        Err(e) => return errors::internal_error("get_inventory", e),
    };
    if compartments.is_empty() {
        return errors::not_found("inventory");
    }

    (
        StatusCode::OK,
        Json(dto::InventoryResponse::new(character_id, &compartments)),
    )
        .into_response()
}

pub async fn find_compartment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(character_id): Path<u32>,
    Query(query): Query<dto::CompartmentQuery>,
) -> axum::response::Response {
    let inventory_type = match InventoryType::try_from(query.inventory_type) {
        Ok(t) => t,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_type", e.to_string());
        }
    };

    match services
        .engine
        .find_compartment(tenant.tenant_id(), CharacterId(character_id), inventory_type)
    {
        Ok(Some(c)) => (StatusCode::OK, Json(dto::CompartmentResponse::from(&c))).into_response(),
        Ok(None) => errors::not_found("compartment"),
        Err(e) => errors::internal_error("find_compartment", e),
    }
}

pub async fn get_compartment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path((character_id, compartment_id)): Path<(u32, String)>,
) -> axum::response::Response {
    let compartment_id: CompartmentId = match compartment_id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid compartment id");
        }
    };

    match services
        .engine
        .get_compartment(tenant.tenant_id(), compartment_id)
    {
        // A compartment of another character is as absent as a missing one.
        Ok(Some(c)) if c.character_id() == CharacterId(character_id) => {
            (StatusCode::OK, Json(dto::CompartmentResponse::from(&c))).into_response()
        }
        Ok(_) => errors::not_found("compartment"),
        Err(e) => errors::internal_error("get_compartment", e),
    }
}

pub async fn create_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(character_id): Path<u32>,
) -> axum::response::Response {
    let character_id = CharacterId(character_id);
    let ctx = RequestContext::new(tenant.tenant_id(), TransactionId::new());

    match services
        .engine
        .create_character_compartments(ctx, character_id)
    {
        Ok(compartments) => (
            StatusCode::CREATED,
            Json(dto::InventoryResponse::new(character_id, &compartments)),
        )
            .into_response(),
        Err(e) => errors::internal_error("create_inventory", e),
    }
}

pub async fn delete_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(character_id): Path<u32>,
) -> axum::response::Response {
    let ctx = RequestContext::new(tenant.tenant_id(), TransactionId::new());

    match services
        .engine
        .delete_character(ctx, CharacterId(character_id))
    {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::internal_error("delete_inventory", e),
    }
}
