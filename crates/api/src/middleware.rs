use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use stowage_core::TenantId;

use crate::app::errors;
use crate::context::TenantContext;

/// Header carrying the caller's tenant.
pub const TENANT_HEADER: &str = "TENANT_ID";

/// Resolve the tenant from the request headers and attach it as an extension.
pub async fn tenant_middleware(mut req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let tenant_id = match extract_tenant(req.headers()) {
        Ok(t) => t,
        Err(message) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_tenant", message).into_response();
        }
    };

    req.extensions_mut().insert(TenantContext::new(tenant_id));
    next.run(req).await
}

fn extract_tenant(headers: &HeaderMap) -> Result<TenantId, &'static str> {
    let header = headers
        .get(TENANT_HEADER)
        .ok_or("missing TENANT_ID header")?;

    let header = header.to_str().map_err(|_| "TENANT_ID header is not valid text")?;

    header
        .trim()
        .parse()
        .map_err(|_| "TENANT_ID header is not a valid tenant id")
}
