//! Route handlers

pub mod health;
pub mod ingest;
pub mod overrides;
pub mod resources;

use crate::api::error::{ApiError, ApiResult};
use crate::util::{is_safe_identifier, normalize_tenant_id};

/// Rejects tenant identifiers before they reach the registry
pub(crate) fn tenant_param(raw: &str) -> ApiResult<String> {
    normalize_tenant_id(raw)
        .ok_or_else(|| ApiError::InvalidRequest(format!("invalid tenant id: {raw}")))
}

/// Rejects resource identifiers before they reach the registry
pub(crate) fn resource_param(raw: &str) -> ApiResult<&str> {
    if is_safe_identifier(raw) {
        Ok(raw)
    } else {
        Err(ApiError::InvalidRequest(format!("invalid resource id: {raw}")))
    }
}
