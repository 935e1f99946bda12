//! Read endpoints over the merged view

use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::ListQuery,
};
use crate::registry::{Page, Resource, ResourceStats, SourceTarget, paginate};

use super::{resource_param, tenant_param};

/// GET /api/v1/tenants/:tenant/resources
pub async fn list_resources(
    State(state): State<ApiState>,
    Path(tenant): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<Resource>>> {
    let tenant = tenant_param(&tenant)?;
    let filter = query.filter()?;
    let resources = state.registry.list(&tenant, &filter).await?;
    Ok(Json(paginate(resources, query.offset, query.limit)))
}

/// GET /api/v1/tenants/:tenant/resources/:id
pub async fn get_resource(
    State(state): State<ApiState>,
    Path((tenant, id)): Path<(String, String)>,
) -> ApiResult<Json<Resource>> {
    let tenant = tenant_param(&tenant)?;
    let id = resource_param(&id)?;
    state
        .registry
        .get(&tenant, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("resource not found: {id}")))
}

/// GET /api/v1/tenants/:tenant/resources/:id/children
pub async fn get_children(
    State(state): State<ApiState>,
    Path((tenant, id)): Path<(String, String)>,
) -> ApiResult<Json<Vec<Resource>>> {
    let tenant = tenant_param(&tenant)?;
    let id = resource_param(&id)?;
    Ok(Json(state.registry.children(&tenant, id).await?))
}

/// GET /api/v1/tenants/:tenant/resources/:id/sources
pub async fn get_source_targets(
    State(state): State<ApiState>,
    Path((tenant, id)): Path<(String, String)>,
) -> ApiResult<Json<Vec<SourceTarget>>> {
    let tenant = tenant_param(&tenant)?;
    let id = resource_param(&id)?;
    Ok(Json(state.registry.source_targets(&tenant, id).await?))
}

/// GET /api/v1/tenants/:tenant/stats
pub async fn get_stats(
    State(state): State<ApiState>,
    Path(tenant): Path<String>,
) -> ApiResult<Json<ResourceStats>> {
    let tenant = tenant_param(&tenant)?;
    Ok(Json(state.registry.stats(&tenant).await?))
}
