//! Manual link, unlink and report-merge endpoints

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use crate::api::{
    error::ApiResult,
    state::ApiState,
    types::{LinkRequest, ReportMergeRequest, UnlinkRequest},
};
use crate::storage::{ManualLink, MergeExclusion};

use super::{resource_param, tenant_param};

/// POST /api/v1/tenants/:tenant/links
pub async fn create_link(
    State(state): State<ApiState>,
    Path(tenant): Path<String>,
    Json(request): Json<LinkRequest>,
) -> ApiResult<(StatusCode, Json<ManualLink>)> {
    let tenant = tenant_param(&tenant)?;
    let primary = resource_param(&request.primary_id)?;
    let secondary = resource_param(&request.secondary_id)?;

    let link = state
        .registry
        .link(&tenant, primary, secondary, &request.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(link)))
}

/// POST /api/v1/tenants/:tenant/resources/:id/report-merge
pub async fn report_merge(
    State(state): State<ApiState>,
    Path((tenant, id)): Path<(String, String)>,
    Json(request): Json<ReportMergeRequest>,
) -> ApiResult<(StatusCode, Json<Vec<MergeExclusion>>)> {
    let tenant = tenant_param(&tenant)?;
    let id = resource_param(&id)?;

    let exclusions = state
        .registry
        .report_merge(&tenant, id, &request.sources, &request.note)
        .await?;
    Ok((StatusCode::CREATED, Json(exclusions)))
}

/// POST /api/v1/tenants/:tenant/resources/:id/unlink
pub async fn unlink(
    State(state): State<ApiState>,
    Path((tenant, id)): Path<(String, String)>,
    Json(request): Json<UnlinkRequest>,
) -> ApiResult<(StatusCode, Json<MergeExclusion>)> {
    let tenant = tenant_param(&tenant)?;
    let id = resource_param(&id)?;
    let target = resource_param(&request.target_id)?;

    let exclusion = state
        .registry
        .unlink(&tenant, id, target, &request.reason)
        .await?;
    Ok((StatusCode::CREATED, Json(exclusion)))
}
