//! Push ingestion endpoint

use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{IngestQuery, IngestResponse},
};
use crate::registry::{DataSource, IngestRecord, SourceFeed};
use crate::util::is_safe_identifier;

use super::tenant_param;

/// POST /api/v1/tenants/:tenant/ingest/:source
///
/// Replaces the feed's snapshot with the records in the body. An optional
/// `?instance=` names the feed when several pollers report the same kind.
pub async fn ingest_records(
    State(state): State<ApiState>,
    Path((tenant, source)): Path<(String, String)>,
    Query(query): Query<IngestQuery>,
    Json(records): Json<Vec<IngestRecord>>,
) -> ApiResult<Json<IngestResponse>> {
    let tenant = tenant_param(&tenant)?;
    let kind: DataSource = source.parse().map_err(ApiError::InvalidRequest)?;

    let feed = match query.instance.as_deref().map(str::trim) {
        Some(instance) if !instance.is_empty() => {
            if !is_safe_identifier(instance) {
                return Err(ApiError::InvalidRequest(format!(
                    "invalid feed instance: {instance}"
                )));
            }
            SourceFeed::instance(kind, instance)
        }
        _ => SourceFeed::new(kind),
    };

    let outcome = state.registry.ingest(&tenant, feed, records).await?;
    Ok(Json(outcome.into()))
}
