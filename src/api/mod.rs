//! REST API over the resource registry
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/tenants/:tenant/resources` - List merged resources
//! - `GET /api/v1/tenants/:tenant/resources/:id` - One resource
//! - `GET /api/v1/tenants/:tenant/resources/:id/children` - Its children
//! - `GET /api/v1/tenants/:tenant/resources/:id/sources` - Its source records
//! - `POST /api/v1/tenants/:tenant/resources/:id/report-merge` - Split a merge
//! - `POST /api/v1/tenants/:tenant/resources/:id/unlink` - Keep two resources apart
//! - `POST /api/v1/tenants/:tenant/links` - Link two resources
//! - `GET /api/v1/tenants/:tenant/stats` - Counts per type, status and source
//! - `POST /api/v1/tenants/:tenant/ingest/:source` - Push a feed snapshot
//!
//! Tenant and resource identifiers are validated before the registry sees
//! them.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;
pub use types::{
    HealthResponse, IngestResponse, LinkRequest, ListQuery, ReportMergeRequest, UnlinkRequest,
};

use std::net::SocketAddr;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ApiConfig;

/// Builds the router with every route and layer
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    let protected = Router::new()
        .route(
            "/api/v1/tenants/:tenant/resources",
            get(routes::resources::list_resources),
        )
        .route(
            "/api/v1/tenants/:tenant/resources/:id",
            get(routes::resources::get_resource),
        )
        .route(
            "/api/v1/tenants/:tenant/resources/:id/children",
            get(routes::resources::get_children),
        )
        .route(
            "/api/v1/tenants/:tenant/resources/:id/sources",
            get(routes::resources::get_source_targets),
        )
        .route(
            "/api/v1/tenants/:tenant/resources/:id/report-merge",
            post(routes::overrides::report_merge),
        )
        .route(
            "/api/v1/tenants/:tenant/resources/:id/unlink",
            post(routes::overrides::unlink),
        )
        .route(
            "/api/v1/tenants/:tenant/links",
            post(routes::overrides::create_link),
        )
        .route(
            "/api/v1/tenants/:tenant/stats",
            get(routes::resources::get_stats),
        )
        .route(
            "/api/v1/tenants/:tenant/ingest/:source",
            post(routes::ingest::ingest_records),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    let mut app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .merge(protected)
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(config: &ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    let app = router(config, state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
