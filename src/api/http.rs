use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::routing::{get, post};
use tokio::net::ToSocketAddrs;

use crate::auth::Caller;

use super::{Envelope, MonitoringOrchestrator};

type AppState = State<Arc<MonitoringOrchestrator>>;

#[derive(Debug, Default, serde::Deserialize)]
pub struct StopParams {
    #[serde(default)]
    pub deletedata: bool,
}

fn caller(headers: &HeaderMap) -> Caller {
    Caller::from_authorization(
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok()),
    )
}

async fn start_all(orchestrator: AppState, headers: HeaderMap) -> Envelope {
    orchestrator.start_monitoring(&caller(&headers), None).await
}

async fn start_one(orchestrator: AppState, headers: HeaderMap, Path(app): Path<String>) -> Envelope {
    orchestrator.start_monitoring(&caller(&headers), Some(&app)).await
}

async fn stop_all(
    orchestrator: AppState,
    headers: HeaderMap,
    Query(params): Query<StopParams>,
) -> Envelope {
    orchestrator
        .stop_monitoring(&caller(&headers), None, params.deletedata)
        .await
}

async fn stop_one(
    orchestrator: AppState,
    headers: HeaderMap,
    Path(app): Path<String>,
    Query(params): Query<StopParams>,
) -> Envelope {
    orchestrator
        .stop_monitoring(&caller(&headers), Some(&app), params.deletedata)
        .await
}

async fn snapshot(orchestrator: AppState, headers: HeaderMap, Path(identity): Path<String>) -> Envelope {
    orchestrator
        .monitoring_snapshot(&caller(&headers), &identity)
        .await
}

/// Routes of the monitoring API.
pub fn router(orchestrator: Arc<MonitoringOrchestrator>) -> axum::Router {
    axum::Router::new()
        .route("/apps/monitoring/start", post(start_all))
        .route("/apps/monitoring/start/{app}", post(start_one))
        .route("/apps/monitoring/stop", post(stop_all))
        .route("/apps/monitoring/stop/{app}", post(stop_one))
        .route("/apps/monitoring/snapshot/{identity}", get(snapshot))
        .with_state(orchestrator)
}

pub struct ApiServer {
    router: axum::Router,
}

impl ApiServer {
    pub fn new(orchestrator: Arc<MonitoringOrchestrator>) -> Self {
        Self {
            router: router(orchestrator),
        }
    }

    /// Serves the API until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns an error if `addr` cannot be bound or serving fails.
    pub async fn listen(self, addr: impl ToSocketAddrs) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        log::info!("API listening on {}", listener.local_addr()?);
        axum::serve(listener, self.router.into_make_service()).await
    }
}
