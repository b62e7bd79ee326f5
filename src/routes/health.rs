//! Health and version endpoints
//!
//! `/health` is a liveness probe: it answers 200 while the process runs and
//! reports `degraded` when no ledger endpoint is reachable.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use super::json_response;
use crate::ledger::EndpointStatus;
use crate::server::AppState;
use crate::worker::PoolStats;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    /// `online` or `degraded`
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
    pub mode: &'static str,
    pub node_id: String,
    pub uptime_secs: u64,
    pub ledger: LedgerHealth,
    pub workers: PoolStats,
}

#[derive(Serialize)]
pub struct LedgerHealth {
    pub alive: usize,
    pub total: usize,
    pub endpoints: Vec<EndpointStatus>,
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let endpoints = state.ledger.snapshot();
    let alive = endpoints.iter().filter(|e| e.alive).count();

    HealthResponse {
        healthy: true,
        status: if alive > 0 { "online" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        node_id: state.args.node_id.to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        ledger: LedgerHealth {
            alive,
            total: endpoints.len(),
            endpoints,
        },
        workers: state.workers.stats(),
    }
}

/// Handle liveness probe (/health, /healthz)
pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &build_health_response(state))
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    /// Git commit hash (short)
    pub commit: &'static str,
    pub commit_full: &'static str,
    pub build_time: &'static str,
    pub service: &'static str,
}

/// Handle version endpoint (/version)
pub fn version_info() -> Response<Full<Bytes>> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "chain-relay",
    };
    json_response(StatusCode::OK, &response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::Harness;
    use http_body_util::BodyExt;

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_ledger_and_workers() {
        let h = Harness::new(&["--dev-mode"]);
        let response = health_check(&h.state);
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["healthy"], true);
        assert_eq!(body["status"], "online");
        assert_eq!(body["mode"], "development");
        assert_eq!(body["ledger"]["alive"], 1);
        assert_eq!(body["ledger"]["endpoints"][0]["address"], "mock");
        assert_eq!(body["workers"]["shard_count"], 4);
    }

    #[tokio::test]
    async fn test_health_degraded_without_ledger() {
        let h = Harness::new(&[]);
        h.state.ledger.get_client().set_alive(false);

        let response = health_check(&h.state);
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["ledger"]["alive"], 0);
    }

    #[tokio::test]
    async fn test_version() {
        let body = body_json(version_info()).await;
        assert_eq!(body["service"], "chain-relay");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}
