//! HTTP API for the volume manager
//!
//! Operation outcomes are reported in-band: every operation answers 200 with
//! a `status` code in the body, including requests that fail to parse.

use crate::api::{
    CreateVolumeRequest, CreateVolumeResponse, HeartbeatRequest, HeartbeatResponse,
    ListDisksResponse, ListVolumesResponse, RegisterDiskRequest, RegisterDiskResponse, Reply,
    StatusResponse, TimeoutQuery, VolumeInfoResponse,
};
use crate::common::{non_negative, Error, Result, Status};
use crate::manager::VolumeManager;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

#[derive(Clone)]
pub struct ManagerState {
    pub manager: Arc<VolumeManager>,
}

pub fn create_router(state: ManagerState) -> Router {
    Router::new()
        // Datanode-facing
        .route("/datanode/register", axum::routing::post(register_disk))
        .route("/datanode/heartbeat", axum::routing::post(report_heartbeat))
        // Volumes
        .route(
            "/volumes",
            axum::routing::post(create_volume).get(list_volumes),
        )
        .route("/volumes/:uuid", axum::routing::get(get_volume_info))
        .route("/disks", axum::routing::get(list_disks))
        // Admin and probes
        .route("/admin/status", axum::routing::get(admin_status))
        .route("/health/ready", axum::routing::get(health_ready))
        .route("/health/live", axum::routing::get(health_live))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn reply<T: Reply>(result: Result<T>) -> Json<T> {
    Json(result.unwrap_or_else(|e| T::failed(&e)))
}

/// Body or query that axum could not parse, answered as a `ValidationError`
fn malformed<T: Reply>(what: &str, body_text: String) -> Json<T> {
    tracing::debug!("Malformed {}: {}", what, body_text);
    Json(T::failed(&Error::Validation(format!(
        "malformed {}: {}",
        what, body_text
    ))))
}

async fn register_disk(
    State(state): State<ManagerState>,
    payload: std::result::Result<Json<RegisterDiskRequest>, JsonRejection>,
) -> Json<RegisterDiskResponse> {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return malformed("register request", rejection.body_text()),
    };
    let result = try_register_disk(&state.manager, &req).await;
    if let Err(e) = &result {
        tracing::warn!(
            "Register disk {}:{} {} failed: {}",
            req.host_ip,
            req.port,
            req.mount_path,
            e
        );
    }
    reply(result)
}

async fn try_register_disk(
    manager: &VolumeManager,
    req: &RegisterDiskRequest,
) -> Result<RegisterDiskResponse> {
    let registration = req.to_registration()?;
    let range = manager
        .register_disk(registration, manager.deadline(req.timeout_ms))
        .await?;
    Ok(RegisterDiskResponse::ok(range))
}

/// Acknowledged whenever the request is well-formed
async fn report_heartbeat(
    State(state): State<ManagerState>,
    payload: std::result::Result<Json<HeartbeatRequest>, JsonRejection>,
) -> Json<HeartbeatResponse> {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return malformed("heartbeat", rejection.body_text()),
    };
    match req.to_heartbeat() {
        Ok(heartbeat) => {
            state
                .manager
                .report_heartbeat(heartbeat, state.manager.deadline(req.timeout_ms))
                .await;
            Json(HeartbeatResponse::default())
        }
        Err(e) => Json(HeartbeatResponse::failed(&e)),
    }
}

async fn create_volume(
    State(state): State<ManagerState>,
    payload: std::result::Result<Json<CreateVolumeRequest>, JsonRejection>,
) -> Json<CreateVolumeResponse> {
    match payload {
        Ok(Json(req)) => reply(try_create_volume(&state.manager, &req).await),
        Err(rejection) => malformed("create volume request", rejection.body_text()),
    }
}

async fn try_create_volume(
    manager: &VolumeManager,
    req: &CreateVolumeRequest,
) -> Result<CreateVolumeResponse> {
    let quota = non_negative("quota", req.quota)?;
    let uuid = manager
        .create_volume(&req.name, quota, manager.deadline(req.timeout_ms))
        .await?;
    Ok(CreateVolumeResponse {
        status: Status::Ok.code(),
        volume_uuid: Some(uuid),
        error: None,
    })
}

async fn get_volume_info(
    State(state): State<ManagerState>,
    Path(uuid): Path<String>,
    query: std::result::Result<Query<TimeoutQuery>, QueryRejection>,
) -> Json<VolumeInfoResponse> {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => return malformed("query string", rejection.body_text()),
    };
    let result = Uuid::parse_str(&uuid)
        .map_err(|_| Error::Validation(format!("invalid volume uuid '{}'", uuid)))
        .and_then(|uuid| {
            let deadline = state.manager.deadline(query.timeout_ms);
            state.manager.get_volume_info(&uuid, &deadline)
        })
        .map(VolumeInfoResponse::from);
    if let Err(e) = &result {
        tracing::debug!("Get volume info {} failed: {}", uuid, e);
    }
    reply(result)
}

async fn list_volumes(State(state): State<ManagerState>) -> Json<ListVolumesResponse> {
    reply(state.manager.list_volumes().map(|volumes| ListVolumesResponse {
        status: Status::Ok.code(),
        volumes: volumes.into_iter().map(Into::into).collect(),
        error: None,
    }))
}

async fn list_disks(State(state): State<ManagerState>) -> Json<ListDisksResponse> {
    reply(state.manager.list_disks().map(|disks| ListDisksResponse {
        status: Status::Ok.code(),
        disks: disks.into_iter().map(Into::into).collect(),
        error: None,
    }))
}

/// Pool counters for dashboards
async fn admin_status(State(state): State<ManagerState>) -> Json<StatusResponse> {
    reply(pool_status(&state.manager))
}

fn pool_status(manager: &VolumeManager) -> Result<StatusResponse> {
    Ok(StatusResponse {
        status: Status::Ok.code(),
        pool: manager.pool_stats()?,
        disks: manager.list_disks()?.len(),
        volumes: manager.list_volumes()?.len(),
        block_size: manager.config().block_size,
        replicas: manager.config().replicas,
        error: None,
    })
}

/// Readiness probe: 200 once the metadata store answers
async fn health_ready(State(state): State<ManagerState>) -> impl IntoResponse {
    match state.manager.pool_stats() {
        Ok(stats) => (
            StatusCode::OK,
            Json(json!({
                "ready": true,
                "total_blocks": stats.total_blocks,
                "free_blocks": stats.free_blocks,
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "ready": false,
                "reason": e.to_string(),
            })),
        ),
    }
}

/// Liveness probe
async fn health_live() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "alive": true,
            "version": crate::VERSION,
            "timestamp": crate::common::timestamp_now(),
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ManagerConfig;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn router() -> Router {
        let manager = VolumeManager::open(ManagerConfig::in_memory(10, 3)).unwrap();
        create_router(ManagerState {
            manager: Arc::new(manager),
        })
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_live() {
        let response = router()
            .oneshot(Request::get("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["alive"], true);
        assert_eq!(body["version"], crate::VERSION);
    }

    #[tokio::test]
    async fn test_bad_uuid_is_validation_error() {
        let response = router()
            .oneshot(Request::get("/volumes/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], Status::ValidationError.code());
    }

    #[tokio::test]
    async fn test_unknown_volume_is_not_found() {
        let uri = format!("/volumes/{}", Uuid::new_v4());
        let response = router()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["status"], Status::NotFound.code());
    }

    #[tokio::test]
    async fn test_unparseable_bodies_are_validation_errors() {
        for (uri, body) in [
            ("/datanode/register", "not json"),
            ("/datanode/heartbeat", r#"{"host_ip":"10.0.0.1"}"#),
            ("/volumes", r#"{"name":"v","quota":"lots"}"#),
        ] {
            let response = router()
                .oneshot(
                    Request::post(uri)
                        .header("content-type", "application/json")
                        .body(Body::from(body))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{}", uri);
            let body = body_json(response).await;
            assert_eq!(body["status"], Status::ValidationError.code(), "{}", uri);
            assert!(body["error"].as_str().unwrap().contains("malformed"));
        }
    }

    #[tokio::test]
    async fn test_missing_content_type_is_validation_error() {
        let response = router()
            .oneshot(
                Request::post("/volumes")
                    .body(Body::from(r#"{"name":"v","quota":10}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], Status::ValidationError.code());
    }

    #[tokio::test]
    async fn test_bad_timeout_query_is_validation_error() {
        let uri = format!("/volumes/{}?timeout_ms=soon", Uuid::new_v4());
        let response = router()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], Status::ValidationError.code());
    }

    #[tokio::test]
    async fn test_negative_quota_rejected() {
        let response = router()
            .oneshot(
                Request::post("/volumes")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name":"v","quota":-3}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["status"], Status::ValidationError.code());
        assert!(body.get("volume_uuid").is_none());
    }
}
