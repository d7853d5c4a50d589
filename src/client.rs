//! HTTP client for a running volume manager
//!
//! Returns the wire responses as-is: callers check `status` themselves.
//! Only transport failures surface as `Err`.

use crate::api::{
    CreateVolumeRequest, CreateVolumeResponse, HeartbeatRequest, HeartbeatResponse,
    ListDisksResponse, ListVolumesResponse, RegisterDiskRequest, RegisterDiskResponse,
    StatusResponse, VolumeInfoResponse,
};
use crate::common::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ManagerClient {
    http: reqwest::Client,
    base_url: String,
}

impl ManagerClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(10))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    pub async fn register_disk(&self, req: &RegisterDiskRequest) -> Result<RegisterDiskResponse> {
        self.post("/datanode/register", req).await
    }

    pub async fn report_heartbeat(&self, req: &HeartbeatRequest) -> Result<HeartbeatResponse> {
        self.post("/datanode/heartbeat", req).await
    }

    pub async fn create_volume(&self, req: &CreateVolumeRequest) -> Result<CreateVolumeResponse> {
        self.post("/volumes", req).await
    }

    pub async fn get_volume_info(&self, uuid: &Uuid) -> Result<VolumeInfoResponse> {
        self.get(&format!("/volumes/{}", uuid)).await
    }

    pub async fn list_volumes(&self) -> Result<ListVolumesResponse> {
        self.get("/volumes").await
    }

    pub async fn list_disks(&self) -> Result<ListDisksResponse> {
        self.get("/disks").await
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        self.get("/admin/status").await
    }
}
