//! Wire types for the volume manager's HTTP API
//!
//! Every response carries an in-band `status` code (see [`Status`]); the
//! HTTP status is 200 whenever the request body parsed. Quantities arrive
//! signed and are rejected with `ValidationError` when negative.

use crate::common::{non_negative, Error, Result, Status};
use crate::manager::catalog::VolumeTopology;
use crate::manager::health::Heartbeat;
use crate::manager::metadata::{BlockRange, DiskRecord, DiskStatus, VolumeRecord};
use crate::manager::pool::PoolStats;
use crate::manager::registry::DiskRegistration;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;

fn parse_host(host_ip: &str, port: u16) -> Result<SocketAddr> {
    let ip: IpAddr = host_ip
        .trim()
        .parse()
        .map_err(|_| Error::Validation(format!("invalid host ip '{}'", host_ip)))?;
    Ok(SocketAddr::new(ip, port))
}

/// Responses that report a failure as `status` + `error`
pub trait Reply: Default {
    fn set_failure(&mut self, status: Status, error: String);

    fn failed(err: &Error) -> Self {
        let mut reply = Self::default();
        reply.set_failure(err.status(), err.to_string());
        reply
    }
}

macro_rules! impl_reply {
    ($($ty:ty),+ $(,)?) => {
        $(impl Reply for $ty {
            fn set_failure(&mut self, status: Status, error: String) {
                self.status = status.code();
                self.error = Some(error);
            }
        })+
    };
}

impl_reply!(
    RegisterDiskResponse,
    HeartbeatResponse,
    CreateVolumeResponse,
    VolumeInfoResponse,
    ListVolumesResponse,
    ListDisksResponse,
    StatusResponse,
);

// === RegisterDisk ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDiskRequest {
    pub host_ip: String,
    pub port: u16,
    pub mount_path: String,
    pub capacity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl RegisterDiskRequest {
    pub fn to_registration(&self) -> Result<DiskRegistration> {
        Ok(DiskRegistration {
            host: parse_host(&self.host_ip, self.port)?,
            mount_path: self.mount_path.clone(),
            capacity: non_negative("capacity", self.capacity)?,
        })
    }
}

/// `first_block_id = last_block_id = 0` when the disk got no blocks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDiskResponse {
    pub status: u32,
    pub first_block_id: u64,
    pub last_block_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RegisterDiskResponse {
    pub fn ok(range: Option<BlockRange>) -> Self {
        let (first_block_id, last_block_id) = range.map_or((0, 0), |r| (r.first, r.last));
        Self {
            status: Status::Ok.code(),
            first_block_id,
            last_block_id,
            error: None,
        }
    }
}

// === ReportHeartbeat ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub host_ip: String,
    pub port: u16,
    pub used: i64,
    pub free: i64,
    /// 0 is healthy, anything else is a fault code
    pub status: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl HeartbeatRequest {
    pub fn to_heartbeat(&self) -> Result<Heartbeat> {
        Ok(Heartbeat {
            host: parse_host(&self.host_ip, self.port)?,
            used: non_negative("used", self.used)?,
            free: non_negative("free", self.free)?,
            status: DiskStatus::from_code(self.status),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub status: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// === CreateVolume ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVolumeRequest {
    pub name: String,
    pub quota: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateVolumeResponse {
    pub status: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_uuid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// === GetVolumeInfo ===

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub block_id: u64,
    pub host_ip: String,
    pub host_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub group_id: u64,
    pub blocks: Vec<BlockInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfoResponse {
    pub status: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub quota: u64,
    #[serde(default)]
    pub groups: Vec<GroupInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<VolumeTopology> for VolumeInfoResponse {
    fn from(topology: VolumeTopology) -> Self {
        let groups = topology
            .groups
            .into_iter()
            .map(|group| GroupInfo {
                group_id: group.group_id,
                blocks: group
                    .blocks
                    .into_iter()
                    .map(|b| BlockInfo {
                        block_id: b.block_id,
                        host_ip: b.host.ip().to_string(),
                        host_port: b.host.port(),
                    })
                    .collect(),
            })
            .collect();
        Self {
            status: Status::Ok.code(),
            name: topology.name,
            quota: topology.quota,
            groups,
            error: None,
        }
    }
}

/// Optional query string for GET routes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeoutQuery {
    pub timeout_ms: Option<u64>,
}

// === Listings and status ===

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSummary {
    pub uuid: Uuid,
    pub name: String,
    pub quota: u64,
    pub group_count: u64,
    pub created_at: i64,
}

impl From<VolumeRecord> for VolumeSummary {
    fn from(v: VolumeRecord) -> Self {
        Self {
            uuid: v.uuid,
            name: v.name,
            quota: v.quota,
            group_count: v.group_count,
            created_at: v.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListVolumesResponse {
    pub status: u32,
    #[serde(default)]
    pub volumes: Vec<VolumeSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSummary {
    pub host_ip: String,
    pub port: u16,
    pub mount_path: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    /// Heartbeat status code, 0 when healthy
    pub status: u32,
    pub first_block_id: u64,
    pub last_block_id: u64,
    pub unaddressable: u64,
    pub last_heartbeat: Option<i64>,
}

impl From<DiskRecord> for DiskSummary {
    fn from(d: DiskRecord) -> Self {
        let (first_block_id, last_block_id) = d.blocks.map_or((0, 0), |r| (r.first, r.last));
        Self {
            host_ip: d.host.ip().to_string(),
            port: d.host.port(),
            mount_path: d.mount_path,
            total: d.total,
            used: d.used,
            free: d.free,
            status: d.status.code(),
            first_block_id,
            last_block_id,
            unaddressable: d.unaddressable,
            last_heartbeat: d.last_heartbeat,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListDisksResponse {
    pub status: u32,
    #[serde(default)]
    pub disks: Vec<DiskSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: u32,
    #[serde(default)]
    pub pool: PoolStats,
    #[serde(default)]
    pub disks: usize,
    #[serde(default)]
    pub volumes: usize,
    #[serde(default)]
    pub block_size: u64,
    #[serde(default)]
    pub replicas: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
