//! Error types for volmgr

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Input Errors ===
    #[error("Invalid request: {0}")]
    Validation(String),

    // === Store Errors ===
    #[error("Store error: {0}")]
    Store(String),

    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    #[error("Metadata corrupted: {0}")]
    MetadataCorrupted(String),

    // === Allocation Errors ===
    #[error("Allocation exhausted at group {group}: need {needed} blocks, {available} eligible")]
    AllocationExhausted {
        group: u64,
        needed: usize,
        available: usize,
    },

    // === Lookup Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Network Errors ===
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // === Generic ===
    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

/// In-band result code carried by every remote response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    StoreError,
    ValidationError,
    AllocationExhausted,
    NotFound,
    AlreadyExists,
    DeadlineExceeded,
}

impl Status {
    pub fn code(self) -> u32 {
        match self {
            Status::Ok => 0,
            Status::StoreError => 1,
            Status::ValidationError => 2,
            Status::AllocationExhausted => 3,
            Status::NotFound => 4,
            Status::AlreadyExists => 5,
            Status::DeadlineExceeded => 6,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Status::Ok,
            1 => Status::StoreError,
            2 => Status::ValidationError,
            3 => Status::AllocationExhausted,
            4 => Status::NotFound,
            5 => Status::AlreadyExists,
            6 => Status::DeadlineExceeded,
            _ => return None,
        })
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Status::Ok => "ok",
            Status::StoreError => "store error",
            Status::ValidationError => "validation error",
            Status::AllocationExhausted => "allocation exhausted",
            Status::NotFound => "not found",
            Status::AlreadyExists => "already exists",
            Status::DeadlineExceeded => "deadline exceeded",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::AllocationExhausted { .. } | Error::Timeout(_) | Error::Http(_)
        )
    }

    /// Map to the in-band status code returned to remote callers
    pub fn status(&self) -> Status {
        match self {
            Error::Validation(_) | Error::InvalidConfig(_) => Status::ValidationError,
            Error::AllocationExhausted { .. } => Status::AllocationExhausted,
            Error::NotFound(_) => Status::NotFound,
            Error::AlreadyExists(_) => Status::AlreadyExists,
            Error::Timeout(_) => Status::DeadlineExceeded,
            Error::Io(_)
            | Error::Http(_)
            | Error::Store(_)
            | Error::RocksDb(_)
            | Error::MetadataCorrupted(_)
            | Error::Internal(_)
            | Error::Other(_) => Status::StoreError,
        }
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::MetadataCorrupted(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}
