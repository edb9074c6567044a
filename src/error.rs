//! Crate-wide error taxonomy.
//!
//! Hot-path code (the poller and the mapping engine) never returns
//! [`AsteriqError`]; failures there are counted and surfaced as data
//! (`DeviceDisconnected`, `DeviceLost`) rather than as `Result::Err`, so the
//! polling loop can never unwind on a single bad sample. This type is for
//! startup, persistence, and the background extraction/export paths.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AsteriqError {
    #[error("device enumeration failed: {0}")]
    DeviceEnumerationFailure(String),

    #[error("device disconnected: {0}")]
    DeviceDisconnected(String),

    #[error("virtual slot {0} lost (repeated write failures)")]
    DeviceLost(u8),

    #[error("virtual slot {0} is busy (owned by another process)")]
    SlotBusy(u8),

    #[error("virtual slot {0} is not configured")]
    SlotMissing(u8),

    #[error("virtual slot {0} is already owned by this process")]
    SlotAlreadyOwned(u8),

    #[error("virtual-device driver mismatch: library {lib_ver}, driver {drv_ver}")]
    DriverMismatch { lib_ver: String, drv_ver: String },

    #[error("device-hide utility unavailable")]
    HidHideUnavailable,

    #[error("failed to open binding archive: {0}")]
    ArchiveOpenFailure(String),

    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    #[error("archive decryption failed")]
    DecryptionFailure,

    #[error("binary XML parse error: {0}")]
    BinaryXmlParseError(String),

    #[error("export validation failed: {0:?}")]
    ExportValidationFailure(Vec<String>),

    #[error("a detection is already in flight")]
    DetectionBusy,

    #[error("profile I/O error: {0}")]
    ProfileIoError(String),

    #[error("profile format error: {0}")]
    ProfileFormatError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AsteriqError>;

/// Advisory schema-change report (§4.9 step 6). Never fatal, so it is a
/// plain data type rather than an [`AsteriqError`] variant.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SchemaDiffWarning {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub renamed: Vec<(String, String)>,
}
