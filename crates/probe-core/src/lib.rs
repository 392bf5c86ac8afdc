use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod directory;
pub mod gateway;
pub mod params;

pub use directory::{build_directory, DirectoryNode, NodeKind};
pub use gateway::{
    GatewayError, InsertRecord, InvokeReply, RecordGateway, UpdateRecord,
};
pub use params::{format_json_params, params_are_valid_json};

/// Stable identifier for a connection target within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId(Uuid);

impl TargetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named (host, port) endpoint the tool can talk to. Held only for the
/// lifetime of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub id: TargetId,
    pub name: String,
    pub host: String,
    pub port: u16,
}

/// Validity flag carried by stored records. The collaborator encodes it as
/// an integer column: 0 is live, anything else is superseded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum RecordValidity {
    #[default]
    Valid,
    Superseded,
}

impl From<i64> for RecordValidity {
    fn from(value: i64) -> Self {
        if value == 0 {
            RecordValidity::Valid
        } else {
            RecordValidity::Superseded
        }
    }
}

impl From<RecordValidity> for i64 {
    fn from(value: RecordValidity) -> Self {
        match value {
            RecordValidity::Valid => 0,
            RecordValidity::Superseded => 1,
        }
    }
}

/// A saved invocation: parameters plus metadata for a specific
/// (port, service, method). Owned by the external store; `id` is
/// server-assigned and stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRecord {
    pub id: i64,
    pub port: u16,
    pub service: String,
    pub method: String,
    pub name: String,
    #[serde(default)]
    pub json_params: String,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub modify_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_valid: RecordValidity,
}

/// Which path produced the current selection. A directory entry is
/// reachable while the active filters point elsewhere, so it snapshots the
/// service/method that were true for the record at selection time; a
/// list-originated selection is always consistent with the active filters
/// by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOrigin {
    FromList,
    FromDirectory { service: String, method: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub record: InvocationRecord,
    pub origin: SelectionOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
}

impl NoticeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeKind::Success => "success",
            NoticeKind::Error => "error",
        }
    }
}

/// Transient user-facing notice. The session clears it a fixed interval
/// after it is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub kind: NoticeKind,
    pub visible: bool,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: NoticeKind::Success,
            visible: true,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: NoticeKind::Error,
            visible: true,
        }
    }
}

/// Outcome of a remote invocation, success or failure, for the response
/// surface.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeOutcome {
    pub success: bool,
    pub body: String,
    pub elapsed_ms: u64,
    pub finished_at: DateTime<Utc>,
}
