use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Classified failure reported by the vault or raised while talking to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    OperationFailed,
    UpdateDenied,
    DeletionDenied,
    OperationDenied,
    InvalidInput,
    /// Any other error type string returned by the vault, kept verbatim.
    Other(String),
}

impl ErrorKind {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorKind::OperationFailed => "OPERATION_FAILED",
            ErrorKind::UpdateDenied => "UPDATE_DENIED",
            ErrorKind::DeletionDenied => "DELETION_DENIED",
            ErrorKind::OperationDenied => "OPERATION_DENIED",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::Other(s) => s,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ErrorKind {
    fn from(s: &str) -> Self {
        match s {
            "OPERATION_FAILED" => ErrorKind::OperationFailed,
            "UPDATE_DENIED" => ErrorKind::UpdateDenied,
            "DELETION_DENIED" => ErrorKind::DeletionDenied,
            "OPERATION_DENIED" => ErrorKind::OperationDenied,
            "INVALID_INPUT" | "INVALID_DATA" | "PARAMETER_REQUIRED" => ErrorKind::InvalidInput,
            other => ErrorKind::Other(other.to_string()),
        }
    }
}

/// Error value returned by every external call. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct CallError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CallError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn operation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OperationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }
}

/// Result of one call through the external API client.
pub type CallResult<T> = std::result::Result<T, CallError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
            HttpMethod::Put => f.write_str("PUT"),
        }
    }
}

/// Form parameters sent with a call. Keys may repeat (multi-value controls).
pub type Params = Vec<(String, String)>;

/// A document version, rendered on the wire as `{id}_{major}_{minor}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentVersionId {
    pub id: String,
    pub major: u32,
    pub minor: u32,
}

impl DocumentVersionId {
    pub fn new(id: impl Into<String>, major: u32, minor: u32) -> Self {
        Self {
            id: id.into(),
            major,
            minor,
        }
    }

    /// Path segment `documents/{id}/versions/{major}/{minor}`.
    pub fn path(&self) -> String {
        format!(
            "documents/{}/versions/{}/{}",
            self.id, self.major, self.minor
        )
    }
}

impl fmt::Display for DocumentVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.id, self.major, self.minor)
    }
}

impl FromStr for DocumentVersionId {
    type Err = CallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CallError::invalid_input(format!("Malformed document version id: {s}"));

        let mut parts = s.split('_');
        let (Some(id), Some(major), Some(minor), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        Ok(Self {
            id: id.to_string(),
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

impl TryFrom<String> for DocumentVersionId {
    type Error = CallError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<DocumentVersionId> for String {
    fn from(v: DocumentVersionId) -> Self {
        v.to_string()
    }
}

/// An entry of the lifecycle action menu for a document version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleAction {
    pub label: String,
    pub name: String,
}

/// One row of the active-workflow listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveWorkflow {
    pub document_id: String,
    pub task_id: String,
}
