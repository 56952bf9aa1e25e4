/// Error types shared across the locker
///
/// `LockerError` covers every failure coming out of the database, the disk
/// cache, the network and the image decoder. `AddEntryError` is what the add
/// form gets back: either a field-level validation message or a hard failure.

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum LockerError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("remote returned {status} for {url}")]
    RemoteStatus { url: String, status: u16 },
    #[error("no entry with indexation id {0}")]
    EntryNotFound(String),
    #[error("attachment already registered: {0}")]
    DuplicateAttachment(String),
    #[error("no content available for {0}")]
    ContentUnavailable(String),
    #[error("configuration error: {0}")]
    Config(String),
}

pub type LockerResult<T> = Result<T, LockerError>;

/// Add-form field an error message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddField {
    UserId,
    AttachmentUrl,
}

impl fmt::Display for AddField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddField::UserId => write!(f, "user id"),
            AddField::AttachmentUrl => write!(f, "attachment url"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AddEntryError {
    /// Rejected before anything was written
    #[error("{field}: {message}")]
    Invalid { field: AddField, message: String },
    #[error(transparent)]
    Failed(#[from] LockerError),
}

impl AddEntryError {
    pub fn invalid(field: AddField, message: impl Into<String>) -> Self {
        AddEntryError::Invalid {
            field,
            message: message.into(),
        }
    }

    /// The form field to flag, if this is a validation failure
    pub fn field(&self) -> Option<AddField> {
        match self {
            AddEntryError::Invalid { field, .. } => Some(*field),
            AddEntryError::Failed(_) => None,
        }
    }
}
