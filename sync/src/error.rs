use remote::RemoteError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Could not find the specified repository or directory")]
    NotFound,

    #[error("{message}")]
    TooLarge { message: String },

    #[error("Not enough rate limit remaining: {required} lookups needed, {remaining} left")]
    RateLimited { required: usize, remaining: u64 },

    #[error("No write access to {owner}/{repo} and forking it failed")]
    PermissionDenied { owner: String, repo: String },

    #[error("Forking {owner}/{repo} took longer than {waited_secs} seconds, try again later")]
    ForkTimeout {
        owner: String,
        repo: String,
        waited_secs: u64,
    },

    #[error("Invalid base64 content: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Failed to unpack repository archive: {0}")]
    Archive(#[from] std::io::Error),

    #[error("{message}")]
    Invalid { message: String },

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl SyncError {
    /// A tree listing the remote refused to return in full.
    pub fn tree_truncated() -> Self {
        SyncError::TooLarge {
            message: "This repository is too big to make a commit".to_string(),
        }
    }

    /// An archive above the download ceiling.
    pub fn archive_too_large() -> Self {
        SyncError::TooLarge {
            message: "This repository is too big to import".to_string(),
        }
    }

    /// Whether retrying later could succeed without any input change.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::RateLimited { .. } | SyncError::ForkTimeout { .. }
        )
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
