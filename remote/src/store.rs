use crate::types::{
    BlobEncoding, CommitLookup, GitObjectRef, Permission, RefUpdate, RemoteTree, RepoInfo,
    TreeWriteEntry,
};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Could not find the specified repository or directory")]
    NotFound,

    #[error("Remote store rejected the request: {message}")]
    Unprocessable { message: String },

    #[error("Remote refused the merge: {message}")]
    Conflict { message: String },

    #[error("Archive of {size} bytes exceeds the {limit} byte ceiling")]
    TooLarge { size: u64, limit: u64 },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Remote store returned {status}: {message}")]
    Api { status: u16, message: String },
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// The remote Git object API the synchronization engine runs against.
///
/// Implementations translate transport detail (HTTP statuses, wire payloads)
/// into [`RemoteError`] here; consumers never branch on a status code.
/// Credentials are per-user tokens; passing `None` lets the implementation
/// fall back to its shared service credential.
#[async_trait]
pub trait RemoteObjectStore: Send + Sync {
    /// Latest commit sha for a branch, scoped to `path` when non-empty.
    /// Sends `etag` as a conditional validator when given; a still-current
    /// answer comes back as [`CommitLookup::NotModified`] without consuming
    /// meaningful quota.
    async fn latest_commit(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        path: &str,
        etag: Option<&str>,
        token: Option<&str>,
    ) -> RemoteResult<CommitLookup>;

    /// Tree listing for a tree-ish (tree or commit sha).
    async fn get_tree(
        &self,
        owner: &str,
        repo: &str,
        tree_sha: &str,
        recursive: bool,
        token: Option<&str>,
    ) -> RemoteResult<RemoteTree>;

    async fn create_blob(
        &self,
        owner: &str,
        repo: &str,
        content: &str,
        encoding: BlobEncoding,
        token: &str,
    ) -> RemoteResult<GitObjectRef>;

    async fn create_tree(
        &self,
        owner: &str,
        repo: &str,
        entries: &[TreeWriteEntry],
        base_tree: Option<&str>,
        token: &str,
    ) -> RemoteResult<GitObjectRef>;

    async fn create_commit(
        &self,
        owner: &str,
        repo: &str,
        tree_sha: &str,
        parents: &[String],
        message: &str,
        token: &str,
    ) -> RemoteResult<GitObjectRef>;

    /// Point an existing branch at `commit_sha`.
    async fn update_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        commit_sha: &str,
        force: bool,
        token: &str,
    ) -> RemoteResult<RefUpdate>;

    /// Create a new branch pointing at `commit_sha`.
    async fn create_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        commit_sha: &str,
        token: &str,
    ) -> RemoteResult<RefUpdate>;

    /// Server-side merge of `head_sha` into `base_branch`. Returns the merge
    /// commit, or `None` when the branch already contained the head. A
    /// genuine content conflict surfaces as [`RemoteError::Conflict`].
    async fn merge(
        &self,
        owner: &str,
        repo: &str,
        base_branch: &str,
        head_sha: &str,
        token: &str,
    ) -> RemoteResult<Option<GitObjectRef>>;

    /// Request a fork under the token's identity. Forking is asynchronous on
    /// the remote side; completion is observed via [`repo_exists`].
    ///
    /// [`repo_exists`]: RemoteObjectStore::repo_exists
    async fn create_fork(&self, owner: &str, repo: &str, token: &str) -> RemoteResult<()>;

    async fn repo_exists(&self, owner: &str, repo: &str, token: Option<&str>)
        -> RemoteResult<bool>;

    async fn fetch_permission(
        &self,
        owner: &str,
        repo: &str,
        token: Option<&str>,
    ) -> RemoteResult<Permission>;

    async fn repo_info(
        &self,
        owner: &str,
        repo: &str,
        token: Option<&str>,
    ) -> RemoteResult<RepoInfo>;

    /// Create a brand-new repository under the token's identity.
    async fn create_repo(&self, name: &str, private: bool, token: &str) -> RemoteResult<RepoInfo>;

    /// Download a gzipped tar archive of the repository at `commit_sha`.
    /// Implementations must reject a declared content length above
    /// `max_bytes` before reading the body.
    async fn download_archive(
        &self,
        owner: &str,
        repo: &str,
        commit_sha: &str,
        max_bytes: u64,
        token: Option<&str>,
    ) -> RemoteResult<Vec<u8>>;

    /// Sha of the most recent commit that touched `path` on `branch`, if any.
    async fn latest_commit_for_file(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        path: &str,
        token: Option<&str>,
    ) -> RemoteResult<Option<String>>;

    /// Remaining request quota on the shared service credential.
    async fn remaining_quota(&self) -> RemoteResult<u64>;
}
