pub mod cache;
pub mod commit;
pub mod diff;
pub mod error;
pub mod fork;
pub mod resolver;
pub mod snapshot;

pub use cache::{Clock, EtagEntry, StateCache, SystemClock};
pub use commit::{BranchInfo, CommitChanges, CommitOutcome, CommitPipeline};
pub use diff::{diff, git_blob_hash, ChangeSet, LocalFile};
pub use error::{SyncError, SyncResult};
pub use fork::ForkCoordinator;
pub use resolver::{branch_candidates, RepoStateResolver, ResolvedState};
pub use snapshot::{
    raw_cdn_url, NormalizedFile, NormalizedFileSet, RepositorySnapshotDownloader,
    MAX_ARCHIVE_BYTES,
};

use remote::{GitLocation, Identity, PendingWrite, RemoteObjectStore};
use std::sync::Arc;

/// The synchronization engine's front door, wiring the resolver, diff
/// engine, commit pipeline, fork coordinator, and snapshot downloader around
/// one shared store and cache.
pub struct GitSync {
    store: Arc<dyn RemoteObjectStore>,
    resolver: Arc<RepoStateResolver>,
    pipeline: CommitPipeline,
    forks: ForkCoordinator,
    snapshots: RepositorySnapshotDownloader,
}

impl GitSync {
    pub fn new(store: Arc<dyn RemoteObjectStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Construct with an injected clock so cache TTLs are testable.
    pub fn with_clock(store: Arc<dyn RemoteObjectStore>, clock: Arc<dyn Clock>) -> Self {
        let cache = Arc::new(StateCache::new(clock));
        let resolver = Arc::new(RepoStateResolver::new(store.clone(), cache));
        Self {
            pipeline: CommitPipeline::new(store.clone(), resolver.clone()),
            forks: ForkCoordinator::new(store.clone()),
            snapshots: RepositorySnapshotDownloader::new(store.clone()),
            resolver,
            store,
        }
    }

    /// Current commit sha for a branch/path, with slash-ambiguity handling.
    pub async fn resolve(
        &self,
        location: &GitLocation,
        skip_cache: bool,
        token: Option<&str>,
    ) -> SyncResult<ResolvedState> {
        self.resolver.resolve(location, skip_cache, token).await
    }

    /// Delta between the remote tree at `commit_sha` and `files` (which are
    /// relative to the location's sub-path).
    pub async fn file_differences(
        &self,
        location: &GitLocation,
        commit_sha: &str,
        files: &[LocalFile],
        token: Option<&str>,
    ) -> SyncResult<ChangeSet> {
        let tree = self
            .pipeline
            .normalized_tree(location, commit_sha, true, token)
            .await?;
        diff::diff(&tree.entries, files)
    }

    /// Publish `changes` as a commit on top of `parents[0]`, reconciling the
    /// branch ref (fast-forward, merge, or new branch).
    pub async fn commit(
        &self,
        location: &GitLocation,
        changes: CommitChanges,
        parents: &[String],
        message: &str,
        identity: &Identity,
    ) -> SyncResult<CommitOutcome> {
        self.pipeline
            .commit(location, changes, parents, message, identity)
            .await
    }

    /// Create a branch at `commit_sha`; a `sync-` name is generated when none
    /// is given.
    pub async fn create_branch(
        &self,
        location: &GitLocation,
        commit_sha: &str,
        name: Option<String>,
        identity: &Identity,
    ) -> SyncResult<BranchInfo> {
        self.pipeline
            .create_branch(location, commit_sha, name, &identity.token)
            .await
    }

    /// A location the identity can push to, forking the target if needed.
    pub async fn ensure_writable(
        &self,
        location: &GitLocation,
        identity: &Identity,
    ) -> SyncResult<GitLocation> {
        self.forks.ensure_writable(location, identity).await
    }

    /// Full repository snapshot at `commit_sha`.
    pub async fn snapshot(
        &self,
        location: &GitLocation,
        commit_sha: &str,
        is_private: bool,
        token: Option<&str>,
    ) -> SyncResult<NormalizedFileSet> {
        self.snapshots
            .snapshot(location, commit_sha, is_private, token)
            .await
    }

    pub async fn default_branch(
        &self,
        owner: &str,
        repo: &str,
        token: Option<&str>,
    ) -> SyncResult<String> {
        let info = self.store.repo_info(owner, repo, token).await?;
        Ok(info.default_branch)
    }

    pub async fn is_private(
        &self,
        owner: &str,
        repo: &str,
        token: Option<&str>,
    ) -> SyncResult<bool> {
        let info = self.store.repo_info(owner, repo, token).await?;
        Ok(info.private)
    }

    /// Create a brand-new repository seeded with `files` and return its
    /// location.
    pub async fn create_repo(
        &self,
        name: &str,
        files: &[LocalFile],
        private: bool,
        identity: &Identity,
    ) -> SyncResult<GitLocation> {
        let info = self.store.create_repo(name, private, &identity.token).await?;
        let location = GitLocation::new(info.owner, info.name, info.default_branch);

        let state = self
            .resolver
            .resolve(&location, true, Some(&identity.token))
            .await?;

        let changes = CommitChanges {
            added: files.iter().map(pending_write).collect(),
            modified: Vec::new(),
            deleted: Vec::new(),
        };
        let commit = self
            .pipeline
            .create_commit_object(
                &location,
                &changes,
                &[state.commit_sha],
                "Initial commit",
                &identity.token,
            )
            .await?;

        self.store
            .update_ref(
                &location.owner,
                &location.repo,
                &location.branch,
                &commit.sha,
                true,
                &identity.token,
            )
            .await?;
        self.resolver.invalidate(&location);

        Ok(location)
    }
}

fn pending_write(file: &LocalFile) -> PendingWrite {
    if file.is_binary {
        PendingWrite::base64(&file.path, &file.content)
    } else {
        PendingWrite::utf8(&file.path, &file.content)
    }
}

pub mod prelude {
    pub use crate::cache::*;
    pub use crate::commit::*;
    pub use crate::diff::*;
    pub use crate::error::*;
    pub use crate::fork::*;
    pub use crate::resolver::*;
    pub use crate::snapshot::*;
    pub use crate::GitSync;
}
