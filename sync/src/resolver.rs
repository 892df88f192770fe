//! Resolution of "what commit is this branch at right now", with caching and
//! branch-name disambiguation.
//!
//! Branch names may contain `/`, so a request for branch `feature` and path
//! `x/y` can really mean branch `feature/x` and path `y`. The remote cannot
//! tell us which; we find out by trying the splits in order.

use crate::cache::StateCache;
use crate::error::{SyncError, SyncResult};
use remote::{CommitLookup, GitLocation, RemoteError, RemoteObjectStore};
use std::sync::Arc;
use tracing::debug;

/// A resolved branch head, together with the location it was actually found
/// at (the branch/path split may differ from the requested one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedState {
    pub commit_sha: String,
    pub location: GitLocation,
}

pub struct RepoStateResolver {
    store: Arc<dyn RemoteObjectStore>,
    cache: Arc<StateCache>,
}

impl RepoStateResolver {
    pub fn new(store: Arc<dyn RemoteObjectStore>, cache: Arc<StateCache>) -> Self {
        Self { store, cache }
    }

    /// Resolve the current commit sha for `location`.
    ///
    /// `skip_cache` bypasses the sha cache for the requested split only;
    /// disambiguation retries always consult it. Lookups made with a per-user
    /// `token` never populate the shared ETag cache.
    pub async fn resolve(
        &self,
        location: &GitLocation,
        skip_cache: bool,
        token: Option<&str>,
    ) -> SyncResult<ResolvedState> {
        let candidates = branch_candidates(&location.branch, location.path_str());

        for (index, (branch, path)) in candidates.iter().enumerate() {
            let candidate = location.with_branch(branch).with_path(path.clone());

            if !(skip_cache && index == 0) {
                if let Some(sha) = self.cache.latest_sha(&candidate) {
                    return Ok(ResolvedState {
                        commit_sha: sha,
                        location: candidate,
                    });
                }
            }

            match self.lookup(&candidate, token).await {
                Ok(sha) => {
                    return Ok(ResolvedState {
                        commit_sha: sha,
                        location: candidate,
                    });
                }
                Err(SyncError::Remote(
                    RemoteError::NotFound | RemoteError::Unprocessable { .. },
                )) => {
                    debug!(
                        "no branch {} with path {:?}, retrying with next split",
                        candidate.branch, candidate.path
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(SyncError::NotFound)
    }

    /// Drop the cached sha so the next resolve observes the remote. Must be
    /// called after every successful branch mutation.
    pub fn invalidate(&self, location: &GitLocation) {
        self.cache.invalidate(location);
    }

    async fn lookup(&self, location: &GitLocation, token: Option<&str>) -> SyncResult<String> {
        let cached = self.cache.etag(location);
        let lookup = self
            .store
            .latest_commit(
                &location.owner,
                &location.repo,
                &location.branch,
                location.path_str(),
                cached.as_ref().map(|entry| entry.etag.as_str()),
                token,
            )
            .await?;

        let sha = match lookup {
            CommitLookup::NotModified => match cached {
                Some(entry) => {
                    debug!("etag still current for {}/{}", location.owner, location.repo);
                    entry.sha
                }
                None => {
                    return Err(SyncError::Remote(RemoteError::Api {
                        status: 304,
                        message: "not modified without a cached validator".to_string(),
                    }))
                }
            },
            CommitLookup::Fresh { sha, etag } => {
                // Per-user lookups stay out of the shared ETag cache: their
                // visibility must not leak, and authenticated quota is not a
                // concern anyway.
                if token.is_none() {
                    if let Some(etag) = etag {
                        self.cache.store_etag(location, etag, &sha);
                    }
                }
                sha
            }
        };

        self.cache.store_sha(location, &sha);
        Ok(sha)
    }
}

/// All (branch, path) splits a request could have meant, in the order they
/// should be tried: the literal split first, then one path segment at a time
/// folded into the branch.
pub fn branch_candidates(branch: &str, path: &str) -> Vec<(String, String)> {
    let mut candidates = vec![(branch.to_string(), path.to_string())];

    if !path.is_empty() {
        let segments: Vec<&str> = path.split('/').collect();
        let mut grown = branch.to_string();
        for (index, segment) in segments.iter().enumerate() {
            if segment.is_empty() {
                break;
            }
            grown = format!("{}/{}", grown, segment);
            candidates.push((grown.clone(), segments[index + 1..].join("/")));
        }
    }

    candidates
}
