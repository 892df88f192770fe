//! The commit-construction pipeline: blobs, tree, commit object, and the
//! ref-reconciliation ladder (fast-forward, merge, new branch).

use crate::error::{SyncError, SyncResult};
use crate::resolver::RepoStateResolver;
use futures::future::try_join_all;
use remote::{
    GitLocation, GitObjectRef, Identity, PendingWrite, RemoteError, RemoteObjectStore, RemoteTree,
    TreeEntry, TreeEntryKind, TreeWriteEntry,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The files to publish. `added`/`modified` carry content, `deleted` only
/// paths. All paths are local-side relative; the pipeline rebases them onto
/// the location's sub-path exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitChanges {
    pub added: Vec<PendingWrite>,
    pub modified: Vec<PendingWrite>,
    pub deleted: Vec<String>,
}

impl CommitChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// Where a published commit ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    /// Head the reported branch now points at.
    pub commit_sha: String,
    pub branch: String,
    /// The branch had moved and the commit was merged into it.
    pub merged: bool,
    /// The changes live on a freshly created branch because the original
    /// branch could be neither fast-forwarded nor merged.
    pub branch_created: bool,
}

/// A branch created by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    pub branch: String,
    pub ref_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

pub struct CommitPipeline {
    store: Arc<dyn RemoteObjectStore>,
    resolver: Arc<RepoStateResolver>,
}

impl CommitPipeline {
    pub fn new(store: Arc<dyn RemoteObjectStore>, resolver: Arc<RepoStateResolver>) -> Self {
        Self { store, resolver }
    }

    /// Fetch the full tree at `commit_sha`, rejecting truncated listings.
    /// With `make_relative`, entries outside the location's sub-path are
    /// dropped and the rest rebased to local-relative paths (the form the
    /// diff engine consumes).
    pub async fn normalized_tree(
        &self,
        location: &GitLocation,
        commit_sha: &str,
        make_relative: bool,
        token: Option<&str>,
    ) -> SyncResult<RemoteTree> {
        let tree = self
            .store
            .get_tree(&location.owner, &location.repo, commit_sha, true, token)
            .await?;
        if tree.truncated {
            return Err(SyncError::tree_truncated());
        }

        let mut entries = tree.entries;
        if make_relative {
            if let Some(path) = location.path.as_deref() {
                let prefix = format!("{}/", path);
                entries.retain(|entry| entry.path.starts_with(&prefix));
                for entry in &mut entries {
                    entry.path = entry.path[prefix.len()..].to_string();
                }
            }
        }

        Ok(RemoteTree {
            sha: tree.sha,
            entries,
            truncated: false,
        })
    }

    /// Publish `changes` on top of `parents[0]` and reconcile the branch ref.
    ///
    /// The ladder: fast-forward when the branch still points at the diffed
    /// commit, otherwise (or when the fast-forward itself fails) a
    /// server-side merge, and on a merge conflict a brand-new branch carrying
    /// the commit — the original branch is never overwritten with stale
    /// state and the caller's changes are never dropped.
    pub async fn commit(
        &self,
        location: &GitLocation,
        changes: CommitChanges,
        parents: &[String],
        message: &str,
        identity: &Identity,
    ) -> SyncResult<CommitOutcome> {
        let base_sha = parents
            .first()
            .ok_or_else(|| SyncError::Invalid {
                message: "a commit requires at least one parent sha".to_string(),
            })?
            .clone();

        let commit = self
            .create_commit_object(location, &changes, parents, message, &identity.token)
            .await?;

        // Anything resolved before the object-creation awaits is stale by
        // now; re-resolve and compare against the diffed parent.
        let fresh = self
            .resolver
            .resolve(location, true, Some(&identity.token))
            .await?;

        if fresh.commit_sha == base_sha {
            match self
                .store
                .update_ref(
                    &location.owner,
                    &location.repo,
                    &location.branch,
                    &commit.sha,
                    true,
                    &identity.token,
                )
                .await
            {
                Ok(_) => {
                    self.resolver.invalidate(location);
                    info!(
                        "fast-forwarded {}/{}@{} to {}",
                        location.owner, location.repo, location.branch, commit.sha
                    );
                    return Ok(CommitOutcome {
                        commit_sha: commit.sha,
                        branch: location.branch.clone(),
                        merged: false,
                        branch_created: false,
                    });
                }
                Err(e) => {
                    warn!(
                        "fast-forward of {} failed ({}), attempting merge",
                        location.branch, e
                    );
                }
            }
        } else {
            debug!(
                "branch {} moved from {} to {} since diff, attempting merge",
                location.branch, base_sha, fresh.commit_sha
            );
        }

        match self
            .store
            .merge(
                &location.owner,
                &location.repo,
                &location.branch,
                &commit.sha,
                &identity.token,
            )
            .await
        {
            Ok(merge) => {
                self.resolver.invalidate(location);
                let head = merge.map(|m| m.sha).unwrap_or_else(|| commit.sha.clone());
                Ok(CommitOutcome {
                    commit_sha: head,
                    branch: location.branch.clone(),
                    merged: true,
                    branch_created: false,
                })
            }
            Err(RemoteError::Conflict { .. }) => {
                let branch = self
                    .create_branch(location, &commit.sha, None, &identity.token)
                    .await?;
                self.resolver.invalidate(location);
                info!(
                    "merge into {} conflicted, changes published on new branch {}",
                    location.branch, branch.branch
                );
                Ok(CommitOutcome {
                    commit_sha: commit.sha,
                    branch: branch.branch,
                    merged: false,
                    branch_created: true,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Build blob/tree/commit objects for `changes` without touching any ref.
    pub async fn create_commit_object(
        &self,
        location: &GitLocation,
        changes: &CommitChanges,
        parents: &[String],
        message: &str,
        token: &str,
    ) -> SyncResult<GitObjectRef> {
        let base_commit = parents.first().ok_or_else(|| SyncError::Invalid {
            message: "a commit requires at least one parent sha".to_string(),
        })?;

        let base = self
            .normalized_tree(location, base_commit, false, Some(token))
            .await?;

        // The single local-to-remote rebasing step for this operation.
        let writes: Vec<PendingWrite> = changes
            .modified
            .iter()
            .chain(changes.added.iter())
            .map(|write| PendingWrite {
                path: location.rebase(&write.path),
                content: write.content.clone(),
                encoding: write.encoding,
            })
            .collect();
        let deleted: Vec<String> = changes
            .deleted
            .iter()
            .map(|path| location.rebase(path))
            .collect();

        let had_deletions = !deleted.is_empty();
        let entries = if had_deletions {
            self.resolve_deletions(location, base.entries, &deleted, token)
                .await?
        } else {
            base.entries
        };

        debug!(
            "creating {} blob(s) for {}/{}",
            writes.len(),
            location.owner,
            location.repo
        );
        let new_blobs = try_join_all(writes.iter().map(|write| async move {
            let blob = self
                .store
                .create_blob(
                    &location.owner,
                    &location.repo,
                    &write.content,
                    write.encoding,
                    token,
                )
                .await?;
            Ok::<TreeWriteEntry, SyncError>(TreeWriteEntry::blob(write.path.clone(), blob.sha))
        }))
        .await?;

        // Deletions cannot ride on the base_tree shortcut: the new tree must
        // be a full materialized listing.
        let tree_entries = assemble_tree(entries, new_blobs);
        let base_tree = if had_deletions {
            None
        } else {
            Some(base.sha.as_str())
        };
        let tree = self
            .store
            .create_tree(
                &location.owner,
                &location.repo,
                &tree_entries,
                base_tree,
                token,
            )
            .await?;

        let commit = self
            .store
            .create_commit(
                &location.owner,
                &location.repo,
                &tree.sha,
                parents,
                message,
                token,
            )
            .await?;

        info!(
            "created commit {} ({} writes, {} deletions) in {}/{}",
            commit.sha,
            writes.len(),
            deleted.len(),
            location.owner,
            location.repo
        );
        Ok(commit)
    }

    /// Create a branch at `commit_sha`, generating a name when none is given.
    pub async fn create_branch(
        &self,
        location: &GitLocation,
        commit_sha: &str,
        name: Option<String>,
        token: &str,
    ) -> SyncResult<BranchInfo> {
        let branch = name.unwrap_or_else(generated_branch_name);
        let update = self
            .store
            .create_ref(&location.owner, &location.repo, &branch, commit_sha, token)
            .await?;

        Ok(BranchInfo {
            branch,
            ref_name: update.ref_name,
            url: update.url,
        })
    }

    /// Remove `deleted` paths from `entries`, expanding any subtree whose
    /// children the listing does not show. The walk is an explicit worklist
    /// over directory prefixes, root first, so ordering is deterministic.
    async fn resolve_deletions(
        &self,
        location: &GitLocation,
        mut entries: Vec<TreeEntry>,
        deleted: &[String],
        token: &str,
    ) -> SyncResult<Vec<TreeEntry>> {
        for path in deleted {
            let mut worklist = ancestor_chain(path);
            worklist.reverse();

            while let Some(dir) = worklist.pop() {
                if entries
                    .iter()
                    .any(|entry| entry.is_blob() && entry.path == *path)
                {
                    break;
                }
                let position = entries
                    .iter()
                    .position(|entry| entry.kind == TreeEntryKind::Tree && entry.path == dir);
                let Some(position) = position else { continue };

                let sha = entries[position].sha.clone();
                debug!("expanding subtree {} to resolve deletion of {}", dir, path);
                let subtree = self
                    .store
                    .get_tree(&location.owner, &location.repo, &sha, false, Some(token))
                    .await?;
                if subtree.truncated {
                    return Err(SyncError::tree_truncated());
                }

                entries.remove(position);
                entries.extend(subtree.entries.into_iter().map(|mut entry| {
                    entry.path = format!("{}/{}", dir, entry.path);
                    entry
                }));
            }
        }

        entries.retain(|entry| !deleted.iter().any(|path| *path == entry.path));
        Ok(entries)
    }
}

/// Combine the (deletion-adjusted) base listing with freshly written blobs.
/// Base blobs superseded by a new blob at the same path are dropped, as are
/// subtree references that a listed blob path reaches into (the two forms
/// must not overlap in one tree submission).
fn assemble_tree(entries: Vec<TreeEntry>, new_blobs: Vec<TreeWriteEntry>) -> Vec<TreeWriteEntry> {
    let written: HashSet<&str> = new_blobs.iter().map(|blob| blob.path.as_str()).collect();
    let blob_paths: Vec<String> = entries
        .iter()
        .filter(|entry| entry.is_blob())
        .map(|entry| entry.path.clone())
        .chain(new_blobs.iter().map(|blob| blob.path.clone()))
        .collect();

    let mut assembled: Vec<TreeWriteEntry> = entries
        .iter()
        .filter(|entry| match entry.kind {
            TreeEntryKind::Blob => !written.contains(entry.path.as_str()),
            TreeEntryKind::Tree => {
                let prefix = format!("{}/", entry.path);
                !blob_paths.iter().any(|path| path.starts_with(&prefix))
            }
            TreeEntryKind::Commit => true,
        })
        .map(TreeWriteEntry::from)
        .collect();
    assembled.extend(new_blobs);
    assembled
}

/// Directory prefixes of a path, root first: `a/b/c.txt` -> `["a", "a/b"]`.
fn ancestor_chain(path: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut prefix = String::new();
    let mut parts = path.split('/').peekable();
    while let Some(part) = parts.next() {
        if parts.peek().is_none() {
            break;
        }
        if prefix.is_empty() {
            prefix = part.to_string();
        } else {
            prefix = format!("{}/{}", prefix, part);
        }
        chain.push(prefix.clone());
    }
    chain
}

fn generated_branch_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("sync-{}", &id[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(path: &str, sha: &str) -> TreeEntry {
        TreeEntry {
            path: path.to_string(),
            mode: "100644".to_string(),
            kind: TreeEntryKind::Blob,
            size: Some(1),
            sha: sha.to_string(),
            url: None,
        }
    }

    fn dir(path: &str, sha: &str) -> TreeEntry {
        TreeEntry {
            path: path.to_string(),
            mode: "040000".to_string(),
            kind: TreeEntryKind::Tree,
            size: None,
            sha: sha.to_string(),
            url: None,
        }
    }

    #[test]
    fn test_ancestor_chain() {
        assert_eq!(ancestor_chain("a.txt"), Vec::<String>::new());
        assert_eq!(ancestor_chain("a/b.txt"), vec!["a"]);
        assert_eq!(ancestor_chain("a/b/c.txt"), vec!["a", "a/b"]);
    }

    #[test]
    fn test_generated_branch_name_shape() {
        let name = generated_branch_name();
        assert!(name.starts_with("sync-"));
        assert_eq!(name.len(), "sync-".len() + 12);
        assert_ne!(name, generated_branch_name());
    }

    #[test]
    fn test_assemble_drops_superseded_blobs() {
        let entries = vec![blob("a.txt", "old"), blob("b.txt", "keep")];
        let new_blobs = vec![TreeWriteEntry::blob("a.txt", "new")];

        let assembled = assemble_tree(entries, new_blobs);
        let a: Vec<&TreeWriteEntry> = assembled.iter().filter(|e| e.path == "a.txt").collect();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].sha, "new");
        assert!(assembled.iter().any(|e| e.path == "b.txt"));
    }

    #[test]
    fn test_assemble_drops_subtree_reached_by_blob_path() {
        let entries = vec![dir("src", "tree1"), blob("src/a.txt", "s1")];
        let assembled = assemble_tree(entries, Vec::new());
        assert_eq!(assembled.len(), 1);
        assert_eq!(assembled[0].path, "src/a.txt");
    }

    #[test]
    fn test_assemble_keeps_untouched_subtree_reference() {
        let entries = vec![dir("vendor", "tree1"), blob("a.txt", "s1")];
        let assembled = assemble_tree(entries, vec![TreeWriteEntry::blob("b.txt", "s2")]);
        assert!(assembled.iter().any(|e| e.path == "vendor"));
        assert!(assembled.iter().any(|e| e.path == "b.txt"));
    }
}
