#![allow(dead_code)]

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use remote::{
    BlobEncoding, CommitLookup, GitObjectRef, Permission, RefUpdate, RemoteError,
    RemoteObjectStore, RemoteResult, RemoteTree, RepoInfo, TreeEntry, TreeEntryKind,
    TreeWriteEntry,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// How the mock answers a merge request.
pub enum MergeBehavior {
    Merged(String),
    NothingToMerge,
    Conflict,
}

/// Scriptable in-memory [`RemoteObjectStore`] that records every call.
pub struct MockStore {
    /// "branch|path" -> sha answered by `latest_commit`.
    pub latest: Mutex<HashMap<String, String>>,
    /// ETag attached to every fresh `latest_commit` answer.
    pub fresh_etag: Mutex<Option<String>>,
    /// Incoming validator that short-circuits to `NotModified`.
    pub not_modified_for: Mutex<Option<String>>,
    /// tree-ish -> listing answered by `get_tree`.
    pub trees: Mutex<HashMap<String, RemoteTree>>,
    pub update_ref_fails: Mutex<bool>,
    pub fork_fails: Mutex<bool>,
    pub merge_behavior: Mutex<MergeBehavior>,
    pub permission: Mutex<Permission>,
    /// Successive `repo_exists` answers; exhausted -> `true`.
    pub repo_exists_script: Mutex<VecDeque<bool>>,
    /// Blob content that makes `create_blob` fail.
    pub poison_blob_content: Mutex<Option<String>>,
    pub archive: Mutex<Vec<u8>>,
    pub quota: Mutex<u64>,
    /// Absolute file path -> sha answered by `latest_commit_for_file`.
    pub file_commits: Mutex<HashMap<String, String>>,
    pub private: Mutex<bool>,
    pub created_repo_owner: Mutex<String>,

    pub created_trees: Mutex<Vec<(Vec<TreeWriteEntry>, Option<String>)>>,
    pub created_commits: Mutex<Vec<(String, Vec<String>, String)>>,
    pub created_refs: Mutex<Vec<(String, String)>>,
    pub calls: Mutex<Vec<String>>,
    counter: AtomicUsize,
}

impl Default for MockStore {
    fn default() -> Self {
        Self {
            latest: Mutex::new(HashMap::new()),
            fresh_etag: Mutex::new(None),
            not_modified_for: Mutex::new(None),
            trees: Mutex::new(HashMap::new()),
            update_ref_fails: Mutex::new(false),
            fork_fails: Mutex::new(false),
            merge_behavior: Mutex::new(MergeBehavior::NothingToMerge),
            permission: Mutex::new(Permission::Admin),
            repo_exists_script: Mutex::new(VecDeque::new()),
            poison_blob_content: Mutex::new(None),
            archive: Mutex::new(Vec::new()),
            quota: Mutex::new(5000),
            file_commits: Mutex::new(HashMap::new()),
            private: Mutex::new(false),
            created_repo_owner: Mutex::new("creator".to_string()),
            created_trees: Mutex::new(Vec::new()),
            created_commits: Mutex::new(Vec::new()),
            created_refs: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            counter: AtomicUsize::new(0),
        }
    }
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_latest(&self, branch: &str, path: &str, sha: &str) {
        self.latest
            .lock()
            .unwrap()
            .insert(format!("{}|{}", branch, path), sha.to_string());
    }

    pub fn set_tree(&self, tree_ish: &str, tree: RemoteTree) {
        self.trees
            .lock()
            .unwrap()
            .insert(tree_ish.to_string(), tree);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_id(&self) -> usize {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }
}

/// Blob tree entry helper for fixtures.
pub fn blob_entry(path: &str, sha: &str) -> TreeEntry {
    TreeEntry {
        path: path.to_string(),
        mode: "100644".to_string(),
        kind: TreeEntryKind::Blob,
        size: Some(1),
        sha: sha.to_string(),
        url: None,
    }
}

/// Subtree tree entry helper for fixtures.
pub fn tree_entry(path: &str, sha: &str) -> TreeEntry {
    TreeEntry {
        path: path.to_string(),
        mode: "040000".to_string(),
        kind: TreeEntryKind::Tree,
        size: None,
        sha: sha.to_string(),
        url: None,
    }
}

pub fn remote_tree(sha: &str, entries: Vec<TreeEntry>) -> RemoteTree {
    RemoteTree {
        sha: sha.to_string(),
        entries,
        truncated: false,
    }
}

/// Build a gzipped tar archive in memory, the shape the snapshot
/// downloader consumes.
pub fn tar_gz(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder
        .into_inner()
        .unwrap()
        .finish()
        .unwrap()
}

#[async_trait]
impl RemoteObjectStore for MockStore {
    async fn latest_commit(
        &self,
        _owner: &str,
        _repo: &str,
        branch: &str,
        path: &str,
        etag: Option<&str>,
        token: Option<&str>,
    ) -> RemoteResult<CommitLookup> {
        self.log(format!(
            "latest_commit:{}:{}:etag={:?}:token={}",
            branch,
            path,
            etag,
            token.is_some()
        ));

        if let (Some(etag), Some(expected)) = (etag, self.not_modified_for.lock().unwrap().clone())
        {
            if etag == expected {
                return Ok(CommitLookup::NotModified);
            }
        }

        match self
            .latest
            .lock()
            .unwrap()
            .get(&format!("{}|{}", branch, path))
        {
            Some(sha) => Ok(CommitLookup::Fresh {
                sha: sha.clone(),
                etag: self.fresh_etag.lock().unwrap().clone(),
            }),
            None => Err(RemoteError::NotFound),
        }
    }

    async fn get_tree(
        &self,
        _owner: &str,
        _repo: &str,
        tree_sha: &str,
        recursive: bool,
        _token: Option<&str>,
    ) -> RemoteResult<RemoteTree> {
        self.log(format!("get_tree:{}:recursive={}", tree_sha, recursive));
        self.trees
            .lock()
            .unwrap()
            .get(tree_sha)
            .cloned()
            .ok_or(RemoteError::NotFound)
    }

    async fn create_blob(
        &self,
        _owner: &str,
        _repo: &str,
        content: &str,
        _encoding: BlobEncoding,
        _token: &str,
    ) -> RemoteResult<GitObjectRef> {
        self.log(format!("create_blob:{}", content));

        if let Some(poison) = self.poison_blob_content.lock().unwrap().clone() {
            if content == poison {
                return Err(RemoteError::Api {
                    status: 500,
                    message: "blob store unavailable".to_string(),
                });
            }
        }

        Ok(GitObjectRef {
            sha: format!("blob-{}", self.next_id()),
            url: None,
        })
    }

    async fn create_tree(
        &self,
        _owner: &str,
        _repo: &str,
        entries: &[TreeWriteEntry],
        base_tree: Option<&str>,
        _token: &str,
    ) -> RemoteResult<GitObjectRef> {
        self.log(format!("create_tree:base={:?}", base_tree));
        self.created_trees
            .lock()
            .unwrap()
            .push((entries.to_vec(), base_tree.map(str::to_string)));
        Ok(GitObjectRef {
            sha: format!("tree-{}", self.next_id()),
            url: None,
        })
    }

    async fn create_commit(
        &self,
        _owner: &str,
        _repo: &str,
        tree_sha: &str,
        parents: &[String],
        message: &str,
        _token: &str,
    ) -> RemoteResult<GitObjectRef> {
        self.log(format!("create_commit:{}", tree_sha));
        self.created_commits.lock().unwrap().push((
            tree_sha.to_string(),
            parents.to_vec(),
            message.to_string(),
        ));
        Ok(GitObjectRef {
            sha: format!("commit-{}", self.next_id()),
            url: None,
        })
    }

    async fn update_ref(
        &self,
        _owner: &str,
        _repo: &str,
        branch: &str,
        commit_sha: &str,
        force: bool,
        _token: &str,
    ) -> RemoteResult<RefUpdate> {
        self.log(format!("update_ref:{}:{}:force={}", branch, commit_sha, force));

        if *self.update_ref_fails.lock().unwrap() {
            return Err(RemoteError::Api {
                status: 422,
                message: "reference update failed".to_string(),
            });
        }

        Ok(RefUpdate {
            ref_name: format!("refs/heads/{}", branch),
            url: None,
        })
    }

    async fn create_ref(
        &self,
        _owner: &str,
        _repo: &str,
        branch: &str,
        commit_sha: &str,
        _token: &str,
    ) -> RemoteResult<RefUpdate> {
        self.log(format!("create_ref:{}:{}", branch, commit_sha));
        self.created_refs
            .lock()
            .unwrap()
            .push((branch.to_string(), commit_sha.to_string()));
        Ok(RefUpdate {
            ref_name: format!("refs/heads/{}", branch),
            url: None,
        })
    }

    async fn merge(
        &self,
        _owner: &str,
        _repo: &str,
        base_branch: &str,
        head_sha: &str,
        _token: &str,
    ) -> RemoteResult<Option<GitObjectRef>> {
        self.log(format!("merge:{}:{}", base_branch, head_sha));

        match &*self.merge_behavior.lock().unwrap() {
            MergeBehavior::Merged(sha) => Ok(Some(GitObjectRef {
                sha: sha.clone(),
                url: None,
            })),
            MergeBehavior::NothingToMerge => Ok(None),
            MergeBehavior::Conflict => Err(RemoteError::Conflict {
                message: "merge conflict".to_string(),
            }),
        }
    }

    async fn create_fork(&self, owner: &str, repo: &str, _token: &str) -> RemoteResult<()> {
        self.log(format!("create_fork:{}/{}", owner, repo));

        if *self.fork_fails.lock().unwrap() {
            return Err(RemoteError::Api {
                status: 403,
                message: "forking disabled".to_string(),
            });
        }
        Ok(())
    }

    async fn repo_exists(
        &self,
        owner: &str,
        repo: &str,
        _token: Option<&str>,
    ) -> RemoteResult<bool> {
        self.log(format!("repo_exists:{}/{}", owner, repo));
        Ok(self
            .repo_exists_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(true))
    }

    async fn fetch_permission(
        &self,
        owner: &str,
        repo: &str,
        _token: Option<&str>,
    ) -> RemoteResult<Permission> {
        self.log(format!("fetch_permission:{}/{}", owner, repo));
        Ok(*self.permission.lock().unwrap())
    }

    async fn repo_info(
        &self,
        owner: &str,
        repo: &str,
        _token: Option<&str>,
    ) -> RemoteResult<RepoInfo> {
        self.log(format!("repo_info:{}/{}", owner, repo));
        Ok(RepoInfo {
            name: repo.to_string(),
            owner: owner.to_string(),
            default_branch: "main".to_string(),
            private: *self.private.lock().unwrap(),
        })
    }

    async fn create_repo(&self, name: &str, private: bool, _token: &str) -> RemoteResult<RepoInfo> {
        self.log(format!("create_repo:{}", name));
        Ok(RepoInfo {
            name: name.to_string(),
            owner: self.created_repo_owner.lock().unwrap().clone(),
            default_branch: "main".to_string(),
            private,
        })
    }

    async fn download_archive(
        &self,
        _owner: &str,
        _repo: &str,
        commit_sha: &str,
        max_bytes: u64,
        _token: Option<&str>,
    ) -> RemoteResult<Vec<u8>> {
        self.log(format!("download_archive:{}", commit_sha));

        let archive = self.archive.lock().unwrap().clone();
        if archive.len() as u64 > max_bytes {
            return Err(RemoteError::TooLarge {
                size: archive.len() as u64,
                limit: max_bytes,
            });
        }
        Ok(archive)
    }

    async fn latest_commit_for_file(
        &self,
        _owner: &str,
        _repo: &str,
        branch: &str,
        path: &str,
        _token: Option<&str>,
    ) -> RemoteResult<Option<String>> {
        self.log(format!("latest_commit_for_file:{}:{}", branch, path));
        Ok(self.file_commits.lock().unwrap().get(path).cloned())
    }

    async fn remaining_quota(&self) -> RemoteResult<u64> {
        self.log("remaining_quota".to_string());
        Ok(*self.quota.lock().unwrap())
    }
}
