use serde::{Deserialize, Serialize};

/// Coordinate into a remote repository: owner, repo, branch, and an optional
/// sub-path when only a directory of the repository is being synchronized.
///
/// Paths carried next to a location with a sub-path are relative to that
/// sub-path on the local side and absolute from the repository root on the
/// remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLocation {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl GitLocation {
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: branch.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.is_empty() { None } else { Some(path) };
        self
    }

    /// Same coordinate under a different owner (used when a fork takes over).
    pub fn with_owner(&self, owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            ..self.clone()
        }
    }

    /// Same coordinate on a different branch.
    pub fn with_branch(&self, branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            ..self.clone()
        }
    }

    /// Sub-path as a plain str, empty when absent.
    pub fn path_str(&self) -> &str {
        self.path.as_deref().unwrap_or("")
    }

    /// Rebase a local-side relative path onto this location's sub-path,
    /// yielding a repository-root absolute path.
    pub fn rebase(&self, relative: &str) -> String {
        match self.path.as_deref() {
            Some(prefix) if !prefix.is_empty() => {
                format!("{}/{}", prefix.trim_end_matches('/'), relative)
            }
            _ => relative.to_string(),
        }
    }
}

/// Object type of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeEntryKind {
    Blob,
    Tree,
    Commit,
}

/// One object inside a remote Git tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Path relative to the listed tree's root.
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: TreeEntryKind,
    /// Byte size; present for blobs only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub sha: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.kind == TreeEntryKind::Blob
    }
}

/// A tree listing fetched for one tree-ish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTree {
    /// Sha of the tree object itself.
    pub sha: String,
    pub entries: Vec<TreeEntry>,
    /// The remote store could not return the full listing. Consumers must
    /// reject truncated trees rather than diff against a partial view.
    pub truncated: bool,
}

/// Entry submitted when creating a new tree object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeWriteEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: TreeEntryKind,
    pub sha: String,
}

impl TreeWriteEntry {
    /// A regular (non-executable) file blob.
    pub fn blob(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: "100644".to_string(),
            kind: TreeEntryKind::Blob,
            sha: sha.into(),
        }
    }
}

impl From<&TreeEntry> for TreeWriteEntry {
    fn from(entry: &TreeEntry) -> Self {
        Self {
            path: entry.path.clone(),
            mode: entry.mode.clone(),
            kind: entry.kind,
            sha: entry.sha.clone(),
        }
    }
}

/// Content encoding accepted by the blob creation endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobEncoding {
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "base64")]
    Base64,
}

/// A file queued for blob creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWrite {
    pub path: String,
    pub content: String,
    pub encoding: BlobEncoding,
}

impl PendingWrite {
    pub fn utf8(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            encoding: BlobEncoding::Utf8,
        }
    }

    pub fn base64(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            encoding: BlobEncoding::Base64,
        }
    }
}

/// Result of creating a blob, tree, or commit object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitObjectRef {
    pub sha: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Result of updating or creating a branch reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefUpdate {
    #[serde(rename = "ref")]
    pub ref_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Answer of a conditional "latest commit for branch/path" lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitLookup {
    /// A fresh answer, with the validator to use for the next conditional
    /// request when the store provided one.
    Fresh { sha: String, etag: Option<String> },
    /// The cached answer is still current.
    NotModified,
}

/// Permission level of an identity on a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Admin,
    Write,
    Read,
    None,
}

impl Permission {
    /// Whether this level allows pushing commits.
    pub fn can_write(self) -> bool {
        matches!(self, Permission::Admin | Permission::Write)
    }
}

/// Repository metadata relevant to synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub name: String,
    pub owner: String,
    pub default_branch: String,
    pub private: bool,
}

/// The identity acting on behalf of the caller: its login and the credential
/// used for writes (reads may run on the shared service credential instead).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub login: String,
    pub token: String,
}

impl Identity {
    pub fn new(login: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            token: token.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_rebase_with_path() {
        let location = GitLocation::new("octo", "widgets", "main").with_path("packages/app");
        assert_eq!(location.rebase("src/index.js"), "packages/app/src/index.js");
    }

    #[test]
    fn test_location_rebase_without_path() {
        let location = GitLocation::new("octo", "widgets", "main");
        assert_eq!(location.rebase("src/index.js"), "src/index.js");
    }

    #[test]
    fn test_location_empty_path_normalized_to_none() {
        let location = GitLocation::new("octo", "widgets", "main").with_path("");
        assert_eq!(location.path, None);
        assert_eq!(location.path_str(), "");
    }

    #[test]
    fn test_location_with_owner_keeps_rest() {
        let location = GitLocation::new("octo", "widgets", "dev").with_path("lib");
        let forked = location.with_owner("contributor");
        assert_eq!(forked.owner, "contributor");
        assert_eq!(forked.repo, "widgets");
        assert_eq!(forked.branch, "dev");
        assert_eq!(forked.path.as_deref(), Some("lib"));
    }

    #[test]
    fn test_tree_write_entry_blob_defaults() {
        let entry = TreeWriteEntry::blob("a.txt", "abc123");
        assert_eq!(entry.mode, "100644");
        assert_eq!(entry.kind, TreeEntryKind::Blob);
    }

    #[test]
    fn test_blob_encoding_serialization() {
        assert_eq!(
            serde_json::to_string(&BlobEncoding::Utf8).unwrap(),
            "\"utf-8\""
        );
        assert_eq!(
            serde_json::to_string(&BlobEncoding::Base64).unwrap(),
            "\"base64\""
        );
    }

    #[test]
    fn test_tree_entry_kind_serialization() {
        let entry = TreeWriteEntry::blob("a.txt", "abc");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "blob");
    }

    #[test]
    fn test_permission_can_write() {
        assert!(Permission::Admin.can_write());
        assert!(Permission::Write.can_write());
        assert!(!Permission::Read.can_write());
        assert!(!Permission::None.can_write());
    }
}
