//! Pure tree-diff engine: compares a remote Git tree against a local file set
//! using git's own content addressing, so an unchanged file is recognized
//! without ever downloading it.

use crate::error::SyncResult;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use remote::TreeEntry;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::HashMap;

/// A file the caller wants to exist in the repository. Binary files carry
/// their content base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFile {
    pub path: String,
    pub content: String,
    pub is_binary: bool,
}

impl LocalFile {
    pub fn text(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            is_binary: false,
        }
    }

    pub fn binary(path: impl Into<String>, base64_content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: base64_content.into(),
            is_binary: true,
        }
    }

    /// Decoded byte content: the raw text bytes, or the decoded base64
    /// payload for binary files.
    pub fn bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        if self.is_binary {
            BASE64.decode(self.content.as_bytes())
        } else {
            Ok(self.content.as_bytes().to_vec())
        }
    }
}

/// Output of diffing a remote tree against a local file set. Every path
/// appears in at most one list; unchanged paths appear in none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// Sha-1 of `content` the way `git hash-object` computes it for blobs:
/// over the byte sequence `"blob " + byte_length + "\0" + content`.
pub fn git_blob_hash(content: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", content.len()).as_bytes());
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Compute the add/modify/delete delta between `tree` and `files`.
///
/// `deleted` and `modified` preserve the tree's iteration order, `added`
/// preserves the file set's. Directory entries are skipped: only blobs are
/// compared, and only ever by hash equality.
pub fn diff(tree: &[TreeEntry], files: &[LocalFile]) -> SyncResult<ChangeSet> {
    let by_path: HashMap<&str, &LocalFile> =
        files.iter().map(|file| (file.path.as_str(), file)).collect();

    let mut changes = ChangeSet::default();

    for entry in tree.iter().filter(|entry| entry.is_blob()) {
        match by_path.get(entry.path.as_str()) {
            None => changes.deleted.push(entry.path.clone()),
            Some(file) => {
                if git_blob_hash(&file.bytes()?) != entry.sha {
                    changes.modified.push(entry.path.clone());
                }
            }
        }
    }

    for file in files {
        let known = tree
            .iter()
            .any(|entry| entry.is_blob() && entry.path == file.path);
        if !known {
            changes.added.push(file.path.clone());
        }
    }

    Ok(changes)
}
