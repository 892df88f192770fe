//! Full-repository snapshots: one archive download instead of one request
//! per file, with binary content either embedded (private repositories) or
//! deferred to a CDN mirror (public ones).

use crate::error::{SyncError, SyncResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::read::GzDecoder;
use futures::future::try_join_all;
use remote::{GitLocation, RemoteError, RemoteObjectStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;
use tar::Archive;
use tracing::{debug, warn};

/// Hard ceiling on the archive download.
pub const MAX_ARCHIVE_BYTES: u64 = 128 * 1024 * 1024;

/// Files above this are never inlined as text.
const MAX_TEXT_BYTES: usize = 3 * 1024 * 1024;

/// CDN mirror that serves raw file content with a correct content type (the
/// remote store itself serves everything as text/plain).
const RAW_CDN_BASE: &str = "https://rawcdn.githack.com";

const BINARY_EXTENSIONS: &[&str] = &[
    ".ico", ".jpg", ".jpeg", ".png", ".gif", ".eot", ".otf", ".webp", ".ttf", ".woff", ".woff2",
    ".mp4", ".webm", ".wasm", ".pdf", ".zip", ".gz", ".tar",
];

/// One snapshot entry: inline text, an embedded base64 payload, or a URL
/// resolving to the binary content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedFile {
    pub content: String,
    pub is_binary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary_content: Option<String>,
}

impl NormalizedFile {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_binary: false,
            binary_content: None,
        }
    }

    pub fn binary_url(url: impl Into<String>) -> Self {
        Self {
            content: url.into(),
            is_binary: true,
            binary_content: None,
        }
    }

    pub fn binary_embedded(base64_content: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            is_binary: true,
            binary_content: Some(base64_content.into()),
        }
    }
}

/// Repo-relative path to file, ordered for stable output.
pub type NormalizedFileSet = BTreeMap<String, NormalizedFile>;

pub struct RepositorySnapshotDownloader {
    store: Arc<dyn RemoteObjectStore>,
    max_archive_bytes: u64,
}

impl RepositorySnapshotDownloader {
    pub fn new(store: Arc<dyn RemoteObjectStore>) -> Self {
        Self {
            store,
            max_archive_bytes: MAX_ARCHIVE_BYTES,
        }
    }

    pub fn with_max_archive_bytes(mut self, max: u64) -> Self {
        self.max_archive_bytes = max;
        self
    }

    /// Materialize the repository (or its sub-path) at `commit_sha` as a
    /// normalized file set.
    pub async fn snapshot(
        &self,
        location: &GitLocation,
        commit_sha: &str,
        is_private: bool,
        token: Option<&str>,
    ) -> SyncResult<NormalizedFileSet> {
        let bytes = match self
            .store
            .download_archive(
                &location.owner,
                &location.repo,
                commit_sha,
                self.max_archive_bytes,
                token,
            )
            .await
        {
            Ok(bytes) => bytes,
            Err(RemoteError::TooLarge { .. }) => return Err(SyncError::archive_too_large()),
            Err(e) => return Err(e.into()),
        };

        debug!(
            "unpacking {} byte archive of {}/{}@{}",
            bytes.len(),
            location.owner,
            location.repo,
            commit_sha
        );

        let mut result = NormalizedFileSet::new();
        let mut pending_binaries: Vec<String> = Vec::new();

        let mut archive = Archive::new(GzDecoder::new(&bytes[..]));
        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }

            let entry_path = entry.path()?.to_string_lossy().into_owned();
            // Every archive entry lives under one synthetic top-level folder.
            let Some((_, repo_path)) = entry_path.split_once('/') else {
                continue;
            };
            if repo_path.is_empty() {
                continue;
            }

            // Snapshot side of the path-rebasing invariant: archive paths
            // are repo-root absolute, the result is sub-path relative.
            let relative = match location.path.as_deref() {
                Some(prefix) => match repo_path.strip_prefix(&format!("{}/", prefix)) {
                    Some(rest) => rest.to_string(),
                    None => continue,
                },
                None => repo_path.to_string(),
            };

            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;

            if is_text(&relative, &data) {
                result.insert(
                    relative,
                    NormalizedFile::text(String::from_utf8_lossy(&data).into_owned()),
                );
            } else if is_private {
                // No CDN serves private content; embed it.
                result.insert(relative, NormalizedFile::binary_embedded(BASE64.encode(&data)));
            } else {
                pending_binaries.push(relative);
            }
        }

        // Each public binary costs one "latest commit for path" request.
        // Without a user token those run on the shared quota, so check it
        // up front instead of failing half-way through the batch.
        if token.is_none() && !pending_binaries.is_empty() {
            let remaining = self.store.remaining_quota().await?;
            if pending_binaries.len() as u64 >= remaining {
                warn!(
                    "snapshot needs {} sha lookups but only {} requests remain",
                    pending_binaries.len(),
                    remaining
                );
                return Err(SyncError::RateLimited {
                    required: pending_binaries.len(),
                    remaining,
                });
            }
        }

        let resolved = try_join_all(pending_binaries.iter().map(|path| async move {
            let absolute = location.rebase(path);
            let sha = self
                .store
                .latest_commit_for_file(
                    &location.owner,
                    &location.repo,
                    &location.branch,
                    &absolute,
                    token,
                )
                .await?;
            Ok::<(String, Option<String>), SyncError>((path.clone(), sha))
        }))
        .await?;

        for (path, sha) in resolved {
            let url = raw_cdn_url(location, &path, sha.as_deref());
            result.insert(path, NormalizedFile::binary_url(url));
        }

        Ok(result)
    }
}

/// URL of the CDN mirror for one file, pinned to `commit_sha` when known and
/// falling back to the branch head otherwise.
pub fn raw_cdn_url(location: &GitLocation, file_path: &str, commit_sha: Option<&str>) -> String {
    let mut url = format!(
        "{}/{}/{}/{}/",
        RAW_CDN_BASE,
        location.owner,
        location.repo,
        commit_sha.unwrap_or(&location.branch)
    );
    if let Some(path) = location.path.as_deref() {
        url.push_str(path);
        url.push('/');
    }
    url.push_str(file_path);
    url
}

/// Boundary-level text/binary split; deliberately conservative rather than
/// clever. JS/TS sources are always text regardless of content.
fn is_text(name: &str, content: &[u8]) -> bool {
    let lower = name.to_ascii_lowercase();
    if [".js", ".jsx", ".ts", ".tsx"]
        .iter()
        .any(|ext| lower.ends_with(ext))
    {
        return true;
    }
    if BINARY_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return false;
    }
    if content.len() > MAX_TEXT_BYTES {
        return false;
    }
    if content.contains(&0) {
        return false;
    }
    std::str::from_utf8(content).is_ok()
}
