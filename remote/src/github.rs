use crate::config::GithubConfig;
use crate::store::{RemoteError, RemoteObjectStore, RemoteResult};
use crate::types::{
    BlobEncoding, CommitLookup, GitObjectRef, Permission, RefUpdate, RemoteTree, RepoInfo,
    TreeEntry, TreeWriteEntry,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, IF_NONE_MATCH, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const ACCEPT_JSON: &str = "application/vnd.github.v3+json";

#[derive(Deserialize)]
struct GhCommitResponse {
    sha: String,
}

#[derive(Deserialize)]
struct GhTreeResponse {
    sha: String,
    tree: Vec<TreeEntry>,
    truncated: bool,
}

#[derive(Serialize)]
struct GhCreateBlobRequest<'a> {
    content: &'a str,
    encoding: BlobEncoding,
}

#[derive(Serialize)]
struct GhCreateTreeRequest<'a> {
    tree: &'a [TreeWriteEntry],
    #[serde(skip_serializing_if = "Option::is_none")]
    base_tree: Option<&'a str>,
}

#[derive(Serialize)]
struct GhCreateCommitRequest<'a> {
    tree: &'a str,
    message: &'a str,
    parents: &'a [String],
}

#[derive(Serialize)]
struct GhUpdateRefRequest<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Serialize)]
struct GhCreateRefRequest<'a> {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: &'a str,
}

#[derive(Serialize)]
struct GhMergeRequest<'a> {
    base: &'a str,
    head: &'a str,
}

#[derive(Serialize)]
struct GhCreateRepoRequest<'a> {
    name: &'a str,
    private: bool,
    auto_init: bool,
}

#[derive(Deserialize)]
struct GhPermissions {
    #[serde(default)]
    admin: bool,
    #[serde(default)]
    push: bool,
}

#[derive(Deserialize)]
struct GhOwner {
    login: String,
}

#[derive(Deserialize)]
struct GhRepoResponse {
    name: String,
    owner: GhOwner,
    private: bool,
    default_branch: String,
    permissions: Option<GhPermissions>,
}

#[derive(Deserialize)]
struct GhRateLimitResponse {
    resources: GhRateLimitResources,
}

#[derive(Deserialize)]
struct GhRateLimitResources {
    core: GhRateLimitCore,
}

#[derive(Deserialize)]
struct GhRateLimitCore {
    remaining: u64,
}

/// GitHub REST implementation of [`RemoteObjectStore`].
pub struct GithubStore {
    client: reqwest::Client,
    config: GithubConfig,
}

impl GithubStore {
    pub fn new(config: GithubConfig) -> RemoteResult<Self> {
        config
            .validate()
            .map_err(|message| RemoteError::Unprocessable { message })?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_JSON));
        if let Ok(agent) = HeaderValue::from_str(&config.user_agent) {
            headers.insert(USER_AGENT, agent);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    pub fn with_default_config() -> RemoteResult<Self> {
        Self::new(GithubConfig::default())
    }

    fn repo_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/repos/{}/{}", self.config.api_url, owner, repo)
    }

    /// Build a request with the caller's token, falling back to the shared
    /// service credential when none is given.
    fn request(&self, method: Method, url: String, token: Option<&str>) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match token {
            Some(token) => builder.bearer_auth(token),
            None => match (&self.config.client_id, &self.config.client_secret) {
                (Some(id), Some(secret)) => builder.basic_auth(id, Some(secret)),
                _ => builder,
            },
        }
    }

    /// Translate a non-success response into the error taxonomy. All HTTP
    /// status inspection lives here and in the few endpoints with
    /// status-specific contracts (304, 204, permission probes).
    async fn fail(response: Response) -> RemoteError {
        let status = response.status();
        let message = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => RemoteError::NotFound,
            StatusCode::CONFLICT => RemoteError::Conflict { message },
            StatusCode::UNPROCESSABLE_ENTITY => RemoteError::Unprocessable { message },
            _ => {
                warn!("github request failed with {}: {}", status, message);
                RemoteError::Api {
                    status: status.as_u16(),
                    message,
                }
            }
        }
    }

    async fn expect_success(response: Response) -> RemoteResult<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::fail(response).await)
        }
    }
}

#[async_trait]
impl RemoteObjectStore for GithubStore {
    async fn latest_commit(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        path: &str,
        etag: Option<&str>,
        token: Option<&str>,
    ) -> RemoteResult<CommitLookup> {
        debug!("fetching latest commit for {}/{}@{}", owner, repo, branch);

        let url = format!("{}/commits/{}", self.repo_url(owner, repo), branch);
        let mut request = self.request(Method::GET, url, token);
        if !path.is_empty() {
            request = request.query(&[("path", path)]);
        }
        if let Some(etag) = etag {
            request = request.header(IF_NONE_MATCH, etag);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::NOT_MODIFIED {
            debug!("latest commit for {}/{}@{} not modified", owner, repo, branch);
            return Ok(CommitLookup::NotModified);
        }

        let response = Self::expect_success(response).await?;
        let fresh_etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body: GhCommitResponse = response.json().await?;

        Ok(CommitLookup::Fresh {
            sha: body.sha,
            etag: fresh_etag,
        })
    }

    async fn get_tree(
        &self,
        owner: &str,
        repo: &str,
        tree_sha: &str,
        recursive: bool,
        token: Option<&str>,
    ) -> RemoteResult<RemoteTree> {
        let url = format!("{}/git/trees/{}", self.repo_url(owner, repo), tree_sha);
        let mut request = self.request(Method::GET, url, token);
        if recursive {
            request = request.query(&[("recursive", "1")]);
        }

        let response = Self::expect_success(request.send().await?).await?;
        let body: GhTreeResponse = response.json().await?;

        Ok(RemoteTree {
            sha: body.sha,
            entries: body.tree,
            truncated: body.truncated,
        })
    }

    async fn create_blob(
        &self,
        owner: &str,
        repo: &str,
        content: &str,
        encoding: BlobEncoding,
        token: &str,
    ) -> RemoteResult<GitObjectRef> {
        let url = format!("{}/git/blobs", self.repo_url(owner, repo));
        let response = self
            .request(Method::POST, url, Some(token))
            .json(&GhCreateBlobRequest { content, encoding })
            .send()
            .await?;

        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }

    async fn create_tree(
        &self,
        owner: &str,
        repo: &str,
        entries: &[TreeWriteEntry],
        base_tree: Option<&str>,
        token: &str,
    ) -> RemoteResult<GitObjectRef> {
        debug!(
            "creating tree with {} entries (base: {:?}) in {}/{}",
            entries.len(),
            base_tree,
            owner,
            repo
        );

        let url = format!("{}/git/trees", self.repo_url(owner, repo));
        let response = self
            .request(Method::POST, url, Some(token))
            .json(&GhCreateTreeRequest {
                tree: entries,
                base_tree,
            })
            .send()
            .await?;

        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }

    async fn create_commit(
        &self,
        owner: &str,
        repo: &str,
        tree_sha: &str,
        parents: &[String],
        message: &str,
        token: &str,
    ) -> RemoteResult<GitObjectRef> {
        let url = format!("{}/git/commits", self.repo_url(owner, repo));
        let response = self
            .request(Method::POST, url, Some(token))
            .json(&GhCreateCommitRequest {
                tree: tree_sha,
                message,
                parents,
            })
            .send()
            .await?;

        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }

    async fn update_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        commit_sha: &str,
        force: bool,
        token: &str,
    ) -> RemoteResult<RefUpdate> {
        debug!("updating refs/heads/{} in {}/{}", branch, owner, repo);

        let url = format!("{}/git/refs/heads/{}", self.repo_url(owner, repo), branch);
        let response = self
            .request(Method::PATCH, url, Some(token))
            .json(&GhUpdateRefRequest {
                sha: commit_sha,
                force,
            })
            .send()
            .await?;

        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }

    async fn create_ref(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        commit_sha: &str,
        token: &str,
    ) -> RemoteResult<RefUpdate> {
        let url = format!("{}/git/refs", self.repo_url(owner, repo));
        let response = self
            .request(Method::POST, url, Some(token))
            .json(&GhCreateRefRequest {
                ref_name: format!("refs/heads/{}", branch),
                sha: commit_sha,
            })
            .send()
            .await?;

        let response = Self::expect_success(response).await?;
        Ok(response.json().await?)
    }

    async fn merge(
        &self,
        owner: &str,
        repo: &str,
        base_branch: &str,
        head_sha: &str,
        token: &str,
    ) -> RemoteResult<Option<GitObjectRef>> {
        debug!("merging {} into {} on {}/{}", head_sha, base_branch, owner, repo);

        let url = format!("{}/merges", self.repo_url(owner, repo));
        let response = self
            .request(Method::POST, url, Some(token))
            .json(&GhMergeRequest {
                base: base_branch,
                head: head_sha,
            })
            .send()
            .await?;

        // 204: the branch already contains the head, nothing to merge.
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let response = Self::expect_success(response).await?;
        Ok(Some(response.json().await?))
    }

    async fn create_fork(&self, owner: &str, repo: &str, token: &str) -> RemoteResult<()> {
        debug!("requesting fork of {}/{}", owner, repo);

        let url = format!("{}/forks", self.repo_url(owner, repo));
        let response = self
            .request(Method::POST, url, Some(token))
            .json(&serde_json::json!({}))
            .send()
            .await?;

        Self::expect_success(response).await?;
        Ok(())
    }

    async fn repo_exists(
        &self,
        owner: &str,
        repo: &str,
        token: Option<&str>,
    ) -> RemoteResult<bool> {
        let response = self
            .request(Method::GET, self.repo_url(owner, repo), token)
            .send()
            .await?;

        match Self::expect_success(response).await {
            Ok(_) => Ok(true),
            Err(RemoteError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn fetch_permission(
        &self,
        owner: &str,
        repo: &str,
        token: Option<&str>,
    ) -> RemoteResult<Permission> {
        let response = self
            .request(Method::GET, self.repo_url(owner, repo), token)
            .send()
            .await?;

        // An unauthorized probe means the caller has no rights, not that the
        // operation failed.
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Ok(Permission::None);
        }

        let response = Self::expect_success(response).await?;
        let body: GhRepoResponse = response.json().await?;

        Ok(match body.permissions {
            None => Permission::None,
            Some(p) if p.admin => Permission::Admin,
            Some(p) if p.push => Permission::Write,
            Some(_) => Permission::Read,
        })
    }

    async fn repo_info(
        &self,
        owner: &str,
        repo: &str,
        token: Option<&str>,
    ) -> RemoteResult<RepoInfo> {
        let response = self
            .request(Method::GET, self.repo_url(owner, repo), token)
            .send()
            .await?;

        let response = Self::expect_success(response).await?;
        let body: GhRepoResponse = response.json().await?;

        Ok(RepoInfo {
            name: body.name,
            owner: body.owner.login,
            default_branch: body.default_branch,
            private: body.private,
        })
    }

    async fn create_repo(&self, name: &str, private: bool, token: &str) -> RemoteResult<RepoInfo> {
        debug!("creating repository {}", name);

        let url = format!("{}/user/repos", self.config.api_url);
        let response = self
            .request(Method::POST, url, Some(token))
            .json(&GhCreateRepoRequest {
                name,
                private,
                auto_init: true,
            })
            .send()
            .await?;

        let response = Self::expect_success(response).await?;
        let body: GhRepoResponse = response.json().await?;

        Ok(RepoInfo {
            name: body.name,
            owner: body.owner.login,
            default_branch: body.default_branch,
            private: body.private,
        })
    }

    async fn download_archive(
        &self,
        owner: &str,
        repo: &str,
        commit_sha: &str,
        max_bytes: u64,
        token: Option<&str>,
    ) -> RemoteResult<Vec<u8>> {
        debug!("downloading archive of {}/{}@{}", owner, repo, commit_sha);

        let url = format!("{}/tarball/{}", self.repo_url(owner, repo), commit_sha);
        let response = self.request(Method::GET, url, token).send().await?;
        let response = Self::expect_success(response).await?;

        // Declared size check before touching the body.
        if let Some(size) = response.content_length() {
            if size > max_bytes {
                return Err(RemoteError::TooLarge {
                    size,
                    limit: max_bytes,
                });
            }
        }

        let bytes = response.bytes().await?;
        // The header can be absent on chunked responses.
        if bytes.len() as u64 > max_bytes {
            return Err(RemoteError::TooLarge {
                size: bytes.len() as u64,
                limit: max_bytes,
            });
        }

        Ok(bytes.to_vec())
    }

    async fn latest_commit_for_file(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        path: &str,
        token: Option<&str>,
    ) -> RemoteResult<Option<String>> {
        let url = format!("{}/commits", self.repo_url(owner, repo));
        let response = self
            .request(Method::GET, url, token)
            .query(&[("sha", branch), ("path", path)])
            .send()
            .await?;

        let response = Self::expect_success(response).await?;
        let commits: Vec<GhCommitResponse> = response.json().await?;

        Ok(commits.into_iter().next().map(|c| c.sha))
    }

    async fn remaining_quota(&self) -> RemoteResult<u64> {
        let url = format!("{}/rate_limit", self.config.api_url);
        let response = self.request(Method::GET, url, None).send().await?;

        let response = Self::expect_success(response).await?;
        let body: GhRateLimitResponse = response.json().await?;

        Ok(body.resources.core.remaining)
    }
}
