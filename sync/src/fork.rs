use crate::error::{SyncError, SyncResult};
use remote::{GitLocation, Identity, RemoteObjectStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Ensures the acting identity has a repository it can push to, forking the
/// target when it does not.
///
/// Forking is asynchronous on the remote side: the fork request only
/// acknowledges, and the new repository appears some time later. The
/// coordinator polls for it with a bounded budget instead of waiting forever.
pub struct ForkCoordinator {
    store: Arc<dyn RemoteObjectStore>,
    poll_interval: Duration,
    max_attempts: u32,
}

impl ForkCoordinator {
    pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
    pub const MAX_ATTEMPTS: u32 = 300;

    pub fn new(store: Arc<dyn RemoteObjectStore>) -> Self {
        Self {
            store,
            poll_interval: Self::POLL_INTERVAL,
            max_attempts: Self::MAX_ATTEMPTS,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Return a location the identity can push to: the target itself when
    /// its permission level allows writing, otherwise a fork under the
    /// identity's own login.
    ///
    /// A repository already existing under the identity with the same name is
    /// reused, which makes repeated calls idempotent: at most one fork
    /// request is ever issued per (identity, repo).
    pub async fn ensure_writable(
        &self,
        location: &GitLocation,
        identity: &Identity,
    ) -> SyncResult<GitLocation> {
        let permission = self
            .store
            .fetch_permission(&location.owner, &location.repo, Some(&identity.token))
            .await?;

        if permission.can_write() {
            return Ok(location.clone());
        }

        debug!(
            "{} has {:?} access to {}/{}, forking",
            identity.login, permission, location.owner, location.repo
        );

        let fork = location.with_owner(&identity.login);
        if self
            .store
            .repo_exists(&fork.owner, &fork.repo, Some(&identity.token))
            .await?
        {
            return Ok(fork);
        }

        if let Err(e) = self
            .store
            .create_fork(&location.owner, &location.repo, &identity.token)
            .await
        {
            warn!(
                "fork request for {}/{} failed: {}",
                location.owner, location.repo, e
            );
            return Err(SyncError::PermissionDenied {
                owner: location.owner.clone(),
                repo: location.repo.clone(),
            });
        }

        for attempt in 1..=self.max_attempts {
            if self
                .store
                .repo_exists(&fork.owner, &fork.repo, Some(&identity.token))
                .await?
            {
                info!(
                    "fork {}/{} available after {} poll(s)",
                    fork.owner, fork.repo, attempt
                );
                return Ok(fork);
            }
            sleep(self.poll_interval).await;
        }

        Err(SyncError::ForkTimeout {
            owner: location.owner.clone(),
            repo: location.repo.clone(),
            waited_secs: self.poll_interval.as_secs() * u64::from(self.max_attempts),
        })
    }
}
