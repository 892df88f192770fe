use remote::GitLocation;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Time source for the caches. Injected so tests can verify TTL eviction
/// without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock backed [`Clock`].
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Cached conditional-request validator and the sha it vouches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtagEntry {
    pub etag: String,
    pub sha: String,
}

struct Timed<T> {
    inserted: Instant,
    value: T,
}

/// Process-wide caches of repository state keyed by (owner, repo, branch,
/// path): a short-lived "latest commit sha" map that absorbs request bursts,
/// and a long-lived ETag map that turns repeat lookups into cheap
/// conditional requests.
pub struct StateCache {
    shas: Mutex<HashMap<String, Timed<String>>>,
    etags: Mutex<HashMap<String, Timed<EtagEntry>>>,
    sha_ttl: Duration,
    etag_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl StateCache {
    pub const SHA_TTL: Duration = Duration::from_secs(5);
    pub const ETAG_TTL: Duration = Duration::from_secs(24 * 60 * 60);
    const SHA_CAPACITY: usize = 500;
    const ETAG_CAPACITY: usize = 50_000;

    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            shas: Mutex::new(HashMap::new()),
            etags: Mutex::new(HashMap::new()),
            sha_ttl: Self::SHA_TTL,
            etag_ttl: Self::ETAG_TTL,
            clock,
        }
    }

    pub fn with_sha_ttl(mut self, ttl: Duration) -> Self {
        self.sha_ttl = ttl;
        self
    }

    pub fn with_etag_ttl(mut self, ttl: Duration) -> Self {
        self.etag_ttl = ttl;
        self
    }

    pub fn latest_sha(&self, location: &GitLocation) -> Option<String> {
        let now = self.clock.now();
        let shas = self.shas.lock().unwrap();
        shas.get(&cache_key(location))
            .filter(|entry| now.duration_since(entry.inserted) < self.sha_ttl)
            .map(|entry| entry.value.clone())
    }

    pub fn store_sha(&self, location: &GitLocation, sha: impl Into<String>) {
        let now = self.clock.now();
        let mut shas = self.shas.lock().unwrap();
        Self::make_room(&mut shas, now, self.sha_ttl, Self::SHA_CAPACITY);
        shas.insert(
            cache_key(location),
            Timed {
                inserted: now,
                value: sha.into(),
            },
        );
    }

    /// Drop the sha entry so the next resolve goes to the remote. Callers
    /// must invalidate after every successful branch mutation.
    pub fn invalidate(&self, location: &GitLocation) {
        self.shas.lock().unwrap().remove(&cache_key(location));
    }

    pub fn etag(&self, location: &GitLocation) -> Option<EtagEntry> {
        let now = self.clock.now();
        let etags = self.etags.lock().unwrap();
        etags
            .get(&cache_key(location))
            .filter(|entry| now.duration_since(entry.inserted) < self.etag_ttl)
            .map(|entry| entry.value.clone())
    }

    pub fn store_etag(
        &self,
        location: &GitLocation,
        etag: impl Into<String>,
        sha: impl Into<String>,
    ) {
        let now = self.clock.now();
        let mut etags = self.etags.lock().unwrap();
        Self::make_room(&mut etags, now, self.etag_ttl, Self::ETAG_CAPACITY);
        etags.insert(
            cache_key(location),
            Timed {
                inserted: now,
                value: EtagEntry {
                    etag: etag.into(),
                    sha: sha.into(),
                },
            },
        );
    }

    fn make_room<T>(
        map: &mut HashMap<String, Timed<T>>,
        now: Instant,
        ttl: Duration,
        capacity: usize,
    ) {
        if map.len() < capacity {
            return;
        }
        map.retain(|_, entry| now.duration_since(entry.inserted) < ttl);
        if map.len() >= capacity {
            if let Some(oldest) = map
                .iter()
                .min_by_key(|(_, entry)| entry.inserted)
                .map(|(key, _)| key.clone())
            {
                map.remove(&oldest);
            }
        }
    }
}

pub(crate) fn cache_key(location: &GitLocation) -> String {
    format!(
        "{}/{}#{}#{}",
        location.owner,
        location.repo,
        location.branch,
        location.path_str()
    )
}
