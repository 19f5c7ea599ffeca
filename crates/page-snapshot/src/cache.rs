//! Per-runtime snapshot cache with staleness.

use chrono::Utc;
use tracing::debug;

use crate::bridge::SnapshotService;
use crate::errors::SnapshotError;
use crate::model::Snapshot;
use crate::options::SnapshotOptions;

/// Staleness-bounded wrapper around the snapshot service.
///
/// Owned by exactly one runtime instance and not thread-safe; the runtime
/// serializes access. Invalidated by any mutating action and by explicit
/// [`CachedSnapshot::invalidate`]. Invariant: `cached.is_none()` ⇔
/// `cached_at == 0`.
pub struct CachedSnapshot {
    service: SnapshotService,
    max_age_ms: u64,
    cached: Option<Snapshot>,
    cached_at: i64,
    cached_url: Option<String>,
}

impl CachedSnapshot {
    pub fn new(service: SnapshotService, max_age_ms: u64) -> Self {
        Self {
            service,
            max_age_ms,
            cached: None,
            cached_at: 0,
            cached_url: None,
        }
    }

    pub fn service(&self) -> &SnapshotService {
        &self.service
    }

    /// Age of the cached snapshot in ms; `u64::MAX` when empty.
    pub fn age_ms(&self) -> u64 {
        if self.cached.is_none() {
            return u64::MAX;
        }
        (Utc::now().timestamp_millis() - self.cached_at).max(0) as u64
    }

    pub fn cached_url(&self) -> Option<&str> {
        self.cached_url.as_deref()
    }

    /// Whether a `get` without `force_refresh` would be a cache hit.
    pub fn is_fresh(&self) -> bool {
        self.cached.is_some() && self.age_ms() <= self.max_age_ms
    }

    /// The cached snapshot itself, hit or stale; `None` after invalidation.
    pub fn peek(&self) -> Option<&Snapshot> {
        self.cached.as_ref()
    }

    /// Return the cached snapshot when fresh enough, otherwise fetch.
    ///
    /// A hit requires `!force_refresh` and `age_ms() <= max_age_ms`.
    pub async fn get(
        &mut self,
        options: &SnapshotOptions,
        force_refresh: bool,
    ) -> Result<Snapshot, SnapshotError> {
        if !force_refresh && self.age_ms() <= self.max_age_ms {
            if let Some(snapshot) = &self.cached {
                debug!(target: "page-snapshot", age_ms = self.age_ms(), "snapshot cache hit");
                return Ok(snapshot.clone());
            }
        }

        let snapshot = self.service.acquire(options).await?;
        self.cached_at = Utc::now().timestamp_millis();
        self.cached_url = Some(snapshot.url.clone());
        self.cached = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Drop the cached snapshot. Idempotent.
    pub fn invalidate(&mut self) {
        self.cached = None;
        self.cached_at = 0;
        self.cached_url = None;
    }
}
