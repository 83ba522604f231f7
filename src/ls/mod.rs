//! The lock-system interface.
//!
//! Every mutating operation in the dispatcher consults [`DavLockSystem::check`]
//! before touching the tree; conflicts are reported, never silently
//! ignored or auto-broken. Timeout expiry is passive: an expired lock is
//! treated as absent the next time it is looked at.

use std::time::{Duration, SystemTime};

use xmltree::Element;

use crate::davpath::DavPath;

pub mod memls;

/// Scope of a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    /// At most one exclusive lock can cover a resource.
    Exclusive,
    /// Any number of shared locks can coexist.
    Shared,
}

/// An active lock on a resource.
#[derive(Debug, Clone)]
pub struct DavLock {
    /// Opaque credential proving ownership (a `urn:uuid:` URI).
    pub token: String,
    /// Path of the locked resource, without trailing slash.
    pub path: String,
    /// The authenticated principal that created the lock, if any.
    pub principal: Option<String>,
    /// Opaque owner information from the LOCK request body.
    pub owner: Option<Element>,
    /// Requested timeout; `None` means infinite.
    pub timeout: Option<Duration>,
    /// Absolute deadline derived from `timeout`.
    pub deadline: Option<SystemTime>,
    pub scope: LockScope,
    /// Depth-infinity locks also cover every descendant.
    pub deep: bool,
}

impl DavLock {
    pub(crate) fn is_expired(&self, now: SystemTime) -> bool {
        self.deadline.is_some_and(|d| d < now)
    }
}

/// The interface to a lock backend.
///
/// All methods are synchronous and atomic with respect to concurrent
/// requests; an in-memory implementation guards its table with a mutex, a
/// persistent one relies on its store's transactional get/put/delete.
pub trait DavLockSystem: Send + Sync {
    /// Acquire a lock on `path`.
    ///
    /// Fails with the first conflicting lock when an incompatible lock
    /// already covers the path: two exclusive locks always conflict, an
    /// exclusive lock conflicts with anything, and ancestor/descendant
    /// locks count when their (or the requested) depth is infinite.
    #[allow(clippy::too_many_arguments)]
    fn lock(
        &self,
        path: &DavPath,
        principal: Option<&str>,
        owner: Option<&Element>,
        timeout: Option<Duration>,
        scope: LockScope,
        deep: bool,
    ) -> Result<DavLock, DavLock>;

    /// Release the lock with `token` on `path`. Fails when the token
    /// does not match an active lock on that path.
    fn unlock(&self, path: &DavPath, token: &str) -> Result<(), ()>;

    /// Extend the timeout of an existing lock.
    fn refresh(&self, path: &DavPath, token: &str, timeout: Option<Duration>)
        -> Result<DavLock, ()>;

    /// Verify that a mutation of `path` (and, when `deep`, everything
    /// below it) is permitted given the presented tokens. Fails with the
    /// first blocking lock.
    fn check(&self, path: &DavPath, deep: bool, submitted: &[String]) -> Result<(), DavLock>;

    /// All active locks covering `path`.
    fn discover(&self, path: &DavPath) -> Vec<DavLock>;

    /// Forget all locks at and below `path` (the resource is gone).
    fn delete(&self, path: &DavPath) -> Result<(), ()>;
}
