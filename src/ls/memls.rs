//! In-memory lock system.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use xmltree::Element;

use crate::davpath::DavPath;
use crate::ls::{DavLock, DavLockSystem, LockScope};

/// Ephemeral lock system, one table for the whole tree.
///
/// The table maps resource path to its active locks. All mutations take
/// the one mutex, which makes acquire/release/check atomic with respect
/// to concurrent requests. Expired locks are pruned whenever the entry
/// they live in is visited.
pub struct MemLs {
    table: Mutex<HashMap<String, Vec<DavLock>>>,
}

impl MemLs {
    pub fn new() -> Arc<MemLs> {
        Arc::new(MemLs {
            table: Mutex::new(HashMap::new()),
        })
    }
}

// Does a lock at `lock_path` (with `deep`) cover `path`?
fn covers(lock_path: &str, deep: bool, path: &str) -> bool {
    if lock_path == path {
        return true;
    }
    deep && is_ancestor(lock_path, path)
}

fn is_ancestor(ancestor: &str, path: &str) -> bool {
    if ancestor == "/" {
        return path != "/";
    }
    path.strip_prefix(ancestor)
        .is_some_and(|r| r.starts_with('/'))
}

fn prune(locks: &mut Vec<DavLock>, now: SystemTime) {
    locks.retain(|l| !l.is_expired(now));
}

type Table = HashMap<String, Vec<DavLock>>;

// All unexpired locks that cover `path`; when `deep`, locks on
// descendants count as well.
fn find_covering(table: &mut Table, path: &str, deep: bool, now: SystemTime) -> Vec<DavLock> {
    let mut found = Vec::new();
    for (lock_path, locks) in table.iter_mut() {
        prune(locks, now);
        for lock in locks.iter() {
            if covers(lock_path, lock.deep, path) || (deep && is_ancestor(path, lock_path)) {
                found.push(lock.clone());
            }
        }
    }
    table.retain(|_, locks| !locks.is_empty());
    found
}

impl DavLockSystem for MemLs {
    fn lock(
        &self,
        path: &DavPath,
        principal: Option<&str>,
        owner: Option<&Element>,
        timeout: Option<Duration>,
        scope: LockScope,
        deep: bool,
    ) -> Result<DavLock, DavLock> {
        let now = SystemTime::now();
        let key = path.as_url_string();
        let mut table = self.table.lock();

        // A new deep lock also conflicts with locks below the path.
        for existing in find_covering(&mut table, &key, deep, now) {
            if scope == LockScope::Exclusive || existing.scope == LockScope::Exclusive {
                return Err(existing);
            }
        }

        let lock = DavLock {
            token: format!("urn:uuid:{}", uuid::Uuid::new_v4()),
            path: key.clone(),
            principal: principal.map(|s| s.to_string()),
            owner: owner.cloned(),
            timeout,
            deadline: timeout.map(|t| now + t),
            scope,
            deep,
        };
        table.entry(key).or_default().push(lock.clone());
        Ok(lock)
    }

    fn unlock(&self, path: &DavPath, token: &str) -> Result<(), ()> {
        let now = SystemTime::now();
        let key = path.as_url_string();
        let mut table = self.table.lock();
        let locks = table.get_mut(&key).ok_or(())?;
        prune(locks, now);
        let len = locks.len();
        locks.retain(|l| l.token != token);
        let removed = locks.len() != len;
        if locks.is_empty() {
            table.remove(&key);
        }
        if removed {
            Ok(())
        } else {
            Err(())
        }
    }

    fn refresh(
        &self,
        path: &DavPath,
        token: &str,
        timeout: Option<Duration>,
    ) -> Result<DavLock, ()> {
        let now = SystemTime::now();
        let key = path.as_url_string();
        let mut table = self.table.lock();
        let locks = table.get_mut(&key).ok_or(())?;
        prune(locks, now);
        let lock = locks.iter_mut().find(|l| l.token == token).ok_or(())?;
        lock.timeout = timeout;
        lock.deadline = timeout.map(|t| now + t);
        Ok(lock.clone())
    }

    fn check(&self, path: &DavPath, deep: bool, submitted: &[String]) -> Result<(), DavLock> {
        let now = SystemTime::now();
        let key = path.as_url_string();
        let mut table = self.table.lock();
        for lock in find_covering(&mut table, &key, deep, now) {
            if !submitted.contains(&lock.token) {
                return Err(lock);
            }
        }
        Ok(())
    }

    fn discover(&self, path: &DavPath) -> Vec<DavLock> {
        let now = SystemTime::now();
        let key = path.as_url_string();
        let mut table = self.table.lock();
        find_covering(&mut table, &key, false, now)
    }

    fn delete(&self, path: &DavPath) -> Result<(), ()> {
        let key = path.as_url_string();
        let mut table = self.table.lock();
        table.retain(|lock_path, _| lock_path != &key && !is_ancestor(&key, lock_path));
        Ok(())
    }
}
