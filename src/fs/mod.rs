//! Storage backends implementing the node model.

use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use futures_util::future::{self, FutureExt};

use crate::errors::FsError;
use crate::node::{DavCollection, DavNode, FsFuture, NamedRoot};

#[cfg(feature = "localfs")]
pub mod localfs;
#[cfg(feature = "memfs")]
pub mod memfs;

/// A read-only root collection holding named mount points.
///
/// Each mount is wrapped in a [`NamedRoot`], so a share keeps its
/// configured name and cannot be renamed or deleted through the
/// protocol. Children cannot be created directly in this collection.
pub struct SimpleDir {
    created: SystemTime,
    mounts: Vec<Arc<dyn DavNode>>,
}

impl SimpleDir {
    pub fn new() -> SimpleDir {
        SimpleDir {
            created: SystemTime::now(),
            mounts: Vec::new(),
        }
    }

    /// Mount `node` under `name`. Fails on duplicate names and on
    /// nodes that are not collections.
    pub fn add_mount(&mut self, name: &str, node: Arc<dyn DavNode>) -> Result<(), FsError> {
        if self.mounts.iter().any(|m| m.name() == name) {
            return Err(FsError::Exists);
        }
        let named = NamedRoot::new(name, node)?;
        self.mounts.push(Arc::new(named));
        Ok(())
    }
}

impl Default for SimpleDir {
    fn default() -> Self {
        SimpleDir::new()
    }
}

impl DavNode for SimpleDir {
    fn name(&self) -> String {
        String::new()
    }

    fn set_name<'a>(&'a self, _new_name: &'a str) -> FsFuture<'a, ()> {
        future::err(FsError::Forbidden).boxed()
    }

    fn delete(&self) -> FsFuture<'_, ()> {
        future::err(FsError::Forbidden).boxed()
    }

    fn last_modified(&self) -> FsFuture<'_, SystemTime> {
        future::ok(self.created).boxed()
    }

    fn as_collection(&self) -> Option<&dyn DavCollection> {
        Some(self)
    }
}

impl DavCollection for SimpleDir {
    fn get_children(&self) -> FsFuture<'_, Vec<Arc<dyn DavNode>>> {
        future::ok(self.mounts.clone()).boxed()
    }

    fn get_child<'a>(&'a self, name: &'a str) -> FsFuture<'a, Arc<dyn DavNode>> {
        let child = self.mounts.iter().find(|m| m.name() == name).cloned();
        match child {
            Some(c) => future::ok(c).boxed(),
            None => future::err(FsError::NotFound).boxed(),
        }
    }

    fn create_file<'a>(&'a self, _name: &'a str, _data: Bytes) -> FsFuture<'a, Option<String>> {
        future::err(FsError::Forbidden).boxed()
    }

    fn create_directory<'a>(&'a self, _name: &'a str) -> FsFuture<'a, ()> {
        future::err(FsError::Forbidden).boxed()
    }
}

// A node name must be a single path segment.
pub(crate) fn valid_name(name: &str) -> Result<(), FsError> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(FsError::Forbidden);
    }
    if name.contains('/') || name.contains('\0') {
        return Err(FsError::Forbidden);
    }
    Ok(())
}

#[cfg(test)]
#[cfg(feature = "memfs")]
mod tests {
    use super::*;
    use crate::fs::memfs::MemFs;

    #[tokio::test]
    async fn mounts_are_fixed() {
        let mut root = SimpleDir::new();
        root.add_mount("docs", MemFs::new()).unwrap();
        assert!(root.add_mount("docs", MemFs::new()).is_err());

        let share = root.get_child("docs").await.unwrap();
        assert_eq!(share.name(), "docs");
        assert_eq!(
            share.set_name("other").await.unwrap_err(),
            FsError::Forbidden
        );
        assert_eq!(
            root.create_directory("direct").await.unwrap_err(),
            FsError::Forbidden
        );
    }
}
