//! Local filesystem backend.
//!
//! Serves a directory on the local filesystem. Node handles are cheap
//! and per-request; all state lives on disk. Renames go through the one
//! `rename(2)` primitive, so a node is never reachable at neither its
//! old nor its new path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use futures_util::future::FutureExt;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;

use crate::errors::FsError;
use crate::fs::valid_name;
use crate::node::{DavCollection, DavFile, DavNode, FsFuture};

/// Local filesystem backend; `new` returns the root collection.
pub struct LocalFs;

impl LocalFs {
    /// Serve the directory at `base`. Fails right away when `base` does
    /// not exist or is not a directory, so misconfiguration is caught at
    /// startup and not in request handling.
    pub fn new(base: impl Into<PathBuf>) -> Result<Arc<dyn DavNode>, FsError> {
        let base = base.into();
        let meta = std::fs::metadata(&base).map_err(FsError::from)?;
        if !meta.is_dir() {
            return Err(FsError::Forbidden);
        }
        Ok(Arc::new(LocalDir {
            base: Arc::new(base),
            rel: Mutex::new(PathBuf::new()),
        }))
    }
}

struct LocalDir {
    base: Arc<PathBuf>,
    // relative path below base; empty for the root. Updated only after
    // a successful rename.
    rel: Mutex<PathBuf>,
}

struct LocalFile {
    base: Arc<PathBuf>,
    rel: Mutex<PathBuf>,
}

fn node_name(rel: &Mutex<PathBuf>) -> String {
    rel.lock()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn meta_etag(meta: &std::fs::Metadata) -> Option<String> {
    let modified = meta.modified().ok()?;
    let t = modified
        .duration_since(std::time::UNIX_EPOCH)
        .ok()?
        .as_nanos();
    Some(format!("\"{:x}-{:x}\"", meta.len(), t))
}

async fn rename(base: &PathBuf, rel: &Mutex<PathBuf>, new_name: &str) -> Result<(), FsError> {
    valid_name(new_name)?;
    let old_rel = rel.lock().clone();
    if old_rel.file_name().is_none() {
        // the backend root has no parent to rename within.
        return Err(FsError::Forbidden);
    }
    let mut new_rel = old_rel.clone();
    new_rel.set_file_name(new_name);
    let from = base.join(&old_rel);
    let to = base.join(&new_rel);
    if tokio::fs::metadata(&to).await.is_ok() {
        return Err(FsError::Exists);
    }
    tokio::fs::rename(&from, &to).await?;
    // only track the new location once the primitive succeeded.
    *rel.lock() = new_rel;
    Ok(())
}

async fn last_modified(path: PathBuf) -> Result<SystemTime, FsError> {
    let meta = tokio::fs::metadata(path).await?;
    Ok(meta.modified()?)
}

async fn created(path: PathBuf) -> Result<SystemTime, FsError> {
    let meta = tokio::fs::metadata(path).await?;
    Ok(meta.created().or_else(|_| meta.modified())?)
}

impl LocalDir {
    fn fspath(&self) -> PathBuf {
        self.base.join(&*self.rel.lock())
    }

    fn child_rel(&self, name: &str) -> Result<PathBuf, FsError> {
        valid_name(name)?;
        Ok(self.rel.lock().join(name))
    }
}

impl DavNode for LocalDir {
    fn name(&self) -> String {
        node_name(&self.rel)
    }

    fn set_name<'a>(&'a self, new_name: &'a str) -> FsFuture<'a, ()> {
        rename(&self.base, &self.rel, new_name).boxed()
    }

    fn delete(&self) -> FsFuture<'_, ()> {
        async move {
            if self.rel.lock().file_name().is_none() {
                return Err(FsError::Forbidden);
            }
            tokio::fs::remove_dir_all(self.fspath()).await?;
            Ok(())
        }
        .boxed()
    }

    fn last_modified(&self) -> FsFuture<'_, SystemTime> {
        last_modified(self.fspath()).boxed()
    }

    fn created(&self) -> FsFuture<'_, SystemTime> {
        created(self.fspath()).boxed()
    }

    fn as_collection(&self) -> Option<&dyn DavCollection> {
        Some(self)
    }
}

impl DavCollection for LocalDir {
    fn get_children(&self) -> FsFuture<'_, Vec<Arc<dyn DavNode>>> {
        async move {
            let mut rd = tokio::fs::read_dir(self.fspath()).await?;
            let mut children: Vec<Arc<dyn DavNode>> = Vec::new();
            while let Some(entry) = rd.next_entry().await? {
                let name = match entry.file_name().into_string() {
                    Ok(name) => name,
                    Err(_) => {
                        debug!("skipping child with non-unicode name in {:?}", self.fspath());
                        continue;
                    }
                };
                let rel = self.rel.lock().join(&name);
                let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                if is_dir {
                    children.push(Arc::new(LocalDir {
                        base: self.base.clone(),
                        rel: Mutex::new(rel),
                    }));
                } else {
                    children.push(Arc::new(LocalFile {
                        base: self.base.clone(),
                        rel: Mutex::new(rel),
                    }));
                }
            }
            Ok(children)
        }
        .boxed()
    }

    fn get_child<'a>(&'a self, name: &'a str) -> FsFuture<'a, Arc<dyn DavNode>> {
        async move {
            let rel = self.child_rel(name)?;
            let meta = tokio::fs::metadata(self.base.join(&rel)).await?;
            let node: Arc<dyn DavNode> = if meta.is_dir() {
                Arc::new(LocalDir {
                    base: self.base.clone(),
                    rel: Mutex::new(rel),
                })
            } else {
                Arc::new(LocalFile {
                    base: self.base.clone(),
                    rel: Mutex::new(rel),
                })
            };
            Ok(node)
        }
        .boxed()
    }

    fn create_file<'a>(&'a self, name: &'a str, data: Bytes) -> FsFuture<'a, Option<String>> {
        async move {
            let rel = self.child_rel(name)?;
            let path = self.base.join(&rel);
            let mut file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await?;
            file.write_all(&data).await?;
            file.flush().await?;
            // stored as-is; fingerprint from the resulting metadata.
            let meta = file.metadata().await?;
            Ok(meta_etag(&meta))
        }
        .boxed()
    }

    fn create_directory<'a>(&'a self, name: &'a str) -> FsFuture<'a, ()> {
        async move {
            let rel = self.child_rel(name)?;
            tokio::fs::create_dir(self.base.join(&rel)).await?;
            Ok(())
        }
        .boxed()
    }
}

impl LocalFile {
    fn fspath(&self) -> PathBuf {
        self.base.join(&*self.rel.lock())
    }
}

impl DavNode for LocalFile {
    fn name(&self) -> String {
        node_name(&self.rel)
    }

    fn set_name<'a>(&'a self, new_name: &'a str) -> FsFuture<'a, ()> {
        rename(&self.base, &self.rel, new_name).boxed()
    }

    fn delete(&self) -> FsFuture<'_, ()> {
        async move {
            tokio::fs::remove_file(self.fspath()).await?;
            Ok(())
        }
        .boxed()
    }

    fn last_modified(&self) -> FsFuture<'_, SystemTime> {
        last_modified(self.fspath()).boxed()
    }

    fn created(&self) -> FsFuture<'_, SystemTime> {
        created(self.fspath()).boxed()
    }

    fn as_file(&self) -> Option<&dyn DavFile> {
        Some(self)
    }
}

impl DavFile for LocalFile {
    fn read(&self) -> FsFuture<'_, Bytes> {
        async move {
            let data = tokio::fs::read(self.fspath()).await?;
            Ok(Bytes::from(data))
        }
        .boxed()
    }

    fn put(&self, data: Bytes) -> FsFuture<'_, Option<String>> {
        async move {
            let path = self.fspath();
            tokio::fs::write(&path, &data).await?;
            let meta = tokio::fs::metadata(&path).await?;
            Ok(meta_etag(&meta))
        }
        .boxed()
    }

    fn content_length(&self) -> FsFuture<'_, u64> {
        async move {
            let meta = tokio::fs::metadata(self.fspath()).await?;
            Ok(meta.len())
        }
        .boxed()
    }

    fn etag(&self) -> FsFuture<'_, Option<String>> {
        async move {
            let meta = tokio::fs::metadata(self.fspath()).await?;
            Ok(meta_etag(&meta))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dav-core-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn basic_tree_operations() {
        let dir = tempdir();
        let root = LocalFs::new(&dir).unwrap();
        let col = root.as_collection().unwrap();

        col.create_directory("sub").await.unwrap();
        let etag = col.create_file("f.txt", Bytes::from("abc")).await.unwrap();
        assert!(etag.is_some());
        assert_eq!(
            col.create_file("f.txt", Bytes::new()).await.unwrap_err(),
            FsError::Exists
        );

        let f = col.get_child("f.txt").await.unwrap();
        let file = f.as_file().unwrap();
        assert_eq!(file.read().await.unwrap(), Bytes::from("abc"));
        assert_eq!(file.content_length().await.unwrap(), 3);

        f.set_name("g.txt").await.unwrap();
        assert!(col.get_child("g.txt").await.is_ok());
        assert!(matches!(
            col.get_child("f.txt").await.unwrap_err(),
            FsError::NotFound
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn rename_to_existing_fails_in_place() {
        let dir = tempdir();
        let root = LocalFs::new(&dir).unwrap();
        let col = root.as_collection().unwrap();
        col.create_file("a", Bytes::from("1")).await.unwrap();
        col.create_file("b", Bytes::from("2")).await.unwrap();

        let a = col.get_child("a").await.unwrap();
        assert_eq!(a.set_name("b").await.unwrap_err(), FsError::Exists);
        // still reachable at the old path
        assert_eq!(a.name(), "a");
        assert!(col.get_child("a").await.is_ok());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_base_is_a_startup_error() {
        assert!(LocalFs::new("/definitely/not/here").is_err());
        let file = std::env::temp_dir().join(format!("dav-core-file-{}", uuid::Uuid::new_v4()));
        std::fs::write(&file, b"x").unwrap();
        assert_eq!(LocalFs::new(&file).unwrap_err(), FsError::Forbidden);
        std::fs::remove_file(&file).unwrap();
    }
}
