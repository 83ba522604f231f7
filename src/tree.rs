//! Path resolution against the node tree.
//!
//! A `Tree` lives for one request. It resolves slash-delimited paths to
//! nodes and caches every node it resolved, so that repeated lookups for
//! the same path within the request return the same instance. The cache
//! is discarded with the tree at the end of the request.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::davpath::DavPath;
use crate::errors::{DavError, DavResult, FsError};
use crate::node::DavNode;

pub struct Tree {
    root: Arc<dyn DavNode>,
    cache: Mutex<HashMap<String, Arc<dyn DavNode>>>,
}

impl Tree {
    pub fn new(root: Arc<dyn DavNode>) -> Tree {
        Tree {
            root,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a path to a node.
    ///
    /// Fails with NotFound when no resource exists at the path, or when
    /// any ancestor segment resolves to something that is not a
    /// collection.
    pub async fn get_node_for_path(&self, path: &DavPath) -> DavResult<Arc<dyn DavNode>> {
        let key = path.as_url_string();
        if let Some(node) = self.cache.lock().get(&key) {
            return Ok(node.clone());
        }

        // Walk down from the root, reusing cached ancestors.
        let mut current = self.root.clone();
        let mut walked = DavPath::root(path.prefix());
        for segment in path.segments() {
            walked = walked.child(segment);
            let cache_key = walked.as_url_string();
            if let Some(node) = self.cache.lock().get(&cache_key) {
                current = node.clone();
                continue;
            }
            let col = match current.as_collection() {
                Some(col) => col,
                None => return Err(DavError::NotFound),
            };
            let child = match col.get_child(segment).await {
                Ok(child) => child,
                Err(FsError::NotFound) => return Err(DavError::NotFound),
                Err(e) => return Err(e.into()),
            };
            self.cache.lock().insert(cache_key, child.clone());
            current = child;
        }
        Ok(current)
    }

    /// Non-throwing existence check.
    pub async fn node_exists(&self, path: &DavPath) -> bool {
        self.get_node_for_path(path).await.is_ok()
    }

    /// Drop cached entries at and below `path` after a mutation.
    pub fn flush(&self, path: &DavPath) {
        let prefix = path.as_url_string();
        let mut cache = self.cache.lock();
        cache.retain(|key, _| key != &prefix && !is_descendant(key, &prefix));
    }
}

fn is_descendant(key: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return key != "/";
    }
    key.strip_prefix(prefix).is_some_and(|r| r.starts_with('/'))
}

#[cfg(test)]
#[cfg(feature = "memfs")]
mod tests {
    use super::*;
    use crate::fs::memfs::MemFs;
    use bytes::Bytes;

    fn path(p: &str) -> DavPath {
        DavPath::from_str_and_prefix(p, "").unwrap()
    }

    async fn fixture() -> Tree {
        let root = MemFs::new();
        let col = root.as_collection().unwrap();
        col.create_directory("dir").await.unwrap();
        let dir = col.get_child("dir").await.unwrap();
        dir.as_collection()
            .unwrap()
            .create_file("file.txt", Bytes::from("hello"))
            .await
            .unwrap();
        Tree::new(root)
    }

    #[tokio::test]
    async fn resolves_nested_paths() {
        let tree = fixture().await;
        let node = tree.get_node_for_path(&path("/dir/file.txt")).await.unwrap();
        assert_eq!(node.name(), "file.txt");
        assert!(!node.is_collection());
        assert!(tree.node_exists(&path("/dir")).await);
        assert!(!tree.node_exists(&path("/nope")).await);
    }

    #[tokio::test]
    async fn ancestor_that_is_a_file_is_not_found() {
        let tree = fixture().await;
        let err = tree
            .get_node_for_path(&path("/dir/file.txt/sub"))
            .await
            .unwrap_err();
        assert!(matches!(err, DavError::NotFound));
    }

    #[tokio::test]
    async fn lookups_are_referentially_stable() {
        let tree = fixture().await;
        let a = tree.get_node_for_path(&path("/dir")).await.unwrap();
        let b = tree.get_node_for_path(&path("/dir")).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn flush_forgets_subtree() {
        let tree = fixture().await;
        let a = tree.get_node_for_path(&path("/dir")).await.unwrap();
        tree.flush(&path("/dir"));
        let b = tree.get_node_for_path(&path("/dir")).await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
