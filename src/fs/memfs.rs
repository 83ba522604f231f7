//! Ephemeral in-memory backend.
//!
//! Nodes share their state through `Arc<Mutex<..>>` interior, so every
//! handle resolved for a path observes the same data. Children are kept
//! in creation order; names are unique within a collection. This backend
//! stores dead properties, which makes it the reference backend for the
//! property tests.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use futures_util::future::{self, FutureExt};
use parking_lot::Mutex;
use xmltree::Element;

use crate::errors::FsError;
use crate::fs::valid_name;
use crate::node::{DavCollection, DavFile, DavNode, FsFuture};

type PropKey = (Option<String>, String);
type DirHandle = Arc<Mutex<DirInner>>;
type FileHandle = Arc<Mutex<FileInner>>;

struct DirInner {
    name: String,
    mtime: SystemTime,
    created: SystemTime,
    entries: Vec<Entry>,
    props: HashMap<PropKey, Element>,
}

struct FileInner {
    name: String,
    mtime: SystemTime,
    created: SystemTime,
    data: Bytes,
    props: HashMap<PropKey, Element>,
}

#[derive(Clone)]
enum Entry {
    Dir(DirHandle),
    File(FileHandle),
}

impl Entry {
    fn name(&self) -> String {
        match self {
            Entry::Dir(d) => d.lock().name.clone(),
            Entry::File(f) => f.lock().name.clone(),
        }
    }

    fn as_node(&self, parent: DirHandle) -> Arc<dyn DavNode> {
        match self {
            Entry::Dir(d) => Arc::new(MemDir {
                inner: d.clone(),
                parent: Some(parent),
            }),
            Entry::File(f) => Arc::new(MemFile {
                inner: f.clone(),
                parent,
            }),
        }
    }
}

/// In-memory filesystem; `new` returns the root collection.
pub struct MemFs;

impl MemFs {
    pub fn new() -> Arc<dyn DavNode> {
        let now = SystemTime::now();
        Arc::new(MemDir {
            inner: Arc::new(Mutex::new(DirInner {
                name: String::new(),
                mtime: now,
                created: now,
                entries: Vec::new(),
                props: HashMap::new(),
            })),
            parent: None,
        })
    }
}

struct MemDir {
    inner: DirHandle,
    parent: Option<DirHandle>,
}

struct MemFile {
    inner: FileHandle,
    parent: DirHandle,
}

fn content_etag(data: &Bytes) -> String {
    let mut h = std::collections::hash_map::DefaultHasher::new();
    data.hash(&mut h);
    format!("\"{:x}-{:x}\"", data.len(), h.finish())
}

fn prop_key(e: &Element) -> PropKey {
    (e.namespace.clone(), e.name.clone())
}

// Rename an entry, enforcing sibling-name uniqueness. `me` identifies
// the entry being renamed so it does not collide with itself.
fn rename_in(
    parent: &DirHandle,
    me: &Entry,
    set: impl FnOnce(&str),
    new_name: &str,
) -> Result<(), FsError> {
    valid_name(new_name)?;
    let parent = parent.lock();
    let me_name = me.name();
    for entry in &parent.entries {
        let name = entry.name();
        if name == new_name && name != me_name {
            return Err(FsError::Exists);
        }
    }
    set(new_name);
    Ok(())
}

// Detach an entry from its parent.
fn remove_from(parent: &DirHandle, name: &str) -> Result<(), FsError> {
    let mut parent = parent.lock();
    let len = parent.entries.len();
    parent.entries.retain(|e| e.name() != name);
    if parent.entries.len() == len {
        return Err(FsError::NotFound);
    }
    parent.mtime = SystemTime::now();
    Ok(())
}

impl DavNode for MemDir {
    fn name(&self) -> String {
        self.inner.lock().name.clone()
    }

    fn set_name<'a>(&'a self, new_name: &'a str) -> FsFuture<'a, ()> {
        let res = match &self.parent {
            None => Err(FsError::Forbidden),
            Some(parent) => rename_in(
                parent,
                &Entry::Dir(self.inner.clone()),
                |n| self.inner.lock().name = n.to_string(),
                new_name,
            ),
        };
        future::ready(res).boxed()
    }

    fn delete(&self) -> FsFuture<'_, ()> {
        let res = match &self.parent {
            None => Err(FsError::Forbidden),
            Some(parent) => remove_from(parent, &self.name()),
        };
        future::ready(res).boxed()
    }

    fn last_modified(&self) -> FsFuture<'_, SystemTime> {
        future::ok(self.inner.lock().mtime).boxed()
    }

    fn created(&self) -> FsFuture<'_, SystemTime> {
        future::ok(self.inner.lock().created).boxed()
    }

    fn as_collection(&self) -> Option<&dyn DavCollection> {
        Some(self)
    }

    fn set_property<'a>(&'a self, prop: &'a Element) -> FsFuture<'a, ()> {
        self.inner.lock().props.insert(prop_key(prop), prop.clone());
        future::ok(()).boxed()
    }

    fn remove_property<'a>(&'a self, ns: Option<&'a str>, name: &'a str) -> FsFuture<'a, ()> {
        let key = (ns.map(|s| s.to_string()), name.to_string());
        self.inner.lock().props.remove(&key);
        future::ok(()).boxed()
    }

    fn get_property<'a>(
        &'a self,
        ns: Option<&'a str>,
        name: &'a str,
    ) -> FsFuture<'a, Option<Element>> {
        let key = (ns.map(|s| s.to_string()), name.to_string());
        future::ok(self.inner.lock().props.get(&key).cloned()).boxed()
    }

    fn dead_props(&self) -> FsFuture<'_, Vec<Element>> {
        future::ok(self.inner.lock().props.values().cloned().collect()).boxed()
    }
}

impl DavCollection for MemDir {
    fn get_children(&self) -> FsFuture<'_, Vec<Arc<dyn DavNode>>> {
        let inner = self.inner.lock();
        let children = inner
            .entries
            .iter()
            .map(|e| e.as_node(self.inner.clone()))
            .collect();
        future::ok(children).boxed()
    }

    fn get_child<'a>(&'a self, name: &'a str) -> FsFuture<'a, Arc<dyn DavNode>> {
        let inner = self.inner.lock();
        let child = inner
            .entries
            .iter()
            .find(|e| e.name() == name)
            .map(|e| e.as_node(self.inner.clone()));
        match child {
            Some(c) => future::ok(c).boxed(),
            None => future::err(FsError::NotFound).boxed(),
        }
    }

    fn create_file<'a>(&'a self, name: &'a str, data: Bytes) -> FsFuture<'a, Option<String>> {
        let res = (|| {
            valid_name(name)?;
            let mut inner = self.inner.lock();
            if inner.entries.iter().any(|e| e.name() == name) {
                return Err(FsError::Exists);
            }
            let etag = content_etag(&data);
            let now = SystemTime::now();
            inner.entries.push(Entry::File(Arc::new(Mutex::new(FileInner {
                name: name.to_string(),
                mtime: now,
                created: now,
                data,
                props: HashMap::new(),
            }))));
            inner.mtime = now;
            // stored byte-identical, so the fingerprint may be reported.
            Ok(Some(etag))
        })();
        future::ready(res).boxed()
    }

    fn create_directory<'a>(&'a self, name: &'a str) -> FsFuture<'a, ()> {
        let res = (|| {
            valid_name(name)?;
            let mut inner = self.inner.lock();
            if inner.entries.iter().any(|e| e.name() == name) {
                return Err(FsError::Exists);
            }
            let now = SystemTime::now();
            inner.entries.push(Entry::Dir(Arc::new(Mutex::new(DirInner {
                name: name.to_string(),
                mtime: now,
                created: now,
                entries: Vec::new(),
                props: HashMap::new(),
            }))));
            inner.mtime = now;
            Ok(())
        })();
        future::ready(res).boxed()
    }
}

impl DavNode for MemFile {
    fn name(&self) -> String {
        self.inner.lock().name.clone()
    }

    fn set_name<'a>(&'a self, new_name: &'a str) -> FsFuture<'a, ()> {
        let res = rename_in(
            &self.parent,
            &Entry::File(self.inner.clone()),
            |n| self.inner.lock().name = n.to_string(),
            new_name,
        );
        future::ready(res).boxed()
    }

    fn delete(&self) -> FsFuture<'_, ()> {
        future::ready(remove_from(&self.parent, &self.name())).boxed()
    }

    fn last_modified(&self) -> FsFuture<'_, SystemTime> {
        future::ok(self.inner.lock().mtime).boxed()
    }

    fn created(&self) -> FsFuture<'_, SystemTime> {
        future::ok(self.inner.lock().created).boxed()
    }

    fn as_file(&self) -> Option<&dyn DavFile> {
        Some(self)
    }

    fn set_property<'a>(&'a self, prop: &'a Element) -> FsFuture<'a, ()> {
        self.inner.lock().props.insert(prop_key(prop), prop.clone());
        future::ok(()).boxed()
    }

    fn remove_property<'a>(&'a self, ns: Option<&'a str>, name: &'a str) -> FsFuture<'a, ()> {
        let key = (ns.map(|s| s.to_string()), name.to_string());
        self.inner.lock().props.remove(&key);
        future::ok(()).boxed()
    }

    fn get_property<'a>(
        &'a self,
        ns: Option<&'a str>,
        name: &'a str,
    ) -> FsFuture<'a, Option<Element>> {
        let key = (ns.map(|s| s.to_string()), name.to_string());
        future::ok(self.inner.lock().props.get(&key).cloned()).boxed()
    }

    fn dead_props(&self) -> FsFuture<'_, Vec<Element>> {
        future::ok(self.inner.lock().props.values().cloned().collect()).boxed()
    }
}

impl DavFile for MemFile {
    fn read(&self) -> FsFuture<'_, Bytes> {
        future::ok(self.inner.lock().data.clone()).boxed()
    }

    fn put(&self, data: Bytes) -> FsFuture<'_, Option<String>> {
        let mut inner = self.inner.lock();
        let etag = content_etag(&data);
        inner.data = data;
        inner.mtime = SystemTime::now();
        future::ok(Some(etag)).boxed()
    }

    fn content_length(&self) -> FsFuture<'_, u64> {
        future::ok(self.inner.lock().data.len() as u64).boxed()
    }

    fn etag(&self) -> FsFuture<'_, Option<String>> {
        future::ok(Some(content_etag(&self.inner.lock().data))).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(node: &Arc<dyn DavNode>) -> &dyn DavCollection {
        node.as_collection().unwrap()
    }

    #[tokio::test]
    async fn create_and_lookup() {
        let root = MemFs::new();
        col(&root).create_directory("dir").await.unwrap();
        let etag = col(&root)
            .create_file("file", Bytes::from("x"))
            .await
            .unwrap();
        assert!(etag.is_some());

        let names: Vec<_> = col(&root)
            .get_children()
            .await
            .unwrap()
            .iter()
            .map(|n| n.name())
            .collect();
        // creation order
        assert_eq!(names, vec!["dir", "file"]);
    }

    #[tokio::test]
    async fn duplicate_names_conflict() {
        let root = MemFs::new();
        col(&root).create_directory("x").await.unwrap();
        assert_eq!(
            col(&root).create_directory("x").await.unwrap_err(),
            FsError::Exists
        );
        assert_eq!(
            col(&root)
                .create_file("x", Bytes::new())
                .await
                .unwrap_err(),
            FsError::Exists
        );
    }

    #[tokio::test]
    async fn rename_checks_siblings() {
        let root = MemFs::new();
        col(&root).create_directory("a").await.unwrap();
        col(&root).create_directory("b").await.unwrap();
        let a = col(&root).get_child("a").await.unwrap();
        assert_eq!(a.set_name("b").await.unwrap_err(), FsError::Exists);
        a.set_name("c").await.unwrap();
        assert!(col(&root).get_child("c").await.is_ok());
        assert!(col(&root).get_child("a").await.is_err());
        // renaming the root is not possible
        assert_eq!(root.set_name("z").await.unwrap_err(), FsError::Forbidden);
    }

    #[tokio::test]
    async fn state_is_shared_between_handles() {
        let root = MemFs::new();
        col(&root).create_directory("dir").await.unwrap();
        let h1 = col(&root).get_child("dir").await.unwrap();
        let h2 = col(&root).get_child("dir").await.unwrap();
        h1.as_collection()
            .unwrap()
            .create_file("f", Bytes::new())
            .await
            .unwrap();
        assert!(h2.as_collection().unwrap().get_child("f").await.is_ok());
    }

    #[tokio::test]
    async fn dead_props_round_trip() {
        let root = MemFs::new();
        let mut e = Element::new("displayname");
        e.namespace = Some("DAV:".to_string());
        root.set_property(&e).await.unwrap();
        let got = root.get_property(Some("DAV:"), "displayname").await.unwrap();
        assert!(got.is_some());
        assert_eq!(root.dead_props().await.unwrap().len(), 1);
        root.remove_property(Some("DAV:"), "displayname")
            .await
            .unwrap();
        assert!(root
            .get_property(Some("DAV:"), "displayname")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn file_contents() {
        let root = MemFs::new();
        col(&root)
            .create_file("f", Bytes::from("hello"))
            .await
            .unwrap();
        let f = col(&root).get_child("f").await.unwrap();
        let file = f.as_file().unwrap();
        assert_eq!(file.read().await.unwrap(), Bytes::from("hello"));
        assert_eq!(file.content_length().await.unwrap(), 5);
        let e1 = file.etag().await.unwrap();
        file.put(Bytes::from("world")).await.unwrap();
        let e2 = file.etag().await.unwrap();
        assert_ne!(e1, e2);
        assert_eq!(file.read().await.unwrap(), Bytes::from("world"));
    }
}
