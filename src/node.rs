//! The node model: the interface between the handler and the storage backends.
//!
//! A backend exposes a tree of nodes. Every node has a name and a
//! modification time; a node is either a [`DavCollection`] (it owns named
//! child nodes) or a [`DavFile`] (it owns a byte payload). The dispatcher
//! queries capabilities through [`DavNode::as_collection`] /
//! [`DavNode::as_file`] instead of inspecting concrete types.
//!
//! All methods that touch backend storage return boxed futures, like the
//! filesystem interface this crate grew out of. Backend failures are
//! values ([`FsError`]); they are mapped to protocol errors at the
//! handler boundary.

use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use futures_util::future::{self, BoxFuture, FutureExt};
use xmltree::Element;

use crate::errors::FsError;

/// Boxed future returned by all backend methods.
pub type FsFuture<'a, T> = BoxFuture<'a, Result<T, FsError>>;

/// A resource in the tree.
pub trait DavNode: Send + Sync {
    /// Name of the node: the last segment of its path. Never contains `/`.
    fn name(&self) -> String;

    /// Rename the node in place.
    ///
    /// On failure the node must still be reachable at its old path;
    /// implementations rename through a single primitive and only update
    /// their own state when that primitive succeeded.
    fn set_name<'a>(&'a self, new_name: &'a str) -> FsFuture<'a, ()>;

    /// Remove the node (recursively, for collections).
    fn delete(&self) -> FsFuture<'_, ()>;

    fn last_modified(&self) -> FsFuture<'_, SystemTime>;

    /// Creation time. Backends that do not record it report the
    /// modification time instead.
    fn created(&self) -> FsFuture<'_, SystemTime> {
        self.last_modified()
    }

    fn is_collection(&self) -> bool {
        self.as_collection().is_some()
    }

    fn as_collection(&self) -> Option<&dyn DavCollection> {
        None
    }

    fn as_file(&self) -> Option<&dyn DavFile> {
        None
    }

    /// Store a dead property. The element carries its own namespace.
    /// Backends without property storage keep the default, which refuses.
    fn set_property<'a>(&'a self, _prop: &'a Element) -> FsFuture<'a, ()> {
        future::err(FsError::Forbidden).boxed()
    }

    /// Remove a dead property.
    fn remove_property<'a>(&'a self, _ns: Option<&'a str>, _name: &'a str) -> FsFuture<'a, ()> {
        future::err(FsError::Forbidden).boxed()
    }

    /// Look up a dead property.
    fn get_property<'a>(
        &'a self,
        _ns: Option<&'a str>,
        _name: &'a str,
    ) -> FsFuture<'a, Option<Element>> {
        future::ok(None).boxed()
    }

    /// All dead properties, for `allprop` requests.
    fn dead_props(&self) -> FsFuture<'_, Vec<Element>> {
        future::ok(Vec::new()).boxed()
    }
}

impl std::fmt::Debug for dyn DavNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DavNode({})", self.name())
    }
}

/// A node that contains named child nodes.
///
/// Child names are unique within a collection: creating a child with an
/// existing name is a conflict ([`FsError::Exists`]), never an overwrite.
pub trait DavCollection: DavNode {
    /// All children, in a stable order for the duration of one response.
    fn get_children(&self) -> FsFuture<'_, Vec<Arc<dyn DavNode>>>;

    /// Look up a child by name.
    fn get_child<'a>(&'a self, name: &'a str) -> FsFuture<'a, Arc<dyn DavNode>>;

    /// Create a file child with an initial payload.
    ///
    /// Returns a content fingerprint (quoted ETag) only when the stored
    /// representation is guaranteed byte-identical to `data`; otherwise
    /// the fingerprint must be omitted.
    fn create_file<'a>(&'a self, name: &'a str, data: Bytes) -> FsFuture<'a, Option<String>>;

    /// Create a collection child.
    fn create_directory<'a>(&'a self, name: &'a str) -> FsFuture<'a, ()>;
}

/// A node that owns a byte payload.
pub trait DavFile: DavNode {
    fn read(&self) -> FsFuture<'_, Bytes>;

    /// Replace the payload. Same fingerprint rules as
    /// [`DavCollection::create_file`].
    fn put(&self, data: Bytes) -> FsFuture<'_, Option<String>>;

    fn content_length(&self) -> FsFuture<'_, u64>;

    fn etag(&self) -> FsFuture<'_, Option<String>> {
        future::ok(None).boxed()
    }
}

/// A collection mounted under a fixed name.
///
/// This is the immutable-identity variant of the node model: it answers
/// with the mount name instead of the inner node's own name, and since a
/// rename or delete would detach the mount point, both fail with
/// `Forbidden`. Everything else is delegated to the inner node.
pub struct NamedRoot {
    name: String,
    inner: Arc<dyn DavNode>,
}

impl NamedRoot {
    /// Mount `inner` under `name`. Fails if `name` contains `/` or
    /// `inner` is not a collection.
    pub fn new(name: impl Into<String>, inner: Arc<dyn DavNode>) -> Result<NamedRoot, FsError> {
        let name = name.into();
        if name.is_empty() || name.contains('/') {
            return Err(FsError::Forbidden);
        }
        if !inner.is_collection() {
            return Err(FsError::NotImplemented);
        }
        Ok(NamedRoot { name, inner })
    }

    fn col(&self) -> Result<&dyn DavCollection, FsError> {
        self.inner.as_collection().ok_or(FsError::NotImplemented)
    }
}

impl DavNode for NamedRoot {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn set_name<'a>(&'a self, _new_name: &'a str) -> FsFuture<'a, ()> {
        future::err(FsError::Forbidden).boxed()
    }

    fn delete(&self) -> FsFuture<'_, ()> {
        future::err(FsError::Forbidden).boxed()
    }

    fn last_modified(&self) -> FsFuture<'_, SystemTime> {
        self.inner.last_modified()
    }

    fn created(&self) -> FsFuture<'_, SystemTime> {
        self.inner.created()
    }

    fn as_collection(&self) -> Option<&dyn DavCollection> {
        Some(self)
    }

    fn set_property<'a>(&'a self, prop: &'a Element) -> FsFuture<'a, ()> {
        self.inner.set_property(prop)
    }

    fn remove_property<'a>(&'a self, ns: Option<&'a str>, name: &'a str) -> FsFuture<'a, ()> {
        self.inner.remove_property(ns, name)
    }

    fn get_property<'a>(
        &'a self,
        ns: Option<&'a str>,
        name: &'a str,
    ) -> FsFuture<'a, Option<Element>> {
        self.inner.get_property(ns, name)
    }

    fn dead_props(&self) -> FsFuture<'_, Vec<Element>> {
        self.inner.dead_props()
    }
}

impl DavCollection for NamedRoot {
    fn get_children(&self) -> FsFuture<'_, Vec<Arc<dyn DavNode>>> {
        match self.col() {
            Ok(col) => col.get_children(),
            Err(e) => future::err(e).boxed(),
        }
    }

    fn get_child<'a>(&'a self, name: &'a str) -> FsFuture<'a, Arc<dyn DavNode>> {
        match self.col() {
            Ok(col) => col.get_child(name),
            Err(e) => future::err(e).boxed(),
        }
    }

    fn create_file<'a>(&'a self, name: &'a str, data: Bytes) -> FsFuture<'a, Option<String>> {
        match self.col() {
            Ok(col) => col.create_file(name, data),
            Err(e) => future::err(e).boxed(),
        }
    }

    fn create_directory<'a>(&'a self, name: &'a str) -> FsFuture<'a, ()> {
        match self.col() {
            Ok(col) => col.create_directory(name),
            Err(e) => future::err(e).boxed(),
        }
    }
}
