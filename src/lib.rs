//! ## Generic async Webdav request handler
//!
//! [`Webdav`](https://tools.ietf.org/html/rfc4918) (RFC4918) is defined as
//! HTTP (GET/HEAD/PUT/DELETE) plus a bunch of extension methods (PROPFIND, etc).
//! These extension methods are used to manage collections (like unix directories),
//! get information on collections (like unix `ls` or `readdir`), rename and
//! copy items, lock/unlock items, etc.
//!
//! A `handler` is a piece of code that takes a `http::Request`, processes it in some
//! way, and then generates a `http::Response`. This library is a `handler` that maps
//! the HTTP/Webdav protocol to a tree of [nodes][DavNode]. Included are an adapter
//! for the local filesystem (`localfs`), an in-memory tree with dead-property
//! support (`memfs`), and a virtual root that mounts other backends as named,
//! fixed shares.
//!
//! Since the handler works with the standard types from the `http` and
//! `http_body` crates, it can be plugged into any HTTP server framework that
//! also works with those types.
//!
//! ## Backend interfaces.
//!
//! - the library contains a [HTTP handler][DavHandler], configured through
//!   a [builder][DavBuilder] with backends resolved once at startup.
//! - storage backends implement the node traits ([`DavNode`], [`DavCollection`],
//!   [`DavFile`]), optionally with dead-property storage.
//! - a [locksystem][DavLockSystem] handles webdav locks.
//! - [plugins][DavPlugin] can intercept requests before dispatch, e.g. for
//!   [HTTP Basic authentication][BasicAuthPlugin].
//!
//! ## Implemented methods.
//!
//! `OPTIONS`, `GET`/`HEAD`, `PUT`, `DELETE`, `MKCOL` (plain RFC4918 and the
//! extended-body variant of RFC5689), `PROPFIND`, `PROPPATCH`, `COPY`, `MOVE`,
//! `LOCK` and `UNLOCK`.
//!
//! ## Example.
//!
//! ```no_run
//! use dav_core::{DavHandler, FileSystem, LockSystem};
//! use dav_core::body::Body;
//!
//! #[tokio::main]
//! async fn main() {
//!     let dav = DavHandler::builder(FileSystem::local("/tmp"))
//!         .locksystem(LockSystem::Mem)
//!         .build()
//!         .expect("backend setup failed");
//!
//!     let req = http::Request::builder()
//!         .method("PROPFIND")
//!         .uri("/")
//!         .header("Depth", "1")
//!         .body(Body::empty())
//!         .unwrap();
//!     let res = dav.handle(req).await;
//!     println!("{}", res.status());
//! }
//! ```

#[macro_use]
extern crate log;

mod davhandler;
mod davheaders;
mod errors;
mod multistatus;
mod props;
mod tree;
mod util;

pub mod body;
pub mod davpath;
pub mod fs;
pub mod ls;
pub mod node;
pub mod plugin;

use crate::errors::DavResult;

pub use crate::davhandler::{DavBuilder, DavHandler, FileSystem, LockSystem};
pub use crate::errors::FsError;
pub use crate::node::{DavCollection, DavFile, DavNode};
pub use crate::util::{DavMethod, DavMethodSet};

#[doc(inline)]
pub use crate::ls::DavLockSystem;
#[doc(inline)]
pub use crate::plugin::{AuthBackend, BasicAuthPlugin, DavPlugin};
