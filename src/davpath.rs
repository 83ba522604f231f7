//! Utilities to parse and produce request paths.
//!
//! A `DavPath` is the decoded, normalized form of the request URI with
//! the configured prefix stripped off. It is the identity of a node in
//! the tree: a sequence of UTF-8 segments, `/`-joined, and never with a
//! trailing slash except for the root itself.

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::errors::{DavError, DavResult};

// Characters that need escaping when we generate an URL from a path.
const PATH_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// A parsed, normalized request path.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DavPath {
    segments: Vec<String>,
    // Did the URL have a trailing slash (or was it the root).
    collection: bool,
    // OPTIONS * (asterisk-form request target).
    star: bool,
    prefix: String,
}

impl DavPath {
    /// Parse a request URI, stripping off `prefix`.
    pub fn from_uri_and_prefix(uri: &http::Uri, prefix: &str) -> DavResult<DavPath> {
        if uri.path() == "*" {
            return Ok(DavPath {
                segments: Vec::new(),
                collection: true,
                star: true,
                prefix: prefix.to_string(),
            });
        }
        DavPath::from_str_and_prefix(uri.path(), prefix)
    }

    /// Parse a percent-encoded URL path (no scheme/authority), stripping off `prefix`.
    pub fn from_str_and_prefix(path: &str, prefix: &str) -> DavResult<DavPath> {
        if !path.starts_with('/') {
            return Err(DavError::InvalidPath);
        }
        let prefix = prefix.trim_end_matches('/');
        let rest = match path.strip_prefix(prefix) {
            Some("") => "/",
            Some(r) if r.starts_with('/') => r,
            _ => return Err(DavError::NotFound),
        };

        let collection = rest.ends_with('/');
        let mut segments = Vec::new();
        for raw in rest.split('/') {
            let seg = percent_decode_str(raw)
                .decode_utf8()
                .map_err(|_| DavError::InvalidPath)?;
            match seg.as_ref() {
                "" | "." => {}
                ".." => {
                    // Never allow the path to escape the tree.
                    if segments.pop().is_none() {
                        return Err(DavError::ForbiddenPath);
                    }
                }
                s => {
                    if s.contains('\0') {
                        return Err(DavError::InvalidPath);
                    }
                    segments.push(s.to_string());
                }
            }
        }

        Ok(DavPath {
            collection: collection || segments.is_empty(),
            segments,
            star: false,
            prefix: prefix.to_string(),
        })
    }

    /// Is this the tree root?
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Was the request target `*` (server-wide OPTIONS)?
    pub fn is_star(&self) -> bool {
        self.star
    }

    /// Did the URL indicate a collection (trailing slash)?
    pub fn is_collection(&self) -> bool {
        self.collection
    }

    /// Note that this path refers to a collection.
    pub fn add_slash(&mut self) {
        self.collection = true;
    }

    /// Last path segment; empty string for the root.
    pub fn file_name(&self) -> &str {
        self.segments.last().map(|s| s.as_str()).unwrap_or("")
    }

    /// Path of the parent collection. The parent of the root is the root.
    pub fn parent(&self) -> DavPath {
        let mut segments = self.segments.clone();
        segments.pop();
        DavPath {
            segments,
            collection: true,
            star: false,
            prefix: self.prefix.clone(),
        }
    }

    /// Path of a named child of this (collection) path.
    pub fn child(&self, name: &str) -> DavPath {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        DavPath {
            segments,
            collection: false,
            star: false,
            prefix: self.prefix.clone(),
        }
    }

    /// The normalized path without the prefix, percent-encoded.
    /// No trailing slash, except for the root.
    pub fn as_url_string(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        let mut s = String::new();
        for seg in &self.segments {
            s.push('/');
            s.push_str(&utf8_percent_encode(seg, PATH_ENCODE_SET).to_string());
        }
        s
    }

    /// Full encoded URL path including the prefix, with a trailing
    /// slash if this is a collection. Used when generating hrefs.
    pub fn as_href(&self) -> String {
        let mut s = format!("{}{}", self.prefix, self.as_url_string());
        if self.collection && !s.ends_with('/') {
            s.push('/');
        }
        s
    }

    /// The decoded path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub(crate) fn prefix(&self) -> &str {
        &self.prefix
    }

    pub(crate) fn root(prefix: &str) -> DavPath {
        DavPath {
            segments: Vec::new(),
            collection: true,
            star: false,
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }
}

impl fmt::Display for DavPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_url_string())
    }
}

impl fmt::Debug for DavPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}{}\"", self.prefix, self.as_url_string())
    }
}
