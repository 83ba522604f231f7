//
// This module contains the main entry point of the library,
// DavHandler.
//
use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Buf;
use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use http_body::Body as HttpBody;

use crate::body::Body;
use crate::davheaders;
use crate::davpath::DavPath;
use crate::fs::SimpleDir;
use crate::ls::memls::MemLs;
use crate::ls::DavLockSystem;
use crate::node::DavNode;
use crate::plugin::{DavPlugin, PluginAction};
use crate::tree::Tree;
use crate::util::{dav_method, dav_xml_error, DavMethod, DavMethodSet};

use crate::errors::DavError;
use crate::DavResult;

pub mod handle_copymove;
pub mod handle_delete;
pub mod handle_gethead;
pub mod handle_lock;
pub mod handle_mkcol;
pub mod handle_options;
pub mod handle_props;
pub mod handle_put;

// Limit for XML request bodies.
const MAX_XML_BODY: usize = 65536;
// Limit for PUT payloads.
const MAX_PUT_BODY: usize = 16 << 20;

/// Configuration of the handler.
#[derive(Clone)]
pub struct DavBuilder {
    /// Prefix to be stripped off when handling request.
    prefix: String,
    /// Storage backend.
    fs: FileSystem,
    /// Locksystem backend.
    ls: Option<LockSystem>,
    /// Set of allowed methods (Defaults to "all methods")
    allow: DavMethodSet,
    /// Principal is webdav speak for "user", used to give locks an owner (if a locksystem is
    /// active).
    principal: Option<String>,
    /// Ordered request hooks.
    plugins: Vec<Arc<dyn DavPlugin>>,
}

/// Storage backend selection. Resolved once, in [`DavBuilder::build`];
/// wiring mistakes (a missing directory, a duplicate share name) are
/// reported there and never surface as per-request errors.
#[derive(Clone)]
pub enum FileSystem {
    #[cfg(feature = "memfs")]
    Mem,
    #[cfg(feature = "localfs")]
    Local {
        /// Path to the root directory.
        base: PathBuf,
    },
    /// A virtual root of named shares, each backed by its own backend.
    Shares(Vec<(String, FileSystem)>),
}

impl FileSystem {
    /// Serve a local directory.
    #[cfg(feature = "localfs")]
    pub fn local(path: impl Into<PathBuf>) -> Self {
        FileSystem::Local { base: path.into() }
    }

    fn build(self) -> DavResult<Arc<dyn DavNode>> {
        match self {
            #[cfg(feature = "memfs")]
            FileSystem::Mem => Ok(crate::fs::memfs::MemFs::new()),
            #[cfg(feature = "localfs")]
            FileSystem::Local { base } => Ok(crate::fs::localfs::LocalFs::new(base)?),
            FileSystem::Shares(shares) => {
                let mut root = SimpleDir::new();
                for (name, fs) in shares {
                    root.add_mount(&name, fs.build()?)?;
                }
                Ok(Arc::new(root))
            }
        }
    }
}

/// Lock backend selection.
#[derive(Default, Clone, Copy)]
pub enum LockSystem {
    #[default]
    Mem,
}

impl LockSystem {
    fn build(self) -> Arc<dyn DavLockSystem> {
        match self {
            LockSystem::Mem => MemLs::new(),
        }
    }
}

impl DavBuilder {
    /// Create a new configuration builder.
    pub fn new(fs: FileSystem) -> DavBuilder {
        Self {
            prefix: String::new(),
            fs,
            ls: None,
            allow: DavMethodSet::WEBDAV_RW,
            principal: None,
            plugins: Vec::new(),
        }
    }

    /// Build the handler. Backend wiring happens here; any
    /// misconfiguration is reported now, at startup.
    pub fn build(self) -> DavResult<DavHandler> {
        Ok(DavHandler {
            prefix: Arc::new(self.prefix),
            root: self.fs.build()?,
            ls: self.ls.map(|ls| ls.build()),
            allow: self.allow,
            principal: self.principal.map(Arc::new),
            plugins: Arc::new(self.plugins),
        })
    }

    /// Prefix to be stripped off before translating the rest of
    /// the request path to a tree path.
    pub fn strip_prefix(self, prefix: impl Into<String>) -> Self {
        let mut this = self;
        this.prefix = prefix.into();
        this
    }

    /// Set the locksystem to use.
    pub fn locksystem(self, ls: LockSystem) -> Self {
        let mut this = self;
        this.ls = Some(ls);
        this
    }

    /// Which methods to allow (default is all methods).
    pub fn methods(self, allow: DavMethodSet) -> Self {
        let mut this = self;
        this.allow = allow;
        this
    }

    /// Set the name of the "webdav principal". This will be the owner of any created locks.
    pub fn principal(self, principal: impl Into<String>) -> Self {
        let mut this = self;
        this.principal = Some(principal.into());
        this
    }

    /// Append a request hook. Hooks run in the order they were added.
    pub fn plugin(self, plugin: Arc<dyn DavPlugin>) -> Self {
        let mut this = self;
        this.plugins.push(plugin);
        this
    }
}

/// The webdav handler struct.
///
/// The `builder` and `build` methods are used to instantiate a handler.
///
/// The `handle` and `handle_with` methods are the methods that do the actual work.
#[derive(Clone)]
pub struct DavHandler {
    pub(crate) prefix: Arc<String>,
    pub(crate) root: Arc<dyn DavNode>,
    pub(crate) ls: Option<Arc<dyn DavLockSystem>>,
    pub(crate) allow: DavMethodSet,
    pub(crate) principal: Option<Arc<String>>,
    pub(crate) plugins: Arc<Vec<Arc<dyn DavPlugin>>>,
}

// Per-request state: the tree (with its node cache) and the principal,
// both discarded when the request is done.
pub(crate) struct DavContext {
    pub(crate) tree: Tree,
    pub(crate) principal: Option<String>,
}

impl DavHandler {
    /// Return a configuration builder.
    pub fn builder(fs: FileSystem) -> DavBuilder {
        DavBuilder::new(fs)
    }

    /// Handle a webdav request.
    pub async fn handle<ReqBody, ReqData, ReqError>(&self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
    {
        self.handle_inner(req).await
    }

    /// Handle a webdav request, overriding parts of the config.
    ///
    /// For example, the `principal` can be set for this request.
    pub async fn handle_with<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
        prefix: Option<String>,
        principal: Option<String>,
    ) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
    {
        let mut this = self.clone();
        if let Some(prefix) = prefix {
            this.prefix = Arc::new(format!(
                "{}/{}",
                this.prefix.trim_end_matches('/'),
                prefix.trim_start_matches('/')
            ));
        }
        if let Some(principal) = principal {
            this.principal = Some(Arc::new(principal));
        }
        this.handle_inner(req).await
    }
}

impl DavHandler {
    // helper.
    pub(crate) fn path(&self, req: &Request<()>) -> DavPath {
        // This never fails (has been checked before)
        DavPath::from_uri_and_prefix(req.uri(), &self.prefix).unwrap()
    }

    // Every mutating operation calls this before touching the tree.
    // Conflicting locks are reported as `Locked`, never worked around.
    pub(crate) fn check_locks(
        &self,
        req: &Request<()>,
        path: &DavPath,
        deep: bool,
    ) -> DavResult<()> {
        if let Some(ls) = &self.ls {
            let tokens = req
                .headers()
                .typed_get::<davheaders::IfTokens>()
                .map(|t| t.0)
                .unwrap_or_default();
            ls.check(path, deep, &tokens).map_err(|_| DavError::Locked)?;
        }
        Ok(())
    }

    // drain request body and return it as one buffer.
    pub(crate) async fn read_request<ReqBody, ReqData, ReqError>(
        &self,
        body: ReqBody,
        max_size: usize,
    ) -> DavResult<Vec<u8>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let mut data = Vec::new();
        pin_utils::pin_mut!(body);
        while let Some(res) = body.data().await {
            let mut buf = res.map_err(|_| {
                DavError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "UnexpectedEof"))
            })?;
            while buf.has_remaining() {
                if data.len() + buf.remaining() > max_size {
                    return Err(StatusCode::PAYLOAD_TOO_LARGE.into());
                }
                let b = buf.chunk();
                let l = b.len();
                data.extend_from_slice(b);
                buf.advance(l);
            }
        }
        Ok(data)
    }

    // internal dispatcher.
    async fn handle_inner<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
    ) -> Response<Body>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        // Turn any DavError results into a HTTP error response.
        match self.handle2(req).await {
            Ok(resp) => {
                debug!("== END REQUEST result OK");
                resp
            }
            Err(err) => {
                debug!("== END REQUEST result {:?}", err);
                let mut resp = Response::builder().status(err.statuscode());
                if err.must_close() {
                    resp = resp.header("connection", "close");
                }
                // A protocol-level error document; backend diagnostic
                // detail never reaches the client.
                let xml = dav_xml_error(err.condition());
                resp = resp
                    .header("Content-Type", "application/xml; charset=utf-8")
                    .header("Content-Length", xml.len().to_string());
                resp.body(Body::from(xml)).unwrap()
            }
        }
    }

    // internal dispatcher part 2.
    async fn handle2<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
    ) -> DavResult<Response<Body>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let (req, body) = {
            let (parts, body) = req.into_parts();
            (Request::from_parts(parts, ()), body)
        };

        // debug when running the webdav litmus tests.
        if log_enabled!(log::Level::Debug) {
            if let Some(t) = req.headers().typed_get::<davheaders::XLitmus>() {
                debug!("X-Litmus: {:?}", t);
            }
        }

        // translate HTTP method to Webdav method.
        let method = match dav_method(req.method()) {
            Ok(m) => m,
            Err(e) => {
                debug!("refusing method {} request {}", req.method(), req.uri());
                return Err(e);
            }
        };

        // see if method is allowed.
        if !self.allow.contains(method.as_set()) {
            debug!(
                "method {} not allowed on request {}",
                req.method(),
                req.uri()
            );
            return Err(DavError::StatusClose(StatusCode::METHOD_NOT_ALLOWED));
        }

        // make sure the request path is valid.
        let path = DavPath::from_uri_and_prefix(req.uri(), &self.prefix)?;

        // per-request state: the tree cache and the principal.
        let mut ctx = DavContext {
            tree: Tree::new(self.root.clone()),
            principal: self.principal.as_ref().map(|p| p.to_string()),
        };

        // give the hooks a chance to authenticate or fully handle
        // the request before we dispatch it.
        for plugin in self.plugins.iter() {
            match plugin.before(&req, &path).await? {
                PluginAction::Pass => {}
                PluginAction::SetPrincipal(p) => ctx.principal = Some(p),
                PluginAction::Respond(resp) => return Ok(resp),
            }
        }

        // All handlers work on a pre-read body.
        let max_size = match method {
            DavMethod::Put => MAX_PUT_BODY,
            _ => MAX_XML_BODY,
        };
        let body_data = self.read_request(body, max_size).await?;

        // Not all methods accept a body.
        if !DavMethodSet::WEBDAV_BODY.contains(method.as_set()) && !body_data.is_empty() {
            return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE.into());
        }

        debug!("== START REQUEST {:?} {}", method, path);

        let res = match method {
            DavMethod::Options => self.handle_options(&ctx, &req).await,
            DavMethod::PropFind => self.handle_propfind(&ctx, &req, &body_data).await,
            DavMethod::PropPatch => self.handle_proppatch(&ctx, &req, &body_data).await,
            DavMethod::MkCol => self.handle_mkcol(&ctx, &req, &body_data).await,
            DavMethod::Delete => self.handle_delete(&ctx, &req).await,
            DavMethod::Lock => self.handle_lock(&ctx, &req, &body_data).await,
            DavMethod::Unlock => self.handle_unlock(&ctx, &req).await,
            DavMethod::Head | DavMethod::Get => self.handle_get(&ctx, &req).await,
            DavMethod::Copy | DavMethod::Move => self.handle_copymove(&ctx, &req, method).await,
            DavMethod::Put => self.handle_put(&ctx, &req, body_data).await,
        };

        // 405 must advertise what _would_ work on this path.
        let res = match res {
            Err(err) if err.statuscode() == StatusCode::METHOD_NOT_ALLOWED => {
                let mut resp = self.handle_options(&ctx, &req).await?;
                *resp.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
                let xml = dav_xml_error(err.condition());
                let headers = resp.headers_mut();
                headers.remove("dav");
                headers.remove("ms-author-via");
                headers.insert(
                    "content-type",
                    "application/xml; charset=utf-8".parse().unwrap(),
                );
                headers.typed_insert(headers::ContentLength(xml.len() as u64));
                *resp.body_mut() = Body::from(xml);
                Ok(resp)
            }
            res => res,
        };

        let mut resp = res?;
        for plugin in self.plugins.iter() {
            plugin.after(&req, &mut resp).await;
        }
        Ok(resp)
    }
}
