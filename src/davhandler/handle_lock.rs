//
// LOCK (create and refresh) and UNLOCK.
//
use bytes::Bytes;
use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use xmltree::{Element, XMLNode};

use crate::body::Body;
use crate::davhandler::handle_props::dav_element;
use crate::davhandler::DavContext;
use crate::davheaders;
use crate::errors::DavError;
use crate::ls::{DavLock, LockScope};
use crate::multistatus::render_dav_document;
use crate::props;
use crate::DavResult;

/// The `activelock` element describing one lock, as used in
/// LOCK responses and `lockdiscovery` property values.
pub(crate) fn activelock_element(lock: &DavLock) -> Element {
    let mut active = dav_element("activelock");

    let mut locktype = dav_element("locktype");
    locktype.children.push(XMLNode::Element(dav_element("write")));
    active.children.push(XMLNode::Element(locktype));

    let mut lockscope = dav_element("lockscope");
    let scope = match lock.scope {
        LockScope::Exclusive => "exclusive",
        LockScope::Shared => "shared",
    };
    lockscope.children.push(XMLNode::Element(dav_element(scope)));
    active.children.push(XMLNode::Element(lockscope));

    let mut depth = dav_element("depth");
    let d = if lock.deep { "infinity" } else { "0" };
    depth.children.push(XMLNode::Text(d.to_string()));
    active.children.push(XMLNode::Element(depth));

    if let Some(owner) = &lock.owner {
        active.children.push(XMLNode::Element(owner.clone()));
    }

    let mut timeout = dav_element("timeout");
    let t = match lock.deadline.and_then(|d| d.duration_since(std::time::SystemTime::now()).ok()) {
        Some(left) => format!("Second-{}", left.as_secs()),
        None => "Infinite".to_string(),
    };
    timeout.children.push(XMLNode::Text(t));
    active.children.push(XMLNode::Element(timeout));

    let mut locktoken = dav_element("locktoken");
    let mut href = dav_element("href");
    href.children.push(XMLNode::Text(lock.token.clone()));
    locktoken.children.push(XMLNode::Element(href));
    active.children.push(XMLNode::Element(locktoken));

    let mut lockroot = dav_element("lockroot");
    let mut href = dav_element("href");
    href.children.push(XMLNode::Text(lock.path.clone()));
    lockroot.children.push(XMLNode::Element(href));
    active.children.push(XMLNode::Element(lockroot));

    active
}

fn lock_response(lock: &DavLock, status: StatusCode) -> DavResult<Response<Body>> {
    let mut discovery = dav_element("lockdiscovery");
    discovery
        .children
        .push(XMLNode::Element(activelock_element(lock)));
    let buf = render_dav_document("prop", &[discovery])?;

    let resp = Response::builder()
        .status(status)
        .header("Content-Type", "application/xml; charset=utf-8")
        .header("Content-Length", buf.len().to_string())
        .header("Lock-Token", format!("<{}>", lock.token))
        .body(Body::from(buf))
        .unwrap();
    Ok(resp)
}

impl crate::DavHandler {
    pub(crate) async fn handle_lock(
        &self,
        ctx: &DavContext,
        req: &Request<()>,
        body: &[u8],
    ) -> DavResult<Response<Body>> {
        let ls = self.ls.as_ref().ok_or(DavError::MethodNotAllowed)?;
        let path = self.path(req);

        let timeout = req
            .headers()
            .typed_get::<davheaders::DavTimeout>()
            .and_then(|t| t.as_duration());

        if body.is_empty() {
            // Refresh of an existing lock; the token comes from `If`.
            let tokens = req
                .headers()
                .typed_get::<davheaders::IfTokens>()
                .map(|t| t.0)
                .unwrap_or_default();
            let token = tokens.first().ok_or(DavError::BadRequest)?;
            let lock = ls
                .refresh(&path, token, timeout)
                .map_err(|_| DavError::Status(StatusCode::PRECONDITION_FAILED))?;
            return lock_response(&lock, StatusCode::OK);
        }

        let lockinfo = props::parse_lockinfo(body)?;
        let scope = if lockinfo.shared {
            LockScope::Shared
        } else {
            LockScope::Exclusive
        };
        let deep = match req.headers().typed_get::<davheaders::Depth>() {
            Some(davheaders::Depth::Zero) => false,
            Some(davheaders::Depth::One) => return Err(DavError::BadRequest),
            _ => true,
        };

        let lock = ls
            .lock(
                &path,
                ctx.principal.as_deref(),
                lockinfo.owner.as_ref(),
                timeout,
                scope,
                deep,
            )
            .map_err(|_| DavError::Locked)?;

        // Locking an unmapped URL creates an empty resource.
        let mut status = StatusCode::OK;
        if !ctx.tree.node_exists(&path).await {
            let created = async {
                let parent = ctx
                    .tree
                    .get_node_for_path(&path.parent())
                    .await
                    .map_err(|_| DavError::Conflict)?;
                let col = parent.as_collection().ok_or(DavError::Conflict)?;
                col.create_file(path.file_name(), Bytes::new()).await?;
                Ok::<_, DavError>(())
            }
            .await;
            if let Err(e) = created {
                let _ = ls.unlock(&path, &lock.token);
                return Err(e);
            }
            ctx.tree.flush(&path.parent());
            status = StatusCode::CREATED;
        }

        lock_response(&lock, status)
    }

    pub(crate) async fn handle_unlock(
        &self,
        _ctx: &DavContext,
        req: &Request<()>,
    ) -> DavResult<Response<Body>> {
        let ls = self.ls.as_ref().ok_or(DavError::MethodNotAllowed)?;
        let path = self.path(req);

        let token = req
            .headers()
            .typed_get::<davheaders::LockToken>()
            .ok_or(DavError::BadRequest)?;

        ls.unlock(&path, &token.0).map_err(|_| DavError::BadLockToken)?;

        let resp = Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header("Content-Length", "0")
            .body(Body::empty())
            .unwrap();
        Ok(resp)
    }
}
