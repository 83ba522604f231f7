//
// MKCOL, plain (RFC4918) and with an extended request body (RFC5689).
//
use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::davhandler::DavContext;
use crate::errors::{DavError, FsError};
use crate::multistatus::{MultiStatus, PropStatBuilder};
use crate::props;
use crate::DavResult;

// Is the declared content type an XML media type?
fn is_xml_content_type(req: &Request<()>) -> bool {
    let ct = match req.headers().get("content-type") {
        Some(ct) => match ct.to_str() {
            Ok(ct) => ct,
            Err(_) => return false,
        },
        None => return false,
    };
    let mediatype = ct.split(';').next().unwrap_or("").trim();
    mediatype.eq_ignore_ascii_case("application/xml")
        || mediatype.eq_ignore_ascii_case("text/xml")
        || mediatype.to_ascii_lowercase().ends_with("+xml")
}

impl crate::DavHandler {
    pub(crate) async fn handle_mkcol(
        &self,
        ctx: &DavContext,
        req: &Request<()>,
        body: &[u8],
    ) -> DavResult<Response<Body>> {
        let mut path = self.path(req);
        path.add_slash();

        // The parent must exist and be a collection.
        let parent = ctx
            .tree
            .get_node_for_path(&path.parent())
            .await
            .map_err(|_| DavError::Conflict)?;
        let parent = parent.as_collection().ok_or(DavError::Conflict)?;

        // The target must not.
        if ctx.tree.node_exists(&path).await {
            return Err(DavError::MethodNotAllowed);
        }

        // An extended-mkcol body must declare an XML content type.
        let mut extra_props = Vec::new();
        if !body.is_empty() {
            if !is_xml_content_type(req) {
                return Err(DavError::UnsupportedMediaType);
            }
            let mut set = props::parse_mkcol(body)?;
            let rt = set.take_dav("resourcetype").ok_or(DavError::BadRequest)?;
            if !props::resourcetype_is_collection(&rt) {
                return Err(DavError::InvalidResourceType);
            }
            extra_props = set.into_iter().collect();
        }

        self.check_locks(req, &path, false)?;

        match parent.create_directory(path.file_name()).await {
            Ok(()) => {}
            // Lost the race; same answer as the exists check above.
            Err(FsError::Exists) => return Err(DavError::MethodNotAllowed),
            Err(e) => return Err(e.into()),
        }
        ctx.tree.flush(&path.parent());

        if extra_props.is_empty() {
            let resp = Response::builder()
                .status(StatusCode::CREATED)
                .header("Content-Length", "0")
                .body(Body::empty())
                .unwrap();
            return Ok(resp);
        }

        // Extra properties are applied after the fact; the collection is
        // committed even when every one of them fails.
        let node = ctx.tree.get_node_for_path(&path).await?;
        let mut propstat = PropStatBuilder::new();
        for prop in extra_props {
            let status = match node.set_property(&prop).await {
                Ok(()) => StatusCode::OK,
                Err(FsError::Forbidden) | Err(FsError::NotImplemented) => StatusCode::FORBIDDEN,
                Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            // Report names only, not values.
            let mut prop = prop;
            prop.children.clear();
            propstat.add(status, prop);
        }

        let mut ms = MultiStatus::new()?;
        ms.add_response(&path.as_href(), propstat.build())?;
        ms.close()
    }
}
