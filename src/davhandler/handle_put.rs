use bytes::Bytes;
use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::davhandler::DavContext;
use crate::errors::DavError;
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_put(
        &self,
        ctx: &DavContext,
        req: &Request<()>,
        data: Vec<u8>,
    ) -> DavResult<Response<Body>> {
        let path = self.path(req);
        if path.is_collection() {
            // "PUT /dir/" can never create a file.
            return Err(DavError::MethodNotAllowed);
        }

        let parent = ctx
            .tree
            .get_node_for_path(&path.parent())
            .await
            .map_err(|_| DavError::Conflict)?;
        let parent = parent.as_collection().ok_or(DavError::Conflict)?;

        self.check_locks(req, &path, false)?;

        let data = Bytes::from(data);
        let (status, etag) = match ctx.tree.get_node_for_path(&path).await {
            Ok(node) => {
                let file = node.as_file().ok_or(DavError::MethodNotAllowed)?;
                let etag = file.put(data).await?;
                (StatusCode::NO_CONTENT, etag)
            }
            Err(DavError::NotFound) => {
                let etag = parent.create_file(path.file_name(), data).await?;
                (StatusCode::CREATED, etag)
            }
            Err(e) => return Err(e),
        };
        ctx.tree.flush(&path);

        let mut res = Response::builder()
            .status(status)
            .header("Content-Length", "0");
        if let Some(etag) = etag {
            res = res.header("ETag", etag);
        }
        Ok(res.body(Body::empty()).unwrap())
    }
}
