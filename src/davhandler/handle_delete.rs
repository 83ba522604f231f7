use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::davhandler::DavContext;
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_delete(
        &self,
        ctx: &DavContext,
        req: &Request<()>,
    ) -> DavResult<Response<Body>> {
        let mut path = self.path(req);
        let node = ctx.tree.get_node_for_path(&path).await?;
        if node.is_collection() {
            path.add_slash();
        }

        // Deleting a collection touches everything below it.
        self.check_locks(req, &path, true)?;

        node.delete().await?;
        ctx.tree.flush(&path);

        // The resource is gone; so are its locks.
        if let Some(ls) = &self.ls {
            let _ = ls.delete(&path);
        }

        let resp = Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header("Content-Length", "0")
            .body(Body::empty())
            .unwrap();
        Ok(resp)
    }
}
