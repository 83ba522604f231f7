//
// COPY and MOVE.
//
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::davhandler::DavContext;
use crate::davheaders;
use crate::davpath::DavPath;
use crate::errors::{DavError, FsError};
use crate::node::DavNode;
use crate::util::DavMethod;
use crate::DavResult;

// Recursive copy of a node into a destination collection. Dead
// properties travel with the node; backends that refuse them do not
// fail the copy.
fn copy_node(
    node: Arc<dyn DavNode>,
    dest: Arc<dyn DavNode>,
    name: String,
    deep: bool,
) -> BoxFuture<'static, DavResult<()>> {
    async move {
        let col = dest.as_collection().ok_or(DavError::Conflict)?;
        if let Some(file) = node.as_file() {
            let data = file.read().await?;
            col.create_file(&name, data).await?;
        } else {
            col.create_directory(&name).await?;
        }
        let new_node = col.get_child(&name).await?;
        for prop in node.dead_props().await? {
            let _ = new_node.set_property(&prop).await;
        }
        if deep && node.is_collection() {
            let src = node.as_collection().ok_or(FsError::GeneralFailure)?;
            for child in src.get_children().await? {
                let child_name = child.name();
                copy_node(child, new_node.clone(), child_name, true).await?;
            }
        }
        Ok(())
    }
    .boxed()
}

impl crate::DavHandler {
    pub(crate) async fn handle_copymove(
        &self,
        ctx: &DavContext,
        req: &Request<()>,
        method: DavMethod,
    ) -> DavResult<Response<Body>> {
        let path = self.path(req);
        let node = ctx.tree.get_node_for_path(&path).await?;

        let dest = req
            .headers()
            .typed_get::<davheaders::Destination>()
            .ok_or(DavError::BadRequest)?;
        // A destination outside our prefix is another server's problem.
        let dest_path = DavPath::from_str_and_prefix(&dest.0, &self.prefix)
            .map_err(|_| DavError::Status(StatusCode::BAD_GATEWAY))?;

        if dest_path.as_url_string() == path.as_url_string() {
            return Err(DavError::Forbidden);
        }
        if is_below(&dest_path, &path) {
            // Cannot copy or move a collection into itself.
            return Err(DavError::Forbidden);
        }

        let overwrite = req
            .headers()
            .typed_get::<davheaders::Overwrite>()
            .map(|o| o.0)
            .unwrap_or(true);
        let deep = match req.headers().typed_get::<davheaders::Depth>() {
            Some(davheaders::Depth::Zero) => false,
            Some(davheaders::Depth::One) => return Err(DavError::BadRequest),
            _ => true,
        };

        let dest_parent = ctx
            .tree
            .get_node_for_path(&dest_path.parent())
            .await
            .map_err(|_| DavError::Conflict)?;
        if dest_parent.as_collection().is_none() {
            return Err(DavError::Conflict);
        }

        if method == DavMethod::Move {
            self.check_locks(req, &path, true)?;
        }
        self.check_locks(req, &dest_path, true)?;

        let existed = match ctx.tree.get_node_for_path(&dest_path).await {
            Ok(existing) => {
                if !overwrite {
                    return Err(DavError::Status(StatusCode::PRECONDITION_FAILED));
                }
                existing.delete().await?;
                ctx.tree.flush(&dest_path);
                if let Some(ls) = &self.ls {
                    let _ = ls.delete(&dest_path);
                }
                true
            }
            Err(DavError::NotFound) => false,
            Err(e) => return Err(e),
        };

        let same_parent = path.parent().as_url_string() == dest_path.parent().as_url_string();
        if method == DavMethod::Move && same_parent {
            // A rename within one collection goes through the one
            // rename primitive.
            node.set_name(dest_path.file_name()).await?;
        } else {
            copy_node(node.clone(), dest_parent, dest_path.file_name().to_string(), deep)
                .await?;
            if method == DavMethod::Move {
                node.delete().await?;
            }
        }

        if method == DavMethod::Move {
            ctx.tree.flush(&path);
            if let Some(ls) = &self.ls {
                let _ = ls.delete(&path);
            }
        }
        ctx.tree.flush(&dest_path);

        let status = if existed {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::CREATED
        };
        let resp = Response::builder()
            .status(status)
            .header("Content-Length", "0")
            .body(Body::empty())
            .unwrap();
        Ok(resp)
    }
}

fn is_below(path: &DavPath, ancestor: &DavPath) -> bool {
    let path = path.as_url_string();
    let ancestor = ancestor.as_url_string();
    // Everything except the root itself is below the root.
    if ancestor == "/" {
        return path != "/";
    }
    path.strip_prefix(&ancestor)
        .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
#[cfg(feature = "memfs")]
mod tests {
    use super::is_below;
    use crate::body::Body;
    use crate::davhandler::FileSystem;
    use crate::davpath::DavPath;
    use crate::DavHandler;
    use http::{Request, StatusCode};

    fn p(s: &str) -> DavPath {
        DavPath::from_str_and_prefix(s, "").unwrap()
    }

    #[test]
    fn below_detection() {
        assert!(is_below(&p("/sub"), &p("/")));
        assert!(is_below(&p("/a/b"), &p("/a")));
        assert!(!is_below(&p("/"), &p("/")));
        assert!(!is_below(&p("/a"), &p("/a/b")));
        // prefix of the name, not an ancestor
        assert!(!is_below(&p("/ab"), &p("/a")));
    }

    #[tokio::test]
    async fn copy_of_root_into_own_subtree_is_refused() {
        let dav = DavHandler::builder(FileSystem::Mem).build().unwrap();

        let req = Request::builder()
            .method("PUT")
            .uri("/test.txt")
            .body(Body::from("x"))
            .unwrap();
        assert_eq!(dav.handle(req).await.status(), StatusCode::CREATED);

        // The destination is inside the source; this must be refused,
        // not attempted.
        let req = Request::builder()
            .method("COPY")
            .uri("/")
            .header("Destination", "/sub")
            .body(Body::empty())
            .unwrap();
        assert_eq!(dav.handle(req).await.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn copy_dir_into_own_subtree_is_refused() {
        let dav = DavHandler::builder(FileSystem::Mem).build().unwrap();

        let req = Request::builder()
            .method("MKCOL")
            .uri("/dir")
            .body(Body::empty())
            .unwrap();
        assert_eq!(dav.handle(req).await.status(), StatusCode::CREATED);

        let req = Request::builder()
            .method("COPY")
            .uri("/dir")
            .header("Destination", "/dir/inner")
            .body(Body::empty())
            .unwrap();
        assert_eq!(dav.handle(req).await.status(), StatusCode::FORBIDDEN);
    }
}
