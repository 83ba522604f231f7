use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::davhandler::DavContext;
use crate::errors::FsError;
use crate::util::systemtime_to_httpdate;
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_get(
        &self,
        ctx: &DavContext,
        req: &Request<()>,
    ) -> DavResult<Response<Body>> {
        let head = req.method() == &http::Method::HEAD;
        let path = self.path(req);
        let node = ctx.tree.get_node_for_path(&path).await?;

        // No directory indexes.
        let file = node.as_file().ok_or(FsError::NotImplemented)?;

        let len = file.content_length().await?;
        let etag = file.etag().await?;
        let modified = node.last_modified().await.ok();

        // Conditional GET. If-None-Match takes precedence over
        // If-Modified-Since.
        let not_modified = if let Some(inm) = req.headers().typed_get::<headers::IfNoneMatch>() {
            match etag.as_deref().and_then(|t| t.parse::<headers::ETag>().ok()) {
                Some(t) => !inm.precondition_passes(&t),
                None => false,
            }
        } else {
            match (req.headers().typed_get::<headers::IfModifiedSince>(), modified) {
                (Some(ims), Some(m)) => !ims.is_modified(m),
                _ => false,
            }
        };
        if not_modified {
            let mut res = Response::builder().status(StatusCode::NOT_MODIFIED);
            if let Some(etag) = etag {
                res = res.header("ETag", etag);
            }
            return Ok(res.body(Body::empty()).unwrap());
        }

        let mut res = Response::builder().status(StatusCode::OK);
        res = res.header("Content-Length", len.to_string());
        if let Some(etag) = etag {
            res = res.header("ETag", etag);
        }
        if let Some(modified) = modified {
            res = res.header("Last-Modified", systemtime_to_httpdate(modified));
        }
        let ctype = mime_guess::from_path(path.file_name()).first_or_octet_stream();
        res = res.header("Content-Type", ctype.as_ref());
        res = res.header("Accept-Ranges", "none");

        if head {
            return Ok(res.body(Body::empty()).unwrap());
        }
        let data = file.read().await?;
        Ok(res.body(Body::from(data)).unwrap())
    }
}

#[cfg(test)]
#[cfg(feature = "memfs")]
mod tests {
    use crate::body::Body;
    use crate::davhandler::FileSystem;
    use crate::DavHandler;
    use http::{Request, StatusCode};

    #[tokio::test]
    async fn get_serves_content_type_and_etag() {
        let dav = DavHandler::builder(FileSystem::Mem).build().unwrap();

        let req = Request::builder()
            .method("PUT")
            .uri("/hello.txt")
            .body(Body::from("hello"))
            .unwrap();
        assert_eq!(dav.handle(req).await.status(), StatusCode::CREATED);

        let req = Request::builder()
            .method("GET")
            .uri("/hello.txt")
            .body(Body::empty())
            .unwrap();
        let res = dav.handle(req).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get("content-length").unwrap(), "5");
        assert!(res
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        assert!(res.headers().get("etag").is_some());
    }

    #[tokio::test]
    async fn conditional_get_on_etag() {
        let dav = DavHandler::builder(FileSystem::Mem).build().unwrap();

        let req = Request::builder()
            .method("PUT")
            .uri("/hello.txt")
            .body(Body::from("hello"))
            .unwrap();
        let res = dav.handle(req).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let etag = res
            .headers()
            .get("etag")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        // a current validator short-circuits to 304, without a body
        let req = Request::builder()
            .method("GET")
            .uri("/hello.txt")
            .header("If-None-Match", &etag)
            .body(Body::empty())
            .unwrap();
        let res = dav.handle(req).await;
        assert_eq!(res.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(res.headers().get("etag").unwrap().to_str().unwrap(), etag);

        // a stale validator still gets the payload
        let req = Request::builder()
            .method("GET")
            .uri("/hello.txt")
            .header("If-None-Match", "\"stale\"")
            .body(Body::empty())
            .unwrap();
        let res = dav.handle(req).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get("content-length").unwrap(), "5");
    }

    #[tokio::test]
    async fn conditional_get_on_modification_date() {
        let dav = DavHandler::builder(FileSystem::Mem).build().unwrap();

        let req = Request::builder()
            .method("PUT")
            .uri("/hello.txt")
            .body(Body::from("hello"))
            .unwrap();
        assert_eq!(dav.handle(req).await.status(), StatusCode::CREATED);

        let req = Request::builder()
            .method("GET")
            .uri("/hello.txt")
            .body(Body::empty())
            .unwrap();
        let res = dav.handle(req).await;
        let modified = res
            .headers()
            .get("last-modified")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();

        let req = Request::builder()
            .method("GET")
            .uri("/hello.txt")
            .header("If-Modified-Since", &modified)
            .body(Body::empty())
            .unwrap();
        let res = dav.handle(req).await;
        assert_eq!(res.status(), StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn get_on_missing_file_is_404() {
        let dav = DavHandler::builder(FileSystem::Mem).build().unwrap();
        let req = Request::builder()
            .method("GET")
            .uri("/nope")
            .body(Body::empty())
            .unwrap();
        assert_eq!(dav.handle(req).await.status(), StatusCode::NOT_FOUND);
    }
}
