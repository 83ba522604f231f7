//
// LOCK/UNLOCK behavior through the full handler.
//
use futures_util::StreamExt;
use http::{Request, Response, StatusCode};

use dav_core::body::Body;
use dav_core::{DavHandler, FileSystem, LockSystem};

const LOCKINFO_EXCLUSIVE: &str = r#"<?xml version="1.0"?>
    <lockinfo xmlns="DAV:">
      <lockscope><exclusive/></lockscope>
      <locktype><write/></locktype>
      <owner>test-suite</owner>
    </lockinfo>"#;

const LOCKINFO_SHARED: &str = r#"<?xml version="1.0"?>
    <lockinfo xmlns="DAV:">
      <lockscope><shared/></lockscope>
      <locktype><write/></locktype>
    </lockinfo>"#;

async fn setup() -> DavHandler {
    let _ = env_logger::builder().is_test(true).try_init();
    let dav = DavHandler::builder(FileSystem::Mem)
        .locksystem(LockSystem::Mem)
        .build()
        .unwrap();
    let req = Request::builder()
        .method("PUT")
        .uri("/test.txt")
        .body(Body::from("Test contents"))
        .unwrap();
    assert_eq!(dav.handle(req).await.status(), StatusCode::CREATED);
    dav
}

async fn body_string(res: Response<Body>) -> String {
    let mut body = res.into_body();
    let mut out = Vec::new();
    while let Some(chunk) = body.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    String::from_utf8(out).unwrap()
}

fn lock_token(res: &Response<Body>) -> String {
    let token = res.headers().get("lock-token").unwrap().to_str().unwrap();
    token
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_string()
}

async fn lock(dav: &DavHandler, uri: &str, body: &str) -> Response<Body> {
    let req = Request::builder()
        .method("LOCK")
        .uri(uri)
        .header("Content-Type", "application/xml")
        .body(Body::from(body))
        .unwrap();
    dav.handle(req).await
}

#[tokio::test]
async fn lock_existing_resource() {
    let dav = setup().await;
    let res = lock(&dav, "/test.txt", LOCKINFO_EXCLUSIVE).await;
    assert_eq!(res.status(), StatusCode::OK);
    let token = lock_token(&res);
    assert!(token.starts_with("urn:uuid:"));
    let body = body_string(res).await;
    assert!(body.contains("lockdiscovery"));
    assert!(body.contains(&token));
    assert!(body.contains("exclusive"));
}

#[tokio::test]
async fn lock_unmapped_url_creates_empty_resource() {
    let dav = setup().await;
    let res = lock(&dav, "/locknull.txt", LOCKINFO_EXCLUSIVE).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let token = lock_token(&res);

    let req = Request::builder()
        .method("GET")
        .uri("/locknull.txt")
        .body(Body::empty())
        .unwrap();
    let res = dav.handle(req).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers().get("content-length").unwrap(), "0");

    let req = Request::builder()
        .method("UNLOCK")
        .uri("/locknull.txt")
        .header("Lock-Token", format!("<{token}>"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(dav.handle(req).await.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn exclusive_locks_conflict() {
    let dav = setup().await;
    assert_eq!(
        lock(&dav, "/test.txt", LOCKINFO_EXCLUSIVE).await.status(),
        StatusCode::OK
    );
    let res = lock(&dav, "/test.txt", LOCKINFO_EXCLUSIVE).await;
    assert_eq!(res.status(), StatusCode::LOCKED);
    assert!(body_string(res).await.contains("lock-token-submitted"));
}

#[tokio::test]
async fn shared_locks_coexist() {
    let dav = setup().await;
    assert_eq!(
        lock(&dav, "/test.txt", LOCKINFO_SHARED).await.status(),
        StatusCode::OK
    );
    assert_eq!(
        lock(&dav, "/test.txt", LOCKINFO_SHARED).await.status(),
        StatusCode::OK
    );
    // but an exclusive one does not join in
    assert_eq!(
        lock(&dav, "/test.txt", LOCKINFO_EXCLUSIVE).await.status(),
        StatusCode::LOCKED
    );
}

#[tokio::test]
async fn mutation_needs_the_lock_token() {
    let dav = setup().await;
    let res = lock(&dav, "/test.txt", LOCKINFO_EXCLUSIVE).await;
    let token = lock_token(&res);

    let req = Request::builder()
        .method("PUT")
        .uri("/test.txt")
        .body(Body::from("changed"))
        .unwrap();
    let res = dav.handle(req).await;
    assert_eq!(res.status(), StatusCode::LOCKED);
    assert!(body_string(res).await.contains("lock-token-submitted"));

    let req = Request::builder()
        .method("PUT")
        .uri("/test.txt")
        .header("If", format!("(<{token}>)"))
        .body(Body::from("changed"))
        .unwrap();
    assert_eq!(dav.handle(req).await.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn deep_lock_covers_descendants() {
    let dav = setup().await;
    let req = Request::builder()
        .method("MKCOL")
        .uri("/dir")
        .body(Body::empty())
        .unwrap();
    assert_eq!(dav.handle(req).await.status(), StatusCode::CREATED);
    let res = lock(&dav, "/dir", LOCKINFO_EXCLUSIVE).await;
    assert_eq!(res.status(), StatusCode::OK);
    let token = lock_token(&res);

    // a descendant is covered by the deep lock
    let req = Request::builder()
        .method("PUT")
        .uri("/dir/file.txt")
        .body(Body::from("x"))
        .unwrap();
    assert_eq!(dav.handle(req).await.status(), StatusCode::LOCKED);

    let req = Request::builder()
        .method("PUT")
        .uri("/dir/file.txt")
        .header("If", format!("(<{token}>)"))
        .body(Body::from("x"))
        .unwrap();
    assert_eq!(dav.handle(req).await.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn unlock_needs_a_matching_token() {
    let dav = setup().await;
    let res = lock(&dav, "/test.txt", LOCKINFO_EXCLUSIVE).await;
    let token = lock_token(&res);

    let req = Request::builder()
        .method("UNLOCK")
        .uri("/test.txt")
        .header("Lock-Token", "<urn:uuid:not-that-one>")
        .body(Body::empty())
        .unwrap();
    let res = dav.handle(req).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert!(body_string(res).await.contains("lock-token-matches-request-uri"));

    let req = Request::builder()
        .method("UNLOCK")
        .uri("/test.txt")
        .header("Lock-Token", format!("<{token}>"))
        .body(Body::empty())
        .unwrap();
    assert_eq!(dav.handle(req).await.status(), StatusCode::NO_CONTENT);

    // the path is writable again
    let req = Request::builder()
        .method("PUT")
        .uri("/test.txt")
        .body(Body::from("free"))
        .unwrap();
    assert_eq!(dav.handle(req).await.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn lock_refresh() {
    let dav = setup().await;
    let res = lock(&dav, "/test.txt", LOCKINFO_EXCLUSIVE).await;
    let token = lock_token(&res);

    let req = Request::builder()
        .method("LOCK")
        .uri("/test.txt")
        .header("If", format!("(<{token}>)"))
        .header("Timeout", "Second-3600")
        .body(Body::empty())
        .unwrap();
    let res = dav.handle(req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_string(res).await;
    assert!(body.contains(&token));
    assert!(body.contains("Second-"));
}

#[tokio::test]
async fn propfind_reports_lockdiscovery() {
    let dav = setup().await;
    let res = lock(&dav, "/test.txt", LOCKINFO_EXCLUSIVE).await;
    let token = lock_token(&res);

    let body = r#"<?xml version="1.0"?>
        <propfind xmlns="DAV:"><prop><lockdiscovery/></prop></propfind>"#;
    let req = Request::builder()
        .method("PROPFIND")
        .uri("/test.txt")
        .header("Depth", "0")
        .header("Content-Type", "application/xml")
        .body(Body::from(body))
        .unwrap();
    let res = dav.handle(req).await;
    assert_eq!(res.status(), StatusCode::MULTI_STATUS);
    let body = body_string(res).await;
    assert!(body.contains("activelock"));
    assert!(body.contains(&token));
}
