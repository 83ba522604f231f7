//! Request hooks.
//!
//! Plugins are an ordered list of extensions consulted by the
//! dispatcher. A `before` hook runs after the URI has been resolved but
//! before method dispatch; it can wave the request through, bind an
//! authenticated principal to it, or answer it outright (which stops
//! normal processing). An `after` hook may decorate the outgoing
//! response.

use headers::authorization::Basic;
use headers::{Authorization, HeaderMapExt};
use http::{Request, Response, StatusCode};
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};

use crate::body::Body;
use crate::davpath::DavPath;
use crate::errors::DavResult;

/// What a `before` hook decided.
pub enum PluginAction {
    /// Nothing to do; continue with the next hook.
    Pass,
    /// Continue, with this principal bound to the request.
    SetPrincipal(String),
    /// The hook fully handled the request.
    Respond(Response<Body>),
}

pub trait DavPlugin: Send + Sync {
    /// Called before method dispatch.
    fn before<'a>(
        &'a self,
        _req: &'a Request<()>,
        _path: &'a DavPath,
    ) -> BoxFuture<'a, DavResult<PluginAction>> {
        future::ok(PluginAction::Pass).boxed()
    }

    /// Called with the response before it is sent.
    fn after<'a>(
        &'a self,
        _req: &'a Request<()>,
        _res: &'a mut Response<Body>,
    ) -> BoxFuture<'a, ()> {
        future::ready(()).boxed()
    }
}

/// Credential verification backend.
///
/// Returns the principal identifier for valid credentials, `None`
/// otherwise. How credentials are stored (file, database, ...) is the
/// backend's business.
pub trait AuthBackend: Send + Sync {
    fn verify<'a>(&'a self, username: &'a str, password: &'a str)
        -> BoxFuture<'a, Option<String>>;
}

/// HTTP Basic authentication hook.
///
/// Short-circuits dispatch with 401 when credentials are missing or
/// wrong; binds the verified principal otherwise.
pub struct BasicAuthPlugin {
    backend: Arc<dyn AuthBackend>,
    realm: String,
}

impl BasicAuthPlugin {
    pub fn new(backend: Arc<dyn AuthBackend>, realm: impl Into<String>) -> BasicAuthPlugin {
        BasicAuthPlugin {
            backend,
            realm: realm.into(),
        }
    }

    fn challenge(&self) -> Response<Body> {
        Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .header("WWW-Authenticate", format!("Basic realm=\"{}\"", self.realm))
            .header("Content-Length", "0")
            .body(Body::empty())
            .unwrap()
    }
}

impl DavPlugin for BasicAuthPlugin {
    fn before<'a>(
        &'a self,
        req: &'a Request<()>,
        _path: &'a DavPath,
    ) -> BoxFuture<'a, DavResult<PluginAction>> {
        async move {
            let basic = match req.headers().typed_get::<Authorization<Basic>>() {
                Some(Authorization(basic)) => basic,
                None => return Ok(PluginAction::Respond(self.challenge())),
            };
            match self.backend.verify(basic.username(), basic.password()).await {
                Some(principal) => Ok(PluginAction::SetPrincipal(principal)),
                None => {
                    debug!("auth failed for user {}", basic.username());
                    Ok(PluginAction::Respond(self.challenge()))
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OneUser;

    impl AuthBackend for OneUser {
        fn verify<'a>(
            &'a self,
            username: &'a str,
            password: &'a str,
        ) -> BoxFuture<'a, Option<String>> {
            let ok = username == "someuser" && password == "somepass";
            future::ready(ok.then(|| username.to_string())).boxed()
        }
    }

    fn request(auth: Option<&str>) -> Request<()> {
        let mut b = Request::builder().method("GET").uri("/");
        if let Some(a) = auth {
            b = b.header("Authorization", a);
        }
        b.body(()).unwrap()
    }

    #[tokio::test]
    async fn missing_credentials_get_a_challenge() {
        let plugin = BasicAuthPlugin::new(Arc::new(OneUser), "dav");
        let path = DavPath::from_str_and_prefix("/", "").unwrap();
        match plugin.before(&request(None), &path).await.unwrap() {
            PluginAction::Respond(resp) => {
                assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
                let www = resp.headers().get("WWW-Authenticate").unwrap();
                assert_eq!(www, "Basic realm=\"dav\"");
            }
            _ => panic!("expected a challenge"),
        }
    }

    #[tokio::test]
    async fn valid_credentials_bind_the_principal() {
        let plugin = BasicAuthPlugin::new(Arc::new(OneUser), "dav");
        let path = DavPath::from_str_and_prefix("/", "").unwrap();
        // base64("someuser:somepass")
        let req = request(Some("Basic c29tZXVzZXI6c29tZXBhc3M="));
        match plugin.before(&req, &path).await.unwrap() {
            PluginAction::SetPrincipal(p) => assert_eq!(p, "someuser"),
            _ => panic!("expected principal"),
        }
    }

    #[tokio::test]
    async fn wrong_credentials_are_rejected() {
        let plugin = BasicAuthPlugin::new(Arc::new(OneUser), "dav");
        let path = DavPath::from_str_and_prefix("/", "").unwrap();
        // base64("someuser:wrong")
        let req = request(Some("Basic c29tZXVzZXI6d3Jvbmc="));
        assert!(matches!(
            plugin.before(&req, &path).await.unwrap(),
            PluginAction::Respond(_)
        ));
    }
}
