//
// PROPFIND and PROPPATCH.
//
use std::sync::Arc;

use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use xmltree::{Element, XMLNode};

use crate::body::Body;
use crate::davhandler::DavContext;
use crate::davheaders;
use crate::davpath::DavPath;
use crate::errors::{DavError, FsError};
use crate::multistatus::{MultiStatus, PropStatBuilder};
use crate::node::DavNode;
use crate::props::{self, PatchItem, PropfindType, QName, NS_DAV};
use crate::util::{systemtime_to_httpdate, systemtime_to_rfc3339};
use crate::DavResult;

// Live properties computed from node state. They cannot be written.
const LIVE_PROPS: &[&str] = &[
    "creationdate",
    "displayname",
    "getcontentlength",
    "getetag",
    "getlastmodified",
    "resourcetype",
    "lockdiscovery",
    "supportedlock",
];

pub(crate) fn dav_element(name: &str) -> Element {
    let mut e = Element::new(name);
    e.namespace = Some(NS_DAV.to_string());
    e
}

fn dav_text_element(name: &str, text: String) -> Element {
    let mut e = dav_element(name);
    e.children.push(XMLNode::Text(text));
    e
}

fn supportedlock_element() -> Element {
    let mut supported = dav_element("supportedlock");
    for scope in ["exclusive", "shared"] {
        let mut entry = dav_element("lockentry");
        let mut lockscope = dav_element("lockscope");
        lockscope.children.push(XMLNode::Element(dav_element(scope)));
        let mut locktype = dav_element("locktype");
        locktype.children.push(XMLNode::Element(dav_element("write")));
        entry.children.push(XMLNode::Element(lockscope));
        entry.children.push(XMLNode::Element(locktype));
        supported.children.push(XMLNode::Element(entry));
    }
    supported
}

// Strip a property element down to its name for status reporting.
fn name_only(e: &Element) -> Element {
    let mut e = e.clone();
    e.children.clear();
    e.attributes.clear();
    e
}

impl crate::DavHandler {
    // Value of one live property for a node, `None` when it does not
    // apply (e.g. getcontentlength on a collection).
    async fn live_prop(
        &self,
        node: &Arc<dyn DavNode>,
        path: &DavPath,
        name: &str,
    ) -> DavResult<Option<Element>> {
        let elem = match name {
            "creationdate" => {
                let t = node.created().await?;
                Some(dav_text_element("creationdate", systemtime_to_rfc3339(t)))
            }
            "displayname" => {
                let name = node.name();
                if name.is_empty() {
                    None
                } else {
                    Some(dav_text_element("displayname", name))
                }
            }
            "getcontentlength" => match node.as_file() {
                Some(file) => {
                    let len = file.content_length().await?;
                    Some(dav_text_element("getcontentlength", len.to_string()))
                }
                None => None,
            },
            "getetag" => match node.as_file() {
                Some(file) => file
                    .etag()
                    .await?
                    .map(|etag| dav_text_element("getetag", etag)),
                None => None,
            },
            "getlastmodified" => {
                let t = node.last_modified().await?;
                Some(dav_text_element(
                    "getlastmodified",
                    systemtime_to_httpdate(t),
                ))
            }
            "resourcetype" => {
                let mut e = dav_element("resourcetype");
                if node.is_collection() {
                    e.children.push(XMLNode::Element(dav_element("collection")));
                }
                Some(e)
            }
            "lockdiscovery" => match &self.ls {
                Some(ls) => {
                    let mut e = dav_element("lockdiscovery");
                    for lock in ls.discover(path) {
                        e.children.push(XMLNode::Element(
                            crate::davhandler::handle_lock::activelock_element(&lock),
                        ));
                    }
                    Some(e)
                }
                None => None,
            },
            "supportedlock" => self.ls.as_ref().map(|_| supportedlock_element()),
            _ => None,
        };
        Ok(elem)
    }

    // The propstat groups for one node.
    async fn propfind_node(
        &self,
        node: &Arc<dyn DavNode>,
        path: &DavPath,
        pftype: &PropfindType,
    ) -> DavResult<PropStatBuilder> {
        let mut propstat = PropStatBuilder::new();
        match pftype {
            PropfindType::PropName => {
                for name in LIVE_PROPS {
                    if self.live_prop(node, path, name).await?.is_some() {
                        propstat.add(StatusCode::OK, dav_element(name));
                    }
                }
                for prop in node.dead_props().await? {
                    propstat.add(StatusCode::OK, name_only(&prop));
                }
            }
            PropfindType::AllProp => {
                for name in LIVE_PROPS {
                    if let Some(elem) = self.live_prop(node, path, name).await? {
                        propstat.add(StatusCode::OK, elem);
                    }
                }
                for prop in node.dead_props().await? {
                    propstat.add(StatusCode::OK, prop);
                }
            }
            PropfindType::Prop(names) => {
                for qn in names {
                    if qn.ns.as_deref() == Some(NS_DAV)
                        && LIVE_PROPS.contains(&qn.name.as_str())
                    {
                        match self.live_prop(node, path, &qn.name).await? {
                            Some(elem) => propstat.add(StatusCode::OK, elem),
                            None => propstat.add(StatusCode::NOT_FOUND, dav_element(&qn.name)),
                        }
                        continue;
                    }
                    let found = node.get_property(qn.ns.as_deref(), &qn.name).await?;
                    let mut missing = Element::new(&qn.name);
                    missing.namespace = qn.ns.clone();
                    match found {
                        Some(elem) => propstat.add(StatusCode::OK, elem),
                        None => propstat.add(StatusCode::NOT_FOUND, missing),
                    }
                }
            }
        }
        Ok(propstat)
    }

    pub(crate) async fn handle_propfind(
        &self,
        ctx: &DavContext,
        req: &Request<()>,
        body: &[u8],
    ) -> DavResult<Response<Body>> {
        let mut path = self.path(req);
        let node = ctx.tree.get_node_for_path(&path).await?;
        if node.is_collection() {
            path.add_slash();
        }
        let pftype = props::parse_propfind(body)?;

        // Unbounded-depth PROPFIND on a large tree is a denial of
        // service, so it is refused outright (RFC4918 14.4 allows this).
        let depth = match req.headers().typed_get::<davheaders::Depth>() {
            Some(davheaders::Depth::Infinity) => {
                return Err(DavError::Forbidden);
            }
            Some(d) => d,
            None => davheaders::Depth::One,
        };

        let mut ms = MultiStatus::new()?;
        let propstat = self.propfind_node(&node, &path, &pftype).await?;
        ms.add_response(&path.as_href(), propstat.build())?;

        if depth == davheaders::Depth::One {
            if let Some(col) = node.as_collection() {
                for child in col.get_children().await? {
                    let mut child_path = path.child(&child.name());
                    if child.is_collection() {
                        child_path.add_slash();
                    }
                    let propstat = self.propfind_node(&child, &child_path, &pftype).await?;
                    ms.add_response(&child_path.as_href(), propstat.build())?;
                }
            }
        }
        ms.close()
    }

    pub(crate) async fn handle_proppatch(
        &self,
        ctx: &DavContext,
        req: &Request<()>,
        body: &[u8],
    ) -> DavResult<Response<Body>> {
        let mut path = self.path(req);
        let node = ctx.tree.get_node_for_path(&path).await?;
        if node.is_collection() {
            path.add_slash();
        }

        self.check_locks(req, &path, false)?;

        let items = props::parse_propertyupdate(body)?;

        // Live properties are protected. When any instruction is
        // invalid nothing is applied: the invalid ones report 403 and
        // the rest 424 (RFC4918 atomicity).
        let is_protected = |qn: &QName| {
            qn.ns.as_deref() == Some(NS_DAV) && LIVE_PROPS.contains(&qn.name.as_str())
        };
        let any_protected = items.iter().any(|item| match item {
            PatchItem::Set(e) => is_protected(&QName::of_element(e)),
            PatchItem::Remove(qn) => is_protected(qn),
        });

        let mut propstat = PropStatBuilder::new();
        if any_protected {
            for item in &items {
                let (qn, elem) = match item {
                    PatchItem::Set(e) => (QName::of_element(e), name_only(e)),
                    PatchItem::Remove(qn) => {
                        let mut e = Element::new(&qn.name);
                        e.namespace = qn.ns.clone();
                        (qn.clone(), e)
                    }
                };
                let status = if is_protected(&qn) {
                    StatusCode::FORBIDDEN
                } else {
                    StatusCode::FAILED_DEPENDENCY
                };
                propstat.add(status, elem);
            }
        } else {
            for item in &items {
                let (elem, result) = match item {
                    PatchItem::Set(e) => (name_only(e), node.set_property(e).await),
                    PatchItem::Remove(qn) => {
                        let mut e = Element::new(&qn.name);
                        e.namespace = qn.ns.clone();
                        (e, node.remove_property(qn.ns.as_deref(), &qn.name).await)
                    }
                };
                let status = match result {
                    Ok(()) => StatusCode::OK,
                    Err(FsError::Forbidden) | Err(FsError::NotImplemented) => {
                        StatusCode::FORBIDDEN
                    }
                    Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                propstat.add(status, elem);
            }
        }

        let mut ms = MultiStatus::new()?;
        ms.add_response(&path.as_href(), propstat.build())?;
        ms.close()
    }
}
