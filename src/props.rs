//! Parsing of XML request bodies into the property model.
//!
//! Requests carry loosely-structured XML; this module maps it onto a
//! typed model. `resourcetype` is the only property with a natively
//! recognized value (a set of type tokens); every other namespaced
//! property is preserved as an opaque element for write-through storage,
//! never dropped.

use xmltree::{Element, XMLNode};

use crate::errors::{DavError, DavResult};

/// The WebDAV XML namespace.
pub const NS_DAV: &str = "DAV:";

/// A namespace-qualified XML name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub ns: Option<String>,
    pub name: String,
}

impl QName {
    pub fn of_element(e: &Element) -> QName {
        QName {
            ns: e.namespace.clone(),
            name: e.name.clone(),
        }
    }

    pub fn is_dav(&self, name: &str) -> bool {
        self.ns.as_deref() == Some(NS_DAV) && self.name == name
    }
}

/// An ordered set of property elements with unique names.
#[derive(Debug, Default)]
pub struct PropertySet {
    props: Vec<Element>,
}

impl PropertySet {
    /// Remove and return the property with the given DAV: name.
    pub fn take_dav(&mut self, name: &str) -> Option<Element> {
        let idx = self
            .props
            .iter()
            .position(|p| QName::of_element(p).is_dav(name))?;
        Some(self.props.remove(idx))
    }

    fn insert(&mut self, prop: Element) {
        // Keys are unique; the first occurrence wins.
        let qn = QName::of_element(&prop);
        if !self.props.iter().any(|p| QName::of_element(p) == qn) {
            self.props.push(prop);
        }
    }
}

impl IntoIterator for PropertySet {
    type Item = Element;
    type IntoIter = std::vec::IntoIter<Element>;

    fn into_iter(self) -> Self::IntoIter {
        self.props.into_iter()
    }
}

/// Child elements only; text and comment nodes are not structure.
pub fn element_children(e: &Element) -> impl Iterator<Item = &Element> {
    e.children.iter().filter_map(|n| match n {
        XMLNode::Element(el) => Some(el),
        _ => None,
    })
}

fn is_dav(e: &Element, name: &str) -> bool {
    e.name == name && e.namespace.as_deref() == Some(NS_DAV)
}

fn parse_xml(body: &[u8]) -> DavResult<Element> {
    Element::parse(body).map_err(|_| DavError::BadRequest)
}

/// Parse an extended-MKCOL request body (RFC5689).
///
/// The body must be well-formed XML (else BadRequest) with a DAV: `mkcol`
/// root element (else UnsupportedMediaType). The returned set holds every
/// property found in the `set`/`prop` blocks, `resourcetype` included.
pub fn parse_mkcol(body: &[u8]) -> DavResult<PropertySet> {
    let root = parse_xml(body)?;
    if !is_dav(&root, "mkcol") {
        return Err(DavError::UnsupportedMediaType);
    }
    let mut set = PropertySet::default();
    for setelem in element_children(&root).filter(|e| is_dav(e, "set")) {
        for prop in element_children(setelem).filter(|e| is_dav(e, "prop")) {
            for p in element_children(prop) {
                set.insert(p.clone());
            }
        }
    }
    Ok(set)
}

/// The type tokens of a `resourcetype` property value.
///
/// Only child element names count; surrounding text nodes (whitespace,
/// newlines) never affect the token set.
pub fn resourcetype_tokens(e: &Element) -> Vec<QName> {
    element_children(e).map(QName::of_element).collect()
}

/// Is this `resourcetype` value exactly `{collection}`?
pub fn resourcetype_is_collection(e: &Element) -> bool {
    let tokens = resourcetype_tokens(e);
    tokens.len() == 1 && tokens[0].is_dav("collection")
}

/// A parsed PROPFIND request body.
#[derive(Debug, PartialEq, Eq)]
pub enum PropfindType {
    AllProp,
    PropName,
    Prop(Vec<QName>),
}

/// Parse a PROPFIND body. An empty body means `allprop`.
pub fn parse_propfind(body: &[u8]) -> DavResult<PropfindType> {
    if body.is_empty() {
        return Ok(PropfindType::AllProp);
    }
    let root = parse_xml(body)?;
    if !is_dav(&root, "propfind") {
        return Err(DavError::BadRequest);
    }
    for child in element_children(&root) {
        if is_dav(child, "allprop") {
            return Ok(PropfindType::AllProp);
        }
        if is_dav(child, "propname") {
            return Ok(PropfindType::PropName);
        }
        if is_dav(child, "prop") {
            let names = element_children(child).map(QName::of_element).collect();
            return Ok(PropfindType::Prop(names));
        }
    }
    Err(DavError::BadRequest)
}

/// One instruction from a PROPPATCH `propertyupdate` body, in
/// document order.
#[derive(Debug)]
pub enum PatchItem {
    Set(Element),
    Remove(QName),
}

pub fn parse_propertyupdate(body: &[u8]) -> DavResult<Vec<PatchItem>> {
    let root = parse_xml(body)?;
    if !is_dav(&root, "propertyupdate") {
        return Err(DavError::BadRequest);
    }
    let mut items = Vec::new();
    for child in element_children(&root) {
        let remove = match () {
            _ if is_dav(child, "set") => false,
            _ if is_dav(child, "remove") => true,
            _ => continue,
        };
        for prop in element_children(child).filter(|e| is_dav(e, "prop")) {
            for p in element_children(prop) {
                if remove {
                    items.push(PatchItem::Remove(QName::of_element(p)));
                } else {
                    items.push(PatchItem::Set(p.clone()));
                }
            }
        }
    }
    Ok(items)
}

/// A parsed LOCK request body.
#[derive(Debug)]
pub struct LockInfo {
    pub shared: bool,
    pub owner: Option<Element>,
}

pub fn parse_lockinfo(body: &[u8]) -> DavResult<LockInfo> {
    let root = parse_xml(body)?;
    if !is_dav(&root, "lockinfo") {
        return Err(DavError::BadRequest);
    }
    let mut shared = None;
    let mut owner = None;
    for child in element_children(&root) {
        if is_dav(child, "lockscope") {
            for scope in element_children(child) {
                if is_dav(scope, "shared") {
                    shared = Some(true);
                } else if is_dav(scope, "exclusive") {
                    shared = Some(false);
                }
            }
        } else if is_dav(child, "owner") {
            owner = Some(child.clone());
        }
    }
    match shared {
        Some(shared) => Ok(LockInfo { shared, owner }),
        None => Err(DavError::BadRequest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mkcol_broken_xml_is_bad_request() {
        assert!(matches!(parse_mkcol(b"Hello"), Err(DavError::BadRequest)));
    }

    #[test]
    fn mkcol_unknown_root_is_unsupported() {
        let body = br#"<?xml version="1.0"?><html></html>"#;
        assert!(matches!(
            parse_mkcol(body),
            Err(DavError::UnsupportedMediaType)
        ));
        // right name, wrong namespace
        let body = br#"<?xml version="1.0"?><mkcol xmlns="urn:x"/>"#;
        assert!(matches!(
            parse_mkcol(body),
            Err(DavError::UnsupportedMediaType)
        ));
    }

    #[test]
    fn mkcol_collects_props() {
        let body = br#"<?xml version="1.0"?>
            <mkcol xmlns="DAV:">
              <set>
                <prop>
                  <resourcetype><collection/></resourcetype>
                  <displayname>my new collection</displayname>
                </prop>
              </set>
            </mkcol>"#;
        let mut set = parse_mkcol(body).unwrap();
        let rt = set.take_dav("resourcetype").unwrap();
        assert!(resourcetype_is_collection(&rt));
        let rest: Vec<_> = set.into_iter().collect();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].name, "displayname");
    }

    #[test]
    fn duplicate_props_keep_first() {
        let body = br#"<?xml version="1.0"?>
            <mkcol xmlns="DAV:">
              <set><prop>
                <displayname>one</displayname>
                <displayname>two</displayname>
              </prop></set>
            </mkcol>"#;
        let set = parse_mkcol(body).unwrap();
        let props: Vec<_> = set.into_iter().collect();
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].children.len(), 1);
    }

    #[test]
    fn resourcetype_whitespace_does_not_count() {
        let body = br#"<?xml version="1.0"?>
            <mkcol xmlns="DAV:">
              <set><prop>
                <resourcetype>
                    <collection />
                </resourcetype>
              </prop></set>
            </mkcol>"#;
        let mut set = parse_mkcol(body).unwrap();
        let rt = set.take_dav("resourcetype").unwrap();
        assert!(resourcetype_is_collection(&rt));
    }

    #[test]
    fn resourcetype_extra_tokens_rejected() {
        let body = br#"<?xml version="1.0"?>
            <mkcol xmlns="DAV:">
              <set><prop>
                <resourcetype><collection /><blabla /></resourcetype>
              </prop></set>
            </mkcol>"#;
        let mut set = parse_mkcol(body).unwrap();
        let rt = set.take_dav("resourcetype").unwrap();
        assert!(!resourcetype_is_collection(&rt));
        assert_eq!(resourcetype_tokens(&rt).len(), 2);
    }

    #[test]
    fn unknown_namespaced_props_are_preserved() {
        let body = br#"<?xml version="1.0"?>
            <mkcol xmlns="DAV:" xmlns:x="urn:example">
              <set><prop>
                <x:special>payload</x:special>
              </prop></set>
            </mkcol>"#;
        let set = parse_mkcol(body).unwrap();
        let props: Vec<_> = set.into_iter().collect();
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].namespace.as_deref(), Some("urn:example"));
        assert_eq!(props[0].name, "special");
    }

    #[test]
    fn propfind_variants() {
        assert_eq!(parse_propfind(b"").unwrap(), PropfindType::AllProp);
        let body = br#"<?xml version="1.0"?>
            <propfind xmlns="DAV:"><propname/></propfind>"#;
        assert_eq!(parse_propfind(body).unwrap(), PropfindType::PropName);
        let body = br#"<?xml version="1.0"?>
            <propfind xmlns="DAV:"><prop><getcontentlength/></prop></propfind>"#;
        match parse_propfind(body).unwrap() {
            PropfindType::Prop(names) => {
                assert_eq!(names.len(), 1);
                assert!(names[0].is_dav("getcontentlength"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lockinfo() {
        let body = br#"<?xml version="1.0"?>
            <lockinfo xmlns="DAV:">
              <lockscope><exclusive/></lockscope>
              <locktype><write/></locktype>
              <owner>me</owner>
            </lockinfo>"#;
        let li = parse_lockinfo(body).unwrap();
        assert!(!li.shared);
        assert!(li.owner.is_some());
    }
}
