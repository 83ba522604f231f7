//! Serializing Multi-Status (207) responses and other XML documents.
//!
//! Properties are emitted grouped by HTTP status: all properties that
//! resolved to the same status share one `propstat` element. Namespace
//! prefixes are assigned stably for the duration of one response; `D`
//! is always the DAV: namespace.

use std::collections::HashMap;

use bytes::Bytes;
use http::{Response, StatusCode};
use xml::writer::{EmitterConfig, EventWriter, XmlEvent};
use xmltree::{Element, XMLNode};

use crate::body::Body;
use crate::errors::DavResult;
use crate::props::NS_DAV;
use crate::util::MemBuffer;

/// One property-status group.
pub struct PropStat {
    pub status: StatusCode,
    pub props: Vec<Element>,
}

/// Collects (status, property) pairs and groups them by status,
/// preserving first-seen status order.
#[derive(Default)]
pub struct PropStatBuilder {
    groups: Vec<PropStat>,
}

impl PropStatBuilder {
    pub fn new() -> PropStatBuilder {
        PropStatBuilder::default()
    }

    pub fn add(&mut self, status: StatusCode, prop: Element) {
        match self.groups.iter_mut().find(|g| g.status == status) {
            Some(g) => g.props.push(prop),
            None => self.groups.push(PropStat {
                status,
                props: vec![prop],
            }),
        }
    }

    pub fn build(self) -> Vec<PropStat> {
        self.groups
    }
}

/// Incremental writer for a 207 Multi-Status response body.
pub struct MultiStatus {
    w: EventWriter<MemBuffer>,
    nsmap: HashMap<String, String>,
}

impl MultiStatus {
    pub fn new() -> DavResult<MultiStatus> {
        let mut w = EmitterConfig::new()
            .write_document_declaration(true)
            .create_writer(MemBuffer::new());
        w.write(XmlEvent::start_element("D:multistatus").ns("D", NS_DAV))?;
        Ok(MultiStatus {
            w,
            nsmap: HashMap::new(),
        })
    }

    /// Add a `response` element for one resource.
    pub fn add_response(&mut self, href: &str, propstats: Vec<PropStat>) -> DavResult<()> {
        self.w.write(XmlEvent::start_element("D:response"))?;
        self.w.write(XmlEvent::start_element("D:href"))?;
        self.w.write(XmlEvent::characters(href))?;
        self.w.write(XmlEvent::end_element())?;
        for ps in &propstats {
            self.w.write(XmlEvent::start_element("D:propstat"))?;
            self.w.write(XmlEvent::start_element("D:prop"))?;
            for prop in &ps.props {
                write_element(&mut self.w, &mut self.nsmap, prop)?;
            }
            self.w.write(XmlEvent::end_element())?;
            self.w.write(XmlEvent::start_element("D:status"))?;
            self.w.write(XmlEvent::characters(&status_line(ps.status)))?;
            self.w.write(XmlEvent::end_element())?;
            self.w.write(XmlEvent::end_element())?;
        }
        self.w.write(XmlEvent::end_element())?;
        Ok(())
    }

    /// Close the document and turn it into a 207 response.
    pub fn close(mut self) -> DavResult<Response<Body>> {
        self.w.write(XmlEvent::end_element())?;
        let buf = self.w.into_inner().take();
        let resp = Response::builder()
            .status(StatusCode::MULTI_STATUS)
            .header("Content-Type", "application/xml; charset=utf-8")
            .header("Content-Length", buf.len().to_string())
            .body(Body::from(buf))
            .unwrap();
        Ok(resp)
    }
}

/// Render a standalone document with a DAV: root element wrapping the
/// given children (used for LOCK responses).
pub fn render_dav_document(root: &str, children: &[Element]) -> DavResult<Bytes> {
    let mut w = EmitterConfig::new()
        .write_document_declaration(true)
        .create_writer(MemBuffer::new());
    let mut nsmap = HashMap::new();
    w.write(XmlEvent::start_element(format!("D:{root}").as_str()).ns("D", NS_DAV))?;
    for child in children {
        write_element(&mut w, &mut nsmap, child)?;
    }
    w.write(XmlEvent::end_element())?;
    Ok(w.into_inner().take())
}

fn status_line(status: StatusCode) -> String {
    format!(
        "HTTP/1.1 {} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    )
}

// Serialize an xmltree element into the event writer, mapping namespaces
// to response-stable prefixes. Non-DAV namespaces are (re)declared on the
// element that uses them so nested scopes stay valid.
fn write_element(
    w: &mut EventWriter<MemBuffer>,
    nsmap: &mut HashMap<String, String>,
    e: &Element,
) -> DavResult<()> {
    let (qname, decl) = match &e.namespace {
        Some(ns) if ns == NS_DAV => (format!("D:{}", e.name), None),
        Some(ns) => {
            let n = nsmap.len();
            let prefix = nsmap
                .entry(ns.clone())
                .or_insert_with(|| format!("ns{n}"))
                .clone();
            (format!("{prefix}:{}", e.name), Some((prefix, ns.clone())))
        }
        None => (e.name.clone(), None),
    };
    let mut start = XmlEvent::start_element(qname.as_str());
    if let Some((prefix, ns)) = &decl {
        start = start.ns(prefix.as_str(), ns.as_str());
    }
    for (k, v) in &e.attributes {
        start = start.attr(k.as_str(), v.as_str());
    }
    w.write(start)?;
    for child in &e.children {
        match child {
            XMLNode::Element(el) => write_element(w, nsmap, el)?,
            XMLNode::Text(t) => w.write(XmlEvent::characters(t))?,
            XMLNode::CData(t) => w.write(XmlEvent::cdata(t))?,
            _ => {}
        }
    }
    w.write(XmlEvent::end_element())?;
    Ok(())
}
