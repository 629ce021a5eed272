//! Owned markup tree.
//!
//! Documents are parsed once with `quick-xml` into an arena of nodes. Element
//! names are namespace-resolved into Clark notation (`{uri}local`), so path
//! selectors can match them independently of the prefixes used in the file.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use std::fs;
use std::path::Path;

/// Error raised while reading or parsing a markup document
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed document at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    #[error("Document has no root element")]
    Empty,
}

#[derive(Debug, Clone)]
struct NodeData {
    name: String,
    attributes: Vec<(String, String)>,
    /// Text before the first child element
    text: String,
    /// Text after this element's end tag, up to the next sibling
    tail: String,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// A parsed document; node 0 is the root element
#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<NodeData>,
}

impl XmlDocument {
    /// Parse a document from a file
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self, XmlError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| XmlError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse_str(&contents)
    }

    /// Parse a document from a string
    pub fn parse_str(xml: &str) -> Result<Self, XmlError> {
        let mut reader = NsReader::from_str(xml);
        let mut nodes: Vec<NodeData> = Vec::new();
        let mut stack: Vec<usize> = Vec::new();

        loop {
            let position = reader.buffer_position();
            let malformed = |message: String| XmlError::Malformed {
                position: position as u64,
                message,
            };

            let (ns, event) = reader
                .read_resolved_event()
                .map_err(|e| malformed(e.to_string()))?;
            let namespace = namespace_uri(ns);

            match event {
                Event::Start(start) => {
                    let idx = open_element(&reader, &mut nodes, &stack, namespace, &start)
                        .map_err(malformed)?;
                    stack.push(idx);
                }
                Event::Empty(start) => {
                    open_element(&reader, &mut nodes, &stack, namespace, &start)
                        .map_err(malformed)?;
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(|e| malformed(e.to_string()))?;
                    append_text(&mut nodes, &stack, &text);
                }
                Event::CData(data) => {
                    let text = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    append_text(&mut nodes, &stack, &text);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if nodes.is_empty() {
            return Err(XmlError::Empty);
        }
        Ok(Self { nodes })
    }

    /// The document's root element
    pub fn root(&self) -> XmlNode<'_> {
        XmlNode { doc: self, idx: 0 }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn namespace_uri(ns: ResolveResult<'_>) -> Option<String> {
    match ns {
        ResolveResult::Bound(namespace) => {
            Some(String::from_utf8_lossy(namespace.as_ref()).into_owned())
        }
        _ => None,
    }
}

fn open_element(
    reader: &NsReader<&[u8]>,
    nodes: &mut Vec<NodeData>,
    stack: &[usize],
    namespace: Option<String>,
    start: &BytesStart<'_>,
) -> Result<usize, String> {
    let local = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let name = match namespace {
        Some(uri) => format!("{{{}}}{}", uri, local),
        None => local,
    };

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = attr.key;
        if key.as_namespace_binding().is_some() {
            continue;
        }
        let (attr_ns, attr_local) = reader.resolve_attribute(key);
        let attr_local = String::from_utf8_lossy(attr_local.as_ref()).into_owned();
        let attr_name = match namespace_uri(attr_ns) {
            Some(uri) => format!("{{{}}}{}", uri, attr_local),
            None => attr_local,
        };
        let value = attr.unescape_value().map_err(|e| e.to_string())?;
        attributes.push((attr_name, value.into_owned()));
    }

    let parent = stack.last().copied();
    if parent.is_none() && !nodes.is_empty() {
        return Err("multiple root elements".to_string());
    }

    let idx = nodes.len();
    nodes.push(NodeData {
        name,
        attributes,
        text: String::new(),
        tail: String::new(),
        parent,
        children: Vec::new(),
    });
    if let Some(parent) = parent {
        nodes[parent].children.push(idx);
    }
    Ok(idx)
}

fn append_text(nodes: &mut [NodeData], stack: &[usize], text: &str) {
    let Some(&current) = stack.last() else {
        return;
    };
    match nodes[current].children.last().copied() {
        Some(last_child) => nodes[last_child].tail.push_str(text),
        None => nodes[current].text.push_str(text),
    }
}

/// Borrowed handle to one element of an [`XmlDocument`]
#[derive(Debug, Clone, Copy)]
pub struct XmlNode<'a> {
    doc: &'a XmlDocument,
    idx: usize,
}

impl<'a> XmlNode<'a> {
    fn data(&self) -> &'a NodeData {
        &self.doc.nodes[self.idx]
    }

    /// Element name in Clark notation (`{uri}local` when namespaced)
    pub fn name(&self) -> &'a str {
        &self.data().name
    }

    /// Text before the first child element; empty when there is none
    pub fn text(&self) -> &'a str {
        &self.data().text
    }

    /// Text following this element's end tag
    pub fn tail(&self) -> &'a str {
        &self.data().tail
    }

    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        self.data()
            .attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn parent(&self) -> Option<XmlNode<'a>> {
        self.data().parent.map(|idx| XmlNode { doc: self.doc, idx })
    }

    pub fn children(&self) -> impl Iterator<Item = XmlNode<'a>> + 'a {
        let doc = self.doc;
        self.data()
            .children
            .iter()
            .map(move |&idx| XmlNode { doc, idx })
    }

    /// All descendants in document order, excluding this node
    pub fn descendants(&self) -> Vec<XmlNode<'a>> {
        let mut out = Vec::new();
        let mut pending: Vec<usize> = self.data().children.iter().rev().copied().collect();
        while let Some(idx) = pending.pop() {
            out.push(XmlNode { doc: self.doc, idx });
            pending.extend(self.doc.nodes[idx].children.iter().rev().copied());
        }
        out
    }

    /// Concatenated text of this element and all of its descendants
    pub fn itertext(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        out.push_str(self.text());
        for child in self.children() {
            child.collect_text(out);
            out.push_str(child.tail());
        }
    }

    /// Position of this node in the document arena; stable per document
    pub fn index(&self) -> usize {
        self.idx
    }
}

impl PartialEq for XmlNode<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.doc, other.doc) && self.idx == other.idx
    }
}

impl Eq for XmlNode<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_structure_and_text() {
        let doc = XmlDocument::parse_str(
            r#"<?xml version="1.0"?>
<library name="city">
  <book id="1">Dune<note>classic</note> tail</book>
  <book id="2"/>
</library>"#,
        )
        .unwrap();

        let root = doc.root();
        assert_eq!(root.name(), "library");
        assert_eq!(root.attribute("name"), Some("city"));

        let books: Vec<_> = root.children().collect();
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].text(), "Dune");
        assert_eq!(books[0].itertext(), "Duneclassic tail");
        assert_eq!(books[1].attribute("id"), Some("2"));
        assert_eq!(books[1].text(), "");
        assert_eq!(books[1].parent(), Some(root));
    }

    #[test]
    fn test_namespaces_are_resolved() {
        let doc = XmlDocument::parse_str(
            r#"<r:root xmlns:r="urn:r" xmlns="urn:d"><item r:kind="a">x</item></r:root>"#,
        )
        .unwrap();
        let root = doc.root();
        assert_eq!(root.name(), "{urn:r}root");
        let item = root.children().next().unwrap();
        assert_eq!(item.name(), "{urn:d}item");
        assert_eq!(item.attribute("{urn:r}kind"), Some("a"));
    }

    #[test]
    fn test_entities_and_cdata() {
        let doc = XmlDocument::parse_str("<a>x &amp; y<![CDATA[ <z> ]]></a>").unwrap();
        assert_eq!(doc.root().text(), "x & y <z> ");
    }

    #[test]
    fn test_descendants_in_document_order() {
        let doc = XmlDocument::parse_str("<a><b><c/></b><d/></a>").unwrap();
        let names: Vec<_> = doc.root().descendants().iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_malformed_document() {
        assert!(matches!(
            XmlDocument::parse_str("<a><b></a>"),
            Err(XmlError::Malformed { .. })
        ));
        assert!(matches!(XmlDocument::parse_str("   "), Err(XmlError::Empty)));
    }
}
