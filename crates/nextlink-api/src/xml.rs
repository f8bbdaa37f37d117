// Generic XML-to-tree decoder
//
// Streams a document through quick-xml and folds each element into an
// order-preserving map keyed by local name. Namespace prefixes are dropped,
// so `<d:href>` and `<D:href>` both land under "href". Repeated children are
// promoted from a single node to a list on their second occurrence.

use std::io::BufRead;

use indexmap::IndexMap;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::Error;

/// Reserved key holding an element's character content.
pub const TEXT_KEY: &str = "@text";

/// An element's children, attributes and text, keyed by local name.
pub type XmlMap = IndexMap<String, XmlValue>;

/// One value in a decoded XML tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlValue {
    /// Character content or an attribute value.
    Text(String),
    /// A single element.
    Node(XmlMap),
    /// Two or more same-named sibling elements, in document order.
    List(Vec<XmlValue>),
}

impl XmlValue {
    /// The element map, if this is a single node.
    pub fn as_node(&self) -> Option<&XmlMap> {
        match self {
            Self::Node(map) => Some(map),
            _ => None,
        }
    }

    /// Text of a leaf, or the `@text` entry of a node.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Node(map) => match map.get(TEXT_KEY) {
                Some(Self::Text(text)) => Some(text),
                _ => None,
            },
            Self::List(_) => None,
        }
    }

    /// Look up a child of a single node.
    pub fn get(&self, key: &str) -> Option<&XmlValue> {
        self.as_node().and_then(|map| map.get(key))
    }

    /// Normalize the single-vs-repeated shapes into a slice.
    ///
    /// A `List` yields its items; anything else yields itself.
    pub fn items(&self) -> &[XmlValue] {
        match self {
            Self::List(items) => items,
            other => std::slice::from_ref(other),
        }
    }
}

/// Decode a complete document into `{ root-local-name: Node(..) }`.
///
/// Fails on any well-formedness error; no partial tree is returned.
pub fn decode(bytes: &[u8]) -> Result<XmlMap, Error> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut tree = XmlMap::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(Error::xml)? {
            Event::Start(start) => {
                let name = local_name(&start);
                let map = decode_element(&mut reader, &start)?;
                insert_child(&mut tree, name, XmlValue::Node(map));
            }
            Event::Empty(start) => {
                let name = local_name(&start);
                let mut map = XmlMap::new();
                read_attributes(&start, &mut map)?;
                insert_child(&mut tree, name, XmlValue::Node(map));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if tree.is_empty() {
        return Err(Error::xml("document has no root element"));
    }
    Ok(tree)
}

/// Decode the element whose start tag was just read, up to its end tag.
pub fn decode_element<R: BufRead>(
    reader: &mut Reader<R>,
    start: &BytesStart<'_>,
) -> Result<XmlMap, Error> {
    let mut map = XmlMap::new();
    read_attributes(start, &mut map)?;

    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(Error::xml)? {
            Event::Start(child) => {
                let name = local_name(&child);
                let value = decode_element(reader, &child)?;
                insert_child(&mut map, name, XmlValue::Node(value));
            }
            Event::Empty(child) => {
                let name = local_name(&child);
                let mut value = XmlMap::new();
                read_attributes(&child, &mut value)?;
                insert_child(&mut map, name, XmlValue::Node(value));
            }
            Event::Text(chunk) => text.push_str(&chunk.unescape().map_err(Error::xml)?),
            Event::CData(chunk) => text.push_str(&String::from_utf8_lossy(&chunk.into_inner())),
            Event::End(_) => break,
            Event::Eof => {
                return Err(Error::xml(format!(
                    "unexpected end of document inside <{}>",
                    local_name(start)
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    let text = text.trim();
    if !text.is_empty() {
        map.insert(TEXT_KEY.to_owned(), XmlValue::Text(text.to_owned()));
    }
    Ok(map)
}

/// Insert a child, promoting an existing single entry to a list.
fn insert_child(map: &mut XmlMap, name: String, value: XmlValue) {
    match map.get_mut(&name) {
        None => {
            map.insert(name, value);
        }
        Some(XmlValue::List(items)) => items.push(value),
        Some(existing) => {
            let first = std::mem::replace(existing, XmlValue::List(Vec::with_capacity(2)));
            *existing = XmlValue::List(vec![first, value]);
        }
    }
}

fn read_attributes(start: &BytesStart<'_>, map: &mut XmlMap) -> Result<(), Error> {
    for attr in start.attributes() {
        let attr = attr.map_err(Error::xml)?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(Error::xml)?.into_owned();
        map.insert(key, XmlValue::Text(value));
    }
    Ok(())
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}
