//! A small owned element tree.
//!
//! Only bounded parts of a message are ever materialized as a tree (the
//! `FieldTypes` table), so this stays deliberately simple: tag, attributes,
//! text and children, all namespace-stripped.

use std::borrow::Cow;
use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::decoder::{is_namespace_declaration, local_name};
use crate::error::DecodeError;

/// One element of a parsed document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    /// Local tag name (namespace prefix and Clark `{uri}` stripped).
    pub tag: String,
    /// Attributes keyed by local name. `xmlns` declarations are not kept.
    pub attributes: BTreeMap<String, String>,
    /// Character data directly inside this element, concatenated in document order.
    pub text: String,
    /// Child elements in document order.
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Builder-style attribute setter, mostly for tests.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Builder-style child setter, mostly for tests.
    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// First direct child with the given local tag.
    pub fn child(&self, tag: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// A node without child elements.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Parse a complete (small) document into a tree.
    ///
    /// This materializes everything; use [`RowsetDecoder`](crate::RowsetDecoder)
    /// for message bodies.
    pub fn parse(xml: &str) -> Result<XmlNode, DecodeError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().expand_empty_elements = true;

        let mut builder = TreeBuilder::new();
        let mut root = None;
        loop {
            let position = reader.buffer_position() as u64;
            let event = reader
                .read_event()
                .map_err(|e| DecodeError::malformed(position, e.to_string()))?;
            match event {
                Event::Start(start) => {
                    if root.is_some() {
                        return Err(DecodeError::malformed(position, "multiple root elements"));
                    }
                    let node = XmlNode::from_start(&start)
                        .map_err(|reason| DecodeError::malformed(position, reason))?;
                    builder.open(node);
                }
                Event::End(_) => {
                    if let Some(node) = builder.close() {
                        root = Some(node);
                    }
                }
                Event::Text(text) => {
                    let text = unescape_text(&text)
                        .map_err(|reason| DecodeError::malformed(position, reason))?;
                    builder.text(&text);
                }
                Event::CData(data) => {
                    let text = std::str::from_utf8(&data)
                        .map_err(|e| DecodeError::malformed(position, e.to_string()))?;
                    builder.text(text);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if builder.depth() > 0 {
            return Err(DecodeError::malformed(
                reader.buffer_position() as u64,
                format!("unexpected end of document with {} open elements", builder.depth()),
            ));
        }
        root.ok_or_else(|| DecodeError::malformed(0, "document has no root element"))
    }

    /// Build a childless node from a start tag.
    pub(crate) fn from_start(start: &BytesStart<'_>) -> Result<Self, String> {
        let mut node = XmlNode::new(utf8(local_name(start.name().as_ref()))?);
        for attr in start.attributes() {
            let attr = attr.map_err(|e| e.to_string())?;
            let key = attr.key.as_ref();
            if is_namespace_declaration(key) {
                continue;
            }
            let value = unescape_text(&attr.value)?;
            node.attributes
                .insert(utf8(local_name(key))?.to_owned(), value.into_owned());
        }
        Ok(node)
    }
}

/// Incrementally assembles a subtree from start / text / end events.
#[derive(Debug, Default)]
pub(crate) struct TreeBuilder {
    stack: Vec<XmlNode>,
}

impl TreeBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn open(&mut self, node: XmlNode) {
        self.stack.push(node);
    }

    pub(crate) fn text(&mut self, text: &str) {
        if let Some(top) = self.stack.last_mut() {
            top.text.push_str(text);
        }
    }

    /// Close the innermost open element. Returns the subtree root once the
    /// outermost element is closed.
    pub(crate) fn close(&mut self) -> Option<XmlNode> {
        let node = self.stack.pop()?;
        match self.stack.last_mut() {
            Some(parent) => {
                parent.children.push(node);
                None
            }
            None => Some(node),
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.stack.len()
    }
}

pub(crate) fn utf8(bytes: &[u8]) -> Result<&str, String> {
    std::str::from_utf8(bytes).map_err(|e| e.to_string())
}

/// Decode escaped character data (`&amp;` etc.) into text.
pub(crate) fn unescape_text(raw: &[u8]) -> Result<Cow<'_, str>, String> {
    quick_xml::escape::unescape(utf8(raw)?).map_err(|e| e.to_string())
}
