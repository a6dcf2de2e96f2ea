//! `RowsetDecoder`: two-pass streaming decoder for rowset messages.
//!
//! Both passes are independent forward-only scans that rewind the source to
//! offset zero first:
//!
//! 1. **Header pass** ([`RowsetDecoder::read_header`]): records the root's
//!    local name and stops at the close of the first `FieldTypes` element.
//!    Only the `FieldTypes` subtree is materialized.
//! 2. **Transaction pass** ([`RowsetDecoder::transactions`]): yields every
//!    `Transaction` element re-serialized as a standalone fragment, numbered
//!    from 1 in document order. Nothing outside the current fragment is
//!    retained, so memory is bounded by the largest single transaction.

use std::io::{BufRead, Cursor, Seek, SeekFrom};

use bytes::Bytes;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use tracing::{debug, trace};

use crate::error::DecodeError;
use crate::message::{FieldTypes, RowsetHeader};
use crate::tree::{utf8, unescape_text, TreeBuilder, XmlNode};

const FIELD_TYPES: &[u8] = b"FieldTypes";
const TRANSACTION: &[u8] = b"Transaction";

/// Strip the namespace from a qualified tag or attribute name.
///
/// Handles both Clark notation (`{urn:x}Tag`) and prefixed names (`ps:Tag`).
pub fn local_name(qname: &[u8]) -> &[u8] {
    let unqualified = match qname.iter().position(|&b| b == b'}') {
        Some(end) => &qname[end + 1..],
        None => qname,
    };
    match unqualified.iter().rposition(|&b| b == b':') {
        Some(colon) => &unqualified[colon + 1..],
        None => unqualified,
    }
}

pub(crate) fn is_namespace_declaration(key: &[u8]) -> bool {
    key == b"xmlns" || key.starts_with(b"xmlns:")
}

/// One `Transaction` element, serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionFragment {
    /// 1-based position among the document's transactions.
    pub index: u64,
    /// The element and its descendants as a self-contained XML string.
    pub xml: String,
}

/// Decoder over a rewindable byte source holding one XML document.
#[derive(Debug)]
pub struct RowsetDecoder<R> {
    source: R,
}

impl RowsetDecoder<Cursor<Bytes>> {
    /// Decoder over an in-memory request body.
    pub fn from_bytes(body: impl Into<Bytes>) -> Self {
        Self::new(Cursor::new(body.into()))
    }
}

impl<R: BufRead + Seek> RowsetDecoder<R> {
    pub fn new(source: R) -> Self {
        Self { source }
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    /// Run the header pass.
    ///
    /// Returns the message name (root local name) and the projected
    /// `FieldTypes` table. Parsing stops at the close of the first
    /// `FieldTypes` element; the rest of the document is not read.
    pub fn read_header(&mut self) -> Result<RowsetHeader, DecodeError> {
        self.source.seek(SeekFrom::Start(0))?;
        let mut reader = xml_reader(&mut self.source);
        let mut buf = Vec::new();

        let mut message_name: Option<String> = None;
        let mut depth = 0usize;
        let mut root_closed = false;
        let mut field_types: Option<TreeBuilder> = None;

        loop {
            let position = reader.buffer_position() as u64;
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| DecodeError::malformed(position, e.to_string()))?;

            match event {
                Event::Start(start) => {
                    if root_closed {
                        return Err(DecodeError::malformed(position, "multiple root elements"));
                    }
                    depth += 1;
                    let qname = start.name();
                    let name = local_name(qname.as_ref());
                    if message_name.is_none() {
                        let root = utf8(name).map_err(|r| DecodeError::malformed(position, r))?;
                        message_name = Some(root.to_owned());
                    }
                    match field_types.as_mut() {
                        Some(builder) => builder.open(element(&start, position)?),
                        None if name == FIELD_TYPES => {
                            let mut builder = TreeBuilder::new();
                            builder.open(element(&start, position)?);
                            field_types = Some(builder);
                        }
                        None => {}
                    }
                }
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    root_closed = depth == 0;
                    if let Some(table) = field_types.as_mut().and_then(TreeBuilder::close) {
                        let header = RowsetHeader {
                            message_name: message_name.unwrap_or_default(),
                            field_types: FieldTypes::from_element(&table)?,
                        };
                        debug!(
                            message_name = %header.message_name,
                            fields = header.field_types.field_count(),
                            "header pass complete"
                        );
                        return Ok(header);
                    }
                }
                Event::Text(text) => {
                    if depth == 0 {
                        outside_root(&text, position)?;
                    }
                    if let Some(builder) = field_types.as_mut() {
                        let text = unescape_text(&text)
                            .map_err(|r| DecodeError::malformed(position, r))?;
                        builder.text(&text);
                    }
                }
                Event::CData(_) if depth == 0 => {
                    return Err(DecodeError::malformed(position, "CDATA outside the root element"));
                }
                Event::CData(data) => {
                    if let Some(builder) = field_types.as_mut() {
                        builder.text(utf8(&data).map_err(|r| DecodeError::malformed(position, r))?);
                    }
                }
                Event::Eof => {
                    return Err(match end_of_input(position, message_name.is_some(), depth) {
                        Some(err) => err,
                        None => DecodeError::MissingFieldTypes,
                    });
                }
                _ => {}
            }
            buf.clear();
        }
    }

    /// Start the transaction pass from the beginning of the source.
    pub fn transactions(&mut self) -> Result<Transactions<'_, R>, DecodeError> {
        self.source.seek(SeekFrom::Start(0))?;
        Ok(Transactions::new(&mut self.source))
    }
}

fn xml_reader<B: BufRead>(source: B) -> Reader<B> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().expand_empty_elements = true;
    reader
}

fn element(start: &BytesStart<'_>, position: u64) -> Result<XmlNode, DecodeError> {
    XmlNode::from_start(start).map_err(|reason| DecodeError::malformed(position, reason))
}

/// Well-formedness check at end of input. `None` means the document was complete.
fn end_of_input(position: u64, seen_root: bool, depth: usize) -> Option<DecodeError> {
    if !seen_root {
        Some(DecodeError::malformed(position, "document has no root element"))
    } else if depth > 0 {
        Some(DecodeError::malformed(
            position,
            format!("unexpected end of document with {depth} open elements"),
        ))
    } else {
        None
    }
}

/// Only whitespace may appear before or after the root element.
fn outside_root(text: &[u8], position: u64) -> Result<(), DecodeError> {
    if text.iter().all(u8::is_ascii_whitespace) {
        Ok(())
    } else {
        Err(DecodeError::malformed(position, "text outside the root element"))
    }
}

/// `xmlns` declarations of one element, raw key and value.
type Scope = Vec<(Vec<u8>, Vec<u8>)>;

fn namespace_declarations(start: &BytesStart<'_>) -> Result<Scope, String> {
    let mut scope = Scope::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        if is_namespace_declaration(attr.key.as_ref()) {
            scope.push((attr.key.as_ref().to_vec(), attr.value.into_owned()));
        }
    }
    Ok(scope)
}

/// Copy of `start` carrying every namespace declaration in scope from its
/// ancestors, so the fragment parses on its own. Inner scopes shadow outer.
fn fragment_root(start: &BytesStart<'_>, own: &Scope, ancestors: &[Scope]) -> BytesStart<'static> {
    let mut root = start.clone().into_owned();
    let mut declared: Vec<&[u8]> = own.iter().map(|(k, _)| k.as_slice()).collect();
    for scope in ancestors.iter().rev() {
        for (key, value) in scope {
            if declared.contains(&key.as_slice()) {
                continue;
            }
            declared.push(key.as_slice());
            root.push_attribute((key.as_slice(), value.as_slice()));
        }
    }
    root
}

/// A `Transaction` element being re-serialized.
struct Capture {
    writer: Writer<Vec<u8>>,
    /// Depth of the `Transaction` element itself.
    depth: usize,
}

impl Capture {
    fn write(&mut self, event: Event<'_>, position: u64) -> Result<(), DecodeError> {
        self.writer
            .write_event(event)
            .map_err(|e| DecodeError::malformed(position, e.to_string()))
    }
}

/// Lazy iterator over the transactions of a document.
///
/// Errors are yielded at the point the scan reaches the offending content;
/// the iterator is fused after the first error.
pub struct Transactions<'a, R> {
    reader: Reader<&'a mut R>,
    buf: Vec<u8>,
    next_index: u64,
    depth: usize,
    seen_root: bool,
    root_closed: bool,
    /// Namespace declarations of each open element.
    scopes: Vec<Scope>,
    /// Open `Transaction` elements, outermost first. A nested one is
    /// written into every enclosing capture as well as its own.
    captures: Vec<Capture>,
    peak_retained: usize,
    finished: bool,
}

impl<'a, R: BufRead> Transactions<'a, R> {
    fn new(source: &'a mut R) -> Self {
        Self {
            reader: xml_reader(source),
            buf: Vec::new(),
            next_index: 1,
            depth: 0,
            seen_root: false,
            root_closed: false,
            scopes: Vec::new(),
            captures: Vec::new(),
            peak_retained: 0,
            finished: false,
        }
    }

    /// Number of fragments yielded so far.
    pub fn emitted(&self) -> u64 {
        self.next_index - 1
    }

    /// Largest number of bytes held at once (fragment buffer plus read
    /// buffer). Stays flat as the transaction count grows.
    pub fn peak_retained_bytes(&self) -> usize {
        self.peak_retained
    }

    fn advance(&mut self) -> Result<Option<TransactionFragment>, DecodeError> {
        loop {
            self.buf.clear();
            let position = self.reader.buffer_position() as u64;
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .map_err(|e| DecodeError::malformed(position, e.to_string()))?;

            match event {
                Event::Start(start) => {
                    if self.root_closed {
                        return Err(DecodeError::malformed(position, "multiple root elements"));
                    }
                    self.seen_root = true;
                    self.depth += 1;

                    let scope = namespace_declarations(&start)
                        .map_err(|r| DecodeError::malformed(position, r))?;
                    for capture in &mut self.captures {
                        capture.write(Event::Start(start.clone()), position)?;
                    }
                    if local_name(start.name().as_ref()) == TRANSACTION {
                        let root = fragment_root(&start, &scope, &self.scopes);
                        let mut capture = Capture {
                            writer: Writer::new(Vec::new()),
                            depth: self.depth,
                        };
                        capture.write(Event::Start(root), position)?;
                        self.captures.push(capture);
                    }
                    self.scopes.push(scope);
                }
                Event::End(end) => {
                    let closing = self.depth;
                    self.depth = self.depth.saturating_sub(1);
                    self.root_closed = self.depth == 0;
                    self.scopes.pop();

                    for capture in &mut self.captures {
                        capture.write(Event::End(end.clone()), position)?;
                    }
                    if self.captures.last().is_some_and(|c| c.depth == closing) {
                        return self.finish_fragment(position).map(Some);
                    }
                }
                Event::Text(text) => {
                    if self.depth == 0 {
                        outside_root(&text, position)?;
                    }
                    for capture in &mut self.captures {
                        capture.write(Event::Text(text.clone()), position)?;
                    }
                }
                Event::CData(data) => {
                    if self.depth == 0 {
                        return Err(DecodeError::malformed(
                            position,
                            "CDATA outside the root element",
                        ));
                    }
                    for capture in &mut self.captures {
                        capture.write(Event::CData(data.clone()), position)?;
                    }
                }
                Event::Eof => {
                    if let Some(err) = end_of_input(position, self.seen_root, self.depth) {
                        return Err(err);
                    }
                    debug!(transactions = self.emitted(), "transaction pass complete");
                    return Ok(None);
                }
                // Comments, processing instructions, declarations.
                _ => {}
            }
        }
    }

    fn finish_fragment(&mut self, position: u64) -> Result<TransactionFragment, DecodeError> {
        let Some(capture) = self.captures.pop() else {
            return Err(DecodeError::malformed(position, "no open transaction"));
        };
        let bytes = capture.writer.into_inner();
        let enclosing: usize = self.captures.iter().map(|c| c.writer.get_ref().len()).sum();
        self.peak_retained = self
            .peak_retained
            .max(bytes.len() + enclosing + self.buf.capacity());
        let xml = String::from_utf8(bytes)
            .map_err(|e| DecodeError::malformed(position, e.to_string()))?;

        let index = self.next_index;
        self.next_index += 1;
        trace!(index, bytes = xml.len(), "transaction extracted");
        Ok(TransactionFragment { index, xml })
    }
}

impl<R: BufRead> Iterator for Transactions<'_, R> {
    type Item = Result<TransactionFragment, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.advance() {
            Ok(Some(fragment)) => Some(Ok(fragment)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

impl<R: BufRead> std::iter::FusedIterator for Transactions<'_, R> {}

#[cfg(test)]
mod tests {
    use super::*;

    const SYNC: &str = r#"<?xml version="1.0"?>
<SYNC_MESSAGE>
  <FieldTypes><FIELD1 type="char"/></FieldTypes>
  <MsgData>
    <Transaction><REC><FIELD1>a</FIELD1></REC></Transaction>
    <Transaction><REC><FIELD1>b</FIELD1></REC></Transaction>
  </MsgData>
</SYNC_MESSAGE>"#;

    #[test]
    fn local_name_variants() {
        assert_eq!(local_name(b"Transaction"), b"Transaction");
        assert_eq!(local_name(b"ps:Transaction"), b"Transaction");
        assert_eq!(local_name(b"{http://peoplesoft.com}Transaction"), b"Transaction");
        assert_eq!(local_name(b"{urn:a:b}p:FieldTypes"), b"FieldTypes");
    }

    #[test]
    fn header_pass() {
        let mut decoder = RowsetDecoder::from_bytes(SYNC);
        let header = decoder.read_header().unwrap();
        assert_eq!(header.message_name, "SYNC_MESSAGE");
        assert_eq!(header.field_types.find("FIELD1"), Some("char"));
    }

    #[test]
    fn transaction_pass() {
        let mut decoder = RowsetDecoder::from_bytes(SYNC);
        let fragments: Vec<_> = decoder
            .transactions()
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].index, 1);
        assert_eq!(
            fragments[0].xml,
            "<Transaction><REC><FIELD1>a</FIELD1></REC></Transaction>"
        );
        assert_eq!(fragments[1].index, 2);
    }

    #[test]
    fn passes_can_run_in_either_order() {
        let mut decoder = RowsetDecoder::from_bytes(SYNC);
        assert_eq!(decoder.transactions().unwrap().count(), 2);
        assert_eq!(decoder.read_header().unwrap().message_name, "SYNC_MESSAGE");
        assert_eq!(decoder.transactions().unwrap().count(), 2);
    }

    #[test]
    fn inherited_namespaces_are_declared_on_fragment() {
        let xml = r#"<m:SYNC xmlns="urn:default" xmlns:m="urn:msg">
            <FieldTypes/>
            <m:Transaction id="1"><m:REC/></m:Transaction>
        </m:SYNC>"#;
        let mut decoder = RowsetDecoder::from_bytes(xml);
        let fragment = decoder.transactions().unwrap().next().unwrap().unwrap();

        assert!(fragment.xml.starts_with("<m:Transaction id=\"1\""));
        assert!(fragment.xml.contains(r#"xmlns="urn:default""#));
        assert!(fragment.xml.contains(r#"xmlns:m="urn:msg""#));
        assert!(XmlNode::parse(&fragment.xml).is_ok());
    }

    #[test]
    fn own_declaration_shadows_inherited() {
        let xml = r#"<SYNC xmlns:p="urn:outer"><FieldTypes/>
            <p:Transaction xmlns:p="urn:inner"/></SYNC>"#;
        let mut decoder = RowsetDecoder::from_bytes(xml);
        let fragment = decoder.transactions().unwrap().next().unwrap().unwrap();
        assert!(fragment.xml.contains("urn:inner"));
        assert!(!fragment.xml.contains("urn:outer"));
    }

    #[test]
    fn nested_transactions_are_emitted_in_end_order() {
        let xml = "<SYNC><FieldTypes/><Transaction n=\"outer\"><Transaction>x</Transaction></Transaction></SYNC>";
        let mut decoder = RowsetDecoder::from_bytes(xml);
        let fragments: Vec<_> = decoder
            .transactions()
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].index, 1);
        assert_eq!(fragments[0].xml, "<Transaction>x</Transaction>");
        assert_eq!(fragments[1].index, 2);
        assert_eq!(
            fragments[1].xml,
            "<Transaction n=\"outer\"><Transaction>x</Transaction></Transaction>"
        );
    }

    #[test]
    fn nested_transaction_inherits_outer_namespaces() {
        let xml = r#"<SYNC><FieldTypes/><p:Transaction xmlns:p="urn:p"><p:Transaction/></p:Transaction></SYNC>"#;
        let mut decoder = RowsetDecoder::from_bytes(xml);
        let inner = decoder.transactions().unwrap().next().unwrap().unwrap();
        assert!(inner.xml.contains(r#"xmlns:p="urn:p""#));
        assert!(XmlNode::parse(&inner.xml).is_ok());
    }

    #[test]
    fn text_after_root_is_malformed() {
        let mut decoder =
            RowsetDecoder::from_bytes("<SYNC><FieldTypes/><Transaction/></SYNC>junk");
        let results: Vec<_> = decoder.transactions().unwrap().collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().index, 1);
        assert!(matches!(results[1], Err(DecodeError::MalformedDocument { .. })));
    }

    #[test]
    fn text_before_root_is_malformed() {
        let mut decoder = RowsetDecoder::from_bytes("junk<SYNC><FieldTypes/></SYNC>");
        assert!(matches!(
            decoder.read_header(),
            Err(DecodeError::MalformedDocument { .. })
        ));
        let mut decoder = RowsetDecoder::from_bytes("\n  <SYNC><FieldTypes/></SYNC>\n");
        assert!(decoder.read_header().is_ok());
        assert_eq!(decoder.transactions().unwrap().count(), 0);
    }

    #[test]
    fn comments_dropped_cdata_kept() {
        let xml = "<SYNC><Transaction><!-- note --><F><![CDATA[a<b]]></F></Transaction></SYNC>";
        let mut decoder = RowsetDecoder::from_bytes(xml);
        let fragment = decoder.transactions().unwrap().next().unwrap().unwrap();
        assert_eq!(fragment.xml, "<Transaction><F><![CDATA[a<b]]></F></Transaction>");
    }

    #[test]
    fn escaped_text_survives_reserialization() {
        let xml = r#"<SYNC><Transaction><F a="x &amp; y">1 &lt; 2</F></Transaction></SYNC>"#;
        let mut decoder = RowsetDecoder::from_bytes(xml);
        let fragment = decoder.transactions().unwrap().next().unwrap().unwrap();
        let node = XmlNode::parse(&fragment.xml).unwrap();
        let field = node.child("F").unwrap();
        assert_eq!(field.text, "1 < 2");
        assert_eq!(field.attribute("a"), Some("x & y"));
    }

    #[test]
    fn missing_field_types() {
        let mut decoder = RowsetDecoder::from_bytes("<SYNC><Transaction/></SYNC>");
        assert!(matches!(
            decoder.read_header().unwrap_err(),
            DecodeError::MissingFieldTypes
        ));
    }

    #[test]
    fn empty_document_is_malformed() {
        let mut decoder = RowsetDecoder::from_bytes("");
        assert!(matches!(
            decoder.read_header().unwrap_err(),
            DecodeError::MalformedDocument { .. }
        ));
        let mut items = decoder.transactions().unwrap();
        assert!(matches!(items.next(), Some(Err(DecodeError::MalformedDocument { .. }))));
        assert!(items.next().is_none());
    }

    #[test]
    fn second_root_is_malformed() {
        let mut decoder =
            RowsetDecoder::from_bytes("<A><Transaction/></A><B><Transaction/></B>");
        let results: Vec<_> = decoder.transactions().unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(DecodeError::MalformedDocument { .. })));
    }
}
