// XML helpers for the SOAP leg of the credential login: pulling a tag's
// text out of a response, and writing escaped elements into a request.
//
// quick-xml never fetches external resources; documents carrying a
// DOCTYPE are rejected outright so no entity declarations are honoured.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::debug;

use crate::error::{Result, SharepointError};

/// Text of the first element whose local name is `tag_name`, whatever
/// its namespace prefix.
///
/// Returns `None` when no such element exists or when the body is not
/// well-formed XML. Entity references are unescaped; nested elements'
/// text is not included.
pub fn extract_tag(xml: &str, tag_name: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let wanted = tag_name.as_bytes();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == wanted => {
                return read_element_text(&mut reader);
            }
            Ok(Event::Empty(e)) if e.local_name().as_ref() == wanted => {
                return Some(String::new());
            }
            Ok(Event::DocType(_)) => {
                debug!("Refusing XML document with a DOCTYPE declaration");
                return None;
            }
            Ok(Event::Eof) => return None,
            Err(e) => {
                debug!(error = %e, "Malformed XML body");
                return None;
            }
            Ok(_) => {}
        }
    }
}

fn read_element_text(reader: &mut Reader<&[u8]>) -> Option<String> {
    let mut text = String::new();
    let mut depth = 0usize;

    loop {
        match reader.read_event().ok()? {
            Event::Text(t) if depth == 0 => text.push_str(&t.unescape().ok()?),
            Event::CData(c) if depth == 0 => text.push_str(std::str::from_utf8(&c).ok()?),
            Event::Start(_) => depth += 1,
            Event::End(_) if depth == 0 => return Some(text),
            Event::End(_) => depth -= 1,
            // unterminated element
            Event::Eof => return None,
            _ => {}
        }
    }
}

/// Thin wrapper over `quick_xml::Writer` for building small documents
/// element by element. Text and attribute values are always escaped.
pub struct XmlBuilder {
    writer: Writer<Vec<u8>>,
}

impl XmlBuilder {
    pub fn new() -> Self {
        Self {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    pub fn open(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<&mut Self> {
        let start = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.emit(Event::Start(start))
    }

    pub fn close(&mut self, name: &str) -> Result<&mut Self> {
        self.emit(Event::End(BytesEnd::new(name)))
    }

    /// `<name attrs>text</name>`
    pub fn leaf(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) -> Result<&mut Self> {
        self.open(name, attributes)?;
        self.emit(Event::Text(BytesText::new(text)))?;
        self.close(name)
    }

    pub fn finish(self) -> Result<String> {
        String::from_utf8(self.writer.into_inner())
            .map_err(|e| SharepointError::Auth(format!("invalid XML output: {e}")))
    }

    fn emit(&mut self, event: Event<'_>) -> Result<&mut Self> {
        self.writer
            .write_event(event)
            .map_err(|e| SharepointError::Auth(format!("cannot write XML: {e}")))?;
        Ok(self)
    }
}

impl Default for XmlBuilder {
    fn default() -> Self {
        Self::new()
    }
}
