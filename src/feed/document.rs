//! A small owned element tree built from quick-xml events.
//!
//! Feed parsing needs random access to an item's children and attributes,
//! which a streaming reader does not give us. Documents are fully buffered
//! anyway, so we materialize the tree once and hand out owned sub-trees.

use quick_xml::escape::{resolve_html5_entity, resolve_xml_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// SEC-003: Maximum element nesting depth. Real feeds sit well under 20.
const MAX_DEPTH: usize = 256;

/// Errors raised when bytes are not a well-formed XML document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The tokenizer rejected the input (syntax error, mismatched end tag, ...).
    #[error("XML parse error: {0}")]
    Xml(String),

    /// The document ended while elements were still open.
    #[error("Unclosed element <{0}> at end of document")]
    Unclosed(String),

    /// A second top-level element appeared after the root was closed.
    #[error("Multiple root elements (found <{0}> after the root)")]
    MultipleRoots(String),

    /// No element at all, e.g. an HTML error page rendered as plain text.
    #[error("Document has no root element")]
    NoRootElement,

    /// SEC-003: nesting depth exceeds safety limit.
    #[error("Element nesting exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),
}

/// One XML element with its attributes, direct text and child elements.
///
/// Names are kept qualified (`content:encoded`, `media:thumbnail`), which is
/// how feeds conventionally spell their extension elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn from_start(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Self {
        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = match attr {
                Ok(attr) => attr,
                Err(err) => {
                    tracing::debug!(error = %err, "Skipping malformed XML attribute");
                    continue;
                }
            };
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = match reader.decoder().decode(&attr.value) {
                Ok(v) => unescape_lenient(&v),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            attributes.push((key, value));
        }

        Self {
            name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
            attributes,
            text: String::new(),
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Concatenated text and CDATA directly inside this element.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// Child elements with the given qualified name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// True if this element or any element below it is named `name`.
    pub fn contains_named(&self, name: &str) -> bool {
        self.name == name || self.children.iter().any(|c| c.contains_named(name))
    }

    /// Moves out every element named `name` in this sub-tree, in document
    /// order. A match is taken whole; elements nested inside a match are not
    /// reported separately.
    pub fn take_descendants_named(self, name: &str) -> Vec<Element> {
        let mut found = Vec::new();
        self.collect_named(name, &mut found);
        found
    }

    fn collect_named(self, name: &str, found: &mut Vec<Element>) {
        if self.name == name {
            found.push(self);
            return;
        }
        for child in self.children {
            child.collect_named(name, found);
        }
    }
}

/// A parsed XML document.
#[derive(Debug, Clone)]
pub struct Document {
    root: Element,
}

impl Document {
    /// Parses a complete document.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] unless the bytes contain exactly one root
    /// element with every tag properly closed.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        // SEC-002: quick-xml never expands <!ENTITY> declarations, so external
        // entities in a hostile feed are inert.
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    if stack.is_empty() && root.is_some() {
                        return Err(ParseError::MultipleRoots(
                            String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                        ));
                    }
                    if stack.len() >= MAX_DEPTH {
                        return Err(ParseError::MaxDepthExceeded(MAX_DEPTH));
                    }
                    stack.push(Element::from_start(&e, &reader));
                }
                Ok(Event::Empty(e)) => {
                    let element = Element::from_start(&e, &reader);
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(_)) => {
                    // quick-xml already verified the end name matches.
                    let element = stack.pop().ok_or_else(|| {
                        ParseError::Xml("closing tag without matching opening tag".to_string())
                    })?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(e)) => {
                    if let Some(current) = stack.last_mut() {
                        match reader.decoder().decode(&e) {
                            Ok(text) => current.text.push_str(&unescape_lenient(&text)),
                            Err(_) => current.text.push_str(&String::from_utf8_lossy(&e)),
                        }
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(current) = stack.last_mut() {
                        match e.decode() {
                            Ok(text) => current.text.push_str(&text),
                            Err(_) => current.text.push_str(&String::from_utf8_lossy(&e)),
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(ParseError::Xml(e.to_string())),
                _ => {}
            }
            buf.clear();
        }

        if let Some(open) = stack.pop() {
            return Err(ParseError::Unclosed(open.name));
        }

        root.map(|root| Document { root })
            .ok_or(ParseError::NoRootElement)
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn into_root(self) -> Element {
        self.root
    }
}

fn resolve_entity(name: &str) -> Option<&'static str> {
    resolve_xml_entity(name).or_else(|| resolve_html5_entity(name))
}

/// Unescapes XML, numeric and HTML5 entity references. Feeds routinely use
/// HTML entities without declaring them; a reference that still does not
/// resolve, or a bare `&`, is kept as written.
fn unescape_lenient(raw: &str) -> String {
    if let Ok(text) = unescape_with(raw, resolve_entity) {
        return text.into_owned();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match tail[1..].find(['&', ';']).map(|i| i + 1) {
            Some(end) if tail.as_bytes()[end] == b';' => {
                let reference = &tail[..=end];
                match unescape_with(reference, resolve_entity) {
                    Ok(text) => out.push_str(&text),
                    Err(_) => out.push_str(reference),
                }
                rest = &tail[end + 1..];
            }
            _ => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Hands a finished element to its parent, or installs it as the root.
fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), ParseError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(ParseError::MultipleRoots(element.name)),
    }
}
