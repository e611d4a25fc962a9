use super::document::{Document, Element, ParseError};

const RSS_ITEM: &str = "item";
const ATOM_ENTRY: &str = "entry";

/// One candidate news node (`<item>` or `<entry>`) before normalization.
#[derive(Debug, Clone)]
pub struct RawItem {
    node: Element,
}

impl RawItem {
    pub fn node(&self) -> &Element {
        &self.node
    }
}

/// Single-pass sequence of raw item nodes from one parsed feed.
///
/// The feed is already buffered in memory; to walk it again, parse the bytes
/// again.
#[derive(Debug)]
pub struct RawItems {
    inner: std::vec::IntoIter<Element>,
}

impl Iterator for RawItems {
    type Item = RawItem;

    fn next(&mut self) -> Option<RawItem> {
        self.inner.next().map(|node| RawItem { node })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for RawItems {}

/// Parses feed bytes into raw item nodes.
///
/// Selects every RSS `<item>` anywhere in the document (RSS 0.9x/2.0 keep
/// them under `<channel>`, RSS 1.0 beside it). When there are none, falls
/// back to Atom `<entry>` elements.
///
/// # Errors
///
/// Returns [`ParseError`] if the bytes are not well-formed XML.
pub fn parse_feed(bytes: &[u8]) -> Result<RawItems, ParseError> {
    let root = Document::parse(bytes)?.into_root();

    let tag = if root.contains_named(RSS_ITEM) {
        RSS_ITEM
    } else {
        ATOM_ENTRY
    };
    let nodes = root.take_descendants_named(tag);
    tracing::debug!(tag = tag, nodes = nodes.len(), "Selected feed item nodes");

    Ok(RawItems {
        inner: nodes.into_iter(),
    })
}
