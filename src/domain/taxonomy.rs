//! Tagged-stream codec for taxonomy exports.
//!
//! A taxonomy file is plain SQL text split into named segments by marker
//! lines of the exact shape `-- BEGIN <BLOCK>`:
//!
//! ```text
//! -- Taxonomies Export Generated on …      ← preamble (never replayed)
//! -- BEGIN PRODUCT ATTRIBUTES
//! INSERT INTO wp_terms …;                  ← segment: ProductAttributes
//! -- BEGIN PRODUCT CATEGORIES
//! INSERT INTO wp_terms …;                  ← segment: ProductCategories
//! ```
//!
//! The codec knows nothing about SQL: a payload is opaque text. Markers are
//! matched case-insensitively when decoding.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MARKER_PREFIX: &str = "-- BEGIN ";

/// A named partition of the taxonomy stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaxonomyBlock {
    ProductCategories,
    ProductTags,
    ProductAttributes,
}

impl TaxonomyBlock {
    pub const ALL: [TaxonomyBlock; 3] = [
        TaxonomyBlock::ProductCategories,
        TaxonomyBlock::ProductTags,
        TaxonomyBlock::ProductAttributes,
    ];

    /// Upper-case name written after `-- BEGIN `.
    pub fn label(&self) -> &'static str {
        match self {
            TaxonomyBlock::ProductCategories => "PRODUCT CATEGORIES",
            TaxonomyBlock::ProductTags => "PRODUCT TAGS",
            TaxonomyBlock::ProductAttributes => "PRODUCT ATTRIBUTES",
        }
    }

    /// Block a source taxonomy name belongs to. Attributes are every
    /// taxonomy starting with `pa_`.
    pub fn for_taxonomy(taxonomy: &str) -> Option<Self> {
        match taxonomy {
            "product_cat" => Some(TaxonomyBlock::ProductCategories),
            "product_tag" => Some(TaxonomyBlock::ProductTags),
            t if t.starts_with("pa_") => Some(TaxonomyBlock::ProductAttributes),
            _ => None,
        }
    }

    /// Full marker line, newline included.
    pub fn marker(&self) -> String {
        format!("{}{}\n", MARKER_PREFIX, self.label())
    }

    /// Recognise a marker line. Case-insensitive, trailing whitespace and
    /// text after the block name are ignored.
    pub fn parse_marker(line: &str) -> Option<Self> {
        let upper = line.trim_end().to_ascii_uppercase();
        let rest = upper.strip_prefix(MARKER_PREFIX)?;
        TaxonomyBlock::ALL
            .into_iter()
            .find(|b| rest.starts_with(b.label()))
    }
}

impl fmt::Display for TaxonomyBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TaxonomyBlock {
    type Err = String;

    /// Accepts `product tags`, `PRODUCT-TAGS`, `product_tags`, …
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised: String = s
            .trim()
            .chars()
            .map(|c| if c == '-' || c == '_' { ' ' } else { c.to_ascii_uppercase() })
            .collect();
        TaxonomyBlock::ALL
            .into_iter()
            .find(|b| b.label() == normalised)
            .ok_or_else(|| format!("unknown taxonomy block '{}'", s))
    }
}

/// One decoded segment: everything after a marker up to the next marker or
/// end of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedSegment {
    pub block: TaxonomyBlock,
    pub payload: String,
}

/// Result of decoding a tagged stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaggedStream {
    /// Text before the first marker. Belongs to no block.
    pub preamble: String,
    pub segments: Vec<TaggedSegment>,
}

/// Encode one segment: marker line followed by the payload.
pub fn encode_segment(block: TaxonomyBlock, payload: &str) -> String {
    let mut out = block.marker();
    out.push_str(payload);
    out
}

/// Split `text` into its preamble and named segments.
pub fn decode(text: &str) -> TaggedStream {
    let mut stream = TaggedStream::default();
    let mut open: Option<TaggedSegment> = None;

    for line in text.split_inclusive('\n') {
        if let Some(block) = TaxonomyBlock::parse_marker(line) {
            if let Some(done) = open.take() {
                stream.segments.push(done);
            }
            open = Some(TaggedSegment {
                block,
                payload: String::new(),
            });
            continue;
        }
        match open.as_mut() {
            Some(seg) => seg.payload.push_str(line),
            None => stream.preamble.push_str(line),
        }
    }
    if let Some(done) = open {
        stream.segments.push(done);
    }
    stream
}
