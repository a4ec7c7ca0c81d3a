use crate::domain::error::MigrationError;
use crate::domain::ports::StatementSink;
use crate::domain::taxonomy::TaxonomyBlock;

/// Tracks which taxonomy block the export stream is in and writes a marker
/// whenever a new block starts.
///
/// Rows must arrive ordered by taxonomy name. Two consecutive taxonomies of
/// the same block (`pa_color`, `pa_size`) share one marker. A taxonomy that
/// maps to no block puts the tagger in an unclassified state: its rows
/// belong to no block and must not be written.
#[derive(Debug, Default)]
pub struct BlockTagger {
    open: Option<TaxonomyBlock>,
    last_taxonomy: Option<String>,
    unclassified: bool,
    markers: usize,
}

impl BlockTagger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block whose marker must precede the row of `taxonomy`, if any.
    pub fn observe(&mut self, taxonomy: &str) -> Option<TaxonomyBlock> {
        if self.last_taxonomy.as_deref() == Some(taxonomy) {
            return None;
        }
        self.last_taxonomy = Some(taxonomy.to_string());
        match TaxonomyBlock::for_taxonomy(taxonomy) {
            Some(block) => self.enter(block),
            None => {
                self.unclassified = true;
                None
            }
        }
    }

    /// Switch to `block` explicitly. `None` if it is already open.
    ///
    /// Unclassified rows are never written, so coming back to the block that
    /// was open before them needs no new marker.
    pub fn enter(&mut self, block: TaxonomyBlock) -> Option<TaxonomyBlock> {
        self.unclassified = false;
        if self.open == Some(block) {
            return None;
        }
        self.open = Some(block);
        self.markers += 1;
        Some(block)
    }

    /// [`observe`](Self::observe) and write the marker, if one is due.
    /// Returns the block the row belongs to; `None` means the row must be
    /// dropped.
    pub fn tag(
        &mut self,
        taxonomy: &str,
        sink: &mut dyn StatementSink,
    ) -> Result<Option<TaxonomyBlock>, MigrationError> {
        if let Some(block) = self.observe(taxonomy) {
            sink.write_marker(&block.marker())?;
        }
        Ok(self.current())
    }

    /// Block the next row belongs to, `None` while unclassified.
    pub fn current(&self) -> Option<TaxonomyBlock> {
        if self.unclassified {
            None
        } else {
            self.open
        }
    }

    pub fn markers_emitted(&self) -> usize {
        self.markers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::splitter::StreamSink;

    #[test]
    fn category_category_tag_attribute_gives_three_markers() {
        let mut sink = StreamSink::new(Vec::new());
        let mut tagger = BlockTagger::new();
        for tax in ["product_cat", "product_cat", "product_tag", "pa_color"] {
            tagger.tag(tax, &mut sink).unwrap();
            sink.write_statement(&format!("-- row {}\n", tax)).unwrap();
        }
        let out = String::from_utf8(sink.into_inner()).unwrap();
        let markers: Vec<&str> = out.lines().filter(|l| l.starts_with("-- BEGIN")).collect();
        assert_eq!(
            markers,
            vec![
                "-- BEGIN PRODUCT CATEGORIES",
                "-- BEGIN PRODUCT TAGS",
                "-- BEGIN PRODUCT ATTRIBUTES"
            ]
        );
        assert_eq!(tagger.markers_emitted(), 3);
    }

    #[test]
    fn consecutive_attribute_taxonomies_share_a_block() {
        let mut tagger = BlockTagger::new();
        assert_eq!(
            tagger.observe("pa_color"),
            Some(TaxonomyBlock::ProductAttributes)
        );
        assert_eq!(tagger.observe("pa_size"), None);
        assert_eq!(tagger.current(), Some(TaxonomyBlock::ProductAttributes));
    }

    #[test]
    fn unknown_taxonomy_emits_nothing() {
        let mut tagger = BlockTagger::new();
        assert_eq!(tagger.observe("product_type"), None);
        assert_eq!(tagger.current(), None);
        assert_eq!(tagger.markers_emitted(), 0);
    }

    #[test]
    fn unknown_taxonomy_after_a_block_is_unclassified() {
        let mut sink = StreamSink::new(Vec::new());
        let mut tagger = BlockTagger::new();
        assert_eq!(
            tagger.tag("product_cat", &mut sink).unwrap(),
            Some(TaxonomyBlock::ProductCategories)
        );
        assert_eq!(tagger.tag("product_shipping_class", &mut sink).unwrap(), None);
        assert_eq!(tagger.current(), None);

        // back to a known block: no duplicate marker for the same block
        assert_eq!(tagger.enter(TaxonomyBlock::ProductCategories), None);
        assert_eq!(tagger.current(), Some(TaxonomyBlock::ProductCategories));
        assert_eq!(
            tagger.tag("product_tag", &mut sink).unwrap(),
            Some(TaxonomyBlock::ProductTags)
        );
        assert_eq!(tagger.markers_emitted(), 2);
    }

    #[test]
    fn enter_is_idempotent() {
        let mut tagger = BlockTagger::new();
        tagger.observe("product_cat");
        assert_eq!(tagger.enter(TaxonomyBlock::ProductCategories), None);
        assert_eq!(
            tagger.enter(TaxonomyBlock::ProductTags),
            Some(TaxonomyBlock::ProductTags)
        );
    }
}
