//! Text extraction, search, links, and selection

use log::{debug, trace, warn};

use super::cache::PageCache;
use crate::engine::{DocumentEngine, EngineResult, Link, Point, Quad, SearchHits, SelectMode};

/// Highlight geometry and copied text of a selection gesture
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionResult {
    pub quads: Vec<Quad>,
    pub text: String,
}

impl SelectionResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quads.is_empty() && self.text.is_empty()
    }
}

/// Text queries against the resident page (and, for whole-document text, every page)
pub struct TextQueryService<'a, E: DocumentEngine> {
    engine: &'a E,
    doc: &'a E::Document,
    cache: &'a mut PageCache<E>,
    page_count: usize,
}

impl<'a, E: DocumentEngine> TextQueryService<'a, E> {
    pub fn new(
        engine: &'a E,
        doc: &'a E::Document,
        cache: &'a mut PageCache<E>,
        page_count: usize,
    ) -> Self {
        Self {
            engine,
            doc,
            cache,
            page_count,
        }
    }

    /// Plain text of one page; empty when the page or its text is unavailable
    pub fn page_text(&mut self, page: usize) -> String {
        let Some(resident) = self
            .cache
            .ensure_resident(self.engine, self.doc, self.page_count, page)
        else {
            return String::new();
        };
        match self.engine.structured_text(resident.page()) {
            Ok(text) => text.as_text(),
            Err(e) => {
                warn!("Text extraction failed on page {}: {e}", resident.index());
                String::new()
            }
        }
    }

    /// Plain text of every page, each followed by a newline.
    ///
    /// Pages are loaded on their own handles so the resident page is left
    /// alone. Any failure yields an empty string rather than a partial dump.
    pub fn document_text(&self) -> String {
        match self.collect_document_text() {
            Ok(text) => text,
            Err(e) => {
                warn!("Whole-document text extraction abandoned: {e}");
                String::new()
            }
        }
    }

    fn collect_document_text(&self) -> EngineResult<String> {
        let count = self.engine.count_pages(self.doc)?;
        let mut all = String::new();
        for index in 0..count {
            let page = self.engine.load_page(self.doc, index)?;
            let text = self.engine.structured_text(&page)?;
            drop(page);
            trace!("Page {index} html: {}", text.as_html());
            all.push_str(&text.as_text());
            all.push('\n');
        }
        debug!("Extracted {} chars from {count} pages", all.len());
        Ok(all)
    }

    /// Matches of `query` on a page; empty means no matches
    pub fn search(&mut self, page: usize, query: &str) -> SearchHits {
        let Some(resident) = self
            .cache
            .ensure_resident(self.engine, self.doc, self.page_count, page)
        else {
            return Vec::new();
        };
        match self.engine.search_page(resident.page(), query) {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Search failed on page {}: {e}", resident.index());
                Vec::new()
            }
        }
    }

    pub fn page_links(&mut self, page: usize) -> Vec<Link> {
        let Some(resident) = self
            .cache
            .ensure_resident(self.engine, self.doc, self.page_count, page)
        else {
            return Vec::new();
        };
        match self.engine.page_links(resident.page()) {
            Ok(links) => links,
            Err(e) => {
                warn!("Links unavailable on page {}: {e}", resident.index());
                Vec::new()
            }
        }
    }

    /// Page a link leads to; `None` for external or unresolvable links
    pub fn resolve_link(&self, link: &Link) -> Option<usize> {
        match self.engine.resolve_link(self.doc, link) {
            Ok(page) => page,
            Err(e) => {
                warn!("Failed to resolve link {:?}: {e}", link.target);
                None
            }
        }
    }

    /// Word-snapped selection between the pointer-down and current points
    pub fn select(&mut self, down: Point, current: Point, page: usize) -> SelectionResult {
        let Some(resident) = self
            .cache
            .ensure_resident(self.engine, self.doc, self.page_count, page)
        else {
            return SelectionResult::default();
        };
        let text = match self.engine.structured_text(resident.page()) {
            Ok(text) => text,
            Err(e) => {
                warn!("Selection unavailable on page {}: {e}", resident.index());
                return SelectionResult::default();
            }
        };

        let (a, b) = text.snap_selection(down, current, SelectMode::Words);
        SelectionResult {
            quads: text.highlight(a, b),
            text: text.copy(a, b),
        }
    }
}
