//! Viewport layout and reflow

use log::{debug, info, warn};

use crate::engine::{DocumentEngine, EngineResult, LayoutParams};

/// Page count and reflow capability after a re-pagination
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Repagination {
    pub page_count: usize,
    pub reflowable: bool,
}

impl Repagination {
    /// Reads the pagination of `doc`; a failed query counts as an empty, fixed-layout document
    pub fn query<E: DocumentEngine>(engine: &E, doc: &E::Document) -> Self {
        let page_count = engine.count_pages(doc).unwrap_or_else(|e| {
            warn!("Failed to count pages: {e}");
            0
        });
        let reflowable = engine.is_reflowable(doc).unwrap_or_else(|e| {
            warn!("Failed to query reflow capability: {e}");
            false
        });
        Self {
            page_count,
            reflowable,
        }
    }
}

/// Last layout applied to the document
#[derive(Clone, Copy, Debug)]
pub struct LayoutState {
    applied: LayoutParams,
}

impl LayoutState {
    #[must_use]
    pub fn new(applied: LayoutParams) -> Self {
        Self { applied }
    }

    #[must_use]
    pub fn applied(&self) -> LayoutParams {
        self.applied
    }

    #[must_use]
    pub fn needs_reflow(&self, requested: LayoutParams) -> bool {
        self.applied != requested
    }

    /// Re-paginates `doc` for `requested` and maps `old_page` onto the new pagination.
    ///
    /// Returns `old_page` untouched when the layout is unchanged. Otherwise the
    /// page is bookmarked under the old layout, the layout is applied, and
    /// `on_repaginate` runs (so callers can drop state tied to the old page
    /// numbering) before the bookmark is resolved under the new layout.
    pub fn reflow<E: DocumentEngine>(
        &mut self,
        engine: &E,
        doc: &mut E::Document,
        old_page: usize,
        requested: LayoutParams,
        on_repaginate: impl FnOnce(&E::Document, Repagination),
    ) -> EngineResult<usize> {
        if !self.needs_reflow(requested) {
            return Ok(old_page);
        }

        info!(
            "Layout {}x{} em {} -> {}x{} em {}",
            self.applied.width,
            self.applied.height,
            self.applied.em,
            requested.width,
            requested.height,
            requested.em
        );

        let mark = engine.make_bookmark(doc, old_page)?;
        engine.layout(doc, requested)?;
        self.applied = requested;

        let repagination = Repagination::query(engine, doc);
        on_repaginate(&*doc, repagination);

        let page = engine.find_bookmark(doc, mark)?;
        let page = page.min(repagination.page_count.saturating_sub(1));
        debug!(
            "Page {old_page} maps to {page} of {} after reflow",
            repagination.page_count
        );
        Ok(page)
    }
}
