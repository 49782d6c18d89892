//! Single-slot cache for the resident page and its display list

use log::{debug, warn};

use crate::engine::{DocumentEngine, Rect};

/// Natural page size in page units
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

enum DisplayListSlot<L> {
    Pending,
    Ready(L),
    Failed,
}

/// The one page currently loaded, plus what was derived from it
pub struct ResidentPage<E: DocumentEngine> {
    index: usize,
    bounds: Rect,
    display_list: DisplayListSlot<E::DisplayList>,
    page: E::Page,
}

impl<E: DocumentEngine> ResidentPage<E> {
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    #[must_use]
    pub fn size(&self) -> PageSize {
        PageSize {
            width: self.bounds.width(),
            height: self.bounds.height(),
        }
    }

    #[must_use]
    pub fn page(&self) -> &E::Page {
        &self.page
    }

    /// Display list for this page, built on first use.
    ///
    /// A failed build is remembered: the page renders nothing until it is
    /// replaced.
    pub fn materialize_display_list(&mut self, engine: &E) -> Option<&E::DisplayList> {
        if let DisplayListSlot::Pending = self.display_list {
            self.display_list = match engine.to_display_list(&self.page) {
                Ok(list) => {
                    debug!("Built display list for page {}", self.index);
                    DisplayListSlot::Ready(list)
                }
                Err(e) => {
                    warn!("Display list for page {} unavailable: {e}", self.index);
                    DisplayListSlot::Failed
                }
            };
        }
        match &self.display_list {
            DisplayListSlot::Ready(list) => Some(list),
            DisplayListSlot::Pending | DisplayListSlot::Failed => None,
        }
    }

    /// Releases the display list before the page it was derived from
    fn release(self) {
        let ResidentPage {
            display_list, page, ..
        } = self;
        drop(display_list);
        drop(page);
    }
}

/// Holds at most one loaded page
pub struct PageCache<E: DocumentEngine> {
    resident: Option<ResidentPage<E>>,
}

impl<E: DocumentEngine> Default for PageCache<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: DocumentEngine> PageCache<E> {
    #[must_use]
    pub fn new() -> Self {
        Self { resident: None }
    }

    #[must_use]
    pub fn resident_index(&self) -> Option<usize> {
        self.resident.as_ref().map(ResidentPage::index)
    }

    /// Makes `index` (clamped into the document) the resident page.
    ///
    /// A hit returns the existing page untouched. A miss releases the old page
    /// first; if loading the new one fails the cache stays empty.
    pub fn ensure_resident(
        &mut self,
        engine: &E,
        doc: &E::Document,
        page_count: usize,
        index: usize,
    ) -> Option<&mut ResidentPage<E>> {
        if page_count == 0 {
            self.invalidate();
            return None;
        }
        let index = index.min(page_count - 1);

        if self.resident_index() == Some(index) {
            return self.resident.as_mut();
        }

        self.invalidate();

        let page = match engine.load_page(doc, index) {
            Ok(page) => page,
            Err(e) => {
                warn!("Failed to load page {index}: {e}");
                return None;
            }
        };
        let bounds = match engine.page_bounds(&page) {
            Ok(bounds) => bounds,
            Err(e) => {
                warn!("Failed to read bounds of page {index}: {e}");
                return None;
            }
        };

        debug!(
            "Page {index} resident ({}x{})",
            bounds.width(),
            bounds.height()
        );
        self.resident = Some(ResidentPage {
            index,
            bounds,
            display_list: DisplayListSlot::Pending,
            page,
        });
        self.resident.as_mut()
    }

    /// Drops the resident page, display list first
    pub fn invalidate(&mut self) {
        if let Some(resident) = self.resident.take() {
            debug!("Releasing page {}", resident.index);
            resident.release();
        }
    }
}
