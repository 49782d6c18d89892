//! Page session manager
//!
//! A [`Session`] owns one open document and everything derived from it: the
//! applied layout, the single resident page with its display list, and the
//! cached outline. Every operation takes the session lock for its whole
//! duration, so rendering, search, and selection never observe a half-done
//! reflow or page switch.

mod cache;
mod layout;
mod navigation;
mod render;
mod text;

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{info, warn};

use crate::engine::{
    CancelToken, DocumentEngine, DocumentSource, EngineError, LayoutParams, Link, MetadataKey,
    PixelBuffer, Point, SearchHits,
};

pub use cache::{PageCache, PageSize, ResidentPage};
pub use layout::{LayoutState, Repagination};
pub use navigation::{NavigationService, TocEntry, TocTarget, flatten_outline};
pub use render::{DEFAULT_RESOLUTION, Patch, RenderCoordinator, RenderOutcome, TileRequest};
pub use text::{SelectionResult, TextQueryService};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session has been destroyed")]
    Destroyed,

    #[error(
        "buffer {buffer_width}x{buffer_height} cannot hold a {patch_width}x{patch_height} patch"
    )]
    BufferTooSmall {
        buffer_width: u32,
        buffer_height: u32,
        patch_width: u32,
        patch_height: u32,
    },

    #[error("invalid layout {width}x{height} em {em}")]
    InvalidLayout { width: f32, height: f32, em: f32 },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Rendering resolution and the layout applied at open
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionConfig {
    /// Device resolution in dots per inch
    pub resolution: u32,
    pub layout: LayoutParams,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            layout: LayoutParams::default(),
        }
    }
}

/// Pagination facts, trustworthy only once the document is unlocked
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub reflowable: bool,
}

impl From<Repagination> for DocumentInfo {
    fn from(value: Repagination) -> Self {
        Self {
            page_count: value.page_count,
            reflowable: value.reflowable,
        }
    }
}

// Fields drop in declaration order: page state before the document.
struct Inner<E: DocumentEngine> {
    cache: PageCache<E>,
    navigation: NavigationService,
    layout: LayoutState,
    info: DocumentInfo,
    doc: E::Document,
}

impl<E: DocumentEngine> Inner<E> {
    fn text<'a>(&'a mut self, engine: &'a E) -> TextQueryService<'a, E> {
        TextQueryService::new(engine, &self.doc, &mut self.cache, self.info.page_count)
    }
}

/// A stateful rendering session over one document
pub struct Session<E: DocumentEngine> {
    engine: E,
    config: SessionConfig,
    state: Mutex<Option<Inner<E>>>,
}

impl<E: DocumentEngine> Session<E> {
    /// Opens `source` and applies the configured layout
    pub fn open(
        engine: E,
        source: DocumentSource,
        magic: &str,
        config: SessionConfig,
    ) -> SessionResult<Self> {
        check_layout(config.layout)?;
        let mut doc = engine.open_document(source, magic)?;
        engine.layout(&mut doc, config.layout)?;
        let info = DocumentInfo::from(Repagination::query(&engine, &doc));
        info!(
            "Opened {magic:?} document: {} pages, reflowable={}",
            info.page_count, info.reflowable
        );

        Ok(Self {
            engine,
            config,
            state: Mutex::new(Some(Inner {
                cache: PageCache::new(),
                navigation: NavigationService::new(),
                layout: LayoutState::new(config.layout),
                info,
                doc,
            })),
        })
    }

    #[must_use]
    pub fn config(&self) -> SessionConfig {
        self.config
    }

    fn lock(&self) -> MutexGuard<'_, Option<Inner<E>>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with<T>(&self, f: impl FnOnce(&E, &mut Inner<E>) -> T) -> SessionResult<T> {
        let mut guard = self.lock();
        let inner = guard.as_mut().ok_or(SessionError::Destroyed)?;
        Ok(f(&self.engine, inner))
    }

    /// Document title from its metadata, if any
    pub fn title(&self) -> SessionResult<Option<String>> {
        self.with(|engine, inner| {
            engine
                .metadata(&inner.doc, MetadataKey::Title)
                .unwrap_or_else(|e| {
                    warn!("Title unavailable: {e}");
                    None
                })
        })
    }

    pub fn page_count(&self) -> SessionResult<usize> {
        self.with(|_, inner| inner.info.page_count)
    }

    pub fn is_reflowable(&self) -> SessionResult<bool> {
        self.with(|_, inner| inner.info.reflowable)
    }

    pub fn layout_params(&self) -> SessionResult<LayoutParams> {
        self.with(|_, inner| inner.layout.applied())
    }

    /// Re-paginates for a new viewport and returns where `old_page` now lives.
    ///
    /// Unchanged parameters return `old_page` without touching any cached state.
    /// Non-finite or non-positive parameters are rejected with nothing changed.
    pub fn layout(&self, old_page: usize, width: f32, height: f32, em: f32) -> SessionResult<usize> {
        let requested = LayoutParams::new(width, height, em);
        check_layout(requested)?;
        let mut guard = self.lock();
        let inner = guard.as_mut().ok_or(SessionError::Destroyed)?;
        let Inner {
            cache,
            navigation,
            layout,
            info,
            doc,
        } = inner;

        let page = layout.reflow(&self.engine, doc, old_page, requested, |doc, repagination| {
            *info = repagination.into();
            cache.invalidate();
            navigation.reload(&self.engine, doc);
        })?;
        Ok(page)
    }

    /// Natural size of `page` (clamped), which becomes the resident page
    pub fn page_size(&self, page: usize) -> SessionResult<Option<PageSize>> {
        self.with(|engine, inner| {
            inner
                .cache
                .ensure_resident(engine, &inner.doc, inner.info.page_count, page)
                .map(|resident| resident.size())
        })
    }

    /// Index of the resident page, if any
    pub fn resident_page(&self) -> SessionResult<Option<usize>> {
        self.with(|_, inner| inner.cache.resident_index())
    }

    /// Paints `request.patch` of the page raster into the top-left of `target`
    pub fn render_tile(
        &self,
        request: &TileRequest,
        target: &mut PixelBuffer,
        cancel: &CancelToken,
    ) -> SessionResult<RenderOutcome> {
        check_buffer(request, target)?;
        let resolution = self.config.resolution;
        self.with(|engine, inner| {
            RenderCoordinator::new(
                engine,
                &inner.doc,
                &mut inner.cache,
                inner.info.page_count,
                resolution,
            )
            .render_tile(request, target, cancel)
        })
    }

    /// Repaints a dirty patch; behaves exactly like [`Session::render_tile`]
    pub fn update_tile(
        &self,
        request: &TileRequest,
        target: &mut PixelBuffer,
        cancel: &CancelToken,
    ) -> SessionResult<RenderOutcome> {
        check_buffer(request, target)?;
        let resolution = self.config.resolution;
        self.with(|engine, inner| {
            RenderCoordinator::new(
                engine,
                &inner.doc,
                &mut inner.cache,
                inner.info.page_count,
                resolution,
            )
            .update_tile(request, target, cancel)
        })
    }

    pub fn page_links(&self, page: usize) -> SessionResult<Vec<Link>> {
        self.with(|engine, inner| inner.text(engine).page_links(page))
    }

    pub fn resolve_link(&self, link: &Link) -> SessionResult<Option<usize>> {
        self.with(|engine, inner| inner.text(engine).resolve_link(link))
    }

    pub fn search(&self, page: usize, query: &str) -> SessionResult<SearchHits> {
        self.with(|engine, inner| inner.text(engine).search(page, query))
    }

    pub fn page_text(&self, page: usize) -> SessionResult<String> {
        self.with(|engine, inner| inner.text(engine).page_text(page))
    }

    /// Text of the whole document, or an empty string if any page fails
    pub fn document_text(&self) -> SessionResult<String> {
        self.with(|engine, inner| inner.text(engine).document_text())
    }

    pub fn select(&self, down: Point, current: Point, page: usize) -> SessionResult<SelectionResult> {
        self.with(|engine, inner| inner.text(engine).select(down, current, page))
    }

    pub fn has_outline(&self) -> SessionResult<bool> {
        self.with(|engine, inner| inner.navigation.has_outline(engine, &inner.doc))
    }

    /// Flattened outline; empty when the document has none
    pub fn outline(&self) -> SessionResult<Vec<TocEntry>> {
        self.with(|engine, inner| {
            inner
                .navigation
                .outline(engine, &inner.doc)
                .map(|outline| flatten_outline(&outline))
                .unwrap_or_default()
        })
    }

    pub fn needs_password(&self) -> SessionResult<bool> {
        self.with(|engine, inner| NavigationService::needs_password(engine, &inner.doc))
    }

    /// Unlocks the document. Only a successful attempt changes any state.
    pub fn authenticate(&self, password: &str) -> SessionResult<bool> {
        self.with(|engine, inner| {
            let unlocked = inner
                .navigation
                .authenticate(engine, &mut inner.doc, password);
            if unlocked {
                inner.cache.invalidate();
                inner.info = Repagination::query(engine, &inner.doc).into();
                info!("{} pages after unlock", inner.info.page_count);
            }
            unlocked
        })
    }

    /// Releases the display list, the page, then the document.
    ///
    /// Safe to call more than once; every other call fails afterwards.
    pub fn destroy(&self) {
        let mut guard = self.lock();
        if let Some(mut inner) = guard.take() {
            inner.cache.invalidate();
            drop(inner);
            info!("Session destroyed");
        }
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.lock().is_none()
    }
}

impl<E: DocumentEngine> Drop for Session<E> {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn check_layout(layout: LayoutParams) -> SessionResult<()> {
    if !layout.is_valid() {
        return Err(SessionError::InvalidLayout {
            width: layout.width,
            height: layout.height,
            em: layout.em,
        });
    }
    Ok(())
}

fn check_buffer(request: &TileRequest, target: &PixelBuffer) -> SessionResult<()> {
    let patch = request.patch;
    if target.width() < patch.width || target.height() < patch.height {
        return Err(SessionError::BufferTooSmall {
            buffer_width: target.width(),
            buffer_height: target.height(),
            patch_width: patch.width,
            patch_height: patch.height,
        });
    }
    Ok(())
}
