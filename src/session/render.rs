//! Tile rendering

use log::{debug, warn};

use super::cache::PageCache;
use crate::engine::{
    CancelToken, DocumentEngine, DrawDevice, EngineError, IRect, Matrix, PAPER, PixelBuffer,
    Rect,
};

/// Base device resolution in dots per inch; page units are 1/72 inch
pub const DEFAULT_RESOLUTION: u32 = 160;

/// Sub-rectangle of the page raster to paint, in raster pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Patch {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Patch {
    #[must_use]
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// A tile render: raster the page at `target_width x target_height`, paint `patch` of it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileRequest {
    pub page: usize,
    pub target_width: u32,
    pub target_height: u32,
    pub patch: Patch,
}

impl TileRequest {
    /// The whole page raster as a single patch
    #[must_use]
    pub const fn full_page(page: usize, target_width: u32, target_height: u32) -> Self {
        Self {
            page,
            target_width,
            target_height,
            patch: Patch::new(0, 0, target_width, target_height),
        }
    }

    /// Whether any pixel of the patch lies on the `target_width x target_height` raster
    fn patch_overlaps_raster(&self) -> bool {
        let raster = IRect::new(
            0,
            0,
            i32::try_from(self.target_width).unwrap_or(i32::MAX),
            i32::try_from(self.target_height).unwrap_or(i32::MAX),
        );
        let patch = IRect::new(
            self.patch.x,
            self.patch.y,
            self.patch
                .x
                .saturating_add(i32::try_from(self.patch.width).unwrap_or(i32::MAX)),
            self.patch
                .y
                .saturating_add(i32::try_from(self.patch.height).unwrap_or(i32::MAX)),
        );
        !patch.intersect(&raster).is_empty()
    }
}

/// What happened to the caller's buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The patch was painted
    Painted,
    /// Nothing to paint with (no page, no display list, engine failure); buffer untouched
    Skipped,
    /// The cancel token fired; buffer untouched
    Cancelled,
}

/// Pre-computed transform from page space to the requested raster
#[derive(Clone, Copy, Debug, PartialEq)]
struct TileTransform {
    ctm: Matrix,
}

impl TileTransform {
    /// Base zoom of `resolution / 72`, then stretched so the page box at that
    /// zoom (rounded out to whole pixels) becomes exactly the target size.
    fn compute(bounds: Rect, resolution: u32, target: (u32, u32)) -> Option<Self> {
        let (target_w, target_h) = target;
        if target_w == 0 || target_h == 0 {
            return None;
        }

        let zoom = resolution as f32 / 72.0;
        let ctm = Matrix::new_translate(-bounds.x0, -bounds.y0).post_scale(zoom, zoom);
        let bbox = bounds.transform(&ctm).round_out();
        if bbox.width() <= 0 || bbox.height() <= 0 {
            return None;
        }

        let xscale = target_w as f32 / bbox.width() as f32;
        let yscale = target_h as f32 / bbox.height() as f32;
        Some(Self {
            ctm: ctm.post_scale(xscale, yscale),
        })
    }
}

/// Paints tiles of the resident page
pub struct RenderCoordinator<'a, E: DocumentEngine> {
    engine: &'a E,
    doc: &'a E::Document,
    cache: &'a mut PageCache<E>,
    page_count: usize,
    resolution: u32,
}

impl<'a, E: DocumentEngine> RenderCoordinator<'a, E> {
    pub fn new(
        engine: &'a E,
        doc: &'a E::Document,
        cache: &'a mut PageCache<E>,
        page_count: usize,
        resolution: u32,
    ) -> Self {
        Self {
            engine,
            doc,
            cache,
            page_count,
            resolution,
        }
    }

    /// Paints `request.patch` into the top-left of `target`.
    ///
    /// The patch is rasterized off to the side and copied in only once the
    /// engine finished it, so a failed or cancelled render leaves `target` as it was.
    pub fn render_tile(
        &mut self,
        request: &TileRequest,
        target: &mut PixelBuffer,
        cancel: &CancelToken,
    ) -> RenderOutcome {
        let patch = request.patch;
        if patch.width == 0 || patch.height == 0 || !request.patch_overlaps_raster() {
            return RenderOutcome::Skipped;
        }
        if cancel.is_cancelled() {
            return RenderOutcome::Cancelled;
        }

        let Some(resident) =
            self.cache
                .ensure_resident(self.engine, self.doc, self.page_count, request.page)
        else {
            return RenderOutcome::Skipped;
        };
        let page_index = resident.index();
        let Some(transform) = TileTransform::compute(
            resident.bounds(),
            self.resolution,
            (request.target_width, request.target_height),
        ) else {
            debug!("Page {page_index} has a degenerate raster, skipping tile");
            return RenderOutcome::Skipped;
        };
        let Some(list) = resident.materialize_display_list(self.engine) else {
            return RenderOutcome::Skipped;
        };

        let mut scratch = PixelBuffer::filled(patch.width, patch.height, PAPER);
        let result = {
            let mut device = DrawDevice::new(&mut scratch, patch.x, patch.y);
            self.engine
                .run_display_list(list, &mut device, &transform.ctm, cancel)
        };

        match result {
            Ok(()) => {
                target.blit_from(&scratch);
                RenderOutcome::Painted
            }
            Err(EngineError::Cancelled) => {
                debug!("Render of page {page_index} cancelled");
                RenderOutcome::Cancelled
            }
            Err(e) => {
                warn!("Render of page {page_index} failed: {e}");
                RenderOutcome::Skipped
            }
        }
    }

    /// Re-render of a dirty patch; same as [`RenderCoordinator::render_tile`]
    pub fn update_tile(
        &mut self,
        request: &TileRequest,
        target: &mut PixelBuffer,
        cancel: &CancelToken,
    ) -> RenderOutcome {
        self.render_tile(request, target, cancel)
    }
}
