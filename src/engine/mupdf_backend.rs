//! MuPDF-backed engine

use log::debug;
use mupdf::text_page::TextBlockType;
use mupdf::{Colorspace, Device, DisplayList, Document, MetadataName, Page, Pixmap, TextPageFlags};

use super::{
    Bookmark, CancelToken, DocumentEngine, DocumentSource, DrawDevice, EngineError,
    EngineResult, LayoutParams, Link, LinkTarget, Matrix, MetadataKey, Outline, OutlineNode,
    Point, Quad, Rect, StructuredText, TextBlock, TextChar, TextLine, page_from_fragment,
};

/// Rows rasterized between two cancellation checks
const BAND_ROWS: i32 = 64;

/// Engine adapter over the `mupdf` crate.
///
/// Bookmarks encode reading progress through the document, which is what
/// survives a re-pagination of a reflowable book.
#[derive(Clone, Copy, Debug, Default)]
pub struct MupdfEngine;

impl MupdfEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn to_rect(r: mupdf::Rect) -> Rect {
    Rect::new(r.x0.min(r.x1), r.y0.min(r.y1), r.x0.max(r.x1), r.y0.max(r.y1))
}

fn to_fz_matrix(m: &Matrix) -> mupdf::Matrix {
    mupdf::Matrix::new(m.a, m.b, m.c, m.d, m.e, m.f)
}

fn page_count(doc: &Document) -> EngineResult<usize> {
    Ok(doc.page_count()?.max(0) as usize)
}

fn convert_outlines(outlines: &[mupdf::Outline]) -> Outline {
    outlines
        .iter()
        .map(|o| OutlineNode {
            title: o.title.trim().to_string(),
            page: o.dest.map(|dest| dest.loc.page_number as usize),
            uri: o.uri.clone(),
            children: convert_outlines(&o.down),
        })
        .collect()
}

impl DocumentEngine for MupdfEngine {
    type Document = Document;
    type Page = Page;
    type DisplayList = DisplayList;

    fn open_document(&self, source: DocumentSource, magic: &str) -> EngineResult<Document> {
        let bytes = source.into_bytes()?;
        debug!("Opening {} byte document as {magic:?}", bytes.len());
        Ok(Document::from_bytes(&bytes, magic)?)
    }

    fn layout(&self, doc: &mut Document, params: LayoutParams) -> EngineResult<()> {
        Ok(doc.layout(params.width, params.height, params.em)?)
    }

    fn count_pages(&self, doc: &Document) -> EngineResult<usize> {
        page_count(doc)
    }

    fn is_reflowable(&self, doc: &Document) -> EngineResult<bool> {
        Ok(doc.is_reflowable()?)
    }

    fn make_bookmark(&self, doc: &Document, page: usize) -> EngineResult<Bookmark> {
        Ok(Bookmark::from_progress(page, page_count(doc)?))
    }

    fn find_bookmark(&self, doc: &Document, mark: Bookmark) -> EngineResult<usize> {
        Ok(mark.progress_page(page_count(doc)?))
    }

    fn load_page(&self, doc: &Document, index: usize) -> EngineResult<Page> {
        Ok(doc.load_page(index as i32)?)
    }

    fn page_bounds(&self, page: &Page) -> EngineResult<Rect> {
        Ok(to_rect(page.bounds()?))
    }

    fn to_display_list(&self, page: &Page) -> EngineResult<DisplayList> {
        Ok(page.to_display_list(true)?)
    }

    fn run_display_list(
        &self,
        list: &DisplayList,
        device: &mut DrawDevice<'_>,
        ctm: &Matrix,
        cancel: &CancelToken,
    ) -> EngineResult<()> {
        let area = device.area();
        let fz_ctm = to_fz_matrix(ctm);
        let rgb = Colorspace::device_rgb();

        let mut band_y = area.y0;
        while band_y < area.y1 {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let band_h = BAND_ROWS.min(area.y1.saturating_sub(band_y));

            let mut pixmap = Pixmap::new(&rgb, area.x0, band_y, area.width(), band_h, false)?;
            pixmap.clear_with(0xFF)?;
            {
                let fz_device = Device::from_pixmap(&pixmap)?;
                let clip = mupdf::Rect {
                    x0: area.x0 as f32,
                    y0: band_y as f32,
                    x1: area.x1 as f32,
                    y1: band_y.saturating_add(band_h) as f32,
                };
                list.run(&fz_device, &fz_ctm, clip)?;
            }

            copy_band(&pixmap, device, band_y, band_h)?;
            band_y += band_h;
        }
        Ok(())
    }

    fn page_links(&self, page: &Page) -> EngineResult<Vec<Link>> {
        let links = page.links()?;
        Ok(links
            .filter_map(|link| {
                let target = if let Some(dest) = link.dest {
                    LinkTarget::Internal {
                        page: dest.loc.page_number as usize,
                    }
                } else if !link.uri.is_empty() {
                    LinkTarget::External {
                        uri: link.uri.clone(),
                    }
                } else {
                    return None;
                };
                let bounds = to_rect(link.bounds);
                if bounds.is_empty() {
                    return None;
                }
                Some(Link { bounds, target })
            })
            .collect())
    }

    fn structured_text(&self, page: &Page) -> EngineResult<StructuredText> {
        let text_page = page.to_text_page(TextPageFlags::empty())?;
        let mut blocks = Vec::new();

        for block in text_page.blocks() {
            if block.r#type() != TextBlockType::Text {
                continue;
            }
            let mut lines = Vec::new();
            for line in block.lines() {
                let bbox = to_rect(line.bounds());
                let raw: Vec<(char, mupdf::Point)> = line
                    .chars()
                    .filter_map(|ch| ch.char().map(|c| (c, ch.origin())))
                    .collect();

                // Glyph boxes run from one origin to the next; the last one ends at the line edge.
                let chars = raw
                    .iter()
                    .enumerate()
                    .map(|(i, (c, origin))| {
                        let x1 = raw.get(i + 1).map_or(bbox.x1, |(_, next)| next.x);
                        let rect = Rect::new(origin.x.min(x1), bbox.y0, origin.x.max(x1), bbox.y1);
                        TextChar {
                            c: *c,
                            quad: Quad::from_rect(&rect),
                            origin: Point::new(origin.x, origin.y),
                        }
                    })
                    .collect();
                lines.push(TextLine { bbox, chars });
            }
            blocks.push(TextBlock {
                bbox: to_rect(block.bounds()),
                lines,
            });
        }

        Ok(StructuredText::new(blocks))
    }

    fn load_outline(&self, doc: &Document) -> EngineResult<Option<Outline>> {
        let outlines = doc.outlines()?;
        if outlines.is_empty() {
            return Ok(None);
        }
        Ok(Some(convert_outlines(&outlines)))
    }

    fn needs_password(&self, doc: &Document) -> EngineResult<bool> {
        Ok(doc.needs_password()?)
    }

    fn authenticate(&self, doc: &mut Document, password: &str) -> EngineResult<bool> {
        Ok(doc.authenticate(password)?)
    }

    fn resolve_link(&self, doc: &Document, link: &Link) -> EngineResult<Option<usize>> {
        let count = page_count(doc)?;
        let page = match &link.target {
            LinkTarget::Internal { page } => Some(*page),
            LinkTarget::External { uri } => page_from_fragment(uri),
        };
        Ok(page.filter(|p| *p < count))
    }

    fn metadata(&self, doc: &Document, key: MetadataKey) -> EngineResult<Option<String>> {
        let name = match key {
            MetadataKey::Title => MetadataName::Title,
        };
        let value = doc.metadata(name)?;
        Ok(Some(value).filter(|v| !v.is_empty()))
    }
}

/// Converts one RGB band pixmap into the device's RGBA rows
fn copy_band(
    pixmap: &Pixmap,
    device: &mut DrawDevice<'_>,
    band_y: i32,
    band_h: i32,
) -> EngineResult<()> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(EngineError::generic(format!(
            "Unsupported pixmap format: {n} channels"
        )));
    }
    let width = pixmap.width() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    if samples.len() < stride * band_h as usize || width * n > stride {
        return Err(EngineError::generic("Pixmap buffer size mismatch"));
    }

    for row in 0..band_h {
        let Some(dst) = device.row_mut(band_y.saturating_add(row)) else {
            continue;
        };
        let src = &samples[row as usize * stride..row as usize * stride + width * n];
        for (out, px) in dst.chunks_exact_mut(4).zip(src.chunks_exact(n)) {
            out[..3].copy_from_slice(&px[..3]);
            out[3] = 0xFF;
        }
    }
    Ok(())
}
