//! Document engine capability surface
//!
//! A [`DocumentEngine`] parses documents and rasterizes pages. The session
//! never looks inside the handles it gets back; it only decides when they are
//! created, reused, and released.

mod cancel;
mod device;
mod geometry;
#[cfg(feature = "mupdf")]
mod mupdf_backend;
mod structured_text;

use std::io::{Read, Seek};

use serde::{Deserialize, Serialize};

pub use cancel::CancelToken;
pub use device::{BYTES_PER_PIXEL, DrawDevice, PAPER, PixelBuffer};
pub use geometry::{IRect, Matrix, Point, Quad, Rect};
#[cfg(feature = "mupdf")]
pub use mupdf_backend::MupdfEngine;
pub use structured_text::{
    SearchHits, SelectMode, StructuredText, TextBlock, TextChar, TextLine,
};

/// Errors raised by engine adapters
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[cfg(feature = "mupdf")]
    #[error("PDF engine: {0}")]
    Mupdf(#[from] mupdf::error::Error),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: usize, page_count: usize },

    #[error("render cancelled")]
    Cancelled,

    #[error("{detail}")]
    Generic { detail: String },
}

impl EngineError {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// A seekable byte stream a document can be opened from
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// Where document bytes come from
pub enum DocumentSource {
    Bytes(Vec<u8>),
    Stream(Box<dyn ReadSeek>),
}

impl DocumentSource {
    /// Drains the source into memory
    pub fn into_bytes(self) -> EngineResult<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Stream(mut stream) => {
                stream.rewind()?;
                let mut bytes = Vec::new();
                stream.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
        }
    }
}

impl From<Vec<u8>> for DocumentSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl std::fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Viewport layout used to paginate reflowable documents
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayoutParams {
    pub width: f32,
    pub height: f32,
    pub em: f32,
}

impl LayoutParams {
    #[must_use]
    pub const fn new(width: f32, height: f32, em: f32) -> Self {
        Self { width, height, em }
    }

    /// All three dimensions are finite and positive
    #[must_use]
    pub fn is_valid(&self) -> bool {
        [self.width, self.height, self.em]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }
}

impl Default for LayoutParams {
    /// "A format" pocket book
    fn default() -> Self {
        Self::new(312.0, 504.0, 10.0)
    }
}

/// Engine-defined location token, stable across a reflow
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Bookmark(pub u64);

/// Fixed-point scale of [`Bookmark::from_progress`]
const PROGRESS_ONE: u128 = 1 << 32;

impl Bookmark {
    /// Start of `page` as a fraction of `count` pages, rounded up.
    ///
    /// Rounding up keeps [`Bookmark::progress_page`] exact when the count is
    /// unchanged.
    #[must_use]
    pub fn from_progress(page: usize, count: usize) -> Self {
        let count = count.max(1) as u128;
        let page = (page as u128).min(count - 1);
        Self(((page * PROGRESS_ONE + count - 1) / count) as u64)
    }

    /// Page of `count` pages that holds this reading position
    #[must_use]
    pub fn progress_page(self, count: usize) -> usize {
        if count == 0 {
            return 0;
        }
        let page = u128::from(self.0) * count as u128 / PROGRESS_ONE;
        (page as usize).min(count - 1)
    }
}

/// Where a link points
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LinkTarget {
    Internal { page: usize },
    External { uri: String },
}

/// Clickable area on a page, in page space
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub bounds: Rect,
    pub target: LinkTarget,
}

/// Page named by a `#page=N` fragment (1-based, as in PDF open parameters)
pub(crate) fn page_from_fragment(uri: &str) -> Option<usize> {
    let (_, fragment) = uri.rsplit_once('#')?;
    fragment
        .split('&')
        .find_map(|part| part.strip_prefix("page="))?
        .parse::<usize>()
        .ok()?
        .checked_sub(1)
}

/// One node of a document outline
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OutlineNode {
    pub title: String,
    /// Destination page (0-indexed), if internal
    #[serde(default)]
    pub page: Option<usize>,
    /// Destination URI, if external
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub children: Vec<OutlineNode>,
}

/// Ordered forest of outline nodes
pub type Outline = Vec<OutlineNode>;

/// Metadata keys the session asks for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetadataKey {
    Title,
}

/// Capability surface consumed by the session.
///
/// Handles release their engine resources when dropped. The session owns every
/// handle and controls drop order, so implementations need no internal locking
/// of their own beyond what `Send` requires.
pub trait DocumentEngine {
    type Document;
    type Page;
    type DisplayList;

    fn open_document(&self, source: DocumentSource, magic: &str) -> EngineResult<Self::Document>;

    fn layout(&self, doc: &mut Self::Document, params: LayoutParams) -> EngineResult<()>;

    fn count_pages(&self, doc: &Self::Document) -> EngineResult<usize>;

    fn is_reflowable(&self, doc: &Self::Document) -> EngineResult<bool>;

    fn make_bookmark(&self, doc: &Self::Document, page: usize) -> EngineResult<Bookmark>;

    fn find_bookmark(&self, doc: &Self::Document, mark: Bookmark) -> EngineResult<usize>;

    fn load_page(&self, doc: &Self::Document, index: usize) -> EngineResult<Self::Page>;

    fn page_bounds(&self, page: &Self::Page) -> EngineResult<Rect>;

    fn to_display_list(&self, page: &Self::Page) -> EngineResult<Self::DisplayList>;

    /// Paints `list` through `ctm` into `device`, polling `cancel` while it works.
    ///
    /// Returns [`EngineError::Cancelled`] once the token fires.
    fn run_display_list(
        &self,
        list: &Self::DisplayList,
        device: &mut DrawDevice<'_>,
        ctm: &Matrix,
        cancel: &CancelToken,
    ) -> EngineResult<()>;

    fn page_links(&self, page: &Self::Page) -> EngineResult<Vec<Link>>;

    fn structured_text(&self, page: &Self::Page) -> EngineResult<StructuredText>;

    fn search_page(&self, page: &Self::Page, needle: &str) -> EngineResult<SearchHits> {
        Ok(self.structured_text(page)?.search(needle))
    }

    /// `Ok(None)` when the document has no outline
    fn load_outline(&self, doc: &Self::Document) -> EngineResult<Option<Outline>>;

    fn needs_password(&self, doc: &Self::Document) -> EngineResult<bool>;

    fn authenticate(&self, doc: &mut Self::Document, password: &str) -> EngineResult<bool>;

    /// Page a link leads to under the current layout, if it is internal
    fn resolve_link(&self, doc: &Self::Document, link: &Link) -> EngineResult<Option<usize>>;

    fn metadata(&self, doc: &Self::Document, key: MetadataKey) -> EngineResult<Option<String>>;
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn page_fragment_is_one_based() {
        assert_eq!(page_from_fragment("#page=3"), Some(2));
        assert_eq!(page_from_fragment("book.pdf#zoom=50&page=1"), Some(0));
        assert_eq!(page_from_fragment("#page=0"), None);
        assert_eq!(page_from_fragment("https://example.com"), None);
    }

    #[test]
    fn stream_source_is_read_from_the_start() {
        let mut cursor = Cursor::new(b"%PDF-1.7".to_vec());
        cursor.set_position(4);
        let source = DocumentSource::Stream(Box::new(cursor));
        assert_eq!(source.into_bytes().unwrap(), b"%PDF-1.7");
    }

    #[test]
    fn layout_params_must_be_finite_and_positive() {
        assert!(LayoutParams::default().is_valid());
        assert!(!LayoutParams::new(f32::NAN, 504.0, 10.0).is_valid());
        assert!(!LayoutParams::new(312.0, f32::INFINITY, 10.0).is_valid());
        assert!(!LayoutParams::new(312.0, 504.0, 0.0).is_valid());
        assert!(!LayoutParams::new(-312.0, 504.0, 10.0).is_valid());
    }

    #[test]
    fn progress_bookmark_keeps_page_when_count_is_unchanged() {
        for count in [1, 2, 3, 7, 10, 333, 1000, 65_537] {
            for page in [0, 1, count / 3, count / 2, count - 1] {
                let page = page.min(count - 1);
                let mark = Bookmark::from_progress(page, count);
                assert_eq!(mark.progress_page(count), page, "page {page} of {count}");
            }
        }
    }

    #[test]
    fn progress_bookmark_floors_into_new_count() {
        assert_eq!(Bookmark::from_progress(1, 2).progress_page(3), 1);
        assert_eq!(Bookmark::from_progress(3, 5).progress_page(3), 1);
        assert_eq!(Bookmark::from_progress(2, 3).progress_page(6), 4);
        assert_eq!(Bookmark::from_progress(9, 10).progress_page(2), 1);
    }

    #[test]
    fn progress_bookmark_clamps_out_of_range() {
        assert_eq!(Bookmark::from_progress(5, 0).progress_page(4), 0);
        assert_eq!(Bookmark::from_progress(50, 10).progress_page(10), 9);
        assert_eq!(Bookmark::from_progress(3, 4).progress_page(0), 0);
        assert_eq!(Bookmark(u64::MAX).progress_page(4), 3);
    }
}
