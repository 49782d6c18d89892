pub mod engine;
pub mod panic_handler;
pub mod session;
pub mod settings;
pub mod speech_rates;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use engine::{CancelToken, DocumentEngine, DocumentSource, LayoutParams, PixelBuffer, Point};
#[cfg(feature = "mupdf")]
pub use engine::MupdfEngine;
pub use session::{
    Patch, RenderOutcome, SelectionResult, Session, SessionConfig, SessionError, SessionResult,
    TileRequest, TocEntry, TocTarget,
};
