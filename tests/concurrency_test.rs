use std::sync::Arc;
use std::thread;

use pagesession::engine::PixelBuffer;
use pagesession::test_utils::test_helpers::{FakeDocumentSpec, open_session};
use pagesession::{CancelToken, RenderOutcome, TileRequest};

fn render_page(
    session: &pagesession::Session<pagesession::test_utils::test_helpers::FakeEngine>,
    page: usize,
) -> PixelBuffer {
    let mut buffer = PixelBuffer::new(120, 160);
    let outcome = session
        .render_tile(&TileRequest::full_page(page, 120, 160), &mut buffer, &CancelToken::none())
        .unwrap();
    assert_eq!(outcome, RenderOutcome::Painted);
    buffer
}

#[test]
fn concurrent_callers_see_consistent_pages() {
    let spec = FakeDocumentSpec::with_pages(3, 300.0, 400.0)
        .page_lines(0, &["alpha"])
        .page_lines(1, &["beta beta"])
        .page_lines(2, &["gamma gamma gamma"]);
    let (_engine, session) = open_session(&spec);
    let session = Arc::new(session);
    let expected: Vec<PixelBuffer> = (0..3).map(|page| render_page(&session, page)).collect();
    let expected = Arc::new(expected);

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let session = Arc::clone(&session);
            let expected = Arc::clone(&expected);
            thread::spawn(move || {
                for round in 0..20 {
                    let page = (worker + round) % 3;
                    assert_eq!(render_page(&session, page), expected[page]);
                    assert!(
                        !session.search(page, "a").unwrap().is_empty(),
                        "page {page} has text"
                    );
                    let text = session.page_text(page).unwrap();
                    assert!(text.starts_with(["alpha", "beta", "gamma"][page]));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn destroy_from_another_thread_is_observed() {
    let (_engine, session) = open_session(&FakeDocumentSpec::with_pages(2, 100.0, 100.0));
    let session = Arc::new(session);

    let destroyer = {
        let session = Arc::clone(&session);
        thread::spawn(move || session.destroy())
    };
    destroyer.join().unwrap();

    assert!(session.is_destroyed());
    assert!(session.page_count().is_err());
}
