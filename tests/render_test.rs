use pagesession::engine::PixelBuffer;
use pagesession::test_utils::test_helpers::{
    FakeDocumentSpec, HandleEvent, INK, PAGE_COLOR, open_session,
};
use pagesession::{CancelToken, Patch, RenderOutcome, TileRequest};

const SENTINEL: [u8; 4] = [1, 2, 3, 4];

fn spec() -> FakeDocumentSpec {
    FakeDocumentSpec::with_pages(2, 300.0, 400.0)
        .page_lines(0, &["A quick brown fox", "jumps over the lazy dog"])
}

fn render(
    session: &pagesession::Session<pagesession::test_utils::test_helpers::FakeEngine>,
    request: &TileRequest,
    cancel: &CancelToken,
) -> (RenderOutcome, PixelBuffer) {
    let mut buffer = PixelBuffer::filled(request.patch.width, request.patch.height, SENTINEL);
    let outcome = session.render_tile(request, &mut buffer, cancel).unwrap();
    (outcome, buffer)
}

fn untouched(buffer: &PixelBuffer) -> bool {
    buffer.pixels().chunks_exact(4).all(|px| px == SENTINEL)
}

#[test]
fn rendering_is_deterministic() {
    let (_engine, session) = open_session(&spec());
    let request = TileRequest::full_page(0, 300, 400);

    let (first_outcome, first) = render(&session, &request, &CancelToken::none());
    let (second_outcome, second) = render(&session, &request, &CancelToken::none());

    assert_eq!(first_outcome, RenderOutcome::Painted);
    assert_eq!(second_outcome, RenderOutcome::Painted);
    assert_eq!(first, second);
}

#[test]
fn page_background_and_glyphs_are_painted() {
    let (_engine, session) = open_session(&spec());
    let (_, buffer) = render(&session, &TileRequest::full_page(0, 300, 400), &CancelToken::none());

    let pixels: Vec<&[u8]> = buffer.pixels().chunks_exact(4).collect();
    assert!(pixels.iter().any(|px| *px == INK));
    assert!(pixels.iter().any(|px| *px == PAGE_COLOR));
    assert!(!pixels.iter().any(|px| *px == SENTINEL));
}

#[test]
fn patch_matches_the_same_region_of_a_full_render() {
    let (_engine, session) = open_session(&spec());
    let (_, full) = render(&session, &TileRequest::full_page(0, 600, 800), &CancelToken::none());

    let patch = Patch::new(20, 24, 120, 50);
    let request = TileRequest {
        patch,
        ..TileRequest::full_page(0, 600, 800)
    };
    let (outcome, tile) = render(&session, &request, &CancelToken::none());

    assert_eq!(outcome, RenderOutcome::Painted);
    for y in 0..patch.height {
        for x in 0..patch.width {
            assert_eq!(
                tile.pixel(x, y),
                full.pixel(patch.x as u32 + x, patch.y as u32 + y),
                "pixel ({x}, {y})"
            );
        }
    }
}

#[test]
fn patch_lands_in_the_top_left_of_a_larger_buffer() {
    let (_engine, session) = open_session(&spec());
    let request = TileRequest {
        patch: Patch::new(0, 0, 10, 10),
        ..TileRequest::full_page(0, 300, 400)
    };
    let mut buffer = PixelBuffer::filled(20, 20, SENTINEL);

    let outcome = session
        .update_tile(&request, &mut buffer, &CancelToken::none())
        .unwrap();

    assert_eq!(outcome, RenderOutcome::Painted);
    assert_ne!(buffer.pixel(9, 9), Some(SENTINEL));
    assert_eq!(buffer.pixel(10, 0), Some(SENTINEL));
    assert_eq!(buffer.pixel(0, 10), Some(SENTINEL));
}

#[test]
fn display_list_is_built_once_per_resident_page() {
    let (engine, session) = open_session(&spec());
    let request = TileRequest::full_page(0, 150, 200);

    render(&session, &request, &CancelToken::none());
    render(&session, &request, &CancelToken::none());
    let zoomed = TileRequest::full_page(0, 600, 800);
    render(&session, &zoomed, &CancelToken::none());

    assert_eq!(engine.count_events(&HandleEvent::DisplayListBuilt(0)), 1);
}

#[test]
fn display_list_failure_leaves_buffer_untouched_until_page_changes() {
    let (engine, session) = open_session(&spec());
    let request = TileRequest::full_page(0, 150, 200);
    engine.fail(|plan| plan.display_list = true);

    let (outcome, buffer) = render(&session, &request, &CancelToken::none());
    assert_eq!(outcome, RenderOutcome::Skipped);
    assert!(untouched(&buffer));

    engine.fail(|plan| plan.display_list = false);
    let (outcome, buffer) = render(&session, &request, &CancelToken::none());
    assert_eq!(outcome, RenderOutcome::Skipped);
    assert!(untouched(&buffer));

    session.page_size(1).unwrap();
    let (outcome, _) = render(&session, &request, &CancelToken::none());
    assert_eq!(outcome, RenderOutcome::Painted);
}

#[test]
fn page_load_failure_skips_the_render() {
    let (engine, session) = open_session(&spec());
    engine.fail(|plan| plan.load_page = Some(1));

    let (outcome, buffer) = render(&session, &TileRequest::full_page(1, 30, 40), &CancelToken::none());

    assert_eq!(outcome, RenderOutcome::Skipped);
    assert!(untouched(&buffer));
    assert_eq!(session.resident_page().unwrap(), None);
}

#[test]
fn cancelled_token_paints_nothing() {
    let (_engine, session) = open_session(&spec());
    let cancel = CancelToken::new();
    cancel.cancel();

    let (outcome, buffer) = render(&session, &TileRequest::full_page(0, 300, 400), &cancel);

    assert_eq!(outcome, RenderOutcome::Cancelled);
    assert!(untouched(&buffer));
}

#[test]
fn cancellation_mid_render_leaves_buffer_untouched() {
    let (engine, session) = open_session(&spec());
    engine.fail(|plan| plan.trip_cancel_after_bands = Some(2));
    let cancel = CancelToken::new();

    let (outcome, buffer) = render(&session, &TileRequest::full_page(0, 300, 400), &cancel);

    assert_eq!(outcome, RenderOutcome::Cancelled);
    assert!(cancel.is_cancelled());
    assert!(untouched(&buffer));
}

#[test]
fn empty_patch_is_skipped() {
    let (_engine, session) = open_session(&spec());
    let request = TileRequest {
        patch: Patch::new(0, 0, 0, 10),
        ..TileRequest::full_page(0, 300, 400)
    };
    let mut buffer = PixelBuffer::filled(4, 4, SENTINEL);

    let outcome = session
        .render_tile(&request, &mut buffer, &CancelToken::none())
        .unwrap();

    assert_eq!(outcome, RenderOutcome::Skipped);
    assert!(untouched(&buffer));
}

#[test]
fn patch_far_outside_the_raster_is_skipped() {
    let (engine, session) = open_session(&spec());
    engine.clear_events();
    for patch in [
        Patch::new(i32::MAX - 5, 0, 10, 10),
        Patch::new(0, i32::MAX - 5, 10, 10),
        Patch::new(300, 0, 10, 10),
        Patch::new(-10, -10, 10, 10),
    ] {
        let request = TileRequest {
            patch,
            ..TileRequest::full_page(0, 300, 400)
        };
        let (outcome, buffer) = render(&session, &request, &CancelToken::none());

        assert_eq!(outcome, RenderOutcome::Skipped, "{patch:?}");
        assert!(untouched(&buffer));
    }
    assert_eq!(engine.count_events(&HandleEvent::DisplayListBuilt(0)), 0);
}

#[test]
fn patch_straddling_the_raster_edge_is_painted() {
    let (_engine, session) = open_session(&spec());
    let request = TileRequest {
        patch: Patch::new(295, 395, 10, 10),
        ..TileRequest::full_page(0, 300, 400)
    };

    let (outcome, buffer) = render(&session, &request, &CancelToken::none());

    assert_eq!(outcome, RenderOutcome::Painted);
    assert!(!untouched(&buffer));
}
