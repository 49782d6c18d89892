pub mod test_helpers {
    use std::sync::{Arc, Mutex, PoisonError};

    use serde::{Deserialize, Serialize};

    use crate::engine::{
        Bookmark, CancelToken, DocumentEngine, DocumentSource, DrawDevice, EngineError,
        EngineResult, IRect, LayoutParams, Link, LinkTarget, Matrix, MetadataKey, Outline,
        OutlineNode, Point, Rect, StructuredText, TextBlock, TextLine, page_from_fragment,
    };
    use crate::session::{Session, SessionConfig};

    /// Left and top inset of the first glyph
    pub const MARGIN: f32 = 10.0;
    /// Glyph advance of fixed-layout pages
    pub const ADVANCE: f32 = 6.0;
    /// Line pitch of fixed-layout pages
    pub const LINE_HEIGHT: f32 = 12.0;
    /// Rows painted between two cancellation checks
    pub const BAND_ROWS: i32 = 16;

    pub const PAGE_COLOR: [u8; 4] = [250, 248, 240, 255];
    pub const INK: [u8; 4] = [20, 20, 20, 255];

    /// Handle lifecycle events, in the order the engine saw them
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum HandleEvent {
        DocumentOpened,
        PageLoaded(usize),
        PageReleased(usize),
        DisplayListBuilt(usize),
        DisplayListReleased(usize),
        OutlineLoaded,
        DocumentReleased,
    }

    /// Operations the fake engine should fail
    #[derive(Clone, Debug, Default)]
    pub struct FailurePlan {
        pub display_list: bool,
        pub structured_text: bool,
        pub structured_text_on_page: Option<usize>,
        pub outline: bool,
        pub load_page: Option<usize>,
        pub layout: bool,
        /// Cancels the render token once this many bands were painted
        pub trip_cancel_after_bands: Option<usize>,
    }

    /// One fixed-layout page of a scripted document
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct FakePage {
        pub width: f32,
        pub height: f32,
        #[serde(default)]
        pub lines: Vec<String>,
        #[serde(default)]
        pub links: Vec<Link>,
    }

    /// Script of a document, handed to the fake engine as JSON bytes
    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct FakeDocumentSpec {
        #[serde(default)]
        pub title: Option<String>,
        #[serde(default)]
        pub pages: Vec<FakePage>,
        /// Words of a reflowable document; `pages` is ignored when set
        #[serde(default)]
        pub reflow_words: Option<Vec<String>>,
        #[serde(default)]
        pub password: Option<String>,
        #[serde(default)]
        pub outline: Outline,
    }

    impl FakeDocumentSpec {
        /// `count` fixed pages of `width x height`, each reading "Page N of COUNT"
        pub fn with_pages(count: usize, width: f32, height: f32) -> Self {
            Self {
                pages: (0..count)
                    .map(|i| FakePage {
                        width,
                        height,
                        lines: vec![format!("Page {} of {count}", i + 1)],
                        links: Vec::new(),
                    })
                    .collect(),
                ..Self::default()
            }
        }

        /// A reflowable document made of the words of `text`
        pub fn reflowable(text: &str) -> Self {
            Self {
                reflow_words: Some(text.split_whitespace().map(str::to_string).collect()),
                ..Self::default()
            }
        }

        pub fn title(mut self, title: &str) -> Self {
            self.title = Some(title.to_string());
            self
        }

        pub fn password(mut self, password: &str) -> Self {
            self.password = Some(password.to_string());
            self
        }

        pub fn outline(mut self, outline: Outline) -> Self {
            self.outline = outline;
            self
        }

        pub fn page_lines(mut self, page: usize, lines: &[&str]) -> Self {
            if let Some(p) = self.pages.get_mut(page) {
                p.lines = lines.iter().map(|l| (*l).to_string()).collect();
            }
            self
        }

        pub fn link(mut self, page: usize, link: Link) -> Self {
            if let Some(p) = self.pages.get_mut(page) {
                p.links.push(link);
            }
            self
        }

        pub fn to_source(&self) -> DocumentSource {
            DocumentSource::Bytes(serde_json::to_vec(self).unwrap_or_default())
        }
    }

    /// Outline node pointing at `page`
    pub fn outline_entry(title: &str, page: usize, children: Vec<OutlineNode>) -> OutlineNode {
        OutlineNode {
            title: title.to_string(),
            page: Some(page),
            uri: None,
            children,
        }
    }

    /// Centre of the glyph at `col` on `line` of a fixed-layout page
    pub fn glyph_center(line: usize, col: usize) -> Point {
        Point::new(
            MARGIN + (col as f32 + 0.5) * ADVANCE,
            MARGIN + (line as f32 + 0.5) * LINE_HEIGHT,
        )
    }

    type Journal = Arc<Mutex<Vec<HandleEvent>>>;

    fn record(journal: &Journal, event: HandleEvent) {
        journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub struct FakeDocument {
        spec: FakeDocumentSpec,
        layout: LayoutParams,
        unlocked: bool,
        pages: Vec<FakePage>,
        /// Index of the first word on each page of a reflowed document
        first_words: Vec<usize>,
        journal: Journal,
    }

    impl FakeDocument {
        fn reflowable(&self) -> bool {
            self.spec.reflow_words.is_some()
        }

        fn locked(&self) -> bool {
            self.spec.password.is_some() && !self.unlocked
        }

        fn page_count(&self) -> usize {
            if self.locked() { 0 } else { self.pages.len() }
        }

        fn em(&self) -> f32 {
            if self.reflowable() { self.layout.em } else { 10.0 }
        }

        fn paginate(&mut self) {
            let Some(words) = self.spec.reflow_words.as_ref() else {
                self.pages = self.spec.pages.clone();
                return;
            };
            let (pages, first_words) = reflow(words, self.layout);
            self.pages = pages;
            self.first_words = first_words;
        }
    }

    impl Drop for FakeDocument {
        fn drop(&mut self) {
            record(&self.journal, HandleEvent::DocumentReleased);
        }
    }

    fn text_metrics(em: f32) -> (f32, f32) {
        (em * ADVANCE / 10.0, em * LINE_HEIGHT / 10.0)
    }

    /// Greedy word wrap of `words` into pages of `layout`
    fn reflow(words: &[String], layout: LayoutParams) -> (Vec<FakePage>, Vec<usize>) {
        let (advance, line_height) = text_metrics(layout.em);
        let per_line = (((layout.width - 2.0 * MARGIN) / advance).floor() as usize).max(1);
        let per_page = (((layout.height - 2.0 * MARGIN) / line_height).floor() as usize).max(1);

        let mut lines: Vec<(usize, String)> = Vec::new();
        let mut current = String::new();
        let mut current_first = 0;
        for (i, word) in words.iter().enumerate() {
            if current.is_empty() {
                current_first = i;
                current.push_str(word);
            } else if current.chars().count() + 1 + word.chars().count() <= per_line {
                current.push(' ');
                current.push_str(word);
            } else {
                lines.push((current_first, std::mem::take(&mut current)));
                current_first = i;
                current.push_str(word);
            }
        }
        if !current.is_empty() {
            lines.push((current_first, current));
        }

        if lines.is_empty() {
            let empty = FakePage {
                width: layout.width,
                height: layout.height,
                lines: Vec::new(),
                links: Vec::new(),
            };
            return (vec![empty], vec![0]);
        }

        let mut pages = Vec::new();
        let mut first_words = Vec::new();
        for chunk in lines.chunks(per_page) {
            first_words.push(chunk[0].0);
            pages.push(FakePage {
                width: layout.width,
                height: layout.height,
                lines: chunk.iter().map(|(_, line)| line.clone()).collect(),
                links: Vec::new(),
            });
        }
        (pages, first_words)
    }

    fn page_text(page: &FakePage, em: f32) -> StructuredText {
        if page.lines.is_empty() {
            return StructuredText::default();
        }
        let (advance, line_height) = text_metrics(em);
        let lines = page
            .lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                TextLine::monospaced(
                    line,
                    MARGIN,
                    MARGIN + i as f32 * line_height,
                    advance,
                    line_height,
                )
            })
            .collect();
        StructuredText::new(vec![TextBlock::new(lines)])
    }

    pub struct FakePageHandle {
        index: usize,
        page: FakePage,
        em: f32,
        journal: Journal,
    }

    impl FakePageHandle {
        pub fn index(&self) -> usize {
            self.index
        }
    }

    impl Drop for FakePageHandle {
        fn drop(&mut self) {
            record(&self.journal, HandleEvent::PageReleased(self.index));
        }
    }

    pub struct FakeDisplayList {
        index: usize,
        bounds: Rect,
        glyphs: Vec<Rect>,
        journal: Journal,
    }

    impl Drop for FakeDisplayList {
        fn drop(&mut self) {
            record(&self.journal, HandleEvent::DisplayListReleased(self.index));
        }
    }

    /// Scripted in-memory engine.
    ///
    /// Clones share the event journal and the failure plan, so a test can keep
    /// one clone while the session owns the other.
    #[derive(Clone, Default)]
    pub struct FakeEngine {
        journal: Journal,
        plan: Arc<Mutex<FailurePlan>>,
    }

    impl FakeEngine {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<HandleEvent> {
            self.journal
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub fn clear_events(&self) {
            self.journal
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }

        pub fn count_events(&self, event: &HandleEvent) -> usize {
            self.events().iter().filter(|e| *e == event).count()
        }

        pub fn fail(&self, f: impl FnOnce(&mut FailurePlan)) {
            f(&mut self.plan.lock().unwrap_or_else(PoisonError::into_inner));
        }

        fn plan(&self) -> FailurePlan {
            self.plan
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    /// Opens `spec` in a fresh session; the returned engine observes it
    pub fn open_session(spec: &FakeDocumentSpec) -> (FakeEngine, Session<FakeEngine>) {
        open_session_with(spec, SessionConfig::default())
    }

    pub fn open_session_with(
        spec: &FakeDocumentSpec,
        config: SessionConfig,
    ) -> (FakeEngine, Session<FakeEngine>) {
        let engine = FakeEngine::new();
        let session = Session::open(engine.clone(), spec.to_source(), "application/x-fake", config)
            .unwrap_or_else(|e| panic!("fake document failed to open: {e}"));
        (engine, session)
    }

    impl DocumentEngine for FakeEngine {
        type Document = FakeDocument;
        type Page = FakePageHandle;
        type DisplayList = FakeDisplayList;

        fn open_document(&self, source: DocumentSource, _magic: &str) -> EngineResult<FakeDocument> {
            let bytes = source.into_bytes()?;
            let spec: FakeDocumentSpec = serde_json::from_slice(&bytes)
                .map_err(|e| EngineError::generic(format!("invalid fake document: {e}")))?;
            record(&self.journal, HandleEvent::DocumentOpened);
            let mut doc = FakeDocument {
                spec,
                layout: LayoutParams::default(),
                unlocked: false,
                pages: Vec::new(),
                first_words: Vec::new(),
                journal: Arc::clone(&self.journal),
            };
            doc.paginate();
            Ok(doc)
        }

        fn layout(&self, doc: &mut FakeDocument, params: LayoutParams) -> EngineResult<()> {
            if self.plan().layout {
                return Err(EngineError::generic("layout failed"));
            }
            doc.layout = params;
            doc.paginate();
            Ok(())
        }

        fn count_pages(&self, doc: &FakeDocument) -> EngineResult<usize> {
            Ok(doc.page_count())
        }

        fn is_reflowable(&self, doc: &FakeDocument) -> EngineResult<bool> {
            Ok(doc.reflowable())
        }

        fn make_bookmark(&self, doc: &FakeDocument, page: usize) -> EngineResult<Bookmark> {
            if !doc.reflowable() {
                return Ok(Bookmark(page as u64));
            }
            let last = doc.first_words.len().saturating_sub(1);
            let word = doc.first_words.get(page.min(last)).copied().unwrap_or(0);
            Ok(Bookmark(word as u64))
        }

        fn find_bookmark(&self, doc: &FakeDocument, mark: Bookmark) -> EngineResult<usize> {
            let count = doc.page_count();
            if !doc.reflowable() {
                return Ok((mark.0 as usize).min(count.saturating_sub(1)));
            }
            let word = mark.0 as usize;
            Ok(doc
                .first_words
                .iter()
                .rposition(|first| *first <= word)
                .unwrap_or(0))
        }

        fn load_page(&self, doc: &FakeDocument, index: usize) -> EngineResult<FakePageHandle> {
            if doc.locked() {
                return Err(EngineError::generic("document is locked"));
            }
            let page_count = doc.page_count();
            let page = doc
                .pages
                .get(index)
                .cloned()
                .ok_or(EngineError::PageOutOfRange { page: index, page_count })?;
            if self.plan().load_page == Some(index) {
                return Err(EngineError::generic(format!("page {index} is damaged")));
            }
            record(&self.journal, HandleEvent::PageLoaded(index));
            Ok(FakePageHandle {
                index,
                page,
                em: doc.em(),
                journal: Arc::clone(&self.journal),
            })
        }

        fn page_bounds(&self, page: &FakePageHandle) -> EngineResult<Rect> {
            Ok(Rect::new(0.0, 0.0, page.page.width, page.page.height))
        }

        fn to_display_list(&self, page: &FakePageHandle) -> EngineResult<FakeDisplayList> {
            if self.plan().display_list {
                return Err(EngineError::generic("display list failed"));
            }
            let glyphs = page_text(&page.page, page.em)
                .blocks
                .iter()
                .flat_map(|b| b.lines.iter())
                .flat_map(|l| l.chars.iter())
                .filter(|ch| !ch.c.is_whitespace())
                .map(|ch| ch.quad.bounds())
                .collect();
            record(&self.journal, HandleEvent::DisplayListBuilt(page.index));
            Ok(FakeDisplayList {
                index: page.index,
                bounds: Rect::new(0.0, 0.0, page.page.width, page.page.height),
                glyphs,
                journal: Arc::clone(&self.journal),
            })
        }

        fn run_display_list(
            &self,
            list: &FakeDisplayList,
            device: &mut DrawDevice<'_>,
            ctm: &Matrix,
            cancel: &CancelToken,
        ) -> EngineResult<()> {
            let trip_after = self.plan().trip_cancel_after_bands;
            let area = device.area();
            let page = list.bounds.transform(ctm).round_out();
            let glyphs: Vec<IRect> = list
                .glyphs
                .iter()
                .map(|g| g.transform(ctm).round_out())
                .collect();

            let mut bands = 0;
            let mut y = area.y0;
            while y < area.y1 {
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                let y1 = y.saturating_add(BAND_ROWS).min(area.y1);
                let band = IRect::new(area.x0, y, area.x1, y1);
                device.fill_rect(page.intersect(&band), PAGE_COLOR);
                for glyph in &glyphs {
                    device.fill_rect(glyph.intersect(&band), INK);
                }
                y = band.y1;
                bands += 1;
                if trip_after == Some(bands) {
                    cancel.cancel();
                }
            }
            Ok(())
        }

        fn page_links(&self, page: &FakePageHandle) -> EngineResult<Vec<Link>> {
            Ok(page.page.links.clone())
        }

        fn structured_text(&self, page: &FakePageHandle) -> EngineResult<StructuredText> {
            let plan = self.plan();
            if plan.structured_text || plan.structured_text_on_page == Some(page.index) {
                return Err(EngineError::generic("structured text failed"));
            }
            Ok(page_text(&page.page, page.em))
        }

        fn load_outline(&self, doc: &FakeDocument) -> EngineResult<Option<Outline>> {
            record(&self.journal, HandleEvent::OutlineLoaded);
            if self.plan().outline {
                return Err(EngineError::generic("outline failed"));
            }
            if doc.locked() || doc.spec.outline.is_empty() {
                return Ok(None);
            }
            Ok(Some(doc.spec.outline.clone()))
        }

        fn needs_password(&self, doc: &FakeDocument) -> EngineResult<bool> {
            Ok(doc.locked())
        }

        fn authenticate(&self, doc: &mut FakeDocument, password: &str) -> EngineResult<bool> {
            match doc.spec.password.as_deref() {
                None => Ok(true),
                Some(expected) if expected == password => {
                    doc.unlocked = true;
                    Ok(true)
                }
                Some(_) => Ok(false),
            }
        }

        fn resolve_link(&self, doc: &FakeDocument, link: &Link) -> EngineResult<Option<usize>> {
            let page = match &link.target {
                LinkTarget::Internal { page } => Some(*page),
                LinkTarget::External { uri } => page_from_fragment(uri),
            };
            Ok(page.filter(|p| *p < doc.page_count()))
        }

        fn metadata(&self, doc: &FakeDocument, key: MetadataKey) -> EngineResult<Option<String>> {
            Ok(match key {
                MetadataKey::Title => doc.spec.title.clone(),
            })
        }
    }

}
