//! Outline and password gate

use log::{debug, info, warn};

use crate::engine::{DocumentEngine, Outline, OutlineNode};

/// Target of a table-of-contents entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TocTarget {
    /// Internal page (0-indexed)
    InternalPage(usize),
    /// External URI
    External(String),
}

/// A single entry of the flattened table of contents
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TocEntry {
    /// Display title
    pub title: String,
    /// Nesting level (0 = top level)
    pub level: usize,
    /// Navigation target
    pub target: TocTarget,
}

/// Depth-first flattening of an outline, skipping untitled and targetless nodes
/// (their children are still visited)
#[must_use]
pub fn flatten_outline(outline: &[OutlineNode]) -> Vec<TocEntry> {
    let mut entries = Vec::new();
    flatten_into(outline, 0, &mut entries);
    entries
}

fn flatten_into(nodes: &[OutlineNode], level: usize, entries: &mut Vec<TocEntry>) {
    for node in nodes {
        let target = if let Some(page) = node.page {
            Some(TocTarget::InternalPage(page))
        } else {
            node.uri.as_ref().map(|uri| TocTarget::External(uri.clone()))
        };

        if let Some(target) = target {
            let title = node.title.trim();
            if !title.is_empty() {
                entries.push(TocEntry {
                    title: title.to_string(),
                    level,
                    target,
                });
            }
        }

        if !node.children.is_empty() {
            flatten_into(&node.children, level + 1, entries);
        }
    }
}

enum OutlineCache {
    Unloaded,
    Loaded(Option<Outline>),
}

/// Lazily loaded outline, valid for one pagination of the document
pub struct NavigationService {
    outline: OutlineCache,
}

impl Default for NavigationService {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationService {
    #[must_use]
    pub fn new() -> Self {
        Self {
            outline: OutlineCache::Unloaded,
        }
    }

    /// Forgets the cached outline; the next query reloads it
    pub fn invalidate(&mut self) {
        self.outline = OutlineCache::Unloaded;
    }

    /// Reloads the outline now. A failure leaves the document without one.
    pub fn reload<E: DocumentEngine>(&mut self, engine: &E, doc: &E::Document) {
        self.outline = OutlineCache::Loaded(Self::load(engine, doc));
    }

    fn load<E: DocumentEngine>(engine: &E, doc: &E::Document) -> Option<Outline> {
        match engine.load_outline(doc) {
            Ok(Some(outline)) if !outline.is_empty() => {
                debug!("Loaded outline with {} top-level entries", outline.len());
                Some(outline)
            }
            Ok(_) => None,
            Err(e) => {
                warn!("Outline unavailable: {e}");
                None
            }
        }
    }

    fn loaded<E: DocumentEngine>(&mut self, engine: &E, doc: &E::Document) -> Option<&Outline> {
        if let OutlineCache::Unloaded = self.outline {
            self.reload(engine, doc);
        }
        match &self.outline {
            OutlineCache::Loaded(outline) => outline.as_ref(),
            OutlineCache::Unloaded => None,
        }
    }

    pub fn has_outline<E: DocumentEngine>(&mut self, engine: &E, doc: &E::Document) -> bool {
        self.loaded(engine, doc).is_some()
    }

    pub fn outline<E: DocumentEngine>(&mut self, engine: &E, doc: &E::Document) -> Option<Outline> {
        self.loaded(engine, doc).cloned()
    }

    pub fn needs_password<E: DocumentEngine>(engine: &E, doc: &E::Document) -> bool {
        match engine.needs_password(doc) {
            Ok(needs) => needs,
            Err(e) => {
                warn!("Password check failed: {e}");
                false
            }
        }
    }

    /// Tries `password`; on success the outline is dropped so it reloads unlocked
    pub fn authenticate<E: DocumentEngine>(
        &mut self,
        engine: &E,
        doc: &mut E::Document,
        password: &str,
    ) -> bool {
        match engine.authenticate(doc, password) {
            Ok(true) => {
                info!("Document unlocked");
                self.invalidate();
                true
            }
            Ok(false) => {
                info!("Password rejected");
                false
            }
            Err(e) => {
                warn!("Authentication failed: {e}");
                false
            }
        }
    }
}
