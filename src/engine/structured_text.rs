//! Geometry-aware page text and the queries run over it
//!
//! Engines hand back a [`StructuredText`] snapshot (blocks of lines of
//! positioned characters). Plain-text export, search, and selection all work
//! on that snapshot, so they behave the same whichever engine produced it.

use serde::{Deserialize, Serialize};

use super::geometry::{Point, Quad, Rect};

/// Matches on one page: one quad group per match, one quad per line it spans
pub type SearchHits = Vec<Vec<Quad>>;

/// A positioned character
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextChar {
    pub c: char,
    pub quad: Quad,
    pub origin: Point,
}

/// A line of characters in reading order
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub bbox: Rect,
    pub chars: Vec<TextChar>,
}

impl TextLine {
    /// Lays `text` out on a fixed advance starting at `(x, y)` (top-left)
    #[must_use]
    pub fn monospaced(text: &str, x: f32, y: f32, advance: f32, height: f32) -> Self {
        let chars: Vec<TextChar> = text
            .chars()
            .enumerate()
            .map(|(i, c)| {
                let x0 = x + i as f32 * advance;
                let rect = Rect::new(x0, y, x0 + advance, y + height);
                TextChar {
                    c,
                    quad: Quad::from_rect(&rect),
                    origin: Point::new(x0, y + height * 0.8),
                }
            })
            .collect();
        let bbox = chars
            .iter()
            .fold(Rect::default(), |acc, ch| acc.union(&ch.quad.bounds()));
        Self { bbox, chars }
    }

    fn text(&self) -> String {
        self.chars.iter().map(|ch| ch.c).collect()
    }
}

/// A block of lines (a paragraph or column fragment)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub bbox: Rect,
    pub lines: Vec<TextLine>,
}

impl TextBlock {
    #[must_use]
    pub fn new(lines: Vec<TextLine>) -> Self {
        let bbox = lines
            .iter()
            .fold(Rect::default(), |acc, line| acc.union(&line.bbox));
        Self { bbox, lines }
    }
}

/// Granularity used when snapping a selection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectMode {
    Chars,
    Words,
    Lines,
}

/// Position of a character: line index across all blocks, then char index
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct CharPos {
    line: usize,
    ch: usize,
}

/// Structured text of one page
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredText {
    pub blocks: Vec<TextBlock>,
}

impl StructuredText {
    #[must_use]
    pub fn new(blocks: Vec<TextBlock>) -> Self {
        Self { blocks }
    }

    fn lines(&self) -> impl Iterator<Item = &TextLine> {
        self.blocks.iter().flat_map(|b| b.lines.iter())
    }

    fn line(&self, index: usize) -> Option<&TextLine> {
        self.lines().nth(index)
    }

    fn char_at(&self, pos: CharPos) -> Option<&TextChar> {
        self.line(pos.line).and_then(|l| l.chars.get(pos.ch))
    }

    /// Plain text: every line ends with a newline, blocks are followed by a blank line
    #[must_use]
    pub fn as_text(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            for line in &block.lines {
                out.push_str(&line.text());
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }

    #[must_use]
    pub fn as_html(&self) -> String {
        let mut out = String::from("<div class=\"page\">\n");
        for block in &self.blocks {
            out.push_str("<div class=\"block\">\n");
            for line in &block.lines {
                out.push_str("<p>");
                for ch in &line.chars {
                    match ch.c {
                        '<' => out.push_str("&lt;"),
                        '>' => out.push_str("&gt;"),
                        '&' => out.push_str("&amp;"),
                        '"' => out.push_str("&quot;"),
                        c => out.push(c),
                    }
                }
                out.push_str("</p>\n");
            }
            out.push_str("</div>\n");
        }
        out.push_str("</div>\n");
        out
    }

    /// Nearest character to `p`: closest line first, then closest char in it
    fn hit(&self, p: Point) -> Option<CharPos> {
        let mut best: Option<(f32, f32, usize)> = None;
        for (i, line) in self.lines().enumerate() {
            if line.chars.is_empty() {
                continue;
            }
            let dy = axis_distance(p.y, line.bbox.y0, line.bbox.y1);
            let dx = axis_distance(p.x, line.bbox.x0, line.bbox.x1);
            if best.is_none_or(|(by, bx, _)| dy < by || (dy == by && dx < bx)) {
                best = Some((dy, dx, i));
            }
        }
        let (_, _, line_idx) = best?;
        let line = self.line(line_idx)?;

        let mut nearest = (f32::INFINITY, 0usize);
        for (k, ch) in line.chars.iter().enumerate() {
            let r = ch.quad.bounds();
            let d = axis_distance(p.x, r.x0, r.x1);
            if d < nearest.0 {
                nearest = (d, k);
            }
        }
        Some(CharPos {
            line: line_idx,
            ch: nearest.1,
        })
    }

    fn ordered_hits(&self, a: Point, b: Point) -> Option<(CharPos, CharPos)> {
        let pa = self.hit(a)?;
        let pb = self.hit(b)?;
        Some(if pa <= pb { (pa, pb) } else { (pb, pa) })
    }

    /// Moves `a` and `b` onto the boundaries of the unit `mode` selects.
    ///
    /// The returned points keep the drag direction: if `b` precedes `a` in
    /// reading order, the first returned point is still the one derived from `a`.
    #[must_use]
    pub fn snap_selection(&self, a: Point, b: Point, mode: SelectMode) -> (Point, Point) {
        let (Some(pa), Some(pb)) = (self.hit(a), self.hit(b)) else {
            return (a, b);
        };
        let forward = pa <= pb;
        let (mut start, mut end) = if forward { (pa, pb) } else { (pb, pa) };

        match mode {
            SelectMode::Chars => {}
            SelectMode::Words => {
                start = self.word_start(start);
                end = self.word_end(end);
            }
            SelectMode::Lines => {
                start.ch = 0;
                end.ch = self
                    .line(end.line)
                    .map_or(0, |l| l.chars.len().saturating_sub(1));
            }
        }

        let centre = |pos: CharPos| self.char_at(pos).map(|ch| ch.quad.center());
        match (centre(start), centre(end)) {
            (Some(s), Some(e)) if forward => (s, e),
            (Some(s), Some(e)) => (e, s),
            _ => (a, b),
        }
    }

    fn word_start(&self, mut pos: CharPos) -> CharPos {
        let Some(line) = self.line(pos.line) else {
            return pos;
        };
        if line.chars[pos.ch].c.is_whitespace() {
            return pos;
        }
        while pos.ch > 0 && !line.chars[pos.ch - 1].c.is_whitespace() {
            pos.ch -= 1;
        }
        pos
    }

    fn word_end(&self, mut pos: CharPos) -> CharPos {
        let Some(line) = self.line(pos.line) else {
            return pos;
        };
        if line.chars[pos.ch].c.is_whitespace() {
            return pos;
        }
        while pos.ch + 1 < line.chars.len() && !line.chars[pos.ch + 1].c.is_whitespace() {
            pos.ch += 1;
        }
        pos
    }

    /// Per-line character ranges (inclusive) between two positions
    fn line_spans(&self, start: CharPos, end: CharPos) -> Vec<(usize, usize, usize)> {
        let mut spans = Vec::new();
        for (i, line) in self.lines().enumerate() {
            if i < start.line || i > end.line || line.chars.is_empty() {
                continue;
            }
            let from = if i == start.line { start.ch } else { 0 };
            let to = if i == end.line {
                end.ch
            } else {
                line.chars.len() - 1
            };
            if from <= to {
                spans.push((i, from, to));
            }
        }
        spans
    }

    /// Highlight quads for the selection between `a` and `b`, one per line
    #[must_use]
    pub fn highlight(&self, a: Point, b: Point) -> Vec<Quad> {
        let Some((start, end)) = self.ordered_hits(a, b) else {
            return Vec::new();
        };
        self.line_spans(start, end)
            .into_iter()
            .filter_map(|(line, from, to)| self.span_quad(line, from, to))
            .collect()
    }

    /// Text between `a` and `b`, lines joined with newlines
    #[must_use]
    pub fn copy(&self, a: Point, b: Point) -> String {
        let Some((start, end)) = self.ordered_hits(a, b) else {
            return String::new();
        };
        let mut pieces = Vec::new();
        for (line_idx, from, to) in self.line_spans(start, end) {
            if let Some(line) = self.line(line_idx) {
                pieces.push(line.chars[from..=to].iter().map(|ch| ch.c).collect::<String>());
            }
        }
        pieces.join("\n")
    }

    fn span_quad(&self, line: usize, from: usize, to: usize) -> Option<Quad> {
        let line = self.line(line)?;
        let rect = line.chars[from..=to]
            .iter()
            .fold(Rect::default(), |acc, ch| acc.union(&ch.quad.bounds()));
        Some(Quad::from_rect(&rect))
    }

    /// Case-insensitive search.
    ///
    /// Whitespace in the needle matches any run of whitespace or line breaks.
    /// Matches never overlap.
    #[must_use]
    pub fn search(&self, needle: &str) -> SearchHits {
        let needle: Vec<char> = normalize_needle(needle);
        if needle.is_empty() {
            return Vec::new();
        }

        // Line breaks become virtual spaces without a character position.
        let mut hay: Vec<(char, Option<CharPos>)> = Vec::new();
        for (li, line) in self.lines().enumerate() {
            for (k, ch) in line.chars.iter().enumerate() {
                hay.push((fold_char(ch.c), Some(CharPos { line: li, ch: k })));
            }
            hay.push((' ', None));
        }

        let mut hits = Vec::new();
        let mut i = 0;
        while i < hay.len() {
            match match_at(&hay, i, &needle) {
                Some(end) => {
                    let positions: Vec<CharPos> = hay[i..end].iter().filter_map(|(_, p)| *p).collect();
                    hits.push(self.quads_for(&positions));
                    i = end;
                }
                None => i += 1,
            }
        }
        hits
    }

    fn quads_for(&self, positions: &[CharPos]) -> Vec<Quad> {
        let mut quads = Vec::new();
        let mut run: Option<(usize, usize, usize)> = None;
        for pos in positions {
            run = match run {
                Some((line, from, _)) if line == pos.line => Some((line, from, pos.ch)),
                Some((line, from, to)) => {
                    quads.extend(self.span_quad(line, from, to));
                    Some((pos.line, pos.ch, pos.ch))
                }
                None => Some((pos.line, pos.ch, pos.ch)),
            };
        }
        if let Some((line, from, to)) = run {
            quads.extend(self.span_quad(line, from, to));
        }
        quads
    }
}

fn axis_distance(v: f32, lo: f32, hi: f32) -> f32 {
    if v < lo {
        lo - v
    } else if v > hi {
        v - hi
    } else {
        0.0
    }
}

fn fold_char(c: char) -> char {
    if c.is_whitespace() {
        ' '
    } else {
        c.to_lowercase().next().unwrap_or(c)
    }
}

fn normalize_needle(needle: &str) -> Vec<char> {
    let mut out: Vec<char> = Vec::new();
    for c in needle.trim().chars().map(fold_char) {
        if c == ' ' && out.last() == Some(&' ') {
            continue;
        }
        out.push(c);
    }
    out
}

/// End index (exclusive) of a match of `needle` starting at `start`
fn match_at(hay: &[(char, Option<CharPos>)], start: usize, needle: &[char]) -> Option<usize> {
    if hay[start].0 == ' ' {
        return None;
    }
    let mut j = start;
    for &nc in needle {
        if nc == ' ' {
            if hay.get(j)?.0 != ' ' {
                return None;
            }
            while hay.get(j).is_some_and(|(c, _)| *c == ' ') {
                j += 1;
            }
        } else {
            if hay.get(j)?.0 != nc {
                return None;
            }
            j += 1;
        }
    }
    Some(j)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADVANCE: f32 = 10.0;
    const HEIGHT: f32 = 12.0;

    fn page(lines: &[&str]) -> StructuredText {
        let lines = lines
            .iter()
            .enumerate()
            .map(|(i, text)| TextLine::monospaced(text, 0.0, i as f32 * 20.0, ADVANCE, HEIGHT))
            .collect();
        StructuredText::new(vec![TextBlock::new(lines)])
    }

    // Centre of character `ch` on line `line`
    fn at(line: usize, ch: usize) -> Point {
        Point::new(ch as f32 * ADVANCE + ADVANCE / 2.0, line as f32 * 20.0 + HEIGHT / 2.0)
    }

    #[test]
    fn as_text_terminates_lines_and_blocks() {
        let st = page(&["hello", "world"]);
        assert_eq!(st.as_text(), "hello\nworld\n\n");
    }

    #[test]
    fn as_html_escapes_markup() {
        let st = page(&["a<b&c"]);
        assert!(st.as_html().contains("<p>a&lt;b&amp;c</p>"));
    }

    #[test]
    fn word_snap_inside_single_word() {
        let st = page(&["the quick brown fox"]);
        // both points inside "quick"
        let (a, b) = st.snap_selection(at(0, 5), at(0, 6), SelectMode::Words);
        let quads = st.highlight(a, b);
        assert_eq!(quads.len(), 1);
        assert_eq!(quads[0].bounds(), Rect::new(40.0, 0.0, 90.0, HEIGHT));
        assert_eq!(st.copy(a, b), "quick");
    }

    #[test]
    fn word_snap_keeps_backward_drag_direction() {
        let st = page(&["the quick brown fox"]);
        let (a, b) = st.snap_selection(at(0, 12), at(0, 1), SelectMode::Words);
        assert!(a.x > b.x);
        assert_eq!(st.copy(a, b), "the quick brown");
    }

    #[test]
    fn selection_across_lines_yields_quad_per_line() {
        let st = page(&["alpha beta", "gamma delta"]);
        let (a, b) = st.snap_selection(at(0, 7), at(1, 2), SelectMode::Words);
        let quads = st.highlight(a, b);
        assert_eq!(quads.len(), 2);
        assert_eq!(st.copy(a, b), "beta\ngamma");
    }

    #[test]
    fn line_snap_selects_whole_lines() {
        let st = page(&["alpha beta", "gamma delta"]);
        let (a, b) = st.snap_selection(at(0, 7), at(1, 2), SelectMode::Lines);
        assert_eq!(st.copy(a, b), "alpha beta\ngamma delta");
    }

    #[test]
    fn empty_page_selects_nothing() {
        let st = StructuredText::default();
        let (a, b) = st.snap_selection(at(0, 0), at(0, 1), SelectMode::Words);
        assert!(st.highlight(a, b).is_empty());
        assert_eq!(st.copy(a, b), "");
    }

    #[test]
    fn search_is_case_insensitive_and_non_overlapping() {
        let st = page(&["Aaa aa", "AA"]);
        let hits = st.search("aa");
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| h.len() == 1));
    }

    #[test]
    fn search_matches_across_line_break() {
        let st = page(&["the quick", "brown fox"]);
        let hits = st.search("quick   brown");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].len(), 2);
        assert_eq!(hits[0][0].bounds(), Rect::new(40.0, 0.0, 90.0, HEIGHT));
        assert_eq!(hits[0][1].bounds(), Rect::new(0.0, 20.0, 50.0, 20.0 + HEIGHT));
    }

    #[test]
    fn search_without_match_or_needle_is_empty() {
        let st = page(&["the quick brown fox"]);
        assert!(st.search("zzzznotfound").is_empty());
        assert!(st.search("   ").is_empty());
    }
}
