//! Pagination: place resolved records onto fixed-size pages.
//!
//! Layout is pure and deterministic. It needs only image dimensions, passed
//! in as a closure, so the whole pagination can be tested without pdfium or
//! real image files. Coordinates are PDF points measured from the top-left
//! corner; the renderer flips them to PDF's bottom-left origin.
//!
//! Record order is the order given. A block that does not fit in the space
//! left on a page moves to the next page; a record may span pages.

use crate::output::{MediaSlot, ResolvedRecord};
use std::path::{Path, PathBuf};

/// Page geometry and type sizes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutOptions {
    pub page_width: f32,
    pub page_height: f32,
    pub margin: f32,
    pub title_size: f32,
    pub meta_size: f32,
    pub body_size: f32,
    /// Line height as a multiple of the font size.
    pub line_spacing: f32,
    pub max_image_height: f32,
    pub record_gap: f32,
}

impl Default for LayoutOptions {
    /// A4 portrait.
    fn default() -> Self {
        Self {
            page_width: 595.28,
            page_height: 841.89,
            margin: 48.0,
            title_size: 18.0,
            meta_size: 9.0,
            body_size: 11.0,
            line_spacing: 1.45,
            max_image_height: 320.0,
            record_gap: 16.0,
        }
    }
}

impl LayoutOptions {
    pub fn content_width(&self) -> f32 {
        self.page_width - 2.0 * self.margin
    }

    /// Lowest y a block may reach; the strip below is kept for the footer.
    fn bottom_limit(&self) -> f32 {
        self.page_height - self.margin - 2.0 * self.meta_size
    }
}

/// Which loaded font a text block is drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFace {
    Latin,
    Wide,
}

/// One positioned element.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Text {
        x: f32,
        y: f32,
        size: f32,
        face: FontFace,
        text: String,
    },
    Image {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub blocks: Vec<Block>,
}

/// Reason shown for a cached file that does not decode as an image.
pub const UNDECODABLE_IMAGE: &str = "could not decode image";

/// Notice printed where an image cannot be shown.
pub fn missing_notice(reason: &str) -> String {
    format!("[media unavailable: {}]", reason)
}

/// Lay out `records` into pages.
///
/// `image_size` returns pixel dimensions for a cached file, or `None` if it
/// cannot be decoded (rendered as a notice).
pub fn layout<F>(
    title: &str,
    subtitle: &str,
    records: &[ResolvedRecord],
    image_size: F,
    opts: &LayoutOptions,
) -> Vec<PageLayout>
where
    F: Fn(&Path) -> Option<(u32, u32)>,
{
    let mut cursor = Cursor::new(opts);

    cursor.text_line(title, opts.title_size);
    cursor.text_line(subtitle, opts.meta_size);
    cursor.gap(opts.record_gap);

    for record in records {
        let date = record.created_at.format("%Y-%m-%d %H:%M:%S").to_string();
        cursor.text_line(&date, opts.meta_size);

        for paragraph in normalise_newlines(&record.text).split('\n') {
            if paragraph.trim().is_empty() {
                cursor.gap(opts.body_size * opts.line_spacing * 0.5);
                continue;
            }
            for line in wrap_text(paragraph, opts.body_size, opts.content_width()) {
                cursor.text_line(&line, opts.body_size);
            }
        }

        for slot in &record.media {
            match slot {
                MediaSlot::Resolved { path, .. } => match image_size(path) {
                    Some((w, h)) if w > 0 && h > 0 => cursor.image(path, w, h),
                    _ => {
                        let notice = missing_notice(UNDECODABLE_IMAGE);
                        cursor.text_line(&notice, opts.meta_size);
                    }
                },
                MediaSlot::Missing { reason, .. } => {
                    let notice = missing_notice(reason);
                    for line in wrap_text(&notice, opts.meta_size, opts.content_width()) {
                        cursor.text_line(&line, opts.meta_size);
                    }
                }
            }
        }

        cursor.gap(opts.record_gap);
    }

    let mut pages = cursor.finish();
    add_footers(&mut pages, opts);
    pages
}

struct Cursor<'a> {
    opts: &'a LayoutOptions,
    pages: Vec<PageLayout>,
    current: PageLayout,
    y: f32,
}

impl<'a> Cursor<'a> {
    fn new(opts: &'a LayoutOptions) -> Self {
        Self {
            opts,
            pages: Vec::new(),
            current: PageLayout::default(),
            y: opts.margin,
        }
    }

    /// Start a new page unless `height` still fits (or the page is empty).
    fn reserve(&mut self, height: f32) {
        if self.y + height > self.opts.bottom_limit() && !self.current.blocks.is_empty() {
            self.pages.push(std::mem::take(&mut self.current));
            self.y = self.opts.margin;
        }
    }

    fn text_line(&mut self, text: &str, size: f32) {
        let height = size * self.opts.line_spacing;
        self.reserve(height);
        self.current.blocks.push(Block::Text {
            x: self.opts.margin,
            y: self.y,
            size,
            face: face_for(text),
            text: text.to_string(),
        });
        self.y += height;
    }

    fn image(&mut self, path: &Path, px_w: u32, px_h: u32) {
        let (width, height) = fit_image(
            px_w,
            px_h,
            self.opts.content_width(),
            self.opts.max_image_height,
        );
        let spacing = self.opts.body_size * 0.5;
        self.reserve(height + spacing);
        self.current.blocks.push(Block::Image {
            x: self.opts.margin,
            y: self.y,
            width,
            height,
            path: path.to_path_buf(),
        });
        self.y += height + spacing;
    }

    fn gap(&mut self, height: f32) {
        self.y += height;
    }

    fn finish(mut self) -> Vec<PageLayout> {
        if !self.current.blocks.is_empty() || self.pages.is_empty() {
            self.pages.push(self.current);
        }
        self.pages
    }
}

fn add_footers(pages: &mut [PageLayout], opts: &LayoutOptions) {
    let total = pages.len();
    for (i, page) in pages.iter_mut().enumerate() {
        let label = format!("{} / {}", i + 1, total);
        let width = text_width(&label, opts.meta_size);
        page.blocks.push(Block::Text {
            x: (opts.page_width - width) / 2.0,
            y: opts.page_height - opts.margin * 0.75,
            size: opts.meta_size,
            face: FontFace::Latin,
            text: label,
        });
    }
}

/// Scale pixel dimensions to fit within `max_w` × `max_h` points.
///
/// One pixel maps to one point unless that overflows; aspect ratio is kept.
pub fn fit_image(px_w: u32, px_h: u32, max_w: f32, max_h: f32) -> (f32, f32) {
    let (w, h) = (px_w as f32, px_h as f32);
    let scale = (max_w / w).min(max_h / h).min(1.0);
    (w * scale, h * scale)
}

fn normalise_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// East Asian wide characters, drawn with the CJK face and at full em width.
pub fn is_wide(c: char) -> bool {
    matches!(c as u32,
        0x1100..=0x115F
        | 0x2E80..=0xA4CF
        | 0xAC00..=0xD7A3
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFF60
        | 0xFFE0..=0xFFE6
        | 0x1F300..=0x1FAFF
        | 0x20000..=0x3FFFD)
}

fn face_for(text: &str) -> FontFace {
    if text.chars().any(is_wide) {
        FontFace::Wide
    } else {
        FontFace::Latin
    }
}

fn char_width(c: char, size: f32) -> f32 {
    if is_wide(c) {
        size
    } else {
        size * 0.55
    }
}

/// Approximate rendered width of `text` at `size` points.
pub fn text_width(text: &str, size: f32) -> f32 {
    text.chars().map(|c| char_width(c, size)).sum()
}

/// Greedy word wrap to `max_width` points.
///
/// Latin words break at spaces, wide characters may break anywhere, and a
/// word longer than a whole line is split by character.
pub fn wrap_text(text: &str, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut width = 0.0f32;

    for token in tokenize(text) {
        let token_width = text_width(token, size);
        let is_space = token.chars().all(char::is_whitespace);

        if width + token_width > max_width && !current.trim().is_empty() {
            lines.push(current.trim_end().to_string());
            current.clear();
            width = 0.0;
            if is_space {
                continue;
            }
        }

        if token_width > max_width && !is_space {
            for c in token.chars() {
                let cw = char_width(c, size);
                if width + cw > max_width && !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                    width = 0.0;
                }
                current.push(c);
                width += cw;
            }
            continue;
        }

        current.push_str(token);
        width += token_width;
    }

    if !current.trim().is_empty() {
        lines.push(current.trim_end().to_string());
    }
    lines
}

/// Split into runs of spaces, runs of narrow non-space chars, and single wide chars.
fn tokenize(text: &str) -> Vec<&str> {
    #[derive(PartialEq)]
    enum Kind {
        Space,
        Word,
        Wide,
    }
    let kind = |c: char| {
        if c.is_whitespace() {
            Kind::Space
        } else if is_wide(c) {
            Kind::Wide
        } else {
            Kind::Word
        }
    };

    let mut tokens = Vec::new();
    let mut start = 0;
    let mut prev: Option<Kind> = None;
    for (i, c) in text.char_indices() {
        let k = kind(c);
        let split = match &prev {
            None => false,
            Some(p) => *p != k || k == Kind::Wide,
        };
        if split {
            tokens.push(&text[start..i]);
            start = i;
        }
        prev = Some(k);
    }
    if start < text.len() {
        tokens.push(&text[start..]);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ingest::parse_datetime;

    fn record(text: &str, media: Vec<MediaSlot>) -> ResolvedRecord {
        ResolvedRecord {
            id: "1".into(),
            created_at: parse_datetime("2024-01-01 12:00:00").unwrap(),
            text: text.into(),
            link: String::new(),
            media,
        }
    }

    fn texts(pages: &[PageLayout]) -> Vec<String> {
        pages
            .iter()
            .flat_map(|p| p.blocks.iter())
            .filter_map(|b| match b {
                Block::Text { text, .. } => Some(text.clone()),
                Block::Image { .. } => None,
            })
            .collect()
    }

    #[test]
    fn wraps_on_word_boundaries() {
        // 0.55 * 10pt = 5.5pt per char; 60pt fits 10 chars
        let lines = wrap_text("hello world again", 10.0, 60.0);
        assert_eq!(lines, vec!["hello", "world", "again"]);
    }

    #[test]
    fn long_word_is_split() {
        let lines = wrap_text("abcdefghijklmnopqrstuvwxyz", 10.0, 55.0);
        assert!(lines.len() >= 3);
        assert_eq!(lines.concat(), "abcdefghijklmnopqrstuvwxyz");
    }

    #[test]
    fn wide_chars_break_anywhere() {
        // each CJK char is 10pt wide at 10pt
        let lines = wrap_text("你好世界你好", 10.0, 30.0);
        assert_eq!(lines, vec!["你好世", "界你好"]);
        assert_eq!(face_for("你好"), FontFace::Wide);
        assert_eq!(face_for("hello"), FontFace::Latin);
    }

    #[test]
    fn image_fits_width_and_height() {
        assert_eq!(fit_image(100, 50, 500.0, 300.0), (100.0, 50.0));
        let (w, h) = fit_image(1000, 500, 500.0, 300.0);
        assert_eq!((w, h), (500.0, 250.0));
        let (w, h) = fit_image(400, 1200, 500.0, 300.0);
        assert_eq!((w, h), (100.0, 300.0));
    }

    #[test]
    fn records_keep_their_order() {
        let records: Vec<_> = (0..5).map(|i| record(&format!("post {i}"), vec![])).collect();
        let pages = layout("T", "sub", &records, |_| None, &LayoutOptions::default());
        let posts: Vec<String> = texts(&pages)
            .into_iter()
            .filter(|t| t.starts_with("post"))
            .collect();
        assert_eq!(posts, ["post 0", "post 1", "post 2", "post 3", "post 4"]);
    }

    #[test]
    fn many_records_paginate_with_footers() {
        let records: Vec<_> = (0..200).map(|i| record(&format!("line {i}"), vec![])).collect();
        let opts = LayoutOptions::default();
        let pages = layout("T", "sub", &records, |_| None, &opts);
        assert!(pages.len() > 1);

        let total = pages.len();
        for (i, page) in pages.iter().enumerate() {
            match page.blocks.last() {
                Some(Block::Text { text, .. }) => {
                    assert_eq!(text, &format!("{} / {}", i + 1, total))
                }
                other => panic!("expected footer, got {other:?}"),
            }
            for b in &page.blocks[..page.blocks.len() - 1] {
                if let Block::Text { y, size, .. } = b {
                    assert!(y + size * opts.line_spacing <= opts.page_height - opts.margin);
                }
            }
        }
    }

    #[test]
    fn media_slots_become_images_or_notices() {
        let rec = record(
            "with media",
            vec![
                MediaSlot::Resolved {
                    url: "u1".into(),
                    path: PathBuf::from("/c/ok.jpg"),
                },
                MediaSlot::Missing {
                    url: "u2".into(),
                    reason: "host not in allowlist: evil.example".into(),
                },
                MediaSlot::Resolved {
                    url: "u3".into(),
                    path: PathBuf::from("/c/broken.jpg"),
                },
            ],
        );
        let size = |p: &Path| (p.ends_with("ok.jpg")).then_some((800, 600));
        let pages = layout("T", "sub", &[rec], size, &LayoutOptions::default());

        let images: Vec<_> = pages[0]
            .blocks
            .iter()
            .filter(|b| matches!(b, Block::Image { .. }))
            .collect();
        assert_eq!(images.len(), 1);

        let all = texts(&pages);
        let rejected = "[media unavailable: host not in allowlist: evil.example]";
        assert!(all.contains(&rejected.to_string()));
        assert!(all.contains(&"[media unavailable: could not decode image]".to_string()));
    }

    #[test]
    fn empty_input_still_has_a_page() {
        let pages = layout("T", "sub", &[], |_| None, &LayoutOptions::default());
        assert_eq!(pages.len(), 1);
    }
}
