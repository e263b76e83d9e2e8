//! Reverse, bottom-up paragraph layout with a pinned cursor line.
//!
//! The cursor lives at half the screen height; paragraphs stack upward from
//! it until they run off the top. Rendering is cached by exact markup
//! string, so the cursor glyph (a markup suffix) gives the tail paragraph
//! its own cache entry and typing never re-rasterizes settled paragraphs.

use std::collections::HashMap;
use std::rc::Rc;

use crate::doc::DocumentModel;
use crate::geometry::{Point, Rect, Size};
use crate::render::markup::{CURSOR, make_markup};
use crate::render::{Canvas, Rendered, RenderError, RenderedText, TextRenderer};

struct LaidOut {
    rendered: Rc<RenderedText>,
    y_top: i32,
}

pub struct LayoutManager {
    renderer: Rc<dyn TextRenderer>,
    render_width: i32,
    cursor_y: i32,
    cache: HashMap<String, Rc<RenderedText>>,
    rendered_font: Option<String>,
    skip_height: i32,
}

impl LayoutManager {
    pub fn new(renderer: Rc<dyn TextRenderer>, screen_size: Size) -> Self {
        Self {
            renderer,
            render_width: screen_size.width,
            cursor_y: screen_size.height / 2,
            cache: HashMap::new(),
            rendered_font: None,
            skip_height: 0,
        }
    }

    /// Bottom of the laid-out area, i.e. the cursor baseline row.
    pub fn cursor_y(&self) -> i32 {
        self.cursor_y
    }

    fn set_font(&mut self, font: &str) {
        self.cache.clear();
        self.skip_height = self.renderer.line_height(font);
        self.rendered_font = Some(font.to_string());
    }

    #[cfg(test)]
    fn cached_markups(&self) -> Vec<String> {
        self.cache.keys().cloned().collect()
    }

    /// Renders everything above and including the cursor line.
    pub fn render_update(
        &mut self,
        font: &str,
        document: &DocumentModel,
    ) -> Result<Rendered, RenderError> {
        if self.rendered_font.as_deref() != Some(font) {
            self.set_font(font);
        }

        let cursor_para_id = document.cursor_para_id();
        let mut used: HashMap<String, Rc<RenderedText>> = HashMap::new();
        let mut laidouts: Vec<LaidOut> = Vec::new();

        let mut current_y = self.cursor_y;
        let paragraphs = document.contents();
        let mut index = paragraphs.len();
        while index > 0 && current_y >= 0 {
            index -= 1;
            let para = &paragraphs[index];
            let mut markup = make_markup(&para.markdown);
            if Some(para.id) == cursor_para_id {
                markup.push_str(CURSOR);
            }
            let rendered = match self.cache.get(&markup) {
                Some(hit) => Rc::clone(hit),
                None => {
                    let fresh = Rc::new(self.renderer.render_markup(
                        &markup,
                        font,
                        self.render_width,
                    )?);
                    self.cache.insert(markup.clone(), Rc::clone(&fresh));
                    fresh
                }
            };
            used.insert(markup, Rc::clone(&rendered));
            let height = rendered.size.height;
            laidouts.push(LaidOut {
                rendered,
                y_top: current_y - height,
            });
            current_y -= height + self.skip_height;
        }

        let render_size = Size::new(self.render_width, self.cursor_y);
        let mut canvas = Canvas::new(render_size);
        for laidout in &laidouts {
            canvas.draw_text(Point::new(0, laidout.y_top), &laidout.rendered);
        }

        // the bare cursor is worth keeping across passes
        if let Some(cursor_only) = self.cache.get(CURSOR) {
            used.insert(CURSOR.to_string(), Rc::clone(cursor_only));
        }
        self.cache = used;

        let mut rendered = canvas.into_rendered();
        rendered.extent = Rect::new(Point::zeroes(), render_size);
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::render::FixedRenderer;

    const FONT: &str = "Test Font 8";

    fn doc_with(paragraph_texts: &[&str]) -> (Db, DocumentModel) {
        let db = Db::open_in_memory().unwrap();
        let session_id = db.new_session().unwrap();
        let mut doc = DocumentModel::new();
        doc.load_session(session_id, &db).unwrap();
        for (i, text) in paragraph_texts.iter().enumerate() {
            if i > 0 {
                doc.new_para();
            }
            for c in text.chars() {
                doc.keystroke(c);
            }
        }
        (db, doc)
    }

    fn manager() -> LayoutManager {
        let renderer = Rc::new(FixedRenderer {
            line_height: 20,
            chars_per_line: 100,
        });
        LayoutManager::new(renderer, Size::new(400, 600))
    }

    #[test]
    fn renders_above_cursor_region() {
        let (_db, doc) = doc_with(&["hello there"]);
        let mut mgr = manager();
        let rendered = mgr.render_update(FONT, &doc).unwrap();
        assert_eq!(
            rendered.extent,
            Rect::new(Point::zeroes(), Size::new(400, 300))
        );
        assert_eq!(rendered.image.len(), 400 * 300);
    }

    #[test]
    fn cursor_paragraph_gets_its_own_cache_key() {
        let (_db, doc) = doc_with(&["first", "second"]);
        let mut mgr = manager();
        mgr.render_update(FONT, &doc).unwrap();
        let markups = mgr.cached_markups();
        assert!(markups.iter().any(|m| m == "first"));
        assert!(markups.iter().any(|m| m == &format!("second{CURSOR}")));
        // the non-cursor form of the tail paragraph was never rendered
        assert!(!markups.iter().any(|m| m == "second"));
    }

    #[test]
    fn cache_is_pruned_to_the_markups_in_use() {
        let (_db, mut doc) = doc_with(&["first"]);
        let mut mgr = manager();
        mgr.render_update(FONT, &doc).unwrap();
        let before = mgr.cached_markups();
        assert!(before.iter().any(|m| m == &format!("first{CURSOR}")));

        doc.keystroke('!');
        mgr.render_update(FONT, &doc).unwrap();
        let after = mgr.cached_markups();
        assert!(after.iter().any(|m| m == &format!("first!{CURSOR}")));
        assert!(!after.iter().any(|m| m == &format!("first{CURSOR}")));
    }

    #[test]
    fn font_change_invalidates_the_cache() {
        let (_db, doc) = doc_with(&["stable"]);
        let mut mgr = manager();
        mgr.render_update(FONT, &doc).unwrap();
        assert!(!mgr.cached_markups().is_empty());
        mgr.render_update("Other Font 12", &doc).unwrap();
        // only the markups re-rendered under the new font remain
        assert_eq!(mgr.cached_markups().len(), 1);
    }

    #[test]
    fn walk_stops_when_paragraphs_fall_off_the_top() {
        // 600px tall screen -> 300px above the cursor; each paragraph is
        // 20px + 20px skip, so only ~8 paragraphs can contribute
        let texts: Vec<String> = (0..40).map(|i| format!("para {i}")).collect();
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        let (_db, doc) = doc_with(&refs);
        let mut mgr = manager();
        mgr.render_update(FONT, &doc).unwrap();
        assert!(mgr.cached_markups().len() <= 9);
    }

    #[test]
    fn repeated_render_hits_the_cache() {
        let (_db, doc) = doc_with(&["first", "second"]);
        let mut mgr = manager();
        let a = mgr.render_update(FONT, &doc).unwrap();
        let b = mgr.render_update(FONT, &doc).unwrap();
        assert_eq!(a, b);
    }
}
