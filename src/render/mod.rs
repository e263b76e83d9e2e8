//! Text rendering seam and grayscale composition helpers.
//!
//! The appliance draws everything into tightly packed 8-bit grayscale
//! buffers (255 = paper white). The [`TextRenderer`] trait is the narrow
//! interface over Pango; [`Canvas`] composes rendered blocks and chrome into
//! full frames for the display façade.

pub mod markup;
pub mod pango;

use crate::geometry::{Point, Rect, Size};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("could not create drawing surface: {0}")]
    Surface(String),
    #[error("rendering failed: {0}")]
    Draw(String),
}

/// A rendered block of text: tightly packed rows, `size.width` bytes each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedText {
    pub buf: Vec<u8>,
    pub size: Size,
}

impl RenderedText {
    pub fn empty(width: i32) -> Self {
        Self {
            buf: Vec::new(),
            size: Size::new(width, 0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size.height <= 0
    }
}

/// A full or partial frame ready for the display façade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub image: Vec<u8>,
    pub extent: Rect,
}

/// Horizontal alignment within the wrap width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    Left,
    Center,
}

/// Renders Pango markup to grayscale pixels.
pub trait TextRenderer {
    /// Lays out `markup` wrapped at `width` pixels and rasterizes it.
    /// A block that lays out to zero pixels comes back with height 0.
    fn render_markup_aligned(
        &self,
        markup: &str,
        font: &str,
        width: i32,
        alignment: Alignment,
    ) -> Result<RenderedText, RenderError>;

    fn render_markup(
        &self,
        markup: &str,
        font: &str,
        width: i32,
    ) -> Result<RenderedText, RenderError> {
        self.render_markup_aligned(markup, font, width, Alignment::Left)
    }

    /// The line height of `font`, used as the inter-paragraph skip.
    fn line_height(&self, font: &str) -> i32;
}

/// An off-screen grayscale frame under composition.
pub struct Canvas {
    size: Size,
    buf: Vec<u8>,
}

impl Canvas {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            buf: vec![0xff; size.total()],
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn fill(&mut self, gray: u8) {
        self.buf.fill(gray);
    }

    /// Copies a rendered block in at `origin`, clipped to the canvas.
    pub fn draw_text(&mut self, origin: Point, text: &RenderedText) {
        self.draw_bytes(origin, &text.buf, text.size);
    }

    pub fn draw_bytes(&mut self, origin: Point, bytes: &[u8], size: Size) {
        let dest = Rect::new(origin, size);
        let Some(clipped) = dest.intersection(&Rect::from_size(self.size)) else {
            return;
        };
        for row in 0..clipped.spread.height {
            let src_y = (clipped.origin.y - origin.y + row) as usize;
            let src_x = (clipped.origin.x - origin.x) as usize;
            let src_start = src_y * size.width as usize + src_x;
            let dst_start = (clipped.origin.y + row) as usize * self.size.width as usize
                + clipped.origin.x as usize;
            let len = clipped.spread.width as usize;
            self.buf[dst_start..dst_start + len]
                .copy_from_slice(&bytes[src_start..src_start + len]);
        }
    }

    /// Strokes a rectangular border `thickness` pixels wide, inside `rect`.
    pub fn draw_frame(&mut self, rect: Rect, thickness: i32, gray: u8) {
        for t in 0..thickness {
            let inner = Rect::new(
                Point::new(rect.origin.x + t, rect.origin.y + t),
                Size::new(rect.spread.width - 2 * t, rect.spread.height - 2 * t),
            );
            if inner.is_empty() {
                break;
            }
            self.hline(inner.origin.x, inner.max_x(), inner.origin.y, gray);
            self.hline(inner.origin.x, inner.max_x(), inner.max_y() - 1, gray);
            self.vline(inner.origin.x, inner.origin.y, inner.max_y(), gray);
            self.vline(inner.max_x() - 1, inner.origin.y, inner.max_y(), gray);
        }
    }

    fn hline(&mut self, x0: i32, x1: i32, y: i32, gray: u8) {
        if y < 0 || y >= self.size.height {
            return;
        }
        let x0 = x0.clamp(0, self.size.width);
        let x1 = x1.clamp(0, self.size.width);
        let row = y as usize * self.size.width as usize;
        self.buf[row + x0 as usize..row + x1 as usize].fill(gray);
    }

    fn vline(&mut self, x: i32, y0: i32, y1: i32, gray: u8) {
        if x < 0 || x >= self.size.width {
            return;
        }
        let y0 = y0.clamp(0, self.size.height);
        let y1 = y1.clamp(0, self.size.height);
        for y in y0..y1 {
            self.buf[y as usize * self.size.width as usize + x as usize] = gray;
        }
    }

    pub fn into_rendered(self) -> Rendered {
        Rendered {
            image: self.buf,
            extent: Rect::from_size(self.size),
        }
    }
}

/// Deterministic renderer for layout tests: fixed line height, one wrapped
/// line per `chars_per_line` characters of markup-stripped text.
#[cfg(test)]
pub struct FixedRenderer {
    pub line_height: i32,
    pub chars_per_line: usize,
}

#[cfg(test)]
impl TextRenderer for FixedRenderer {
    fn render_markup_aligned(
        &self,
        markup: &str,
        _font: &str,
        width: i32,
        _alignment: Alignment,
    ) -> Result<RenderedText, RenderError> {
        let chars = markup.chars().count();
        let lines = chars.div_ceil(self.chars_per_line).max(1);
        let height = self.line_height * lines as i32;
        Ok(RenderedText {
            buf: vec![0x00; (width * height).max(0) as usize],
            size: Size::new(width, height),
        })
    }

    fn line_height(&self, _font: &str) -> i32 {
        self.line_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canvas_draws_clipped_blocks() {
        let mut canvas = Canvas::new(Size::new(10, 10));
        let block = RenderedText {
            buf: vec![0x00; 5 * 5],
            size: Size::new(5, 5),
        };
        canvas.draw_text(Point::new(8, 8), &block);
        let rendered = canvas.into_rendered();
        // clipped to the 2x2 corner
        assert_eq!(rendered.image[8 * 10 + 8], 0x00);
        assert_eq!(rendered.image[9 * 10 + 9], 0x00);
        assert_eq!(rendered.image[7 * 10 + 7], 0xff);
    }

    #[test]
    fn canvas_frames_stay_inside_rect() {
        let mut canvas = Canvas::new(Size::new(20, 20));
        canvas.draw_frame(Rect::new(Point::new(5, 5), Size::new(10, 10)), 2, 0x00);
        let rendered = canvas.into_rendered();
        assert_eq!(rendered.image[5 * 20 + 5], 0x00);
        assert_eq!(rendered.image[6 * 20 + 6], 0x00);
        assert_eq!(rendered.image[7 * 20 + 7], 0xff);
        assert_eq!(rendered.image[4 * 20 + 4], 0xff);
    }
}
