//! Shared UI widgets for menu and dialog screens.

use crate::geometry::{Point, Rect, Size};
use crate::render::markup::escape_for_markup;
use crate::render::{Alignment, Canvas, RenderError, TextRenderer};

/// Enclosed-alphanumeric glyphs used as menu shortcuts; they render well in
/// the symbol fonts shipped on the device.
pub fn circled(c: char) -> char {
    match c {
        '0' => '\u{24ea}',
        '1'..='9' => char::from_u32(0x2460 + (c as u32 - '1' as u32)).unwrap_or(c),
        'Y' => '\u{24ce}',
        'N' => '\u{24c3}',
        _ => c,
    }
}

pub const UI_FONT: &str = "Crimson Pro 12";
pub const TITLE_FONT: &str = "Crimson Pro 48";
pub const BUTTON_FONT: &str = "B612 10";
pub const SMALL_FONT: &str = "Crimson Pro 8";

pub const BUTTON_SIZE: Size = Size {
    width: 400,
    height: 100,
};

/// A tappable labeled box.
pub struct Button<T> {
    pub rect: Rect,
    pub label: String,
    pub value: T,
    pub selected: bool,
}

impl<T> Button<T> {
    pub fn new(rect: Rect, label: impl Into<String>, value: T) -> Self {
        Self {
            rect,
            label: label.into(),
            value,
            selected: false,
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        self.rect.contains(p)
    }

    pub fn render(
        &self,
        canvas: &mut Canvas,
        renderer: &dyn TextRenderer,
        font: &str,
    ) -> Result<(), RenderError> {
        canvas.draw_frame(self.rect, if self.selected { 6 } else { 2 }, 0x00);
        let inset = 10;
        let text = renderer.render_markup_aligned(
            &escape_for_markup(&self.label),
            font,
            self.rect.spread.width - 2 * inset,
            Alignment::Center,
        )?;
        if text.is_empty() {
            return Ok(());
        }
        let y = self.rect.origin.y + (self.rect.spread.height - text.size.height) / 2;
        canvas.draw_text(Point::new(self.rect.origin.x + inset, y), &text);
        Ok(())
    }
}

/// Lays out `count` standard buttons in one centered column, spread evenly
/// over the screen height.
pub fn button_column(screen: Size, count: usize) -> Vec<Rect> {
    let x = (screen.width - BUTTON_SIZE.width) / 2;
    let total = BUTTON_SIZE.height * count as i32;
    let skip = (screen.height - total).max(0) / (count as i32 + 1);
    (0..count)
        .map(|i| {
            Rect::new(
                Point::new(x, skip + i as i32 * (BUTTON_SIZE.height + skip)),
                BUTTON_SIZE,
            )
        })
        .collect()
}

/// A labeled menu row: `① · · · New Session`.
pub fn menu_row(shortcut: char, text: &str) -> String {
    format!(
        "<span font=\"Noto Sans Symbols\">{}</span> \u{b7} \u{b7} \u{b7} {}",
        circled(shortcut),
        text
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circled_digits() {
        assert_eq!(circled('0'), '\u{24ea}');
        assert_eq!(circled('1'), '\u{2460}');
        assert_eq!(circled('9'), '\u{2468}');
        assert_eq!(circled('Y'), '\u{24ce}');
        assert_eq!(circled('x'), 'x');
    }

    #[test]
    fn button_column_spreads_evenly() {
        let rects = button_column(Size::new(1000, 1400), 3);
        assert_eq!(rects.len(), 3);
        assert!(rects.iter().all(|r| r.origin.x == 300));
        let gap0 = rects[0].origin.y;
        let gap1 = rects[1].origin.y - rects[0].max_y();
        assert_eq!(gap0, gap1);
        assert!(rects[2].max_y() <= 1400);
    }
}
