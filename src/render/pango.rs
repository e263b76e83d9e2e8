//! The Pango-backed text renderer.
//!
//! Markup is laid out with word-char wrapping at the requested width and
//! rasterized onto an A8 surface; the alpha channel becomes ink on paper
//! white.

use pango::prelude::*;

use super::{Alignment, RenderError, RenderedText, TextRenderer};
use crate::geometry::Size;

pub struct PangoRenderer {
    context: pango::Context,
}

impl PangoRenderer {
    pub fn new(dpi: f64) -> Self {
        let fontmap = pangocairo::FontMap::new();
        let context = fontmap.create_context();
        pangocairo::functions::context_set_resolution(&context, dpi);
        Self { context }
    }

    fn make_layout(&self, font: &str, width: i32, alignment: Alignment) -> pango::Layout {
        let layout = pango::Layout::new(&self.context);
        layout.set_auto_dir(false);
        layout.set_ellipsize(pango::EllipsizeMode::None);
        layout.set_justify(false);
        layout.set_single_paragraph_mode(false);
        layout.set_wrap(pango::WrapMode::WordChar);
        layout.set_width(width * pango::SCALE);
        layout.set_alignment(match alignment {
            Alignment::Left => pango::Alignment::Left,
            Alignment::Center => pango::Alignment::Center,
        });
        let desc = pango::FontDescription::from_string(font);
        layout.set_font_description(Some(&desc));
        layout
    }
}

impl TextRenderer for PangoRenderer {
    fn render_markup_aligned(
        &self,
        markup: &str,
        font: &str,
        width: i32,
        alignment: Alignment,
    ) -> Result<RenderedText, RenderError> {
        let layout = self.make_layout(font, width, alignment);
        layout.set_markup(markup);
        let (_, height) = layout.pixel_size();
        if height <= 0 || width <= 0 {
            return Ok(RenderedText::empty(width));
        }

        let mut surface = cairo::ImageSurface::create(cairo::Format::A8, width, height)
            .map_err(|e| RenderError::Surface(e.to_string()))?;
        {
            let cr = cairo::Context::new(&surface)
                .map_err(|e| RenderError::Draw(e.to_string()))?;
            pangocairo::functions::show_layout(&cr, &layout);
        }
        surface.flush();

        let stride = surface.stride() as usize;
        let data = surface
            .data()
            .map_err(|e| RenderError::Draw(e.to_string()))?;
        let mut buf = vec![0xffu8; (width * height) as usize];
        for y in 0..height as usize {
            for x in 0..width as usize {
                buf[y * width as usize + x] = 0xff - data[y * stride + x];
            }
        }
        Ok(RenderedText {
            buf,
            size: Size::new(width, height),
        })
    }

    fn line_height(&self, font: &str) -> i32 {
        let desc = pango::FontDescription::from_string(font);
        let metrics = self.context.metrics(Some(&desc), None);
        metrics.height() / pango::SCALE
    }
}
