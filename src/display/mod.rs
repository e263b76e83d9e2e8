//! The display façade: a shadow image in front of the framebuffer sink.
//!
//! Every blit is composed onto the shadow first; only the bounding box of
//! the actual pixel difference travels to the hardware. On an e-ink panel
//! that is the difference between a flash of the whole text area and a
//! flicker-free update of one paragraph.

pub mod sink;

use async_trait::async_trait;

use crate::geometry::{Point, Rect, ScreenInfo, Size};
use crate::render::Rendered;
pub use sink::{DummySink, FramebufferSink, MemorySink, WaveformMode};

#[async_trait(?Send)]
impl FramebufferSink for Box<dyn FramebufferSink> {
    fn screen_info(&self) -> ScreenInfo {
        (**self).screen_info()
    }

    fn set_waveform_mode(&mut self, mode: WaveformMode) {
        (**self).set_waveform_mode(mode);
    }

    async fn display(&mut self, rect: Rect, pixels: &[u8]) -> std::io::Result<()> {
        (**self).display(rect, pixels).await
    }

    async fn clear(&mut self) -> std::io::Result<()> {
        (**self).clear().await
    }
}

pub struct Display<S: FramebufferSink> {
    sink: S,
    size: Size,
    shadow: Vec<u8>,
    saved: Option<Vec<u8>>,
}

pub type DynDisplay = Display<Box<dyn FramebufferSink>>;

impl<S: FramebufferSink> Display<S> {
    pub fn new(sink: S) -> Self {
        let size = sink.screen_info().size;
        Self {
            sink,
            size,
            shadow: vec![0xff; size.total()],
            saved: None,
        }
    }

    pub fn screen_info(&self) -> ScreenInfo {
        self.sink.screen_info()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn set_waveform_mode(&mut self, mode: WaveformMode) {
        self.sink.set_waveform_mode(mode);
    }

    pub async fn clear(&mut self) -> std::io::Result<()> {
        self.shadow.fill(0xff);
        self.sink.clear().await
    }

    /// Pushes a copy of the current screen onto the single-slot stack.
    /// Screens save on deactivation so that modal overlays can restore the
    /// content underneath without rerendering it.
    pub fn save_screen(&mut self) {
        self.saved = Some(self.shadow.clone());
    }

    /// Restores the saved screen, if any, through the normal damage path.
    pub async fn restore_screen(&mut self) -> std::io::Result<()> {
        if let Some(saved) = self.saved.take() {
            self.blit(Rect::from_size(self.size), &saved).await?;
        }
        Ok(())
    }

    pub async fn display_rendered(&mut self, rendered: &Rendered) -> std::io::Result<()> {
        self.blit(rendered.extent, &rendered.image).await
    }

    /// Composes `pixels` (tightly packed, covering `rect`) onto the shadow
    /// and pushes only the changed bounding box to the hardware. A blit that
    /// changes nothing never reaches the wire.
    pub async fn blit(&mut self, rect: Rect, pixels: &[u8]) -> std::io::Result<()> {
        let Some(clipped) = rect.intersection(&Rect::from_size(self.size)) else {
            return Ok(());
        };

        let src_width = rect.spread.width as usize;
        let mut changed: Option<Rect> = None;
        for row in 0..clipped.spread.height {
            let y = clipped.origin.y + row;
            let src_y = (y - rect.origin.y) as usize;
            let src_x = (clipped.origin.x - rect.origin.x) as usize;
            let src_start = src_y * src_width + src_x;
            let dst_start = y as usize * self.size.width as usize + clipped.origin.x as usize;
            let len = clipped.spread.width as usize;

            let src_row = &pixels[src_start..src_start + len];
            let dst_row = &mut self.shadow[dst_start..dst_start + len];
            let mut row_min = None;
            let mut row_max = 0;
            for (x, (src, dst)) in src_row.iter().zip(dst_row.iter_mut()).enumerate() {
                if src != dst {
                    *dst = *src;
                    row_min.get_or_insert(x);
                    row_max = x;
                }
            }
            if let Some(row_min) = row_min {
                let left = clipped.origin.x + row_min as i32;
                let right = clipped.origin.x + row_max as i32 + 1;
                let row_rect = Rect::new(Point::new(left, y), Size::new(right - left, 1));
                changed = Some(match changed {
                    None => row_rect,
                    Some(prev) => union(prev, row_rect),
                });
            }
        }

        let Some(damage) = changed else {
            return Ok(());
        };

        let mut out = Vec::with_capacity(damage.spread.width as usize * damage.spread.height as usize);
        for y in damage.origin.y..damage.max_y() {
            let start = y as usize * self.size.width as usize + damage.origin.x as usize;
            out.extend_from_slice(&self.shadow[start..start + damage.spread.width as usize]);
        }
        self.sink.display(damage, &out).await
    }
}

fn union(a: Rect, b: Rect) -> Rect {
    let x0 = a.origin.x.min(b.origin.x);
    let y0 = a.origin.y.min(b.origin.y);
    let x1 = a.max_x().max(b.max_x());
    let y1 = a.max_y().max(b.max_y());
    Rect::new(Point::new(x0, y0), Size::new(x1 - x0, y1 - y0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run<F: std::future::Future>(fut: F) -> F::Output {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        rt.block_on(fut)
    }

    fn display() -> Display<MemorySink> {
        Display::new(MemorySink::new(Size::new(16, 16)))
    }

    #[test]
    fn identical_blit_is_a_noop() {
        run(async {
            let mut d = display();
            let white = vec![0xff; 16 * 16];
            d.blit(Rect::from_size(Size::new(16, 16)), &white)
                .await
                .unwrap();
            assert!(d.sink().blits.is_empty());
        });
    }

    #[test]
    fn single_pixel_change_produces_minimal_damage() {
        run(async {
            let mut d = display();
            let mut frame = vec![0xff; 16 * 16];
            frame[5 * 16 + 7] = 0x00;
            d.blit(Rect::from_size(Size::new(16, 16)), &frame)
                .await
                .unwrap();
            assert_eq!(d.sink().blits.len(), 1);
            let (rect, bytes) = &d.sink().blits[0];
            assert_eq!(*rect, Rect::new(Point::new(7, 5), Size::new(1, 1)));
            assert_eq!(bytes, &vec![0x00]);
        });
    }

    #[test]
    fn damage_is_the_bounding_box_of_all_changes() {
        run(async {
            let mut d = display();
            let mut frame = vec![0xff; 16 * 16];
            frame[2 * 16 + 3] = 0x00;
            frame[9 * 16 + 12] = 0x40;
            d.blit(Rect::from_size(Size::new(16, 16)), &frame)
                .await
                .unwrap();
            let (rect, _) = &d.sink().blits[0];
            assert_eq!(*rect, Rect::new(Point::new(3, 2), Size::new(10, 8)));
        });
    }

    #[test]
    fn second_identical_blit_is_suppressed() {
        run(async {
            let mut d = display();
            let mut frame = vec![0xff; 16 * 16];
            frame[0] = 0x00;
            let rect = Rect::from_size(Size::new(16, 16));
            d.blit(rect, &frame).await.unwrap();
            d.blit(rect, &frame).await.unwrap();
            assert_eq!(d.sink().blits.len(), 1);
        });
    }

    #[test]
    fn partial_rect_blit_offsets_damage() {
        run(async {
            let mut d = display();
            // paint a 4x4 black block at (8, 8)
            let block = vec![0x00; 4 * 4];
            d.blit(
                Rect::new(Point::new(8, 8), Size::new(4, 4)),
                &block,
            )
            .await
            .unwrap();
            let (rect, bytes) = &d.sink().blits[0];
            assert_eq!(*rect, Rect::new(Point::new(8, 8), Size::new(4, 4)));
            assert_eq!(bytes.len(), 16);
        });
    }

    #[test]
    fn save_and_restore_round_trip() {
        run(async {
            let mut d = display();
            let mut frame = vec![0xff; 16 * 16];
            frame[3 * 16 + 3] = 0x00;
            let full = Rect::from_size(Size::new(16, 16));
            d.blit(full, &frame).await.unwrap();
            d.save_screen();

            // overlay paints over the saved content
            d.blit(full, &vec![0x80; 16 * 16]).await.unwrap();
            d.restore_screen().await.unwrap();

            // the restore repaints exactly the overlay-damaged area back
            let (_, last) = d.sink().blits.last().unwrap();
            assert!(last.contains(&0x00));
            assert!(!last.contains(&0x80));
        });
    }

    #[test]
    fn clear_resets_the_shadow() {
        run(async {
            let mut d = display();
            let mut frame = vec![0xff; 16 * 16];
            frame[0] = 0x00;
            let full = Rect::from_size(Size::new(16, 16));
            d.blit(full, &frame).await.unwrap();
            d.clear().await.unwrap();
            assert_eq!(d.sink().clears, 1);
            // after the clear, repainting the same frame is real damage again
            d.blit(full, &frame).await.unwrap();
            assert_eq!(d.sink().blits.len(), 2);
        });
    }
}
