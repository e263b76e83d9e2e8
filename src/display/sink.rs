//! The narrow interface over the framebuffer hardware.
//!
//! The real panel is driven by an fbink-backed implementation linked in the
//! device build; the tree ships a logging dummy for hosts without a panel
//! and an in-memory sink for tests.

use async_trait::async_trait;

use crate::geometry::{Rect, ScreenInfo, ScreenRotation, Size};

/// Advisory e-ink waveform mode, passed through to the hardware untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaveformMode {
    #[default]
    Auto,
    /// Direct update; black and white only, very fast.
    Du,
    /// Full-quality grayscale refresh.
    Gc16,
    /// Fast non-flashing page turn mode.
    A2,
    /// Reduced-flash mode for sparse text on white.
    Gl16,
}

#[async_trait(?Send)]
pub trait FramebufferSink {
    fn screen_info(&self) -> ScreenInfo;

    fn set_waveform_mode(&mut self, mode: WaveformMode);

    /// Pushes tightly packed 8-bit grayscale pixels covering `rect`.
    async fn display(&mut self, rect: Rect, pixels: &[u8]) -> std::io::Result<()>;

    async fn clear(&mut self) -> std::io::Result<()>;
}

/// Sink for hosts without an e-ink panel: logs traffic and drops the pixels.
pub struct DummySink {
    info: ScreenInfo,
}

impl DummySink {
    pub fn new(size: Size, dpi: f64) -> Self {
        Self {
            info: ScreenInfo {
                size,
                dpi,
                rotation: ScreenRotation::Portrait,
            },
        }
    }
}

#[async_trait(?Send)]
impl FramebufferSink for DummySink {
    fn screen_info(&self) -> ScreenInfo {
        self.info
    }

    fn set_waveform_mode(&mut self, mode: WaveformMode) {
        log::debug!("waveform mode -> {mode:?}");
    }

    async fn display(&mut self, rect: Rect, pixels: &[u8]) -> std::io::Result<()> {
        log::debug!(
            "display {}x{} at ({}, {}), {} bytes",
            rect.spread.width,
            rect.spread.height,
            rect.origin.x,
            rect.origin.y,
            pixels.len()
        );
        Ok(())
    }

    async fn clear(&mut self) -> std::io::Result<()> {
        log::debug!("clear screen");
        Ok(())
    }
}

/// Sink that records every hardware call, for tests.
pub struct MemorySink {
    info: ScreenInfo,
    pub blits: Vec<(Rect, Vec<u8>)>,
    pub clears: usize,
}

impl MemorySink {
    pub fn new(size: Size) -> Self {
        Self {
            info: ScreenInfo {
                size,
                dpi: 300.0,
                rotation: ScreenRotation::Portrait,
            },
            blits: Vec::new(),
            clears: 0,
        }
    }
}

#[async_trait(?Send)]
impl FramebufferSink for MemorySink {
    fn screen_info(&self) -> ScreenInfo {
        self.info
    }

    fn set_waveform_mode(&mut self, _mode: WaveformMode) {}

    async fn display(&mut self, rect: Rect, pixels: &[u8]) -> std::io::Result<()> {
        self.blits.push((rect, pixels.to_vec()));
        Ok(())
    }

    async fn clear(&mut self) -> std::io::Result<()> {
        self.clears += 1;
        Ok(())
    }
}
