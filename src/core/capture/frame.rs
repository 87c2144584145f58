//! 帧采样 - 单个检测周期内的像素快照

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use super::error::CaptureError;

/// Pixel layout of a sampled frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// 4 bytes per pixel, R G B A
    Rgba8,
    /// 1 byte per pixel, camera Y plane used directly as luminance
    Luma8,
}

impl PixelLayout {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelLayout::Rgba8 => 4,
            PixelLayout::Luma8 => 1,
        }
    }
}

/// Pixel data drawn from the live video source for one tick.
#[derive(Debug, Clone)]
pub struct FrameSample {
    pub width: u32,
    pub height: u32,
    layout: PixelLayout,
    data: Vec<u8>,
}

impl FrameSample {
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self, CaptureError> {
        Self::with_layout(width, height, PixelLayout::Rgba8, data)
    }

    pub fn from_y_plane(width: u32, height: u32, y_plane: Vec<u8>) -> Result<Self, CaptureError> {
        Self::with_layout(width, height, PixelLayout::Luma8, y_plane)
    }

    fn with_layout(
        width: u32,
        height: u32,
        layout: PixelLayout,
        data: Vec<u8>,
    ) -> Result<Self, CaptureError> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(layout.bytes_per_pixel()))
            .ok_or_else(|| {
                CaptureError::InvalidFrame(format!("{}x{} overflows buffer size", width, height))
            })?;

        if data.len() != expected {
            return Err(CaptureError::InvalidFrame(format!(
                "{:?} {}x{} expects {} bytes, got {}",
                layout,
                width,
                height,
                expected,
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            layout,
            data,
        })
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Perceptual luminance (BT.601) of one pixel, normalized to [0, 1].
    ///
    /// Coordinates must lie inside the frame.
    pub fn luma(&self, x: u32, y: u32) -> f32 {
        let idx = (y as usize * self.width as usize + x as usize) * self.layout.bytes_per_pixel();
        match self.layout {
            PixelLayout::Luma8 => self.data[idx] as f32 / 255.0,
            PixelLayout::Rgba8 => {
                let r = self.data[idx] as f32;
                let g = self.data[idx + 1] as f32;
                let b = self.data[idx + 2] as f32;
                (0.299 * r + 0.587 * g + 0.114 * b) / 255.0
            }
        }
    }

    /// Crops `region` into an 8-bit grayscale image (OCR input).
    pub fn crop_luma(&self, region: &Region) -> Result<GrayImage, CaptureError> {
        let rect = region
            .to_pixels(self.width, self.height)
            .ok_or(CaptureError::EmptyRegion)?;

        Ok(GrayImage::from_fn(rect.width(), rect.height(), |x, y| {
            let l = self.luma(rect.x0 + x, rect.y0 + y);
            Luma([(l * 255.0).round().clamp(0.0, 255.0) as u8])
        }))
    }
}

/// Rectangle in fractional frame coordinates (0.0 = left/top, 1.0 = right/bottom).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Region {
    pub const FULL: Region = Region::new(0.0, 0.0, 1.0, 1.0);

    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Clamps every edge into [0, 1] (NaN counts as 0) and swaps reversed edges.
    pub fn clamped(&self) -> Region {
        fn unit(v: f32) -> f32 {
            if v.is_nan() {
                0.0
            } else {
                v.clamp(0.0, 1.0)
            }
        }

        let (l, r) = (unit(self.left), unit(self.right));
        let (t, b) = (unit(self.top), unit(self.bottom));
        Region::new(l.min(r), t.min(b), l.max(r), t.max(b))
    }

    /// Maps to pixel coordinates; `None` when nothing of the region is left.
    pub fn to_pixels(&self, width: u32, height: u32) -> Option<PixelRect> {
        let c = self.clamped();
        let x0 = (c.left * width as f32).round() as u32;
        let y0 = (c.top * height as f32).round() as u32;
        let x1 = ((c.right * width as f32).round() as u32).min(width);
        let y1 = ((c.bottom * height as f32).round() as u32).min(height);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(PixelRect { x0, y0, x1, y1 })
    }
}

/// Half-open pixel rectangle `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }
}
