//! 区域分析 - 亮度 / 对比度 / 边缘密度 / 矩形框特征
//!
//! All analyzers walk the same fixed sample grid (every `SAMPLE_STRIDE` pixels in
//! both axes), so a given frame always yields the same scores. Edge analyzers
//! compare each grid sample with its adjacent pixels, not with the next sample.

use super::frame::{FrameSample, PixelRect, Region};
use super::target::Signal;

/// Distance between grid samples, in pixels
pub const SAMPLE_STRIDE: usize = 2;
/// Luma delta to an adjacent pixel that counts as an edge (30/255)
pub const EDGE_DELTA: f32 = 30.0 / 255.0;
/// Border band thickness as a fraction of the region extent
pub const BORDER_BAND: f32 = 0.15;
/// Border edge density at which framing strength saturates
pub const FRAME_EDGE_TARGET: f32 = 0.05;

/// Analyzer outputs for one tick, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RegionScore {
    pub brightness: f32,
    pub contrast: f32,
    pub edge_density: f32,
    /// Edges running horizontally (vertical luma steps only)
    pub horizontal_edges: f32,
    pub shape_confidence: f32,
}

impl RegionScore {
    pub fn value(&self, signal: Signal) -> f32 {
        match signal {
            Signal::Brightness => self.brightness,
            Signal::Contrast => self.contrast,
            Signal::EdgeDensity => self.edge_density,
            Signal::HorizontalEdges => self.horizontal_edges,
            Signal::Shape => self.shape_confidence,
        }
    }
}

pub fn analyze_region(frame: &FrameSample, region: &Region) -> RegionScore {
    let Some(rect) = region.to_pixels(frame.width, frame.height) else {
        return RegionScore::default();
    };

    RegionScore {
        brightness: mean_luma(frame, rect),
        contrast: luma_range(frame, rect),
        edge_density: edge_density_in(frame, rect),
        horizontal_edges: horizontal_edges_in(frame, rect),
        shape_confidence: shape_in(frame, rect),
    }
}

pub fn brightness(frame: &FrameSample, region: &Region) -> f32 {
    region
        .to_pixels(frame.width, frame.height)
        .map(|rect| mean_luma(frame, rect))
        .unwrap_or(0.0)
}

pub fn contrast(frame: &FrameSample, region: &Region) -> f32 {
    region
        .to_pixels(frame.width, frame.height)
        .map(|rect| luma_range(frame, rect))
        .unwrap_or(0.0)
}

pub fn edge_density(frame: &FrameSample, region: &Region) -> f32 {
    region
        .to_pixels(frame.width, frame.height)
        .map(|rect| edge_density_in(frame, rect))
        .unwrap_or(0.0)
}

pub fn horizontal_edges(frame: &FrameSample, region: &Region) -> f32 {
    region
        .to_pixels(frame.width, frame.height)
        .map(|rect| horizontal_edges_in(frame, rect))
        .unwrap_or(0.0)
}

pub fn shape_confidence(frame: &FrameSample, region: &Region) -> f32 {
    region
        .to_pixels(frame.width, frame.height)
        .map(|rect| shape_in(frame, rect))
        .unwrap_or(0.0)
}

fn sample_points(rect: PixelRect) -> impl Iterator<Item = (u32, u32)> {
    (rect.y0..rect.y1).step_by(SAMPLE_STRIDE).flat_map(move |y| {
        (rect.x0..rect.x1)
            .step_by(SAMPLE_STRIDE)
            .map(move |x| (x, y))
    })
}

fn mean_luma(frame: &FrameSample, rect: PixelRect) -> f32 {
    let (sum, count) = sample_points(rect).fold((0.0f64, 0u32), |(sum, count), (x, y)| {
        (sum + frame.luma(x, y) as f64, count + 1)
    });

    if count == 0 {
        return 0.0;
    }
    ((sum / count as f64) as f32).clamp(0.0, 1.0)
}

fn luma_range(frame: &FrameSample, rect: PixelRect) -> f32 {
    let mut min = f32::MAX;
    let mut max = f32::MIN;
    for (x, y) in sample_points(rect) {
        let l = frame.luma(x, y);
        min = min.min(l);
        max = max.max(l);
    }

    if max < min {
        return 0.0;
    }
    (max - min).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    X,
    Y,
}

/// Whether the sample at (x, y) differs from either adjacent pixel along
/// `axis` by more than `EDGE_DELTA`. `None` when neither neighbour is inside `rect`.
fn step_edge(frame: &FrameSample, rect: PixelRect, x: u32, y: u32, axis: Axis) -> Option<bool> {
    let (before, after) = match axis {
        Axis::X => ((x > rect.x0).then(|| (x - 1, y)), (x + 1 < rect.x1).then(|| (x + 1, y))),
        Axis::Y => ((y > rect.y0).then(|| (x, y - 1)), (y + 1 < rect.y1).then(|| (x, y + 1))),
    };
    if before.is_none() && after.is_none() {
        return None;
    }

    let l = frame.luma(x, y);
    Some(
        [before, after]
            .into_iter()
            .flatten()
            .any(|(nx, ny)| (frame.luma(nx, ny) - l).abs() > EDGE_DELTA),
    )
}

fn edge_fraction(frame: &FrameSample, rect: PixelRect, axes: &[Axis]) -> f32 {
    let mut edges = 0u32;
    let mut comparisons = 0u32;

    for (x, y) in sample_points(rect) {
        for &axis in axes {
            if let Some(is_edge) = step_edge(frame, rect, x, y, axis) {
                comparisons += 1;
                if is_edge {
                    edges += 1;
                }
            }
        }
    }

    if comparisons == 0 {
        0.0
    } else {
        edges as f32 / comparisons as f32
    }
}

/// Grid samples with a luma step to an adjacent pixel, both directions.
fn edge_density_in(frame: &FrameSample, rect: PixelRect) -> f32 {
    edge_fraction(frame, rect, &[Axis::X, Axis::Y])
}

/// 水平边缘 - 上下相邻像素的亮度跳变（横向笔画、车牌上下边框）
fn horizontal_edges_in(frame: &FrameSample, rect: PixelRect) -> f32 {
    edge_fraction(frame, rect, &[Axis::Y])
}

/// Rectangular framing: edges concentrated in all four border bands relative
/// to the interior.
fn shape_in(frame: &FrameSample, rect: PixelRect) -> f32 {
    let band_w = ((rect.width() as f32 * BORDER_BAND).round() as u32).max(1);
    let band_h = ((rect.height() as f32 * BORDER_BAND).round() as u32).max(1);

    // 区域太小，没有内部可言
    if band_w * 2 >= rect.width() || band_h * 2 >= rect.height() {
        return 0.0;
    }

    let top = PixelRect { y1: rect.y0 + band_h, ..rect };
    let bottom = PixelRect { y0: rect.y1 - band_h, ..rect };
    let left = PixelRect { x1: rect.x0 + band_w, ..rect };
    let right = PixelRect { x0: rect.x1 - band_w, ..rect };
    let interior = PixelRect {
        x0: rect.x0 + band_w,
        y0: rect.y0 + band_h,
        x1: rect.x1 - band_w,
        y1: rect.y1 - band_h,
    };

    let framing = [top, bottom, left, right]
        .into_iter()
        .map(|band| edge_density_in(frame, band))
        .fold(f32::MAX, f32::min);

    if framing <= 0.0 {
        return 0.0;
    }

    let inner = edge_density_in(frame, interior);
    let strength = (framing / FRAME_EDGE_TARGET).min(1.0);
    let concentration = framing / (framing + inner);

    (strength * (2.0 * concentration).min(1.0)).clamp(0.0, 1.0)
}
