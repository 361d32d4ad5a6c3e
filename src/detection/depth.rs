//! 深度解析 (4 级回退链)
//!
//! 1. 掩码内有效像素的中央值
//! 2. 重心像素的深度
//! 3. 检测框内稀疏采样的中央值
//! 4. 直前值保持 (带超时)

use std::time::{Duration, Instant};

use image::{ImageBuffer, Luma};
use ndarray::Array2;
use tracing::debug;

use super::segmenter::ColorMask;
use super::types::{Pixel, Region};

/// 深度访问接口: 像素 → 米; 0 或负数表示无读数
pub trait DepthSource {
    fn distance(&self, x: u32, y: u32) -> f32;
}

/// 对齐到彩色图的深度帧 (z16 原始值 × 深度尺度)
#[derive(Clone, Debug, PartialEq)]
pub struct DepthFrame {
    /// 行 = y, 列 = x
    data: Array2<u16>,
    /// 米/单位 (RealSense 默认 0.001)
    scale: f32,
}

impl DepthFrame {
    pub fn new(data: Array2<u16>, scale: f32) -> Self {
        Self { data, scale }
    }

    /// 由 16 位灰度图构造
    pub fn from_image(image: &ImageBuffer<Luma<u16>, Vec<u16>>, scale: f32) -> Self {
        let (w, h) = image.dimensions();
        let data = Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
            image.get_pixel(x as u32, y as u32)[0]
        });
        Self { data, scale }
    }

    pub fn width(&self) -> u32 {
        self.data.ncols() as u32
    }

    pub fn height(&self) -> u32 {
        self.data.nrows() as u32
    }
}

impl DepthSource for DepthFrame {
    fn distance(&self, x: u32, y: u32) -> f32 {
        self.data
            .get((y as usize, x as usize))
            .map_or(0.0, |&raw| raw as f32 * self.scale)
    }
}

/// 每个目标的上次深度值 (值 + 时间戳)
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DepthCache {
    depth: f32,
    stamp: Option<Instant>,
}

impl DepthCache {
    pub fn new(depth: f32, stamp: Instant) -> Self {
        Self {
            depth,
            stamp: Some(stamp),
        }
    }

    pub fn depth(&self) -> f32 {
        self.depth
    }

    pub fn stamp(&self) -> Option<Instant> {
        self.stamp
    }

    fn store(&mut self, depth: f32, now: Instant) {
        self.depth = depth;
        self.stamp = Some(now);
    }
}

/// 深度来源 (回退链的哪一级)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthStage {
    MaskMedian,
    Centroid,
    RegionScan,
    Held,
}

/// 解析出的深度值
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthSample {
    /// 米
    pub depth: f32,
    pub stage: DepthStage,
}

/// 深度解析器
#[derive(Clone, Copy, Debug)]
pub struct DepthResolver {
    /// 直前值保持的有效期
    timeout: Duration,
    /// 检测框稀疏采样步长 (像素)
    scan_stride: u32,
}

impl DepthResolver {
    pub fn new(timeout: Duration, scan_stride: u32) -> Self {
        Self {
            timeout,
            scan_stride: scan_stride.max(1),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 按回退链解析深度
    ///
    /// 检测框即掩码所在区域。第 1-3 级成功时刷新缓存; 第 4 级复用缓存而
    /// 不刷新时间戳; 全部失败时缓存清零。
    pub fn resolve(
        &self,
        source: &impl DepthSource,
        mask: &ColorMask,
        centroid: Pixel,
        cache: &mut DepthCache,
        now: Instant,
    ) -> Option<DepthSample> {
        let live = mask_median(source, mask)
            .map(|d| (d, DepthStage::MaskMedian))
            .or_else(|| centroid_depth(source, centroid).map(|d| (d, DepthStage::Centroid)))
            .or_else(|| {
                region_scan(source, mask.region(), self.scan_stride)
                    .map(|d| (d, DepthStage::RegionScan))
            });

        if let Some((depth, stage)) = live {
            cache.store(depth, now);
            return Some(DepthSample { depth, stage });
        }

        if let Some(depth) = held_depth(cache, now, self.timeout) {
            debug!("深度保持直前值: {:.3}m", depth);
            return Some(DepthSample {
                depth,
                stage: DepthStage::Held,
            });
        }

        cache.store(0.0, now);
        None
    }
}

/// 第 1 级: 掩码内有效深度的中央值
pub fn mask_median(source: &impl DepthSource, mask: &ColorMask) -> Option<f32> {
    let region = mask.region();
    let values: Vec<f32> = mask
        .positive_pixels()
        .map(|(x, y)| source.distance(region.x + x, region.y + y))
        .filter(|&d| d > 0.0)
        .collect();
    median(values)
}

/// 第 2 级: 重心像素的深度
pub fn centroid_depth(source: &impl DepthSource, centroid: Pixel) -> Option<f32> {
    let d = source.distance(centroid.x, centroid.y);
    (d > 0.0).then_some(d)
}

/// 第 3 级: 检测框内按步长稀疏采样的中央值
pub fn region_scan(source: &impl DepthSource, region: Region, stride: u32) -> Option<f32> {
    let stride = stride.max(1) as usize;
    let mut values = Vec::new();
    for y in (region.y..region.y2()).step_by(stride) {
        for x in (region.x..region.x2()).step_by(stride) {
            let d = source.distance(x, y);
            if d > 0.0 {
                values.push(d);
            }
        }
    }
    median(values)
}

/// 第 4 级: 未超时的直前值
pub fn held_depth(cache: &DepthCache, now: Instant, timeout: Duration) -> Option<f32> {
    let stamp = cache.stamp?;
    if cache.depth > 0.0 && now.saturating_duration_since(stamp) < timeout {
        Some(cache.depth)
    } else {
        None
    }
}

/// 中央值 (偶数个时取中间两个的平均)
fn median(mut values: Vec<f32>) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}
