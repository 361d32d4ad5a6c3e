//! 颜色分割 (HSV 阈值 → 二值掩码 → 重心)
//!
//! HSV 采用 8 位约定: H ∈ [0, 180) (角度/2), S, V ∈ [0, 255]。

use image::RgbImage;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::types::{Pixel, Region};

/// 掩码中的前景值
pub const MASK_ON: u8 = 255;

/// 闭区间 HSV 阈值
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| self.lower[i] <= hsv[i] && hsv[i] <= self.upper[i])
    }
}

/// 颜色阈值配置: 一个或两个区间
///
/// 红色色相跨越 0°/360°, 需要第二个区间。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvProfile {
    pub primary: HsvRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<HsvRange>,
}

impl HsvProfile {
    pub fn single(range: HsvRange) -> Self {
        Self {
            primary: range,
            secondary: None,
        }
    }

    pub fn wrapped(primary: HsvRange, secondary: HsvRange) -> Self {
        Self {
            primary,
            secondary: Some(secondary),
        }
    }

    /// 默认红色阈值
    pub fn red() -> Self {
        Self::wrapped(
            HsvRange::new([0, 120, 70], [10, 255, 255]),
            HsvRange::new([170, 120, 70], [180, 255, 255]),
        )
    }

    /// 默认蓝色阈值
    pub fn blue() -> Self {
        Self::single(HsvRange::new([100, 120, 70], [130, 255, 255]))
    }

    pub fn matches(&self, hsv: [u8; 3]) -> bool {
        self.primary.contains(hsv) || self.secondary.is_some_and(|r| r.contains(hsv))
    }
}

/// RGB → HSV (8 位)
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let v = r.max(g).max(b);
    let vmin = r.min(g).min(b);
    let diff = v - vmin;

    let s = if v == 0 {
        0
    } else {
        ((255 * diff) as f32 / v as f32 + 0.5).floor() as i32
    };

    let h = if diff == 0 {
        0
    } else {
        // 每个扇区 60°, 折半后为 30
        let sector = if v == r {
            g - b
        } else if v == g {
            b - r + 2 * diff
        } else {
            r - g + 4 * diff
        };
        let h = (30.0 * sector as f32 / diff as f32 + 0.5).floor() as i32;
        if h < 0 {
            h + 180
        } else {
            h
        }
    };

    [h as u8, s as u8, v as u8]
}

/// 区域局部二值掩码
#[derive(Clone, Debug, PartialEq)]
pub struct ColorMask {
    /// 掩码所在的整帧区域
    region: Region,
    /// 行 = y, 列 = x; 值为 0 或 MASK_ON
    data: Array2<u8>,
}

impl ColorMask {
    /// 由现成的掩码数组构造 (形状须为 height x width)
    pub fn from_array(region: Region, data: Array2<u8>) -> Self {
        debug_assert_eq!(
            data.dim(),
            (region.height as usize, region.width as usize)
        );
        Self { region, data }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn is_set(&self, local_x: u32, local_y: u32) -> bool {
        self.data
            .get((local_y as usize, local_x as usize))
            .is_some_and(|&v| v > 0)
    }

    /// 前景像素的局部坐标 (x, y)
    pub fn positive_pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.data
            .indexed_iter()
            .filter(|(_, v)| **v > 0)
            .map(|((y, x), _)| (x as u32, y as u32))
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v > 0).count()
    }

    /// 掩码重心 (一阶矩均值, 截断为整数) 并映射回整帧坐标
    pub fn centroid(&self) -> Option<Pixel> {
        let (mut sum_x, mut sum_y, mut n) = (0u64, 0u64, 0u64);
        for (x, y) in self.positive_pixels() {
            sum_x += x as u64;
            sum_y += y as u64;
            n += 1;
        }
        if n == 0 {
            return None;
        }
        Some(self.region.to_frame((sum_x / n) as u32, (sum_y / n) as u32))
    }
}

/// 对图像区域做颜色分割
///
/// 区域必须位于图像内部 (调用方先用 `BBox::clip` 裁剪)。
pub fn segment(image: &RgbImage, region: Region, profile: &HsvProfile) -> ColorMask {
    let data = Array2::from_shape_fn(
        (region.height as usize, region.width as usize),
        |(y, x)| {
            let p = image.get_pixel(region.x + x as u32, region.y + y as u32);
            if profile.matches(rgb_to_hsv(p[0], p[1], p[2])) {
                MASK_ON
            } else {
                0
            }
        },
    );
    ColorMask::from_array(region, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_rgb_to_hsv_primaries() {
        assert_eq!(rgb_to_hsv(255, 0, 0), [0, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 255, 0), [60, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 0, 255), [120, 255, 255]);
        assert_eq!(rgb_to_hsv(128, 128, 128), [0, 0, 128]);
        assert_eq!(rgb_to_hsv(0, 0, 0), [0, 0, 0]);
    }

    #[test]
    fn test_rgb_to_hsv_wraps_near_red() {
        // 略偏洋红的红色落在 H 上端
        let [h, _, _] = rgb_to_hsv(255, 0, 20);
        assert!(h >= 170 && h < 180, "h = {}", h);
    }

    #[test]
    fn test_red_profile_uses_both_ranges() {
        let red = HsvProfile::red();
        assert!(red.matches(rgb_to_hsv(220, 10, 10)));
        assert!(red.matches(rgb_to_hsv(220, 10, 40)));
        assert!(!red.matches(rgb_to_hsv(10, 10, 220)));
        assert!(HsvProfile::blue().matches(rgb_to_hsv(10, 10, 220)));
    }

    #[test]
    fn test_empty_mask_not_found() {
        let mask = ColorMask::from_array(Region::new(10, 20, 8, 8), Array2::zeros((8, 8)));
        assert_eq!(mask.count(), 0);
        assert!(mask.centroid().is_none());
    }

    #[test]
    fn test_single_pixel_centroid_offset() {
        let mut data = Array2::zeros((8, 8));
        data[[4, 3]] = MASK_ON;
        let mask = ColorMask::from_array(Region::new(10, 20, 8, 8), data);
        assert_eq!(mask.centroid(), Some(Pixel::new(13, 24)));
    }

    #[test]
    fn test_centroid_truncates() {
        let mut data = Array2::zeros((4, 4));
        data[[0, 0]] = MASK_ON;
        data[[1, 1]] = MASK_ON;
        let mask = ColorMask::from_array(Region::new(0, 0, 4, 4), data);
        // 均值 (0.5, 0.5) 截断为 (0, 0)
        assert_eq!(mask.centroid(), Some(Pixel::new(0, 0)));
    }

    #[test]
    fn test_segment_red_patch() {
        let mut img = RgbImage::from_pixel(40, 30, Rgb([20, 200, 20]));
        for y in 12..16 {
            for x in 22..26 {
                img.put_pixel(x, y, Rgb([230, 15, 25]));
            }
        }
        let region = Region::new(20, 10, 10, 10);
        let mask = segment(&img, region, &HsvProfile::red());

        assert_eq!(mask.count(), 16);
        assert!(mask.is_set(2, 2));
        assert!(!mask.is_set(0, 0));
        // 局部重心 (3, 3) → 整帧 (23, 13)
        assert_eq!(mask.centroid(), Some(Pixel::new(23, 13)));
    }

    #[test]
    fn test_segment_no_match() {
        let img = RgbImage::from_pixel(16, 16, Rgb([20, 200, 20]));
        let mask = segment(&img, Region::new(0, 0, 16, 16), &HsvProfile::blue());
        assert!(mask.centroid().is_none());
    }
}
