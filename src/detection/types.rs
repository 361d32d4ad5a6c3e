/// 指尖测距系统数据结构定义
/// Data structures for the fingertip distance pipeline
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

// ========== 公共常量 ==========

/// 米 → 毫米
pub const METERS_TO_MILLIMETERS: f64 = 1000.0;

// ========== 数据结构 ==========

/// 像素坐标 (整帧坐标系)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pixel {
    pub x: u32,
    pub y: u32,
}

impl Pixel {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// 检测框 (Detection bounding box, xyxy)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// 裁剪到画面范围
    ///
    /// 坐标先截断为整数再夹到 `[0, width] x [0, height]`;
    /// 裁剪后为空则返回 `None`。
    pub fn clip(&self, width: u32, height: u32) -> Option<Region> {
        let x1 = (self.x1 as i64).max(0);
        let y1 = (self.y1 as i64).max(0);
        let x2 = (self.x2 as i64).min(width as i64);
        let y2 = (self.y2 as i64).min(height as i64);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        Some(Region {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
        })
    }
}

/// 图像区域 (半开区间 `[x, x + width) x [y, y + height)`)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn x2(&self) -> u32 {
        self.x + self.width
    }

    pub fn y2(&self) -> u32 {
        self.y + self.height
    }

    /// 局部坐标 → 整帧坐标
    pub fn to_frame(&self, local_x: u32, local_y: u32) -> Pixel {
        Pixel::new(self.x + local_x, self.y + local_y)
    }
}

/// 单个检测结果 (检测器 → 融合步骤)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// 类别名称, 例如 "red_finger"
    pub label: String,
    /// 置信度 [0, 1]
    pub confidence: f32,
    pub bbox: BBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// 单个跟踪目标的帧结果
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectReport {
    pub label: String,
    /// 滤波后的3D位置 (米, 相机坐标系); 未初始化时为 None
    pub position: Option<Vector3<f64>>,
    /// 本帧所用检测框的原始置信度
    pub confidence: Option<f32>,
    /// 本帧颜色分割重心 (深度解析失败时仍然保留)
    pub centroid: Option<Pixel>,
}

/// 一帧的输出 (融合步骤 → 记录/显示)
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    pub objects: Vec<ObjectReport>,
    /// 两个目标间距离 (毫米)
    pub distance_mm: Option<f64>,
}

impl FrameReport {
    pub fn object(&self, label: &str) -> Option<&ObjectReport> {
        self.objects.iter().find(|o| o.label == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_inside_frame() {
        let region = BBox::new(10.7, 20.2, 50.9, 60.0).clip(640, 480).unwrap();
        assert_eq!(region, Region::new(10, 20, 40, 40));
    }

    #[test]
    fn test_clip_to_bounds() {
        let region = BBox::new(-15.0, -3.5, 700.0, 500.0).clip(640, 480).unwrap();
        assert_eq!(region, Region::new(0, 0, 640, 480));
    }

    #[test]
    fn test_clip_empty() {
        assert!(BBox::new(650.0, 10.0, 700.0, 20.0).clip(640, 480).is_none());
        assert!(BBox::new(10.0, 10.0, 10.9, 20.0).clip(640, 480).is_none());
    }

    #[test]
    fn test_detection_json() {
        let json = r#"{"label":"red_finger","confidence":0.8,"bbox":{"x1":1.0,"y1":2.0,"x2":3.0,"y2":4.0}}"#;
        let det: Detection = serde_json::from_str(json).unwrap();
        assert_eq!(det.label, "red_finger");
        assert_eq!(det.bbox, BBox::new(1.0, 2.0, 3.0, 4.0));
    }
}
