//! 融合步骤 (FusionStep)
//! 职责: 每帧对每个跟踪目标执行 predict → 分割 → 深度 → 反投影 → update,
//! 然后计算两目标间距离

use std::time::Instant;

use image::RgbImage;
use nalgebra::Vector3;
use tracing::{debug, info};

use super::deproject::{deproject, Intrinsics};
use super::depth::{DepthResolver, DepthSource};
use super::segmenter::segment;
use super::tracker::TrackedObject;
use super::types::{Detection, FrameReport, ObjectReport, Pixel, METERS_TO_MILLIMETERS};

/// 单个目标本帧的观测提取结果
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Measurement {
    point: Option<Vector3<f64>>,
    centroid: Option<Pixel>,
}

pub struct FusionStep {
    /// 跟踪目标 (前两个参与测距)
    objects: Vec<TrackedObject>,
    resolver: DepthResolver,
    intrinsics: Intrinsics,
    /// 低于此置信度的检测框忽略
    min_confidence: f32,
    frame_index: u64,
}

impl FusionStep {
    pub fn new(
        objects: Vec<TrackedObject>,
        resolver: DepthResolver,
        intrinsics: Intrinsics,
        min_confidence: f32,
    ) -> Self {
        info!(
            "🎯 融合步骤: {} 个目标 [{}] | 深度保持 {:.2}s",
            objects.len(),
            objects
                .iter()
                .map(|o| o.label())
                .collect::<Vec<_>>()
                .join(", "),
            resolver.timeout().as_secs_f64()
        );
        Self {
            objects,
            resolver,
            intrinsics,
            min_confidence,
            frame_index: 0,
        }
    }

    pub fn objects(&self) -> &[TrackedObject] {
        &self.objects
    }

    pub fn object(&self, label: &str) -> Option<&TrackedObject> {
        self.objects.iter().find(|o| o.label() == label)
    }

    /// 处理一帧
    ///
    /// 本函数不会失败: 未检测、空区域、空掩码、无深度都只是让该目标本帧
    /// 只做预测。
    pub fn process(
        &mut self,
        image: &RgbImage,
        depth: &impl DepthSource,
        detections: &[Detection],
        now: Instant,
    ) -> FrameReport {
        let frame_index = self.frame_index;
        self.frame_index += 1;

        let mut reports = Vec::with_capacity(self.objects.len());

        for object in &mut self.objects {
            // 1. 无条件预测 (保持与帧率同步)
            object.predict();

            // 2. 有检测框时提取观测
            let detection = best_detection(detections, object.label(), self.min_confidence);
            let measurement = match detection {
                Some(det) => extract_measurement(
                    object,
                    det,
                    image,
                    depth,
                    &self.resolver,
                    &self.intrinsics,
                    now,
                ),
                None => Measurement::default(),
            };

            if let Some(point) = measurement.point {
                object.update(&point);
            }

            // 3. 读取滤波结果
            reports.push(ObjectReport {
                label: object.label().to_string(),
                position: object.position(),
                confidence: detection.map(|d| d.confidence),
                centroid: measurement.centroid,
            });
        }

        let distance_mm = match (reports.first(), reports.get(1)) {
            (
                Some(ObjectReport {
                    position: Some(a), ..
                }),
                Some(ObjectReport {
                    position: Some(b), ..
                }),
            ) => Some((a - b).norm() * METERS_TO_MILLIMETERS),
            _ => None,
        };

        debug!(
            "帧 {}: 距离 {}",
            frame_index,
            distance_mm.map_or_else(|| "---".to_string(), |d| format!("{:.1}mm", d))
        );

        FrameReport {
            frame_index,
            objects: reports,
            distance_mm,
        }
    }
}

/// 同一类别取置信度最高的检测框
fn best_detection<'a>(
    detections: &'a [Detection],
    label: &str,
    min_confidence: f32,
) -> Option<&'a Detection> {
    detections
        .iter()
        .filter(|d| d.label == label && d.confidence >= min_confidence)
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
}

/// 裁剪 → 颜色分割 → 深度解析 → 反投影
fn extract_measurement(
    object: &mut TrackedObject,
    detection: &Detection,
    image: &RgbImage,
    depth: &impl DepthSource,
    resolver: &DepthResolver,
    intrinsics: &Intrinsics,
    now: Instant,
) -> Measurement {
    let Some(region) = detection.bbox.clip(image.width(), image.height()) else {
        debug!("{}: 检测框裁剪后为空", object.label());
        return Measurement::default();
    };

    let mask = segment(image, region, object.profile());
    let Some(centroid) = mask.centroid() else {
        debug!("{}: 颜色掩码为空", object.label());
        return Measurement::default();
    };

    let sample = resolver.resolve(depth, &mask, centroid, object.depth_cache_mut(), now);
    let point = match sample {
        Some(s) if s.depth > 0.0 => Some(deproject(intrinsics, centroid, s.depth)),
        _ => {
            debug!("{}: 深度不可用 @ ({}, {})", object.label(), centroid.x, centroid.y);
            None
        }
    };

    Measurement {
        point,
        centroid: Some(centroid),
    }
}
