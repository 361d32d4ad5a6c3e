/// 估计系统 (Estimation System)
///
/// 每帧同步执行, 负责把检测框变成滤波后的3D位置
/// - Segmenter:  HSV 颜色分割 → 掩码重心
/// - Depth:      深度回退链
/// - Deproject:  像素 + 深度 → 3D 点
/// - Tracker:    每个指尖独立的卡尔曼滤波
/// - Fusion:     逐帧编排 + 指间距离
pub mod deproject;
pub mod depth;
pub mod fusion;
pub mod segmenter;
pub mod tracker;
pub mod types;

pub use deproject::{deproject, DistortionModel, Intrinsics};
pub use depth::{DepthCache, DepthFrame, DepthResolver, DepthSample, DepthSource, DepthStage};
pub use fusion::FusionStep;
pub use segmenter::{segment, ColorMask, HsvProfile, HsvRange};
pub use tracker::{KalmanFilter3D, TrackedObject};
pub use types::{BBox, Detection, FrameReport, ObjectReport, Pixel, Region};
