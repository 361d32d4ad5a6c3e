//! 计测配置 - 通过JSON文件调整参数
//!
//! 每个分区都有默认值, 配置文件只需写需要覆盖的键。

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::detection::{
    DepthResolver, DistortionModel, FusionStep, HsvProfile, Intrinsics, KalmanFilter3D,
    TrackedObject,
};
use crate::error::{Result, TrackerError};

/// 相机参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    /// 目标帧率 (决定卡尔曼 dt)
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

/// 检测器参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// 检测置信度阈值
    pub confidence: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { confidence: 0.5 }
    }
}

/// 滤波参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub kalman_q: f64,       // 过程噪声 q
    pub kalman_r: f64,       // 观测噪声 r
    pub depth_timeout: f64, // 深度保持超时 (秒)
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            kalman_q: 0.01,
            kalman_r: 0.1,
            depth_timeout: 0.5,
        }
    }
}

/// 深度参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthConfig {
    pub scale: f32,       // 米/单位 (z16)
    pub scan_stride: u32, // 检测框稀疏采样步长
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            scale: 0.001,
            scan_stride: 2,
        }
    }
}

/// 跟踪目标: 检测类别 → HSV 阈值名
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub label: String,
    pub hsv: String,
}

impl TargetConfig {
    pub fn new(label: &str, hsv: &str) -> Self {
        Self {
            label: label.to_string(),
            hsv: hsv.to_string(),
        }
    }
}

/// 采集数据目录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub output_dir: PathBuf,
    pub prefix: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data/images"),
            prefix: "frame".to_string(),
        }
    }
}

/// 计测记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordConfig {
    pub enabled: bool,
    pub output_dir: PathBuf,
    /// CSV 时间戳的时区 (小时)
    pub utc_offset_hours: i32,
}

impl Default for RecordConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: PathBuf::from("logs"),
            utc_offset_hours: 9,
        }
    }
}

/// 全部配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub camera: CameraConfig,
    pub model: ModelConfig,
    pub hsv: BTreeMap<String, HsvProfile>,
    pub filter: FilterConfig,
    pub depth: DepthConfig,
    pub intrinsics: Intrinsics,
    pub targets: Vec<TargetConfig>,
    pub capture: CaptureConfig,
    pub record: RecordConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            model: ModelConfig::default(),
            hsv: default_profiles(),
            filter: FilterConfig::default(),
            depth: DepthConfig::default(),
            intrinsics: Intrinsics::default(),
            targets: vec![
                TargetConfig::new("red_finger", "red"),
                TargetConfig::new("blue_finger", "blue"),
            ],
            capture: CaptureConfig::default(),
            record: RecordConfig::default(),
        }
    }
}

/// 深度保持超时 (秒) → Duration; 负数、NaN 或过大时报错
fn depth_timeout(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|e| {
        TrackerError::Config(format!("filter.depth_timeout {} is out of range: {}", secs, e))
    })
}

/// 把 `patch` 合并进 `base`
fn deep_merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

fn default_profiles() -> BTreeMap<String, HsvProfile> {
    BTreeMap::from([
        ("red".to_string(), HsvProfile::red()),
        ("blue".to_string(), HsvProfile::blue()),
    ])
}

impl AppConfig {
    /// 从JSON文件加载配置
    ///
    /// 文件不存在时写出默认配置; 解析或校验失败返回错误。
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("📝 配置文件不存在: {}, 创建默认配置...", path.display());
            let config = Self::default();
            config.save(path)?;
            return Ok(config);
        }

        let json = fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        info!("✅ 配置已从 {} 加载", path.display());
        Ok(config)
    }

    /// 解析JSON并与默认值逐字段深度合并
    ///
    /// 对象按键递归合并, 其余值 (含数组) 整体替换。
    pub fn from_json_str(json: &str) -> Result<Self> {
        let patch: Value = serde_json::from_str(json)?;
        let mut merged = serde_json::to_value(Self::default())?;
        deep_merge(&mut merged, patch);
        let config: Self = serde_json::from_value(merged)?;
        config.validate()?;
        Ok(config)
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(TrackerError::Config(msg));

        if self.camera.fps == 0 {
            return invalid("camera.fps must be positive".into());
        }
        if !(0.0..=1.0).contains(&self.model.confidence) {
            return invalid(format!(
                "model.confidence must be in [0, 1], got {}",
                self.model.confidence
            ));
        }
        if self.filter.kalman_q <= 0.0 || self.filter.kalman_r <= 0.0 {
            return invalid("filter.kalman_q and filter.kalman_r must be positive".into());
        }
        depth_timeout(self.filter.depth_timeout)?;
        if self.depth.scale <= 0.0 {
            return invalid("depth.scale must be positive".into());
        }
        if self.depth.scan_stride == 0 {
            return invalid("depth.scan_stride must be at least 1".into());
        }
        if self.intrinsics.fx <= 0.0 || self.intrinsics.fy <= 0.0 {
            return invalid("intrinsics.fx and intrinsics.fy must be positive".into());
        }
        if self.intrinsics.model == DistortionModel::FTheta && self.intrinsics.coeffs[0] == 0.0 {
            return invalid("intrinsics.coeffs[0] must be non-zero for the ftheta model".into());
        }
        if !(-23..=23).contains(&self.record.utc_offset_hours) {
            return invalid(format!(
                "record.utc_offset_hours must be in [-23, 23], got {}",
                self.record.utc_offset_hours
            ));
        }
        if self.targets.len() != 2 {
            return invalid(format!(
                "exactly two targets are required, got {}",
                self.targets.len()
            ));
        }
        if self.targets[0].label == self.targets[1].label {
            return invalid(format!("duplicate target label {:?}", self.targets[0].label));
        }
        for target in &self.targets {
            if !self.hsv.contains_key(&target.hsv) {
                return invalid(format!(
                    "target {:?} refers to unknown hsv profile {:?}",
                    target.label, target.hsv
                ));
            }
        }
        Ok(())
    }

    /// 帧间隔 (秒)
    pub fn frame_interval(&self) -> f64 {
        1.0 / self.camera.fps as f64
    }

    /// 按配置构建融合步骤 (每个目标独立的滤波器与深度缓存)
    pub fn fusion_step(&self) -> Result<FusionStep> {
        self.validate()?;
        let dt = self.frame_interval();
        let objects = self
            .targets
            .iter()
            .map(|t| {
                TrackedObject::new(
                    t.label.clone(),
                    self.hsv[&t.hsv].clone(),
                    KalmanFilter3D::new(self.filter.kalman_q, self.filter.kalman_r, dt),
                )
            })
            .collect();
        let resolver =
            DepthResolver::new(depth_timeout(self.filter.depth_timeout)?, self.depth.scan_stride);
        Ok(FusionStep::new(
            objects,
            resolver,
            self.intrinsics,
            self.model.confidence,
        ))
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  当前计测配置:");
        info!(
            "  相机: {}x{}@{}fps (dt = {:.4}s)",
            self.camera.width,
            self.camera.height,
            self.camera.fps,
            self.frame_interval()
        );
        info!("  检测置信度: {:.2}", self.model.confidence);
        info!(
            "  卡尔曼 q/r: {}/{} | 深度保持: {:.2}s | 采样步长: {}",
            self.filter.kalman_q,
            self.filter.kalman_r,
            self.filter.depth_timeout,
            self.depth.scan_stride
        );
        info!(
            "  内参: fx={:.1} fy={:.1} ppx={:.1} ppy={:.1} ({:?})",
            self.intrinsics.fx,
            self.intrinsics.fy,
            self.intrinsics.ppx,
            self.intrinsics.ppy,
            self.intrinsics.model
        );
        for target in &self.targets {
            info!("  目标: {} → {}", target.label, target.hsv);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::HsvRange;

    #[test]
    fn test_config_default() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.camera.fps, 30);
        assert_eq!(config.hsv["red"], HsvProfile::red());
        assert!((config.frame_interval() - 1.0 / 30.0).abs() < 1e-12);
    }

    #[test]
    fn test_partial_json_merges_defaults() {
        let json = r#"{
            "filter": { "kalman_q": 0.05 },
            "hsv": { "blue": { "primary": { "lower": [95, 100, 60], "upper": [135, 255, 255] } } }
        }"#;
        let config = AppConfig::from_json_str(json).unwrap();

        assert_eq!(config.filter.kalman_q, 0.05);
        assert_eq!(config.filter.kalman_r, 0.1);
        assert_eq!(config.camera.width, 1280);
        assert_eq!(
            config.hsv["blue"],
            HsvProfile::single(HsvRange::new([95, 100, 60], [135, 255, 255]))
        );
        // 未写出的 red 保留默认
        assert_eq!(config.hsv["red"], HsvProfile::red());
    }

    #[test]
    fn test_partial_red_keeps_wrap_range() {
        let json = r#"{ "hsv": { "red": { "primary": { "lower": [0, 100, 50] } } } }"#;
        let config = AppConfig::from_json_str(json).unwrap();

        let red = &config.hsv["red"];
        assert_eq!(red.primary, HsvRange::new([0, 100, 50], [10, 255, 255]));
        assert_eq!(red.secondary, HsvProfile::red().secondary);
        assert!(red.secondary.is_some());
    }

    #[test]
    fn test_targets_array_replaced_whole() {
        let json = r#"{ "targets": [
            { "label": "left", "hsv": "blue" },
            { "label": "right", "hsv": "red" }
        ] }"#;
        let config = AppConfig::from_json_str(json).unwrap();
        assert_eq!(
            config.targets,
            [TargetConfig::new("left", "blue"), TargetConfig::new("right", "red")]
        );
    }

    #[test]
    fn test_huge_depth_timeout_is_config_error() {
        let json = r#"{ "filter": { "depth_timeout": 1e30 } }"#;
        assert!(matches!(
            AppConfig::from_json_str(json),
            Err(TrackerError::Config(_))
        ));

        let mut config = AppConfig::default();
        config.filter.depth_timeout = -0.1;
        assert!(matches!(config.fusion_step(), Err(TrackerError::Config(_))));
    }

    #[test]
    fn test_ftheta_needs_nonzero_coefficient() {
        let json = r#"{ "intrinsics": { "model": "ftheta" } }"#;
        match AppConfig::from_json_str(json) {
            Err(TrackerError::Config(msg)) => assert!(msg.contains("ftheta")),
            other => panic!("unexpected: {:?}", other),
        }

        let json = r#"{ "intrinsics": { "model": "ftheta", "coeffs": [0.9, 0, 0, 0, 0] } }"#;
        assert!(AppConfig::from_json_str(json).is_ok());
    }

    #[test]
    fn test_validation_rejects_unknown_profile() {
        let json = r#"{ "targets": [
            { "label": "red_finger", "hsv": "red" },
            { "label": "green_finger", "hsv": "green" }
        ] }"#;
        match AppConfig::from_json_str(json) {
            Err(TrackerError::Config(msg)) => assert!(msg.contains("green")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_validation_rejects_bad_noise() {
        let mut config = AppConfig::default();
        config.filter.kalman_r = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.camera.fps = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.targets.pop();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = AppConfig::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, AppConfig::default());

        let reloaded = AppConfig::load(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_fusion_step_from_config() {
        let fusion = AppConfig::default().fusion_step().unwrap();
        let labels: Vec<_> = fusion.objects().iter().map(|o| o.label()).collect();
        assert_eq!(labels, ["red_finger", "blue_finger"]);
        assert!(fusion.objects().iter().all(|o| !o.is_initialized()));
    }
}
