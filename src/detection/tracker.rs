//! 指尖跟踪组件
//! Per-fingertip state estimation

use nalgebra::{Matrix3, Matrix3x6, Matrix6, Vector3, Vector6};
use tracing::warn;

use super::depth::DepthCache;
use super::segmenter::HsvProfile;

// ========== 卡尔曼滤波器 ==========

/// 3D 等速度模型卡尔曼滤波器
///
/// 状态向量: [x, y, z, vx, vy, vz] (米, 米/秒)
/// 观测向量: [x, y, z]
#[derive(Clone, Debug)]
pub struct KalmanFilter3D {
    /// 状态估计
    state: Vector6<f64>,

    /// 估计误差协方差 (6x6, 对称半正定)
    p: Matrix6<f64>,

    /// 状态转移矩阵 (位置 += 速度 * dt)
    f: Matrix6<f64>,

    /// 观测矩阵 (提取位置分量)
    h: Matrix3x6<f64>,

    /// 过程噪声 Q = q * I6
    q: Matrix6<f64>,

    /// 观测噪声 R = r * I3
    r: Matrix3<f64>,

    /// 是否已用第一个观测值初始化
    initialized: bool,
}

impl KalmanFilter3D {
    /// 创建新的卡尔曼滤波器
    ///
    /// # 参数
    /// - `q`: 过程噪声尺度 (越小越平滑)
    /// - `r`: 观测噪声尺度 (越大越信任预测)
    /// - `dt`: 帧间隔 (秒), 由目标帧率得到
    pub fn new(q: f64, r: f64, dt: f64) -> Self {
        let mut f = Matrix6::identity();
        f[(0, 3)] = dt;
        f[(1, 4)] = dt;
        f[(2, 5)] = dt;

        let mut h = Matrix3x6::zeros();
        h[(0, 0)] = 1.0;
        h[(1, 1)] = 1.0;
        h[(2, 2)] = 1.0;

        Self {
            state: Vector6::zeros(),
            p: Matrix6::identity(),
            f,
            h,
            q: Matrix6::identity() * q,
            r: Matrix3::identity() * r,
            initialized: false,
        }
    }

    /// 预测步骤: x = F x, P = F P F^T + Q
    pub fn predict(&mut self) {
        self.state = self.f * self.state;
        self.p = self.f * self.p * self.f.transpose() + self.q;
    }

    /// 更新步骤 (融合一个3D观测)
    ///
    /// 第一次调用只做初始化: 位置 = 观测, 速度 = 0, 协方差不变。
    pub fn update(&mut self, measurement: &Vector3<f64>) {
        if !self.initialized {
            self.state.fixed_rows_mut::<3>(0).copy_from(measurement);
            self.state.fixed_rows_mut::<3>(3).fill(0.0);
            self.initialized = true;
            return;
        }

        // 新息 y = z - H x
        let y = measurement - self.h * self.state;
        let ht = self.h.transpose();
        // 新息协方差 S = H P H^T + R
        let s = self.h * self.p * ht + self.r;

        let Some(s_inv) = s.try_inverse() else {
            warn!("⚠️ 新息协方差不可逆, 跳过本次更新 (S = {:?})", s);
            return;
        };

        // 卡尔曼增益 K = P H^T S^-1
        let k = self.p * ht * s_inv;
        self.state += k * y;
        self.p = (Matrix6::identity() - k * self.h) * self.p;
    }

    /// 滤波后的位置; 未初始化时为 None
    pub fn position(&self) -> Option<Vector3<f64>> {
        self.initialized
            .then(|| self.state.fixed_rows::<3>(0).into_owned())
    }

    /// 滤波后的速度; 未初始化时为 None
    pub fn velocity(&self) -> Option<Vector3<f64>> {
        self.initialized
            .then(|| self.state.fixed_rows::<3>(3).into_owned())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn covariance(&self) -> &Matrix6<f64> {
        &self.p
    }

    /// 协方差的迹 (总体不确定性)
    pub fn covariance_trace(&self) -> f64 {
        self.p.trace()
    }
}

// ========== 跟踪对象 ==========

/// 跟踪对象 (每个类别一个, 生命周期与流水线相同)
#[derive(Clone, Debug)]
pub struct TrackedObject {
    /// 类别名称 (固定不变)
    label: String,

    /// 颜色分割阈值
    profile: HsvProfile,

    /// 独占的卡尔曼滤波器
    filter: KalmanFilter3D,

    /// 深度回退用的上次有效值
    depth_cache: DepthCache,
}

impl TrackedObject {
    pub fn new(label: impl Into<String>, profile: HsvProfile, filter: KalmanFilter3D) -> Self {
        Self {
            label: label.into(),
            profile,
            filter,
            depth_cache: DepthCache::default(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn profile(&self) -> &HsvProfile {
        &self.profile
    }

    pub fn filter(&self) -> &KalmanFilter3D {
        &self.filter
    }

    pub fn depth_cache_mut(&mut self) -> &mut DepthCache {
        &mut self.depth_cache
    }

    pub fn predict(&mut self) {
        self.filter.predict();
    }

    pub fn update(&mut self, measurement: &Vector3<f64>) {
        self.filter.update(measurement);
    }

    pub fn position(&self) -> Option<Vector3<f64>> {
        self.filter.position()
    }

    pub fn is_initialized(&self) -> bool {
        self.filter.is_initialized()
    }
}
