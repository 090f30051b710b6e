//! 单目标状态估计
//! Per-track Kalman filtering and position smoothing

use std::sync::atomic::{AtomicU32, Ordering};

use super::types::{Detection, TrackSnapshot};

/// 平滑系数默认值 (0 = 纯卡尔曼, 1 = 原始观测)
pub const DEFAULT_SMOOTHING_ALPHA: f32 = 0.2;

// ========== 跟踪对象 ==========

/// 跟踪对象 (带身份的陀螺估计)
#[derive(Clone, Debug)]
pub struct Track {
    /// 唯一跟踪ID (单调递增, 不复用)
    pub id: u32,

    /// 平滑后位置
    pub pos: (i32, i32),

    /// 本帧原始观测位置 (用于差分速度)
    pub measured: (i32, i32),

    /// 卡尔曼滤波速度
    pub velocity: (f32, f32),

    /// 后向差分速度 (仅诊断用)
    pub raw_velocity: (f32, f32),

    pub acceleration: (f32, f32),
    pub shape: (u32, u32),
    pub frame: u64,

    filter: KalmanFilter,
}

impl Track {
    /// 新轨迹: 零速度, 以观测位置初始化滤波器
    pub fn spawn(id: u32, detection: &Detection, frame: u64, params: &KalmanParams) -> Self {
        let (x, y) = detection.pos;
        Self {
            id,
            pos: detection.pos,
            measured: detection.pos,
            velocity: (0.0, 0.0),
            raw_velocity: (0.0, 0.0),
            acceleration: (0.0, 0.0),
            shape: detection.shape,
            frame,
            filter: KalmanFilter::new(x as f32, y as f32, params),
        }
    }

    /// 延续轨迹: 预测 + 更新 + 平滑, 返回本帧的新轨迹记录
    ///
    /// `dt = max(1, 帧间隔)`
    pub fn follow(&self, detection: &Detection, frame: u64, alpha: f32) -> Track {
        let dt = frame.saturating_sub(self.frame).max(1) as f32;
        let (mx, my) = (detection.pos.0 as f32, detection.pos.1 as f32);

        let mut filter = self.filter.clone();
        filter.predict(dt);
        filter.update(mx, my);

        let (kx, ky) = filter.position();
        let velocity = filter.velocity();

        let pos = (
            ((1.0 - alpha) * kx + alpha * mx).round() as i32,
            ((1.0 - alpha) * ky + alpha * my).round() as i32,
        );
        let raw_velocity = (
            (mx - self.measured.0 as f32) / dt,
            (my - self.measured.1 as f32) / dt,
        );
        let acceleration = (
            (velocity.0 - self.velocity.0) / dt,
            (velocity.1 - self.velocity.1) / dt,
        );

        Track {
            id: self.id,
            pos,
            measured: detection.pos,
            velocity,
            raw_velocity,
            acceleration,
            shape: detection.shape,
            frame,
            filter,
        }
    }

    pub fn filter(&self) -> &KalmanFilter {
        &self.filter
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            id: self.id,
            pos: self.pos,
            velocity: self.velocity,
            raw_velocity: self.raw_velocity,
            acceleration: self.acceleration,
            shape: self.shape,
            frame: self.frame,
        }
    }
}

// ========== 卡尔曼滤波器 ==========

/// 滤波器噪声参数
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KalmanParams {
    /// 位置过程噪声
    pub q_pos: f32,
    /// 速度过程噪声
    pub q_vel: f32,
    /// 观测噪声
    pub r: f32,
    /// 初始位置方差
    pub p0_pos: f32,
    /// 初始速度方差 (取大值, 新目标速度未知)
    pub p0_vel: f32,
}

impl Default for KalmanParams {
    fn default() -> Self {
        Self {
            q_pos: 1.0,
            q_vel: 0.5,
            r: 4.0,
            p0_pos: 10.0,
            p0_vel: 1000.0,
        }
    }
}

/// 匀速模型卡尔曼滤波器
/// 状态向量: [x, y, vx, vy], 观测: [x, y]
#[derive(Clone, Debug, PartialEq)]
pub struct KalmanFilter {
    state: [f32; 4],
    p: [[f32; 4]; 4],
    q: [f32; 4],
    r: f32,
}

impl KalmanFilter {
    pub fn new(x: f32, y: f32, params: &KalmanParams) -> Self {
        let mut p = [[0.0; 4]; 4];
        p[0][0] = params.p0_pos;
        p[1][1] = params.p0_pos;
        p[2][2] = params.p0_vel;
        p[3][3] = params.p0_vel;

        Self {
            state: [x, y, 0.0, 0.0],
            p,
            q: [params.q_pos, params.q_pos, params.q_vel, params.q_vel],
            r: params.r,
        }
    }

    /// 预测: x = F x, P = F P F^T + Q
    pub fn predict(&mut self, dt: f32) {
        let dt = if dt <= 0.0 { 1.0 } else { dt };

        self.state[0] += self.state[2] * dt;
        self.state[1] += self.state[3] * dt;

        // F = [[1,0,dt,0],[0,1,0,dt],[0,0,1,0],[0,0,0,1]]
        let mut f = [[0.0f32; 4]; 4];
        for (i, row) in f.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        f[0][2] = dt;
        f[1][3] = dt;

        let fp = mat_mul(&f, &self.p);
        let mut fpft = [[0.0f32; 4]; 4];
        for i in 0..4 {
            for j in 0..4 {
                fpft[i][j] = (0..4).map(|k| fp[i][k] * f[j][k]).sum();
            }
        }
        for i in 0..4 {
            fpft[i][i] += self.q[i];
        }
        self.p = fpft;
    }

    /// 更新: 融合位置观测
    pub fn update(&mut self, mx: f32, my: f32) {
        let innovation = [mx - self.state[0], my - self.state[1]];

        // S = H P H^T + R
        let s = [
            [self.p[0][0] + self.r, self.p[0][1]],
            [self.p[1][0], self.p[1][1] + self.r],
        ];
        let det = s[0][0] * s[1][1] - s[0][1] * s[1][0];
        if det.abs() < f32::EPSILON {
            return;
        }
        let s_inv = [
            [s[1][1] / det, -s[0][1] / det],
            [-s[1][0] / det, s[0][0] / det],
        ];

        // K = P H^T S^-1 (4x2)
        let mut k = [[0.0f32; 2]; 4];
        for i in 0..4 {
            for j in 0..2 {
                k[i][j] = self.p[i][0] * s_inv[0][j] + self.p[i][1] * s_inv[1][j];
            }
        }

        for i in 0..4 {
            self.state[i] += k[i][0] * innovation[0] + k[i][1] * innovation[1];
        }

        // P = (I - K H) P
        let mut ikh = [[0.0f32; 4]; 4];
        for i in 0..4 {
            ikh[i][i] = 1.0;
            ikh[i][0] -= k[i][0];
            ikh[i][1] -= k[i][1];
        }
        self.p = mat_mul(&ikh, &self.p);
    }

    pub fn position(&self) -> (f32, f32) {
        (self.state[0], self.state[1])
    }

    pub fn velocity(&self) -> (f32, f32) {
        (self.state[2], self.state[3])
    }

    pub fn state(&self) -> [f32; 4] {
        self.state
    }

    pub fn covariance(&self) -> &[[f32; 4]; 4] {
        &self.p
    }
}

fn mat_mul(a: &[[f32; 4]; 4], b: &[[f32; 4]; 4]) -> [[f32; 4]; 4] {
    let mut out = [[0.0f32; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            out[i][j] = (0..4).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

// ========== 平滑系数 ==========

/// 可跨线程调节的平滑系数 (UI滑块实时修改)
#[derive(Debug)]
pub struct SmoothingAlpha(AtomicU32);

impl SmoothingAlpha {
    pub fn new(alpha: f32) -> Self {
        let alpha = if alpha.is_nan() {
            DEFAULT_SMOOTHING_ALPHA
        } else {
            alpha.clamp(0.0, 1.0)
        };
        Self(AtomicU32::new(alpha.to_bits()))
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// 设置并返回实际生效值 (越界截断到[0,1], NaN忽略)
    pub fn set(&self, alpha: f32) -> f32 {
        if alpha.is_nan() {
            return self.get();
        }
        let alpha = alpha.clamp(0.0, 1.0);
        self.0.store(alpha.to_bits(), Ordering::Relaxed);
        alpha
    }
}

impl Default for SmoothingAlpha {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_ALPHA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_clamps() {
        let alpha = SmoothingAlpha::default();
        assert_eq!(alpha.get(), 0.2);
        assert_eq!(alpha.set(-1.0), 0.0);
        assert_eq!(alpha.get(), 0.0);
        assert_eq!(alpha.set(2.0), 1.0);
        assert_eq!(alpha.get(), 1.0);
        alpha.set(0.3);
        assert!((alpha.get() - 0.3).abs() < 1e-6);
        alpha.set(f32::NAN);
        assert!((alpha.get() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_predict_moves_by_velocity() {
        let mut kf = KalmanFilter::new(0.0, 0.0, &KalmanParams::default());
        kf.state[2] = 2.0;
        kf.state[3] = -1.0;
        kf.predict(3.0);
        assert_eq!(kf.position(), (6.0, -3.0));
        // 协方差对称
        let p = kf.covariance();
        for i in 0..4 {
            for j in 0..4 {
                assert!((p[i][j] - p[j][i]).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_update_pulls_towards_measurement() {
        let mut kf = KalmanFilter::new(100.0, 100.0, &KalmanParams::default());
        kf.predict(1.0);
        kf.update(150.0, 150.0);
        let (x, y) = kf.position();
        assert!(x > 100.0 && x < 150.0);
        assert!(y > 100.0 && y < 150.0);
        // 大速度先验: 速度立即朝观测方向
        assert!(kf.velocity().0 > 0.0);
    }

    #[test]
    fn test_filter_is_deterministic() {
        let run = || {
            let mut kf = KalmanFilter::new(10.0, 20.0, &KalmanParams::default());
            for i in 0..50 {
                kf.predict(1.0 + (i % 3) as f32);
                kf.update(10.0 + i as f32 * 1.5, 20.0 - i as f32 * 0.5);
            }
            kf
        };
        let a = run();
        let b = run();
        for (x, y) in a.state().iter().zip(b.state().iter()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn test_follow_blends_position() {
        let params = KalmanParams::default();
        let first = Track::spawn(1, &Detection::new((100, 100), (10, 10)), 0, &params);

        let raw = first.follow(&Detection::new((150, 150), (10, 10)), 1, 1.0);
        assert_eq!(raw.pos, (150, 150));

        let pure = first.follow(&Detection::new((150, 130), (10, 10)), 1, 0.0);
        let (kx, ky) = pure.filter().position();
        assert_eq!(pure.pos, (kx.round() as i32, ky.round() as i32));

        let smoothed = first.follow(&Detection::new((150, 130), (10, 10)), 1, 0.5);
        assert_eq!(smoothed.pos.0, (0.5 * kx + 0.5 * 150.0).round() as i32);
        assert_eq!(smoothed.pos.1, (0.5 * ky + 0.5 * 130.0).round() as i32);
        assert!(smoothed.pos.0 > 100 && smoothed.pos.0 <= 150);
        assert_eq!(smoothed.id, 1);
    }

    #[test]
    fn test_raw_velocity_uses_frame_gap() {
        let params = KalmanParams::default();
        let first = Track::spawn(4, &Detection::new((100, 100), (10, 10)), 10, &params);
        let next = first.follow(&Detection::new((106, 103), (10, 10)), 13, 0.2);
        assert!((next.raw_velocity.0 - 2.0).abs() < 1e-6);
        assert!((next.raw_velocity.1 - 1.0).abs() < 1e-6);
        assert_eq!(next.measured, (106, 103));

        let expected_ax = next.velocity.0 / 3.0;
        assert!((next.acceleration.0 - expected_ax).abs() < 1e-5);
    }
}
