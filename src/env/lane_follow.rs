//! Lane-following vehicle environment
//!
//! A kinematic bicycle model driving along a straight two-lane road. The agent
//! controls steering and throttle and is rewarded for holding a target speed
//! close to the lane centre.
//!
//! # Dynamics
//!
//! ```text
//! v'   = v + (throttle * max_accel - drag * v) * dt        (v >= 0)
//! x'   = x + v * sin(psi) * dt                              lateral offset
//! psi' = psi + v / wheelbase * tan(steer * max_steer) * dt  heading error
//! ```
//!
//! # Reward
//!
//! - Terminal states (leaving the road, facing the wrong way, or stalling after
//!   the first five seconds) give -10.
//! - Otherwise `3 * s` below the target speed and `3 * (1 - s)` above it, where
//!   `s = speed_kmh / target_kmh`, minus the distance from the lane centre.

use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{
    encoder::{RawObservation, StateEncoder},
    ActionSpace, Environment, Frame, RenderMode, StepInfo, StepResult,
};

const ROAD_HALF_WIDTH: f32 = 3.5;
const LANE_MARK_HALF_WIDTH: f32 = 0.15;
const METERS_PER_PIXEL: f32 = 0.5;

const ROAD_RGB: [u8; 3] = [110, 110, 110];
const GRASS_RGB: [u8; 3] = [30, 90, 30];
const MARK_RGB: [u8; 3] = [230, 200, 40];
const VEHICLE_RGB: [u8; 3] = [220, 40, 40];

/// Tunable parameters of the lane-following task
#[derive(Debug, Clone)]
pub struct LaneFollowConfig {
    /// Simulation step in seconds
    pub dt: f32,
    /// Distance between axles in meters
    pub wheelbase: f32,
    /// Steering angle at full lock, radians
    pub max_steer: f32,
    /// Acceleration at full throttle, m/s²
    pub max_accel: f32,
    /// Linear drag coefficient
    pub drag: f32,
    /// Target speed in km/h
    pub target_kmh: f32,
    /// Distance from lane centre that ends the episode
    pub max_center_distance: f32,
    /// Grace period before stalling ends the episode, seconds
    pub stall_grace_secs: f32,
    /// Speed below which the vehicle counts as stalled, m/s
    pub stall_speed: f32,
    /// Episode time limit in steps; reaching it ends the episode unpenalised
    pub max_steps: usize,
    /// Camera resolution (width, height)
    pub obs_res: (usize, usize),
}

impl Default for LaneFollowConfig {
    fn default() -> Self {
        Self {
            dt: 0.1,
            wheelbase: 2.5,
            max_steer: 0.5,
            max_accel: 3.0,
            drag: 0.05,
            target_kmh: 20.0,
            max_center_distance: 3.0,
            stall_grace_secs: 5.0,
            stall_speed: 1.0,
            max_steps: 3000,
            obs_res: (32, 16),
        }
    }
}

/// Lane-following environment
///
/// Actions are `[steer, throttle]` with steer in [-1, 1] and throttle in
/// [0, 1]; out-of-range actions are clipped.
pub struct LaneFollow {
    config: LaneFollowConfig,
    encoder: Box<dyn StateEncoder>,
    rng: StdRng,

    // Vehicle state
    offset: f32,  // lateral distance from lane centre
    heading: f32, // heading error relative to the road
    speed: f32,
    steer: f32,
    throttle: f32,

    steps: usize,
    closed: bool,
    hud: Vec<String>,
}

impl LaneFollow {
    /// Create an environment with default parameters
    pub fn new(encoder: Box<dyn StateEncoder>, seed: u64) -> Self {
        Self::with_config(LaneFollowConfig::default(), encoder, seed)
    }

    /// Create an environment with custom parameters
    pub fn with_config(config: LaneFollowConfig, encoder: Box<dyn StateEncoder>, seed: u64) -> Self {
        Self {
            config,
            encoder,
            rng: StdRng::seed_from_u64(seed),
            offset: 0.0,
            heading: 0.0,
            speed: 0.0,
            steer: 0.0,
            throttle: 0.0,
            steps: 0,
            closed: false,
            hud: Vec::new(),
        }
    }

    /// Length of encoded states
    pub fn state_dim(&self) -> usize {
        self.encoder.dim()
    }

    /// Simulate the display window being closed
    ///
    /// Every subsequent step reports `info.closed`.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Lines pushed to the heads-up display since the last step
    pub fn hud_lines(&self) -> &[String] {
        &self.hud
    }

    /// Current speed in m/s
    pub fn speed(&self) -> f32 {
        self.speed
    }

    fn elapsed_secs(&self) -> f32 {
        self.steps as f32 * self.config.dt
    }

    fn physics_step(&mut self, steer: f32, throttle: f32) {
        let c = &self.config;
        self.steer = steer;
        self.throttle = throttle;

        let accel = throttle * c.max_accel - c.drag * self.speed;
        self.speed = (self.speed + accel * c.dt).max(0.0);
        self.offset += self.speed * self.heading.sin() * c.dt;
        self.heading += self.speed / c.wheelbase * (steer * c.max_steer).tan() * c.dt;
    }

    /// Stalled, facing the wrong way or off the road
    fn has_failed(&self) -> bool {
        let c = &self.config;
        let stalled = self.elapsed_secs() > c.stall_grace_secs && self.speed < c.stall_speed;
        let wrong_way = self.heading.abs() > std::f32::consts::FRAC_PI_2;
        let off_road = self.offset.abs() > c.max_center_distance;
        stalled || wrong_way || off_road
    }

    fn reward(&self, failed: bool) -> f32 {
        if failed {
            return -10.0;
        }
        let norm_speed = 3.6 * self.speed / self.config.target_kmh;
        let speed_reward = if norm_speed > 1.0 { (1.0 - norm_speed) * 3.0 } else { norm_speed * 3.0 };
        speed_reward - self.offset.abs()
    }

    /// Top-down camera looking ahead of the vehicle
    fn camera_frame(&self) -> Frame {
        let (width, height) = self.config.obs_res;
        let mut frame = Frame::blank(width, height);
        let (sin_h, cos_h) = self.heading.sin_cos();

        for py in 0..height {
            let ahead = (height - 1 - py) as f32 * METERS_PER_PIXEL;
            for px in 0..width {
                let side = (px as f32 - width as f32 / 2.0) * METERS_PER_PIXEL;
                let lateral = self.offset + side * cos_h + ahead * sin_h;
                let rgb = if lateral.abs() < LANE_MARK_HALF_WIDTH {
                    MARK_RGB
                } else if lateral.abs() < ROAD_HALF_WIDTH {
                    ROAD_RGB
                } else {
                    GRASS_RGB
                };
                frame.put(px as isize, py as isize, rgb);
            }
        }

        let cx = (width / 2) as isize;
        let bottom = height as isize - 1;
        for (dx, dy) in [(0, 0), (-1, 0), (0, -1), (-1, -1)] {
            frame.put(cx + dx, bottom + dy, VEHICLE_RGB);
        }
        frame
    }

    fn encoded_state(&self) -> Vec<f32> {
        let frame = self.camera_frame();
        self.encoder.encode(&RawObservation {
            frame: &frame,
            measurements: [self.steer, self.throttle, self.speed],
        })
    }
}

impl Environment for LaneFollow {
    fn reset(&mut self) -> Result<Vec<f32>> {
        self.offset = self.rng.gen_range(-0.5..0.5);
        self.heading = self.rng.gen_range(-0.1..0.1);
        self.speed = 0.0;
        self.steer = 0.0;
        self.throttle = 0.0;
        self.steps = 0;
        self.hud.clear();
        Ok(self.encoded_state())
    }

    fn step(&mut self, action: &[f32]) -> Result<StepResult> {
        if self.closed {
            return Ok(StepResult {
                state: self.encoded_state(),
                reward: 0.0,
                terminal: true,
                info: StepInfo { closed: true },
            });
        }

        let action = self.action_space().clip(action);
        anyhow::ensure!(action.len() == 2, "expected [steer, throttle], got {} values", action.len());

        self.physics_step(action[0], action[1]);
        self.steps += 1;

        let failed = self.has_failed();
        let terminal = failed || self.steps >= self.config.max_steps;
        let reward = self.reward(failed);

        self.hud.push(format!("Distance from center: {:.2}", self.offset.abs()));
        self.hud.push(format!("Angle difference: {:.2}", self.heading.to_degrees()));
        self.hud.push(format!("Reward: {:.4}", reward));

        Ok(StepResult { state: self.encoded_state(), reward, terminal, info: StepInfo::default() })
    }

    fn render(&mut self, mode: RenderMode) -> Result<Frame> {
        let frame = self.camera_frame();
        if mode == RenderMode::Human {
            tracing::trace!(lines = ?self.hud, speed = self.speed, "render");
            self.hud.clear();
        }
        Ok(frame)
    }

    fn action_space(&self) -> ActionSpace {
        ActionSpace { low: vec![-1.0, 0.0], high: vec![1.0, 1.0] }
    }

    fn push_hud(&mut self, line: String) {
        self.hud.push(line);
    }
}
