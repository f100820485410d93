//! Tracked bounding box: a constant-velocity Kalman estimator over bbox state
//!
//! State:        [x, y, s, r, v_x, v_y, v_s]  (center, area, aspect ratio + velocities)
//! Measurement:  [x, y, s, r]
//! Control:      [a_x, a_y]

use crate::bbox::Bbox;
use crate::kalman::{KalmanFilter, KalmanFilterParams};
use anyhow::Result;
use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone)]
pub struct TrackedBbox {
    /// Kalman filter tracking bbox state
    kf: KalmanFilter,
    /// Frames since the last update
    age: u32,
    /// Lifetime update count
    hits: u32,
    /// Consecutive updates, each arriving exactly one prediction after the last
    hit_streak: u32,
}

impl TrackedBbox {
    /// Create a tracker from an initial detection with unit frame interval
    pub fn new(init_bbox: Bbox) -> Self {
        Self::with_dt(init_bbox, 1.0)
    }

    /// Create a tracker with an explicit inter-frame interval `dt`
    pub fn with_dt(init_bbox: Bbox, dt: f32) -> Self {
        let z = init_bbox.to_measurement();
        let initial_state = DVector::from_vec(vec![z[0], z[1], z[2], z[3], 0.0, 0.0, 0.0]);

        #[rustfmt::skip]
        let params = KalmanFilterParams {
            dim_x: 7,
            dim_z: 4,
            dim_u: 2,
            x: initial_state,
            // High uncertainty on the unobserved initial velocities
            p: DMatrix::from_diagonal(&DVector::from_vec(vec![
                10.0, 10.0, 10.0, 10.0, 1e4, 1e4, 1e4,
            ])),
            f: DMatrix::from_row_slice(7, 7, &[
                1.0, 0.0, 0.0, 0.0,  dt, 0.0, 0.0,
                0.0, 1.0, 0.0, 0.0, 0.0,  dt, 0.0,
                0.0, 0.0, 1.0, 0.0, 0.0, 0.0,  dt,
                0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0,
                0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0,
                0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0,
                0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0,
            ]),
            // Constant-acceleration kinematics for the controlled components
            b: DMatrix::from_row_slice(7, 2, &[
                0.5 * dt * dt, 0.0,
                0.0, 0.5 * dt * dt,
                0.0, 0.0,
                0.0, 0.0,
                 dt, 0.0,
                0.0,  dt,
                0.0, 0.0,
            ]),
            h: DMatrix::from_row_slice(4, 7, &[
                1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0,
                0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0,
                0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0,
                0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0,
            ]),
            r: DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 1.0, 10.0, 10.0])),
            q: DMatrix::from_diagonal(&DVector::from_vec(vec![
                1.0, 1.0, 1.0, 1e-2, 1e-2, 1e-2, 1e-4,
            ])),
        };

        Self {
            kf: KalmanFilter::new(params),
            age: 0,
            hits: 0,
            hit_streak: 0,
        }
    }

    /// Predict the next bbox position under the given acceleration control
    pub fn predict(&mut self, acceleration: (f32, f32)) -> Bbox {
        // Keep the projected area non-negative
        if self.kf.x[6] + self.kf.x[2] <= 0.0 {
            self.kf.x[6] = 0.0;
        }

        self.age += 1;
        let u = DVector::from_vec(vec![acceleration.0, acceleration.1]);
        self.kf.predict(&u);

        self.rect()
    }

    /// Update the predicted state with a detected box
    pub fn update(&mut self, detection: Bbox) -> Result<Bbox> {
        self.hits += 1;
        if self.age == 1 {
            self.hit_streak += 1;
        } else {
            self.hit_streak = 0;
        }
        self.age = 0;

        let z = detection.to_measurement();
        self.kf.update(&DVector::from_vec(z.to_vec()))?;

        Ok(self.rect())
    }

    /// Current bbox estimate from the filter state
    pub fn rect(&self) -> Bbox {
        let state = self.kf.state();
        Bbox::from_measurement(&[state[0], state[1], state[2], state[3]])
    }

    /// Current XY velocity estimate
    pub fn velocity(&self) -> (f32, f32) {
        let state = self.kf.state();
        (state[4], state[5])
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn hits(&self) -> u32 {
        self.hits
    }

    pub fn hit_streak(&self) -> u32 {
        self.hit_streak
    }
}
