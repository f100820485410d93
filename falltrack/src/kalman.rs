//! Linear Kalman filter with a control term, used by the bbox state estimator

use anyhow::Result;
use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone)]
pub struct KalmanFilterParams {
    pub dim_x: usize,      // State dimension
    pub dim_z: usize,      // Observation dimension
    pub dim_u: usize,      // Control dimension
    pub x: DVector<f32>,   // Initial state
    pub p: DMatrix<f32>,   // Initial state covariance
    pub f: DMatrix<f32>,   // State transition matrix
    pub b: DMatrix<f32>,   // Control transition matrix
    pub h: DMatrix<f32>,   // Observation matrix
    pub r: DMatrix<f32>,   // Observation noise covariance
    pub q: DMatrix<f32>,   // Process noise covariance
}

#[derive(Debug, Clone)]
pub struct KalmanFilter {
    pub dim_x: usize,
    pub dim_z: usize,
    pub dim_u: usize,
    pub x: DVector<f32>, // State vector
    pub p: DMatrix<f32>, // State covariance matrix
    pub f: DMatrix<f32>, // State transition matrix
    pub b: DMatrix<f32>, // Control transition matrix
    pub h: DMatrix<f32>, // Observation matrix
    pub r: DMatrix<f32>, // Observation noise covariance
    pub q: DMatrix<f32>, // Process noise covariance
    pub y: DVector<f32>, // Residual
    pub s: DMatrix<f32>, // Innovation covariance
    pub k: DMatrix<f32>, // Kalman gain
}

impl KalmanFilter {
    pub fn new(params: KalmanFilterParams) -> Self {
        let dim_x = params.dim_x;
        let dim_z = params.dim_z;

        Self {
            dim_x,
            dim_z,
            dim_u: params.dim_u,
            x: params.x,
            p: params.p,
            f: params.f,
            b: params.b,
            h: params.h,
            r: params.r,
            q: params.q,
            y: DVector::zeros(dim_z),
            s: DMatrix::zeros(dim_z, dim_z),
            k: DMatrix::zeros(dim_x, dim_z),
        }
    }

    /// Predict the next state under control input `u`
    pub fn predict(&mut self, u: &DVector<f32>) {
        // x = F * x + B * u
        self.x = &self.f * &self.x + &self.b * u;

        // P = F * P * F^T + Q
        self.p = &self.f * &self.p * self.f.transpose() + &self.q;
    }

    /// Update with observation
    pub fn update(&mut self, z: &DVector<f32>) -> Result<()> {
        // Residual: y = z - H * x
        self.y = z - &self.h * &self.x;

        // Innovation covariance: S = H * P * H^T + R
        self.s = &self.h * &self.p * self.h.transpose() + &self.r;

        // Kalman gain: K = P * H^T * S^-1
        let s_inv = self
            .s
            .clone()
            .try_inverse()
            .ok_or_else(|| anyhow::anyhow!("Failed to invert innovation covariance matrix"))?;
        self.k = &self.p * self.h.transpose() * s_inv;

        // Update state: x = x + K * y
        self.x = &self.x + &self.k * &self.y;

        // Update covariance: P = (I - K * H) * P
        let i = DMatrix::identity(self.dim_x, self.dim_x);
        self.p = (i - &self.k * &self.h) * &self.p;

        Ok(())
    }

    /// Get current state
    pub fn state(&self) -> &DVector<f32> {
        &self.x
    }

    /// Get current covariance
    pub fn covariance(&self) -> &DMatrix<f32> {
        &self.p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_kalman_filter_basic() {
        // Simple 1D position tracking: state [position, velocity]
        let params = KalmanFilterParams {
            dim_x: 2,
            dim_z: 1,
            dim_u: 1,
            x: DVector::from_vec(vec![0.0, 1.0]),
            p: DMatrix::from_diagonal(&DVector::from_vec(vec![1000.0, 1000.0])),
            f: DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1.0]),
            b: DMatrix::zeros(2, 1),
            h: DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
            r: DMatrix::from_element(1, 1, 0.1),
            q: DMatrix::from_diagonal(&DVector::from_vec(vec![0.01, 0.01])),
        };

        let mut kf = KalmanFilter::new(params);
        let no_control = DVector::zeros(1);

        kf.predict(&no_control);
        assert_abs_diff_eq!(kf.x[0], 1.0, epsilon = 0.001);

        kf.update(&DVector::from_vec(vec![0.9])).unwrap();

        // State should be somewhere between prediction and measurement
        assert!(kf.x[0] > 0.8 && kf.x[0] < 1.0);
    }

    #[test]
    fn test_full_observation_with_tiny_noise_converges_in_one_step() {
        // With H = I and R -> 0 the gain is ~identity, so a single update
        // must pull the state onto the measurement.
        let params = KalmanFilterParams {
            dim_x: 2,
            dim_z: 2,
            dim_u: 1,
            x: DVector::from_vec(vec![3.0, -7.0]),
            p: DMatrix::from_diagonal(&DVector::from_vec(vec![5.0, 2.0])),
            f: DMatrix::from_row_slice(2, 2, &[1.1, 0.3, 0.0, 0.9]),
            b: DMatrix::zeros(2, 1),
            h: DMatrix::identity(2, 2),
            r: DMatrix::from_diagonal(&DVector::from_vec(vec![1e-9, 1e-9])),
            q: DMatrix::from_diagonal(&DVector::from_vec(vec![0.1, 0.1])),
        };

        let mut kf = KalmanFilter::new(params);
        let z = DVector::from_vec(vec![42.0, 13.5]);
        kf.update(&z).unwrap();

        assert_abs_diff_eq!(kf.x[0], 42.0, epsilon = 1e-3);
        assert_abs_diff_eq!(kf.x[1], 13.5, epsilon = 1e-3);
    }

    #[test]
    fn test_gravity_tracking() {
        // Free fall under a known control acceleration, observed through
        // noisy position measurements.
        let dt = 4.0_f32 / 4096.0;
        let g = 9.80665_f32;
        let r_val = 1.0_f32 / 3.0;

        let params = KalmanFilterParams {
            dim_x: 2,
            dim_z: 1,
            dim_u: 1,
            x: DVector::from_vec(vec![0.0, 0.0]),
            p: DMatrix::from_diagonal(&DVector::from_vec(vec![10.0, 10.0])),
            f: DMatrix::from_row_slice(2, 2, &[1.0, dt, 0.0, 1.0]),
            b: DMatrix::from_row_slice(2, 1, &[0.5 * dt * dt, dt]),
            h: DMatrix::from_row_slice(1, 2, &[1.0, 0.0]),
            r: DMatrix::from_element(1, 1, r_val),
            q: DMatrix::from_diagonal(&DVector::from_vec(vec![1e-8, 1e-8])),
        };

        let mut kf = KalmanFilter::new(params);
        let control = DVector::from_vec(vec![-g]);
        let mut rng = StdRng::seed_from_u64(42);

        let mut true_y = 0.0_f32;
        let mut true_v = 0.0_f32;

        for _ in 0..4096 {
            kf.predict(&control);

            true_y += true_v * dt + 0.5 * -g * dt * dt;
            true_v += -g * dt;

            let noise: f32 = rng.gen_range(-1.0..1.0);
            kf.update(&DVector::from_vec(vec![true_y + noise])).unwrap();
        }

        let error = (kf.x[0] - true_y).abs();
        let sigma = (r_val * dt).sqrt();
        assert!(
            error < 5.0 * sigma,
            "position error {error} exceeds 5 sigma ({})",
            5.0 * sigma
        );
    }
}
