use ndarray::{arr2, Array2};

use super::FilterError;
use crate::matrix::{self, MatrixError};

impl From<MatrixError> for FilterError {
    fn from(err: MatrixError) -> Self {
        FilterError::Algebra(err)
    }
}

/// Constant-acceleration Kalman filter over a scalar measurement.
///
/// State is `[position, velocity, acceleration]` — here temperature, change
/// per interval and change-of-change per interval. Only position is
/// observed; velocity and acceleration are inferred through the transition
/// model. All algebra goes through [`crate::matrix`].
pub struct KalmanFilter {
    /// State vector, 3x1.
    x: Array2<f64>,
    /// State covariance, 3x3.
    p: Array2<f64>,
    /// State transition for one interval `dt`.
    f: Array2<f64>,
    /// Process noise covariance, diagonal.
    q: Array2<f64>,
    /// Measurement matrix: observe position only.
    h: Array2<f64>,
    /// Measurement noise covariance, 1x1.
    r: Array2<f64>,
    identity: Array2<f64>,
}

impl KalmanFilter {
    /// Build a filter with independent process and measurement tuning.
    ///
    /// `process_accuracy` seeds the process noise diagonal as
    /// `[q, q^2, q^3]`; `measurement_accuracy` is the 1-sigma measurement
    /// error, squared into `R`.
    pub fn new(dt: f64, x0: f64, process_accuracy: f64, measurement_accuracy: f64) -> Self {
        let q = process_accuracy;
        KalmanFilter {
            x: arr2(&[[x0], [0.0], [0.0]]),
            p: Array2::eye(3),
            f: arr2(&[
                [1.0, dt, 0.5 * dt * dt],
                [0.0, 1.0, dt],
                [0.0, 0.0, 1.0],
            ]),
            q: arr2(&[
                [q, 0.0, 0.0],
                [0.0, q * q, 0.0],
                [0.0, 0.0, q * q * q],
            ]),
            h: arr2(&[[1.0, 0.0, 0.0]]),
            r: arr2(&[[measurement_accuracy * measurement_accuracy]]),
            identity: Array2::eye(3),
        }
    }

    /// Single-scalar tuning preset: one accuracy figure seeds both the
    /// process noise and the measurement noise, matching the original probe
    /// firmware's calibration.
    pub fn with_accuracy(dt: f64, x0: f64, accuracy: f64) -> Self {
        Self::new(dt, x0, accuracy, accuracy)
    }

    /// Current state as `(position, velocity, acceleration)`.
    pub fn state(&self) -> (f64, f64, f64) {
        (self.x[[0, 0]], self.x[[1, 0]], self.x[[2, 0]])
    }

    fn predict(&mut self) -> Result<(), FilterError> {
        // x = Fx
        self.x = matrix::multiply(&self.f, &self.x)?;

        // P = FPF^T + Q
        let fp = matrix::multiply(&self.f, &self.p)?;
        let fpf_t = matrix::multiply(&fp, &matrix::transpose(&self.f))?;
        self.p = matrix::add(&fpf_t, &self.q)?;
        Ok(())
    }

    /// Advance the model one interval, then fold in the measurement `z`.
    ///
    /// Returns the fused `(position, velocity)`: the current temperature
    /// estimate and its per-interval rate of change.
    pub fn update(&mut self, z: f64) -> Result<(f64, f64), FilterError> {
        self.predict()?;

        // Residual y = z - Hx
        let y = matrix::subtract(&arr2(&[[z]]), &matrix::multiply(&self.h, &self.x)?)?;

        // Residual covariance S = HPH^T + R
        let h_t = matrix::transpose(&self.h);
        let hp = matrix::multiply(&self.h, &self.p)?;
        let s = matrix::add(&matrix::multiply(&hp, &h_t)?, &self.r)?;

        // Gain K = PH^T S^-1. S is 1x1 here, but it runs through the same
        // pivoted inverse as any other shape.
        let s_inv = matrix::invert(&s)?.ok_or(FilterError::SingularResidual)?;
        let k = matrix::multiply(&matrix::multiply(&self.p, &h_t)?, &s_inv)?;

        // x = x + Ky
        self.x = matrix::add(&self.x, &matrix::multiply(&k, &y)?)?;

        // Joseph-form covariance update keeps P symmetric and positive
        // semi-definite over long runs: P = (I-KH)P(I-KH)^T + KRK^T
        let kh = matrix::multiply(&k, &self.h)?;
        let i_kh = matrix::subtract(&self.identity, &kh)?;
        let left = matrix::multiply(
            &matrix::multiply(&i_kh, &self.p)?,
            &matrix::transpose(&i_kh),
        )?;
        let krk_t = matrix::multiply(&matrix::multiply(&k, &self.r)?, &matrix::transpose(&k))?;
        self.p = matrix::add(&left, &krk_t)?;

        Ok((self.x[[0, 0]], self.x[[1, 0]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_converges_to_constant_measurement() {
        let mut kf = KalmanFilter::with_accuracy(1.0, 68.0, 0.5);

        let mut last = (0.0, 0.0);
        for _ in 0..200 {
            last = kf.update(72.0).unwrap();
        }

        let (position, velocity) = last;
        let (_, _, acceleration) = kf.state();
        assert_relative_eq!(position, 72.0, epsilon = 0.05);
        assert_relative_eq!(velocity, 0.0, epsilon = 0.05);
        assert_relative_eq!(acceleration, 0.0, epsilon = 0.05);
    }

    #[test]
    fn test_tracks_linear_ramp() {
        // Steady +0.5 per interval: velocity should settle near the slope.
        let mut kf = KalmanFilter::with_accuracy(1.0, 70.0, 0.5);

        let mut velocity = 0.0;
        for i in 0..100 {
            let z = 70.0 + 0.5 * i as f64;
            let (_, v) = kf.update(z).unwrap();
            velocity = v;
        }
        assert_relative_eq!(velocity, 0.5, epsilon = 0.1);
    }

    #[test]
    fn test_covariance_stays_symmetric() {
        let mut kf = KalmanFilter::with_accuracy(5.0, 70.0, 0.5);
        for i in 0..500 {
            kf.update(70.0 + (i % 7) as f64 * 0.1).unwrap();
        }
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(kf.p[[i, j]], kf.p[[j, i]], epsilon = 1e-9);
                if i == j {
                    assert!(kf.p[[i, i]] >= 0.0);
                }
            }
        }
    }

    #[test]
    fn test_independent_noise_parameters() {
        // A filter that trusts its measurements more should track a step
        // change faster.
        let mut trusting = KalmanFilter::new(1.0, 70.0, 0.5, 0.1);
        let mut wary = KalmanFilter::new(1.0, 70.0, 0.5, 5.0);

        let mut trusting_pos = 0.0;
        let mut wary_pos = 0.0;
        for _ in 0..5 {
            trusting_pos = trusting.update(80.0).unwrap().0;
            wary_pos = wary.update(80.0).unwrap().0;
        }
        assert!((80.0 - trusting_pos).abs() < (80.0 - wary_pos).abs());
    }
}
