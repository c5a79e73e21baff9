use super::FilterError;

/// Exponential moving average with smoothing factor `alpha` in (0, 1].
///
/// Higher alpha discounts older observations faster; alpha = 1 passes the
/// input through unchanged. Applied to the estimator's rate output to keep
/// the displayed degrees-per-minute figure from jittering.
pub struct Ema {
    alpha: f64,
    state: Option<f64>,
}

impl Ema {
    pub fn new(alpha: f64) -> Result<Self, FilterError> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(FilterError::InvalidAlpha(alpha));
        }
        Ok(Ema { alpha, state: None })
    }

    /// Fold in a new value and return the updated average. The first value
    /// seeds the state directly.
    pub fn update(&mut self, value: f64) -> f64 {
        let next = match self.state {
            None => value,
            Some(prev) => self.alpha * value + (1.0 - self.alpha) * prev,
        };
        self.state = Some(next);
        next
    }

    pub fn value(&self) -> Option<f64> {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rejects_out_of_range_alpha() {
        assert!(Ema::new(0.0).is_err());
        assert!(Ema::new(-0.1).is_err());
        assert!(Ema::new(1.1).is_err());
        assert!(Ema::new(f64::NAN).is_err());
        assert!(Ema::new(1.0).is_ok());
    }

    #[test]
    fn test_first_value_seeds_state() {
        let mut ema = Ema::new(0.3).unwrap();
        assert_eq!(ema.value(), None);
        assert_relative_eq!(ema.update(4.2), 4.2);
        assert_eq!(ema.value(), Some(4.2));
    }

    #[test]
    fn test_alpha_one_is_identity() {
        let mut ema = Ema::new(1.0).unwrap();
        for v in [3.0, -1.5, 100.0, 0.0] {
            assert_relative_eq!(ema.update(v), v);
        }
    }

    #[test]
    fn test_small_alpha_approaches_step_monotonically() {
        let mut ema = Ema::new(0.05).unwrap();
        ema.update(0.0);

        let mut prev = 0.0;
        for _ in 0..100 {
            let next = ema.update(10.0);
            assert!(next > prev);
            assert!(next < 10.0);
            prev = next;
        }
        // Geometric approach: well on its way after 100 steps.
        assert!(prev > 9.0);
    }
}
