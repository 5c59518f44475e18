use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Running average with mean-square support.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Average {
    n: u64,
    sum: f64,
    sum_sq: f64,
}

impl Average {
    pub fn add(&mut self, value: f64) {
        self.n += 1;
        self.sum += value;
        self.sum_sq += value * value;
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.sum / self.n as f64
        }
    }

    pub fn rms(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            (self.sum_sq / self.n as f64).sqrt()
        }
    }
}

impl AddAssign<f64> for Average {
    fn add_assign(&mut self, value: f64) {
        self.add(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_average_is_zero() {
        let avg = Average::default();
        assert!(avg.is_empty());
        assert_eq!(avg.mean(), 0.0);
        assert_eq!(avg.rms(), 0.0);
    }

    #[test]
    fn mean_and_rms_accumulate() {
        let mut avg = Average::default();
        avg += 1.0;
        avg += 3.0;
        assert_eq!(avg.count(), 2);
        assert!((avg.mean() - 2.0).abs() < 1e-12);
        assert!((avg.rms() - 5.0_f64.sqrt()).abs() < 1e-12);
    }
}
