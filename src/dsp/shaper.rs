//! Table-driven waveshaper

use std::f64::consts::PI;

/// Number of points in the distortion curve
const CURVE_POINTS: usize = 22050;

/// Nonlinear transfer curve sampled over `[-1, 1]`
#[derive(Debug, Clone)]
pub struct WaveShaper {
    curve: Vec<f32>,
}

impl WaveShaper {
    /// Soft-clipping curve `(3 + k)·x·20° / (π + k·|x|)`
    pub fn distortion(k: f64) -> Self {
        let deg = PI / 180.0;
        let curve = (0..CURVE_POINTS)
            .map(|i| {
                let x = i as f64 * 2.0 / CURVE_POINTS as f64 - 1.0;
                ((3.0 + k) * x * 20.0 * deg / (PI + k * x.abs())) as f32
            })
            .collect();
        Self { curve }
    }

    /// Look up one sample, interpolating between curve points.
    ///
    /// Inputs outside `[-1, 1]` take the end values of the curve.
    #[inline]
    pub fn shape(&self, input: f32) -> f32 {
        let last = self.curve.len() - 1;
        let position = (input as f64 + 1.0) * 0.5 * last as f64;
        if position <= 0.0 {
            return self.curve[0];
        }
        if position >= last as f64 {
            return self.curve[last];
        }
        let index = position.floor() as usize;
        let frac = (position - index as f64) as f32;
        let a = self.curve[index];
        let b = self.curve[index + 1];
        a + (b - a) * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_is_odd_and_bounded() {
        let shaper = WaveShaper::distortion(300.0);
        assert!(shaper.shape(0.0).abs() < 0.01);
        assert!(shaper.shape(0.5) > 0.0);
        assert!(shaper.shape(-0.5) < 0.0);
        assert_eq!(shaper.shape(4.0), shaper.shape(1.0));
        assert!(shaper.shape(1.0) < 0.5);
    }

    #[test]
    fn test_curve_is_monotonic() {
        let shaper = WaveShaper::distortion(300.0);
        let mut previous = shaper.shape(-1.0);
        for i in 1..=100 {
            let value = shaper.shape(-1.0 + i as f32 * 0.02);
            assert!(value >= previous);
            previous = value;
        }
    }
}
