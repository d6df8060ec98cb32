//! Sine low-frequency oscillator

use std::f64::consts::TAU;

/// Phase-accumulating sine oscillator
///
/// Phase starts at zero so every render of the same graph produces the same
/// modulation.
#[derive(Debug, Clone, Default)]
pub struct Lfo {
    phase: f64,
}

impl Lfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current sample and advance by one sample at `frequency` Hz
    #[inline]
    pub fn tick(&mut self, frequency: f32, sample_rate: u32) -> f32 {
        let value = (TAU * self.phase).sin() as f32;
        self.phase += frequency as f64 / sample_rate as f64;
        self.phase -= self.phase.floor();
        value
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lfo_period() {
        let mut lfo = Lfo::new();
        let samples: Vec<f32> = (0..4).map(|_| lfo.tick(1.0, 4)).collect();
        assert!(samples[0].abs() < 1e-6);
        assert!((samples[1] - 1.0).abs() < 1e-6);
        assert!(samples[2].abs() < 1e-6);
        assert!((samples[3] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_frequency_holds() {
        let mut lfo = Lfo::new();
        for _ in 0..10 {
            assert_eq!(lfo.tick(0.0, 44100), 0.0);
        }
    }
}
