//! Circular delay line with fractional reads

/// Single-channel delay buffer
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    /// Create a delay line able to hold `max_delay_samples` of history
    pub fn new(max_delay_samples: usize) -> Self {
        Self {
            // one extra slot so the maximum delay is reachable after a write
            buffer: vec![0.0; max_delay_samples.max(1) + 2],
            write_pos: 0,
        }
    }

    /// Create a delay line sized in seconds
    pub fn with_max_seconds(max_seconds: f64, sample_rate: u32) -> Self {
        Self::new((max_seconds * sample_rate as f64).ceil() as usize)
    }

    /// Longest delay that can be read, in samples
    pub fn max_delay(&self) -> f32 {
        (self.buffer.len() - 2) as f32
    }

    /// Read the signal `delay` samples in the past, linearly interpolated.
    ///
    /// Call before [`DelayLine::write`] for the current sample: a delay of 1
    /// returns the most recent write. Delays are clamped to `[1, max_delay]`.
    #[inline]
    pub fn read(&self, delay: f32) -> f32 {
        let delay = delay.clamp(1.0, self.max_delay());
        let len = self.buffer.len();
        let whole = delay.floor();
        let frac = delay - whole;
        let whole = whole as usize;

        let idx_a = (self.write_pos + len + 1 - whole) % len;
        let idx_b = (idx_a + len - 1) % len;
        let a = self.buffer[idx_a];
        let b = self.buffer[idx_b];
        a + (b - a) * frac
    }

    /// Push one sample
    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        self.buffer[self.write_pos] = sample;
    }

    pub fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_delay() {
        let mut line = DelayLine::new(10);
        for i in 0..5 {
            line.write(i as f32);
        }
        assert_eq!(line.read(1.0), 4.0);
        assert_eq!(line.read(3.0), 2.0);
    }

    #[test]
    fn test_fractional_delay_interpolates() {
        let mut line = DelayLine::new(10);
        for i in 0..5 {
            line.write(i as f32);
        }
        assert!((line.read(1.5) - 3.5).abs() < 1e-6);
    }

    #[test]
    fn test_delay_is_clamped() {
        let mut line = DelayLine::new(4);
        for i in 0..10 {
            line.write(i as f32);
        }
        assert_eq!(line.read(0.0), line.read(1.0));
        assert_eq!(line.read(100.0), line.read(4.0));
    }
}
