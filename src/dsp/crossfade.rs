//! Linear crossfade between a processed and an unprocessed signal

/// Mix position that moves linearly toward a target
///
/// `0.0` selects the processed signal, `1.0` the dry signal.
#[derive(Debug, Clone, Copy)]
pub struct Crossfade {
    position: f32,
    target: f32,
    step: f32,
}

impl Crossfade {
    /// Create a crossfade that covers the full range in `fade_secs`
    pub fn new(fade_secs: f64, sample_rate: u32) -> Self {
        let fade_samples = (fade_secs * sample_rate as f64).max(1.0);
        Self {
            position: 0.0,
            target: 0.0,
            step: (1.0 / fade_samples) as f32,
        }
    }

    /// Start moving toward `target`
    pub fn set_target(&mut self, target: f32) {
        self.target = target.clamp(0.0, 1.0);
    }

    /// Move to `target` immediately
    pub fn jump_to(&mut self, target: f32) {
        self.set_target(target);
        self.position = self.target;
    }

    /// True when fully on the dry side and not moving
    #[inline]
    pub fn is_dry(&self) -> bool {
        self.position >= 1.0 && self.target >= 1.0
    }

    /// True when fully on the processed side and not moving
    #[inline]
    pub fn is_processed(&self) -> bool {
        self.position <= 0.0 && self.target <= 0.0
    }

    /// Dry weight for the current frame, then advance one frame
    #[inline]
    pub fn next_weight(&mut self) -> f32 {
        let weight = self.position;
        if self.position < self.target {
            self.position = (self.position + self.step).min(self.target);
        } else if self.position > self.target {
            self.position = (self.position - self.step).max(self.target);
        }
        weight
    }

    /// Blend one mono sample pair and advance
    #[inline]
    pub fn mix(&mut self, processed: f32, dry: f32) -> f32 {
        blend(processed, dry, self.next_weight())
    }
}

/// Weighted blend; exact at both ends of the range
#[inline]
pub fn blend(processed: f32, dry: f32, weight: f32) -> f32 {
    processed * (1.0 - weight) + dry * weight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_reaches_target() {
        let mut fade = Crossfade::new(0.001, 1000);
        fade.set_target(1.0);
        assert_eq!(fade.mix(1.0, 0.0), 1.0);
        assert_eq!(fade.mix(1.0, 0.0), 0.0);
        assert!(fade.is_dry());
    }

    #[test]
    fn test_fade_is_gradual() {
        let mut fade = Crossfade::new(0.01, 1000);
        fade.set_target(1.0);
        let samples: Vec<f32> = (0..12).map(|_| fade.mix(1.0, 0.0)).collect();
        for pair in samples.windows(2) {
            assert!(pair[1] <= pair[0]);
            assert!(pair[0] - pair[1] <= 0.1 + 1e-6);
        }
        assert_eq!(*samples.last().unwrap(), 0.0);
    }

    #[test]
    fn test_jump() {
        let mut fade = Crossfade::new(0.005, 44100);
        fade.jump_to(1.0);
        assert!(fade.is_dry());
        assert_eq!(fade.mix(0.3, 0.7), 0.7);
    }
}
