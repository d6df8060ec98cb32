//! Dynamics processing
//!
//! Feed-forward compressor with linked stereo detection. The same gain
//! computer serves the automatable COMPRESSOR effect and the export limiter.

use crate::engine::buffer::{db_to_linear, linear_to_db};

/// Fixed timing and knee settings of a compressor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicsSettings {
    /// Knee width in dB (0 = hard knee)
    pub knee_db: f32,
    /// Attack time in seconds
    pub attack_secs: f32,
    /// Release time in seconds
    pub release_secs: f32,
}

impl DynamicsSettings {
    /// Timing used by the COMPRESSOR effect
    pub const COMPRESSOR: Self = Self {
        knee_db: 3.0,
        attack_secs: 0.01,
        release_secs: 0.15,
    };

    /// Timing used by the export limiter
    pub const LIMITER: Self = Self {
        knee_db: 0.0,
        attack_secs: 0.0,
        release_secs: 0.1,
    };
}

/// Threshold of the export limiter in dBFS
pub const LIMITER_THRESHOLD_DB: f32 = -1.0;

/// Ratio of the export limiter
pub const LIMITER_RATIO: f32 = 10000.0;

/// One-pole smoothing coefficient for a time constant
fn smoothing_coeff(seconds: f32, sample_rate: u32) -> f32 {
    let samples = seconds * sample_rate as f32;
    if samples > 0.0 {
        (-1.0 / samples).exp()
    } else {
        0.0
    }
}

/// Static gain curve: gain change in dB for an input level in dB
pub fn compute_gain_reduction_db(input_db: f32, threshold: f32, ratio: f32, knee: f32) -> f32 {
    let ratio = ratio.max(1.0);
    if knee > 0.0 {
        let knee_start = threshold - knee / 2.0;
        let knee_end = threshold + knee / 2.0;

        if input_db <= knee_start {
            0.0
        } else if input_db >= knee_end {
            (threshold + (input_db - threshold) / ratio) - input_db
        } else {
            // Quadratic blend from 1:1 to the full ratio across the knee
            let knee_factor = (input_db - knee_start) / knee;
            let effective_ratio = 1.0 + (ratio - 1.0) * knee_factor * knee_factor;
            (knee_start + (input_db - knee_start) / effective_ratio) - input_db
        }
    } else if input_db <= threshold {
        0.0
    } else {
        (threshold + (input_db - threshold) / ratio) - input_db
    }
}

/// Compressor state
#[derive(Debug, Clone)]
pub struct Compressor {
    settings: DynamicsSettings,
    attack_coeff: f32,
    release_coeff: f32,
    /// Current linear gain applied to every channel
    gain: f32,
}

impl Compressor {
    pub fn new(settings: DynamicsSettings, sample_rate: u32) -> Self {
        Self {
            settings,
            attack_coeff: smoothing_coeff(settings.attack_secs, sample_rate),
            release_coeff: smoothing_coeff(settings.release_secs, sample_rate),
            gain: 1.0,
        }
    }

    /// Export limiter: -1 dBFS, hard knee, instant attack
    pub fn limiter(sample_rate: u32) -> Self {
        Self::new(DynamicsSettings::LIMITER, sample_rate)
    }

    /// Compute the smoothed gain for one frame given its peak level
    #[inline]
    pub fn next_gain(&mut self, peak: f32, threshold_db: f32, ratio: f32) -> f32 {
        let input_db = linear_to_db(peak).max(-120.0);
        let target_db =
            compute_gain_reduction_db(input_db, threshold_db, ratio, self.settings.knee_db);
        let target = db_to_linear(target_db);

        let coeff = if target < self.gain {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.gain = coeff * self.gain + (1.0 - coeff) * target;
        self.gain
    }

    /// Process one frame in place with linked detection across channels
    #[inline]
    pub fn process_frame(&mut self, frame: &mut [f32], threshold_db: f32, ratio: f32) {
        let peak = frame.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()));
        let gain = self.next_gain(peak, threshold_db, ratio);
        for sample in frame.iter_mut() {
            *sample *= gain;
        }
    }

    /// Current gain reduction in dB (0 = none)
    pub fn gain_reduction_db(&self) -> f32 {
        linear_to_db(self.gain)
    }

    pub fn reset(&mut self) {
        self.gain = 1.0;
    }
}
