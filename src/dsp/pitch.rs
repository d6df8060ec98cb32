//! Delay-line pitch shifter
//!
//! Two read taps sweep through a short delay buffer at a rate set by the
//! pitch ratio. Their Hann windows are offset by half a period and sum to
//! one, so the crossfade between taps keeps the level constant.

use std::f32::consts::PI;

use super::delay_line::DelayLine;

/// Sweep window in seconds
const WINDOW_SECS: f64 = 0.05;

/// Single-channel pitch shifter
#[derive(Debug, Clone)]
pub struct PitchShifter {
    line: DelayLine,
    window: f32,
    phase: f32,
}

impl PitchShifter {
    pub fn new(sample_rate: u32) -> Self {
        // even length keeps the half-period tap on a whole sample
        let window = 2.0 * (WINDOW_SECS * sample_rate as f64 / 2.0).round() as f32;
        Self {
            line: DelayLine::new(window as usize + 2),
            window,
            phase: 0.0,
        }
    }

    /// Process one sample shifted by `semitones`
    #[inline]
    pub fn process(&mut self, input: f32, semitones: f32) -> f32 {
        let ratio = 2.0_f32.powf(semitones / 12.0);

        let phase_a = self.phase;
        let phase_b = (self.phase + 0.5).fract();
        let gain_a = (PI * phase_a).sin().powi(2);
        let gain_b = (PI * phase_b).sin().powi(2);

        let out = self.line.read(1.0 + phase_a * self.window) * gain_a
            + self.line.read(1.0 + phase_b * self.window) * gain_b;
        self.line.write(input);

        // Shrinking delay raises pitch; growing delay lowers it.
        self.phase += (1.0 - ratio) / self.window;
        self.phase -= self.phase.floor();
        out
    }

    pub fn reset(&mut self) {
        self.line.reset();
        self.phase = 0.0;
    }
}
