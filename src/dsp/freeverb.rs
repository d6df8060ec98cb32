//! Freeverb-style reverberator
//!
//! Eight lowpass-feedback comb filters (four per channel) feed a chain of
//! four allpass filters per channel, followed by a 200 Hz highpass. The dry
//! input is summed with the tail at the output.

use super::biquad::{Biquad, FilterKind, FilterParams};
use super::delay_line::DelayLine;

/// Comb delay times in seconds
pub const COMB_TUNINGS: [f64; 8] = [
    1557.0 / 48000.0,
    1617.0 / 48000.0,
    1491.0 / 48000.0,
    1422.0 / 48000.0,
    1277.0 / 48000.0,
    1356.0 / 48000.0,
    1188.0 / 48000.0,
    1116.0 / 48000.0,
];

/// Allpass centre frequencies in Hz
pub const ALLPASS_FREQUENCIES: [f32; 4] = [225.0, 556.0, 441.0, 341.0];

/// Right-channel allpass detune for stereo spread
const STEREO_SPREAD: f32 = 23.0 / 48000.0;

const COMB_DAMPING_Q: f32 = 0.15;
const HIGHPASS_FREQUENCY: f32 = 200.0;
const DEFAULT_Q: f32 = 1.0;

/// Delay with a lowpass filter and gain in its feedback path
#[derive(Debug, Clone)]
struct LowpassComb {
    line: DelayLine,
    delay_samples: f32,
    damping: Biquad,
}

impl LowpassComb {
    fn new(delay_secs: f64, sample_rate: u32) -> Self {
        Self {
            line: DelayLine::with_max_seconds(delay_secs, sample_rate),
            delay_samples: (delay_secs * sample_rate as f64) as f32,
            damping: Biquad::new(FilterKind::LowPass, sample_rate, 1),
        }
    }

    #[inline]
    fn process(&mut self, input: f32, resonance: f32, dampening: f32) -> f32 {
        let delayed = self.line.read(self.delay_samples);
        self.damping
            .set_params(FilterParams::new(dampening, COMB_DAMPING_Q, 0.0));
        let feedback = self.damping.process(0, delayed) * resonance;
        self.line.write(input + feedback);
        delayed
    }
}

/// Stereo reverberator
#[derive(Debug, Clone)]
pub struct Freeverb {
    combs: Vec<LowpassComb>,
    allpass_left: Vec<Biquad>,
    allpass_right: Vec<Biquad>,
    highpass: Biquad,
}

impl Freeverb {
    pub fn new(sample_rate: u32) -> Self {
        let combs = COMB_TUNINGS
            .iter()
            .map(|&tuning| LowpassComb::new(tuning, sample_rate))
            .collect();

        let allpass_chain = |spread: f32| -> Vec<Biquad> {
            ALLPASS_FREQUENCIES
                .iter()
                .map(|&freq| {
                    let mut filter = Biquad::new(FilterKind::AllPass, sample_rate, 1);
                    filter.set_params(FilterParams::new(freq + spread, DEFAULT_Q, 0.0));
                    filter
                })
                .collect()
        };

        let mut highpass = Biquad::new(FilterKind::HighPass, sample_rate, 2);
        highpass.set_params(FilterParams::new(HIGHPASS_FREQUENCY, DEFAULT_Q, 0.0));

        Self {
            combs,
            allpass_left: allpass_chain(0.0),
            allpass_right: allpass_chain(STEREO_SPREAD),
            highpass,
        }
    }

    /// Process one stereo frame
    ///
    /// # Arguments
    /// * `left`, `right` - Input samples
    /// * `resonance` - Comb feedback gain
    /// * `dampening` - Comb lowpass cutoff in Hz
    ///
    /// # Returns
    /// The dry input plus the filtered tail
    #[inline]
    pub fn process(&mut self, left: f32, right: f32, resonance: f32, dampening: f32) -> (f32, f32) {
        let half = self.combs.len() / 2;
        let (left_combs, right_combs) = self.combs.split_at_mut(half);

        let mut wet_left: f32 = left_combs
            .iter_mut()
            .map(|comb| comb.process(left, resonance, dampening))
            .sum();
        let mut wet_right: f32 = right_combs
            .iter_mut()
            .map(|comb| comb.process(right, resonance, dampening))
            .sum();

        for filter in &mut self.allpass_left {
            wet_left = filter.process(0, wet_left);
        }
        for filter in &mut self.allpass_right {
            wet_right = filter.process(0, wet_right);
        }

        (
            left + self.highpass.process(0, wet_left),
            right + self.highpass.process(1, wet_right),
        )
    }
}
