//! DISTORTION and PITCHSHIFT

use super::node::{Control, NodeBuilder, ParamBlock, ParamId, Processor, DRY, WET};
use crate::dsp::pitch::PitchShifter;
use crate::dsp::shaper::WaveShaper;
use crate::engine::buffer::AudioBuffer;

const DISTORTION_PRE_GAIN: f32 = 3.0;

// ============================================================================
// DISTORTION
// ============================================================================

struct Distortion {
    shaper: WaveShaper,
    post_gain: f32,
}

impl Processor for Distortion {
    fn process(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, _params: &ParamBlock) {
        for (dst, src) in output.samples.iter_mut().zip(&input.samples) {
            for (d, s) in dst.iter_mut().zip(src) {
                *d = self.shaper.shape(s * DISTORTION_PRE_GAIN) * self.post_gain;
            }
        }
    }
}

/// Fixed waveshaper; DISTO_GAIN drives the same wet/dry pair as MIX
pub fn build_distortion(builder: &mut NodeBuilder, _sample_rate: u32) -> Box<dyn Processor> {
    builder.control("DISTO_GAIN", Control::Mix { wet: WET, dry: DRY });
    Box::new(Distortion {
        shaper: WaveShaper::distortion(DISTORTION_PRE_GAIN as f64 * 100.0),
        post_gain: (1.0 / DISTORTION_PRE_GAIN).powf(0.6),
    })
}

// ============================================================================
// PITCHSHIFT
// ============================================================================

struct PitchShift {
    shift: ParamId,
    shifters: Vec<PitchShifter>,
}

impl Processor for PitchShift {
    fn process(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamBlock) {
        let shift = params.get(self.shift);
        for ((dst, src), shifter) in output
            .samples
            .iter_mut()
            .zip(&input.samples)
            .zip(&mut self.shifters)
        {
            for ((d, s), semitones) in dst.iter_mut().zip(src).zip(shift) {
                *d = shifter.process(*s, *semitones);
            }
        }
    }
}

pub fn build_pitchshift(builder: &mut NodeBuilder, sample_rate: u32) -> Box<dyn Processor> {
    let shift = builder.param(0.0);
    builder.control("PITCHSHIFT_SHIFT", Control::Direct(shift));
    Box::new(PitchShift {
        shift,
        shifters: (0..2).map(|_| PitchShifter::new(sample_rate)).collect(),
    })
}
