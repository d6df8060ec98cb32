//! Time-based effects: DELAY and REVERB

use super::node::{Control, NodeBuilder, ParamBlock, ParamId, Processor};
use crate::dsp::delay_line::DelayLine;
use crate::dsp::freeverb::{Freeverb, COMB_TUNINGS};
use crate::engine::buffer::AudioBuffer;

/// Longest DELAY_TIME in seconds
const MAX_DELAY_SECS: f64 = 4.0;

// ============================================================================
// DELAY
// ============================================================================

/// Feedback delay: `wet = d[n]`, `d` fed with `x + feedback·d[n]`
struct Delay {
    time: ParamId,
    feedback: ParamId,
    lines: Vec<DelayLine>,
    sample_rate: u32,
}

impl Processor for Delay {
    fn process(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamBlock) {
        let time = params.get(self.time);
        let feedback = params.get(self.feedback);
        let sr = self.sample_rate as f32;

        for (ch, line) in self.lines.iter_mut().enumerate().take(input.channels()) {
            for i in 0..input.len() {
                let delayed = line.read(time[i] * sr);
                line.write(input.samples[ch][i] + delayed * feedback[i]);
                output.samples[ch][i] = delayed;
            }
        }
    }
}

pub fn build_delay(builder: &mut NodeBuilder, sample_rate: u32) -> Box<dyn Processor> {
    let time = builder.param(0.0);
    let feedback = builder.param(0.0);
    builder.control("DELAY_TIME", Control::Direct(time));
    builder.control("DELAY_FEEDBACK", Control::Direct(feedback));
    Box::new(Delay {
        time,
        feedback,
        lines: (0..2)
            .map(|_| DelayLine::with_max_seconds(MAX_DELAY_SECS, sample_rate))
            .collect(),
        sample_rate,
    })
}

// ============================================================================
// REVERB
// ============================================================================

struct Reverb {
    resonance: ParamId,
    dampening: ParamId,
    freeverb: Freeverb,
}

impl Processor for Reverb {
    fn process(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamBlock) {
        let resonance = params.get(self.resonance);
        let dampening = params.get(self.dampening);
        let stereo = input.channels() > 1;

        for i in 0..input.len() {
            let left = input.samples[0][i];
            let right = if stereo { input.samples[1][i] } else { left };
            let (l, r) = self
                .freeverb
                .process(left, right, resonance[i], dampening[i]);
            output.samples[0][i] = l;
            if stereo {
                output.samples[1][i] = r;
            }
        }
    }
}

pub fn build_reverb(builder: &mut NodeBuilder, sample_rate: u32) -> Box<dyn Processor> {
    // one value per comb filter, driven together
    let resonance = builder.params(COMB_TUNINGS.len(), 0.5);
    let dampening = builder.params(COMB_TUNINGS.len(), 3000.0);
    builder.control("REVERB_TIME", Control::Multi(resonance.clone()));
    builder.control("REVERB_DAMPFREQ", Control::Multi(dampening.clone()));
    Box::new(Reverb {
        resonance: resonance[0],
        dampening: dampening[0],
        freeverb: Freeverb::new(sample_rate),
    })
}
