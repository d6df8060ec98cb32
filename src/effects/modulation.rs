//! LFO-driven effects: CHORUS, FLANGER, PHASER, TREMOLO and RINGMOD

use super::node::{Control, NodeBuilder, ParamBlock, ParamId, Processor};
use crate::dsp::biquad::{Biquad, FilterKind, FilterParams};
use crate::dsp::delay_line::DelayLine;
use crate::dsp::oscillator::Lfo;
use crate::engine::buffer::AudioBuffer;

/// Number of chorus voices
pub const MAX_VOICES: usize = 8;

/// Flanger sweep depth in seconds
const FLANGER_DEPTH: f32 = 0.003;

/// Phaser sweep depth in Hz
const PHASER_DEPTH: f32 = 300.0;

const PHASER_STAGES: usize = 4;

/// Fixed feedback around the tremolo gain stage
const TREMOLO_FEEDBACK: f32 = 0.2;

fn delay_lines(channels: usize, max_secs: f64, sample_rate: u32) -> Vec<DelayLine> {
    (0..channels)
        .map(|_| DelayLine::with_max_seconds(max_secs, sample_rate))
        .collect()
}

// ============================================================================
// CHORUS
// ============================================================================

/// Eight delay voices sharing one LFO; every voice reads the same modulated
/// delay, so the active voice count sets the wet level.
struct Chorus {
    length: ParamId,
    rate: ParamId,
    depth: ParamId,
    voices: Vec<ParamId>,
    lfo: Lfo,
    lines: Vec<DelayLine>,
    sample_rate: u32,
}

impl Processor for Chorus {
    fn process(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamBlock) {
        let length = params.get(self.length);
        let rate = params.get(self.rate);
        let depth = params.get(self.depth);
        let sr = self.sample_rate as f32;

        for i in 0..input.len() {
            let lfo = self.lfo.tick(rate[i], self.sample_rate);
            let delay = (length[i] + lfo * depth[i]) * sr;
            let voice_gain: f32 = self.voices.iter().map(|&id| params.get(id)[i]).sum();
            for (ch, line) in self.lines.iter_mut().enumerate().take(input.channels()) {
                let delayed = line.read(delay);
                line.write(input.samples[ch][i]);
                output.samples[ch][i] = delayed * voice_gain;
            }
        }
    }
}

pub fn build_chorus(builder: &mut NodeBuilder, sample_rate: u32) -> Box<dyn Processor> {
    let length = builder.param(0.0);
    let rate = builder.param(0.0);
    let depth = builder.param(1.0);
    let voices = builder.params(MAX_VOICES, 0.0);
    builder.control("CHORUS_LENGTH", Control::Direct(length));
    builder.control("CHORUS_NUMVOICES", Control::Voices(voices.clone()));
    builder.control("CHORUS_RATE", Control::Direct(rate));
    builder.control("CHORUS_MOD", Control::Direct(depth));
    Box::new(Chorus {
        length,
        rate,
        depth,
        voices,
        lfo: Lfo::new(),
        // longest voice plus the widest sweep
        lines: delay_lines(2, 0.252, sample_rate),
        sample_rate,
    })
}

// ============================================================================
// FLANGER
// ============================================================================

struct Flanger {
    length: ParamId,
    feedback: ParamId,
    rate: ParamId,
    lfo: Lfo,
    lines: Vec<DelayLine>,
    sample_rate: u32,
}

impl Processor for Flanger {
    fn process(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamBlock) {
        let length = params.get(self.length);
        let feedback = params.get(self.feedback);
        let rate = params.get(self.rate);
        let sr = self.sample_rate as f32;

        for i in 0..input.len() {
            let lfo = self.lfo.tick(rate[i], self.sample_rate);
            let delay = (length[i] + lfo * FLANGER_DEPTH) * sr;
            for (ch, line) in self.lines.iter_mut().enumerate().take(input.channels()) {
                let delayed = line.read(delay);
                line.write(input.samples[ch][i] + delayed * feedback[i]);
                output.samples[ch][i] = delayed;
            }
        }
    }
}

pub fn build_flanger(builder: &mut NodeBuilder, sample_rate: u32) -> Box<dyn Processor> {
    let length = builder.param(0.0);
    let feedback = builder.param(0.0);
    let rate = builder.param(0.0);
    builder.control("FLANGER_LENGTH", Control::Direct(length));
    builder.control("FLANGER_FEEDBACK", Control::Direct(feedback));
    builder.control("FLANGER_RATE", Control::Direct(rate));
    Box::new(Flanger {
        length,
        feedback,
        rate,
        lfo: Lfo::new(),
        lines: delay_lines(2, 0.205, sample_rate),
        sample_rate,
    })
}

// ============================================================================
// PHASER
// ============================================================================

/// Four swept allpass stages with a one-sample feedback path
struct Phaser {
    stage_frequencies: [ParamId; PHASER_STAGES],
    feedback: ParamId,
    rate: ParamId,
    lfo: Lfo,
    stages: Vec<Biquad>,
    last_output: Vec<f32>,
    sample_rate: u32,
}

impl Processor for Phaser {
    fn process(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamBlock) {
        let feedback = params.get(self.feedback);
        let rate = params.get(self.rate);

        for i in 0..input.len() {
            let sweep = self.lfo.tick(rate[i], self.sample_rate) * PHASER_DEPTH;
            for (stage, &id) in self.stages.iter_mut().zip(&self.stage_frequencies) {
                stage.set_params(FilterParams::new(params.get(id)[i] + sweep, 1.0, 0.0));
            }
            for ch in 0..input.channels() {
                let mut sample = input.samples[ch][i] + self.last_output[ch] * feedback[i];
                for stage in &mut self.stages {
                    sample = stage.process(ch, sample);
                }
                self.last_output[ch] = sample;
                output.samples[ch][i] = sample;
            }
        }
    }
}

pub fn build_phaser(builder: &mut NodeBuilder, sample_rate: u32) -> Box<dyn Processor> {
    let rate = builder.param(0.0);
    let feedback = builder.param(0.0);
    let frequencies = builder.params(PHASER_STAGES, 0.0);
    builder.control("PHASER_RATE", Control::Direct(rate));
    builder.control("PHASER_FEEDBACK", Control::Direct(feedback));
    builder.control("PHASER_RANGEMIN", Control::Multi(frequencies[..2].to_vec()));
    builder.control("PHASER_RANGEMAX", Control::Multi(frequencies[2..].to_vec()));

    Box::new(Phaser {
        stage_frequencies: [frequencies[0], frequencies[1], frequencies[2], frequencies[3]],
        feedback,
        rate,
        lfo: Lfo::new(),
        stages: (0..PHASER_STAGES)
            .map(|_| Biquad::new(FilterKind::AllPass, sample_rate, 2))
            .collect(),
        last_output: vec![0.0; 2],
        sample_rate,
    })
}

// ============================================================================
// TREMOLO and RINGMOD
// ============================================================================

/// Gain stage modulated around unity, with its output fed back one sample
/// later: `y = (x + fb·y[-1]) · (1 + depth·lfo)`
struct ModulatedGain {
    frequency: ParamId,
    depth: Option<ParamId>,
    feedback: Option<ParamId>,
    fixed_feedback: f32,
    lfo: Lfo,
    last_output: Vec<f32>,
    sample_rate: u32,
}

impl Processor for ModulatedGain {
    fn process(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamBlock) {
        let frequency = params.get(self.frequency);
        for i in 0..input.len() {
            let depth = self.depth.map_or(1.0, |id| params.get(id)[i]);
            let feedback = self.feedback.map_or(self.fixed_feedback, |id| params.get(id)[i]);
            let gain = 1.0 + depth * self.lfo.tick(frequency[i], self.sample_rate);
            for ch in 0..input.channels() {
                let sample = (input.samples[ch][i] + self.last_output[ch] * feedback) * gain;
                self.last_output[ch] = sample;
                output.samples[ch][i] = sample;
            }
        }
    }
}

pub fn build_tremolo(builder: &mut NodeBuilder, sample_rate: u32) -> Box<dyn Processor> {
    let frequency = builder.param(0.0);
    let depth = builder.param(0.1);
    builder.control("TREMOLO_FREQ", Control::Direct(frequency));
    builder.control("TREMOLO_AMOUNT", Control::Direct(depth));
    Box::new(ModulatedGain {
        frequency,
        depth: Some(depth),
        feedback: None,
        fixed_feedback: TREMOLO_FEEDBACK,
        lfo: Lfo::new(),
        last_output: vec![0.0; 2],
        sample_rate,
    })
}

pub fn build_ringmod(builder: &mut NodeBuilder, sample_rate: u32) -> Box<dyn Processor> {
    let frequency = builder.param(40.0);
    let feedback = builder.param(0.0);
    builder.control("RINGMOD_MODFREQ", Control::Direct(frequency));
    builder.control("RINGMOD_FEEDBACK", Control::Direct(feedback));
    Box::new(ModulatedGain {
        frequency,
        depth: None,
        feedback: Some(feedback),
        fixed_feedback: 0.0,
        lfo: Lfo::new(),
        last_output: vec![0.0; 2],
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::catalog;
    use crate::effects::node::EffectNode;
    use crate::engine::buffer::ChannelLayout;

    fn node(name: &str) -> EffectNode {
        EffectNode::new(catalog::lookup(name).unwrap(), 44100, 0.005).unwrap()
    }

    fn impulse(frames: usize) -> AudioBuffer {
        let mut buffer = AudioBuffer::new(frames, ChannelLayout::Stereo);
        buffer.channel_mut(0)[0] = 1.0;
        buffer.channel_mut(1)[0] = 1.0;
        buffer
    }

    #[test]
    fn test_chorus_voice_count_scales_wet_level() {
        let input = impulse(4096);
        let mut output = AudioBuffer::new(4096, ChannelLayout::Stereo);

        let mut one = node("CHORUS");
        one.process(&input, &mut output, 0.0);
        let one_peak = output.channel(0)[1..].iter().fold(0.0_f32, |a, s| a.max(s.abs()));

        let mut four = node("CHORUS");
        four.parameter("CHORUS_NUMVOICES").unwrap().set_value_at_time(4.0, 0.0);
        four.process(&input, &mut output, 0.0);
        let four_peak = output.channel(0)[1..].iter().fold(0.0_f32, |a, s| a.max(s.abs()));

        assert!(one_peak > 0.0);
        assert!((four_peak / one_peak - 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_flanger_feedback_repeats() {
        let mut flanger = node("FLANGER");
        flanger.parameter("FLANGER_RATE").unwrap().set_value_at_time(0.0, 0.0);
        let input = impulse(2048);
        let mut output = AudioBuffer::new(2048, ChannelLayout::Stereo);
        flanger.process(&input, &mut output, 0.0);
        // 6 ms delay at 44.1 kHz is 264.6 samples; first and second echoes
        let first: f32 = output.channel(0)[255..275].iter().map(|s| s.abs()).sum();
        let second: f32 = output.channel(0)[520..540].iter().map(|s| s.abs()).sum();
        assert!(first > 0.0);
        assert!(second > 0.0 && second < first);
    }

    #[test]
    fn test_phaser_is_stable() {
        let mut phaser = node("PHASER");
        let mut input = AudioBuffer::new(44100, ChannelLayout::Stereo);
        for ch in 0..2 {
            for (i, sample) in input.channel_mut(ch).iter_mut().enumerate() {
                *sample = ((i % 100) as f32 / 50.0) - 1.0;
            }
        }
        let mut output = AudioBuffer::new(44100, ChannelLayout::Stereo);
        phaser.process(&input, &mut output, 0.0);
        assert!(output.is_finite());
        assert!(output.channel(0).iter().all(|s| s.abs() < 10.0));
    }

    #[test]
    fn test_ringmod_modulates_constant() {
        let mut ringmod = node("RINGMOD");
        let mut input = AudioBuffer::new(44100, ChannelLayout::Stereo);
        input.channel_mut(0).fill(0.5);
        input.channel_mut(1).fill(0.5);
        let mut output = AudioBuffer::new(44100, ChannelLayout::Stereo);
        ringmod.process(&input, &mut output, 0.0);
        let left = output.channel(0);
        let max = left.iter().fold(f32::MIN, |a, &s| a.max(s));
        let min = left.iter().fold(f32::MAX, |a, &s| a.min(s));
        // 0.5 · (1 ± 1)
        assert!((max - 1.0).abs() < 1e-3);
        assert!(min.abs() < 1e-3);
    }
}
