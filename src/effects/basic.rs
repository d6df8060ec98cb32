//! Gain, panning and compression

use super::node::{Control, NodeBuilder, ParamBlock, ParamId, Processor};
use crate::dsp::dynamics::{Compressor, DynamicsSettings};
use crate::engine::buffer::AudioBuffer;

// ============================================================================
// VOLUME
// ============================================================================

struct Volume {
    gain: ParamId,
}

impl Processor for Volume {
    fn process(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamBlock) {
        let gain = params.get(self.gain);
        for (dst, src) in output.samples.iter_mut().zip(&input.samples) {
            for ((d, s), g) in dst.iter_mut().zip(src).zip(gain) {
                *d = s * g;
            }
        }
    }
}

pub fn build_volume(builder: &mut NodeBuilder, _sample_rate: u32) -> Box<dyn Processor> {
    let gain = builder.param(1.0);
    builder.control("GAIN", Control::Direct(gain));
    Box::new(Volume { gain })
}

// ============================================================================
// PAN
// ============================================================================

/// Downmixes to mono and feeds the two sides through separate gains
struct Pan {
    left: ParamId,
    right: ParamId,
}

impl Processor for Pan {
    fn process(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamBlock) {
        let left_gain = params.get(self.left);
        let right_gain = params.get(self.right);
        let channels = input.channels().max(1) as f32;

        for i in 0..input.len() {
            let mono = input.samples.iter().map(|ch| ch[i]).sum::<f32>() / channels;
            output.samples[0][i] = mono * left_gain[i];
            if let Some(right) = output.samples.get_mut(1) {
                right[i] = mono * right_gain[i];
            }
        }
    }
}

pub fn build_pan(builder: &mut NodeBuilder, _sample_rate: u32) -> Box<dyn Processor> {
    let left = builder.param(0.5);
    let right = builder.param(0.5);
    builder.control("LEFT_RIGHT", Control::Pan { left, right });
    Box::new(Pan { left, right })
}

// ============================================================================
// COMPRESSOR
// ============================================================================

struct CompressorStage {
    threshold: ParamId,
    ratio: ParamId,
    compressor: Compressor,
    frame: Vec<f32>,
}

impl Processor for CompressorStage {
    fn process(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamBlock) {
        let threshold = params.get(self.threshold);
        let ratio = params.get(self.ratio);
        self.frame.resize(input.channels(), 0.0);

        for i in 0..input.len() {
            for (ch, sample) in self.frame.iter_mut().enumerate() {
                *sample = input.samples[ch][i];
            }
            self.compressor
                .process_frame(&mut self.frame, threshold[i], ratio[i]);
            for (ch, sample) in self.frame.iter().enumerate() {
                output.samples[ch][i] = *sample;
            }
        }
    }
}

pub fn build_compressor(builder: &mut NodeBuilder, sample_rate: u32) -> Box<dyn Processor> {
    let threshold = builder.param(-24.0);
    let ratio = builder.param(12.0);
    builder.control("COMPRESSOR_THRESHOLD", Control::Direct(threshold));
    builder.control("COMPRESSOR_RATIO", Control::Direct(ratio));
    Box::new(CompressorStage {
        threshold,
        ratio,
        compressor: Compressor::new(DynamicsSettings::COMPRESSOR, sample_rate),
        frame: Vec::with_capacity(2),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::catalog;
    use crate::effects::node::EffectNode;
    use crate::engine::buffer::ChannelLayout;

    fn render(name: &str, input: &AudioBuffer) -> AudioBuffer {
        let mut node = EffectNode::new(catalog::lookup(name).unwrap(), 44100, 0.005).unwrap();
        let mut output = AudioBuffer::new(input.len(), ChannelLayout::Stereo);
        node.process(input, &mut output, 0.0);
        output
    }

    fn constant(left: f32, right: f32) -> AudioBuffer {
        let mut buffer = AudioBuffer::new(64, ChannelLayout::Stereo);
        buffer.channel_mut(0).fill(left);
        buffer.channel_mut(1).fill(right);
        buffer
    }

    #[test]
    fn test_volume_default_is_unity() {
        let input = constant(0.5, -0.25);
        assert_eq!(render("VOLUME", &input), input);
    }

    #[test]
    fn test_pan_center_splits_mono_downmix() {
        let output = render("PAN", &constant(1.0, 0.0));
        assert!((output.channel(0)[10] - 0.25).abs() < 1e-6);
        assert!((output.channel(1)[10] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_compressor_reduces_loud_signal() {
        let output = render("COMPRESSOR", &constant(0.9, 0.9));
        assert!(output.channel(0)[63] < 0.9);
        assert!(output.channel(0)[63] > 0.0);
    }
}
