//! Filter effects: FILTER, BANDPASS, EQ3BAND and WAH

use super::node::{Control, NodeBuilder, ParamBlock, ParamId, Processor};
use crate::dsp::biquad::{Biquad, FilterKind, FilterParams};
use crate::engine::buffer::AudioBuffer;

/// Q used by the peaking band and by the fixed-Q wah
const DEFAULT_Q: f32 = 1.0;
const WAH_Q: f32 = 1.25;

/// Where a filter stage reads its settings from
#[derive(Debug, Clone, Copy)]
enum Setting {
    Fixed(f32),
    Param(ParamId),
}

impl Setting {
    #[inline]
    fn at(&self, params: &ParamBlock, i: usize) -> f32 {
        match *self {
            Setting::Fixed(value) => value,
            Setting::Param(id) => params.get(id)[i],
        }
    }
}

struct Stage {
    filter: Biquad,
    frequency: Setting,
    q: Setting,
    gain: Setting,
}

/// Cascade of biquads
struct FilterChain {
    stages: Vec<Stage>,
}

impl FilterChain {
    fn single(kind: FilterKind, sample_rate: u32, frequency: Setting, q: Setting) -> Self {
        Self {
            stages: vec![Stage {
                filter: Biquad::new(kind, sample_rate, 2),
                frequency,
                q,
                gain: Setting::Fixed(0.0),
            }],
        }
    }
}

impl Processor for FilterChain {
    fn process(&mut self, input: &AudioBuffer, output: &mut AudioBuffer, params: &ParamBlock) {
        output.copy_from(input);
        for stage in &mut self.stages {
            for i in 0..input.len() {
                stage.filter.set_params(FilterParams::new(
                    stage.frequency.at(params, i),
                    stage.q.at(params, i),
                    stage.gain.at(params, i),
                ));
                for (ch, channel) in output.samples.iter_mut().enumerate() {
                    channel[i] = stage.filter.process(ch, channel[i]);
                }
            }
        }
    }
}

pub fn build_filter(builder: &mut NodeBuilder, sample_rate: u32) -> Box<dyn Processor> {
    let frequency = builder.param(0.0);
    let resonance = builder.param(1.0);
    builder.control("FILTER_FREQ", Control::Direct(frequency));
    builder.control("FILTER_RESONANCE", Control::Direct(resonance));
    Box::new(FilterChain::single(
        FilterKind::LowPass,
        sample_rate,
        Setting::Param(frequency),
        Setting::Param(resonance),
    ))
}

pub fn build_bandpass(builder: &mut NodeBuilder, sample_rate: u32) -> Box<dyn Processor> {
    let frequency = builder.param(0.0);
    let width = builder.param(1.0);
    builder.control("BANDPASS_FREQ", Control::Direct(frequency));
    builder.control("BANDPASS_WIDTH", Control::Direct(width));
    Box::new(FilterChain::single(
        FilterKind::BandPass,
        sample_rate,
        Setting::Param(frequency),
        Setting::Param(width),
    ))
}

pub fn build_wah(builder: &mut NodeBuilder, sample_rate: u32) -> Box<dyn Processor> {
    let position = builder.param(0.0);
    builder.control("WAH_POSITION", Control::Direct(position));
    Box::new(FilterChain::single(
        FilterKind::BandPass,
        sample_rate,
        Setting::Param(position),
        Setting::Fixed(WAH_Q),
    ))
}

pub fn build_eq3band(builder: &mut NodeBuilder, sample_rate: u32) -> Box<dyn Processor> {
    let bands = [
        (FilterKind::LowShelf, "EQ3BAND_LOWGAIN", "EQ3BAND_LOWFREQ"),
        (FilterKind::Peaking, "EQ3BAND_MIDGAIN", "EQ3BAND_MIDFREQ"),
        (FilterKind::HighShelf, "EQ3BAND_HIGHGAIN", "EQ3BAND_HIGHFREQ"),
    ];

    let stages = bands
        .into_iter()
        .map(|(kind, gain_name, freq_name)| {
            let gain = builder.param(0.0);
            let frequency = builder.param(0.0);
            builder.control(gain_name, Control::Direct(gain));
            builder.control(freq_name, Control::Direct(frequency));
            Stage {
                filter: Biquad::new(kind, sample_rate, 2),
                frequency: Setting::Param(frequency),
                q: Setting::Fixed(DEFAULT_Q),
                gain: Setting::Param(gain),
            }
        })
        .collect();

    Box::new(FilterChain { stages })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::catalog;
    use crate::effects::node::EffectNode;
    use crate::engine::buffer::ChannelLayout;
    use std::f32::consts::TAU;

    fn sine(frequency: f32, frames: usize) -> AudioBuffer {
        let mut buffer = AudioBuffer::new(frames, ChannelLayout::Stereo);
        for ch in 0..2 {
            for (i, sample) in buffer.channel_mut(ch).iter_mut().enumerate() {
                *sample = (TAU * frequency * i as f32 / 44100.0).sin() * 0.5;
            }
        }
        buffer
    }

    fn tail_peak(buffer: &AudioBuffer) -> f32 {
        let half = buffer.len() / 2;
        buffer.channel(0)[half..]
            .iter()
            .fold(0.0_f32, |acc, s| acc.max(s.abs()))
    }

    fn render(name: &str, input: &AudioBuffer) -> AudioBuffer {
        let mut node = EffectNode::new(catalog::lookup(name).unwrap(), 44100, 0.005).unwrap();
        let mut output = AudioBuffer::new(input.len(), ChannelLayout::Stereo);
        node.process(input, &mut output, 0.0);
        output
    }

    #[test]
    fn test_filter_default_cuts_highs() {
        let output = render("FILTER", &sine(8000.0, 8192));
        assert!(tail_peak(&output) < 0.05);
        let output = render("FILTER", &sine(100.0, 8192));
        assert!(tail_peak(&output) > 0.4);
    }

    #[test]
    fn test_eq3band_flat_by_default() {
        let input = sine(1000.0, 8192);
        let output = render("EQ3BAND", &input);
        assert!((tail_peak(&output) - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_wah_passes_its_band() {
        // position 0 centres the band on 350 Hz
        let near = render("WAH", &sine(350.0, 8192));
        let far = render("WAH", &sine(8000.0, 8192));
        assert!(tail_peak(&near) > 0.4);
        assert!(tail_peak(&far) < 0.1);
    }
}
