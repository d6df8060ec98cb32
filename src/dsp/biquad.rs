//! Biquad filter
//!
//! Second-order IIR sections using the Audio EQ Cookbook formulas. Lowpass
//! and highpass Q is a resonance in dB, the other types use a linear Q, and
//! the shelves use a fixed slope of 1.

use std::f64::consts::PI;

/// Filter response type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    LowPass,
    HighPass,
    BandPass,
    LowShelf,
    HighShelf,
    Peaking,
    AllPass,
}

/// Filter settings that determine the coefficients
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    pub frequency: f32,
    pub q: f32,
    pub gain_db: f32,
}

impl FilterParams {
    pub fn new(frequency: f32, q: f32, gain_db: f32) -> Self {
        Self {
            frequency,
            q,
            gain_db,
        }
    }
}

/// Normalized biquad coefficients (a0 == 1)
#[derive(Debug, Clone, Copy, PartialEq)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    const SILENT: Self = Self {
        b0: 0.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    fn calculate(kind: FilterKind, params: FilterParams, sample_rate: f64) -> Self {
        let nyquist = sample_rate / 2.0;
        let normalized = (params.frequency as f64 / nyquist).clamp(0.0, 1.0);
        let q = params.q as f64;
        let gain = params.gain_db as f64;
        let a = 10.0_f64.powf(gain / 40.0);

        // Edge frequencies collapse to pass-through or silence.
        if normalized <= 0.0 {
            return match kind {
                FilterKind::LowPass | FilterKind::BandPass => Self::SILENT,
                FilterKind::LowShelf => Self::IDENTITY,
                FilterKind::HighShelf => Self::gain(a * a),
                FilterKind::AllPass | FilterKind::HighPass | FilterKind::Peaking => Self::IDENTITY,
            };
        }
        if normalized >= 1.0 {
            return match kind {
                FilterKind::HighPass | FilterKind::BandPass => Self::SILENT,
                FilterKind::LowShelf => Self::gain(a * a),
                _ => Self::IDENTITY,
            };
        }

        let w0 = PI * normalized;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();

        let (b0, b1, b2, a0, a1, a2) = match kind {
            FilterKind::LowPass => {
                let alpha = sin_w0 / (2.0 * 10.0_f64.powf(q / 20.0));
                let b1 = 1.0 - cos_w0;
                (b1 / 2.0, b1, b1 / 2.0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterKind::HighPass => {
                let alpha = sin_w0 / (2.0 * 10.0_f64.powf(q / 20.0));
                let b1 = -(1.0 + cos_w0);
                (-b1 / 2.0, b1, -b1 / 2.0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterKind::BandPass => {
                if q <= 0.0 {
                    return Self::IDENTITY;
                }
                let alpha = sin_w0 / (2.0 * q);
                (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterKind::AllPass => {
                if q <= 0.0 {
                    return Self::gain(-1.0);
                }
                let alpha = sin_w0 / (2.0 * q);
                (
                    1.0 - alpha,
                    -2.0 * cos_w0,
                    1.0 + alpha,
                    1.0 + alpha,
                    -2.0 * cos_w0,
                    1.0 - alpha,
                )
            }
            FilterKind::Peaking => {
                if q <= 0.0 {
                    return Self::gain(a * a);
                }
                let alpha = sin_w0 / (2.0 * q);
                (
                    1.0 + alpha * a,
                    -2.0 * cos_w0,
                    1.0 - alpha * a,
                    1.0 + alpha / a,
                    -2.0 * cos_w0,
                    1.0 - alpha / a,
                )
            }
            FilterKind::LowShelf => {
                let alpha = sin_w0 / 2.0 * 2.0_f64.sqrt();
                let k = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + k),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - k),
                    (a + 1.0) + (a - 1.0) * cos_w0 + k,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - k,
                )
            }
            FilterKind::HighShelf => {
                let alpha = sin_w0 / 2.0 * 2.0_f64.sqrt();
                let k = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 + k),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 - k),
                    (a + 1.0) - (a - 1.0) * cos_w0 + k,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                    (a + 1.0) - (a - 1.0) * cos_w0 - k,
                )
            }
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    fn gain(g: f64) -> Self {
        Self {
            b0: g,
            ..Self::SILENT
        }
    }
}

/// Direct form I state for one channel
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, input: f64, c: &BiquadCoeffs) -> f64 {
        let output = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }
}

/// Multi-channel biquad whose settings may change every sample
#[derive(Debug, Clone)]
pub struct Biquad {
    kind: FilterKind,
    sample_rate: f64,
    params: Option<FilterParams>,
    coeffs: BiquadCoeffs,
    states: Vec<BiquadState>,
}

impl Biquad {
    pub fn new(kind: FilterKind, sample_rate: u32, channels: usize) -> Self {
        Self {
            kind,
            sample_rate: sample_rate as f64,
            params: None,
            coeffs: BiquadCoeffs::IDENTITY,
            states: vec![BiquadState::default(); channels],
        }
    }

    /// Update the filter settings; coefficients are only recomputed on change
    #[inline]
    pub fn set_params(&mut self, params: FilterParams) {
        if self.params != Some(params) {
            self.coeffs = BiquadCoeffs::calculate(self.kind, params, self.sample_rate);
            self.params = Some(params);
        }
    }

    /// Filter one sample of one channel
    #[inline]
    pub fn process(&mut self, channel: usize, input: f32) -> f32 {
        let coeffs = self.coeffs;
        self.states[channel].process(input as f64, &coeffs) as f32
    }

    pub fn reset(&mut self) {
        self.states.fill(BiquadState::default());
    }
}
