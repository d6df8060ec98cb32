//! Effect parameter descriptions
//!
//! A [`ParamSpec`] gives a parameter's range and default in the unit scripts
//! use, plus the mapping into the unit the processing stage consumes.

use crate::engine::buffer::db_to_linear;

/// Mapping from the user-facing unit to the engine unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scale {
    /// Value used as is
    Identity,
    /// Decibels to linear gain
    DbToLinear,
    /// Divide by a constant (milliseconds to seconds, percent to fraction)
    Divide(f32),
    /// Map `[min, max]` linearly onto `[to_min, to_max]`
    Range { to_min: f32, to_max: f32 },
}

/// Static description of one effect parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: f32,
    pub min: f32,
    pub max: f32,
    pub scale: Scale,
}

impl ParamSpec {
    pub const fn new(name: &'static str, default: f32, min: f32, max: f32) -> Self {
        Self {
            name,
            default,
            min,
            max,
            scale: Scale::Identity,
        }
    }

    pub const fn scaled(mut self, scale: Scale) -> Self {
        self.scale = scale;
        self
    }

    pub const fn with_default(mut self, default: f32) -> Self {
        self.default = default;
        self
    }

    /// True when `value` lies inside the inclusive range
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    /// Convert a user-facing value to the engine unit
    pub fn scale(&self, value: f32) -> f32 {
        match self.scale {
            Scale::Identity => value,
            Scale::DbToLinear => db_to_linear(value),
            Scale::Divide(divisor) => value / divisor,
            Scale::Range { to_min, to_max } => {
                let percent = (value - self.min) / (self.max - self.min);
                percent * (to_max - to_min) + to_min
            }
        }
    }

    /// Default value in the engine unit
    pub fn scaled_default(&self) -> f32 {
        self.scale(self.default)
    }
}

/// Parameter shared by every effect
pub const BYPASS: ParamSpec = ParamSpec::new("BYPASS", 0.0, 0.0, 1.0);

/// Wet/dry balance of mixable effects
pub const MIX: ParamSpec = ParamSpec::new("MIX", 1.0, 0.0, 1.0);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_scales() {
        let time = ParamSpec::new("DELAY_TIME", 300.0, 0.0, 4000.0).scaled(Scale::Divide(1000.0));
        assert_relative_eq!(time.scaled_default(), 0.3);

        let feedback =
            ParamSpec::new("DELAY_FEEDBACK", -5.0, -120.0, -1.0).scaled(Scale::DbToLinear);
        assert_relative_eq!(feedback.scaled_default(), 0.562_341_3, epsilon = 1e-6);

        let pan = ParamSpec::new("LEFT_RIGHT", 0.0, -100.0, 100.0).scaled(Scale::Range {
            to_min: -1.0,
            to_max: 1.0,
        });
        assert_relative_eq!(pan.scale(-100.0), -1.0);
        assert_relative_eq!(pan.scale(50.0), 0.5);
    }

    #[test]
    fn test_contains_is_inclusive() {
        let gain = ParamSpec::new("GAIN", 0.0, -60.0, 12.0);
        assert!(gain.contains(-60.0));
        assert!(gain.contains(12.0));
        assert!(!gain.contains(12.5));
        assert!(!gain.contains(f32::NAN));
    }
}
