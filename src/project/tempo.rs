//! Tempo Map
//!
//! Converts between musical position (measures) and seconds along a
//! piecewise-linear tempo curve. Measure 1 sits at time 0 and every measure
//! has four beats. Past the last tempo point the tempo is held constant.

use super::model::{Breakpoint, Project, Shape};

/// Tempo used when a project carries no tempo automation
pub const DEFAULT_TEMPO: f64 = 120.0;

/// Beats per measure
pub const BEATS_PER_MEASURE: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct TempoPoint {
    measure: f64,
    tempo: f64,
}

/// Seconds per measure at a fixed tempo
#[inline]
fn seconds_per_measure(tempo: f64) -> f64 {
    60.0 * BEATS_PER_MEASURE / tempo
}

/// Seconds elapsed from `start.measure` to `measure` along the segment `start → end`.
///
/// Integrates the instantaneous seconds-per-measure of a linearly changing
/// tempo, which yields a logarithm.
fn segment_seconds(start: TempoPoint, end: TempoPoint, measure: f64) -> f64 {
    if start.measure == end.measure {
        return (measure - end.measure) * seconds_per_measure(end.tempo);
    }
    if start.tempo == end.tempo {
        return (measure - start.measure) * seconds_per_measure(start.tempo);
    }
    let slope = (end.tempo - start.tempo) / (end.measure - start.measure);
    let current = start.tempo + slope * (measure - start.measure);
    60.0 * BEATS_PER_MEASURE / slope * (current / start.tempo).ln()
}

/// Inverse of [`segment_seconds`]: measure reached after `seconds` along `start → end`.
fn segment_measure(start: TempoPoint, end: TempoPoint, seconds: f64) -> f64 {
    if start.measure == end.measure {
        return end.measure + seconds / seconds_per_measure(end.tempo);
    }
    if start.tempo == end.tempo {
        return start.measure + seconds / seconds_per_measure(start.tempo);
    }
    let slope = (end.tempo - start.tempo) / (end.measure - start.measure);
    start.measure
        + ((seconds * slope / (60.0 * BEATS_PER_MEASURE)).exp() * start.tempo - start.tempo) / slope
}

/// Piecewise-linear tempo curve
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    points: Vec<TempoPoint>,
}

impl Default for TempoMap {
    fn default() -> Self {
        Self::constant(DEFAULT_TEMPO)
    }
}

impl TempoMap {
    /// A map with one fixed tempo
    pub fn constant(tempo: f64) -> Self {
        Self {
            points: vec![TempoPoint {
                measure: 1.0,
                tempo,
            }],
        }
    }

    /// Build a map from a tempo automation envelope.
    ///
    /// Square breakpoints hold their value until the next breakpoint, so
    /// each one adds a second point just before the next change.
    pub fn from_envelope(envelope: &[Breakpoint]) -> Self {
        if envelope.is_empty() {
            return Self::default();
        }

        let mut points = Vec::with_capacity(envelope.len() * 2);
        for (index, point) in envelope.iter().enumerate() {
            points.push(TempoPoint {
                measure: point.measure,
                tempo: f64::from(point.value),
            });
            if point.shape == Shape::Square {
                if let Some(next) = envelope.get(index + 1) {
                    points.push(TempoPoint {
                        measure: next.measure,
                        tempo: f64::from(point.value),
                    });
                }
            }
        }

        // Leading points on the same measure never affect the curve.
        while points.len() > 1 && points[0].measure == points[1].measure {
            points.remove(0);
        }
        Self { points }
    }

    /// Build the map for a project from its mix track
    pub fn from_project(project: &Project) -> Self {
        project
            .tempo_track()
            .map(Self::from_envelope)
            .unwrap_or_default()
    }

    /// Tempo at the start of the project
    pub fn initial_tempo(&self) -> f64 {
        self.points.first().map_or(DEFAULT_TEMPO, |p| p.tempo)
    }

    /// Convert a measure position to seconds
    pub fn measure_to_time(&self, measure: f64) -> f64 {
        self.point_at_measure(measure).0
    }

    /// Tempo in effect at a measure position
    pub fn tempo_at_measure(&self, measure: f64) -> f64 {
        self.point_at_measure(measure).1
    }

    /// Convert seconds to a measure position
    pub fn time_to_measure(&self, seconds: f64) -> f64 {
        let mut elapsed = 0.0;
        let mut previous = TempoPoint {
            measure: 1.0,
            tempo: self.initial_tempo(),
        };
        let mut current = previous;
        let mut reached = elapsed;

        for &point in &self.points {
            current = point;
            reached = elapsed + segment_seconds(previous, point, point.measure);
            if seconds < reached {
                break;
            }
            elapsed = reached;
            previous = point;
        }
        if seconds >= reached {
            current = previous;
        }
        segment_measure(previous, current, seconds - elapsed)
    }

    /// Returns `(seconds, tempo)` at a measure position
    fn point_at_measure(&self, measure: f64) -> (f64, f64) {
        let mut time = 0.0;
        let mut previous = TempoPoint {
            measure: 1.0,
            tempo: self.initial_tempo(),
        };
        let mut current = previous;

        for &point in &self.points {
            current = point;
            if measure < point.measure {
                break;
            }
            time += segment_seconds(previous, point, point.measure);
            previous = point;
        }
        if measure >= current.measure {
            current = previous;
        }
        time += segment_seconds(previous, current, measure);

        if current.measure == previous.measure {
            return (time, current.tempo);
        }
        let slope = (current.tempo - previous.tempo) / (current.measure - previous.measure);
        (time, previous.tempo + slope * (measure - previous.measure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_constant_tempo() {
        let map = TempoMap::constant(120.0);
        assert_relative_eq!(map.measure_to_time(1.0), 0.0);
        assert_relative_eq!(map.measure_to_time(2.0), 2.0);
        assert_relative_eq!(map.measure_to_time(9.0), 16.0);
        assert_relative_eq!(map.time_to_measure(16.0), 9.0);
        assert_relative_eq!(map.tempo_at_measure(5.0), 120.0);
    }

    #[test]
    fn test_default_without_tempo_track() {
        let project = Project {
            length: 1.0,
            tracks: vec![Default::default()],
            transformed_clips: Default::default(),
        };
        let map = TempoMap::from_project(&project);
        assert_relative_eq!(map.initial_tempo(), DEFAULT_TEMPO);
    }

    #[test]
    fn test_square_tempo_change() {
        let map = TempoMap::from_envelope(&[
            Breakpoint::square(1.0, 120.0),
            Breakpoint::square(3.0, 60.0),
        ]);
        // Two measures at 2 s, then 4 s per measure.
        assert_relative_eq!(map.measure_to_time(3.0), 4.0, epsilon = 1e-9);
        assert_relative_eq!(map.measure_to_time(4.0), 8.0, epsilon = 1e-9);
        assert_relative_eq!(map.time_to_measure(6.0), 3.5, epsilon = 1e-9);
        assert_relative_eq!(map.tempo_at_measure(2.0), 120.0);
        assert_relative_eq!(map.tempo_at_measure(5.0), 60.0);
    }

    #[test]
    fn test_linear_tempo_ramp_round_trips() {
        let map = TempoMap::from_envelope(&[
            Breakpoint::linear(1.0, 80.0),
            Breakpoint::square(5.0, 160.0),
        ]);
        assert_relative_eq!(map.tempo_at_measure(3.0), 120.0, epsilon = 1e-9);
        for measure in [1.0, 1.5, 2.75, 4.0, 5.0, 7.25] {
            let seconds = map.measure_to_time(measure);
            assert_relative_eq!(map.time_to_measure(seconds), measure, epsilon = 1e-9);
        }
        // Ramp is faster than 80 BPM throughout, slower than 160 BPM.
        let ramp_seconds = map.measure_to_time(5.0);
        assert!(ramp_seconds < 4.0 * seconds_per_measure(80.0));
        assert!(ramp_seconds > 4.0 * seconds_per_measure(160.0));
    }
}
