//! Project, Track, Clip and Breakpoint types
//!
//! Serialized as camelCase JSON so projects produced by the script layer
//! can be loaded directly.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Index of the mix/metronome track
pub const MIX_TRACK: usize = 0;

/// Name of the tempo placeholder effect
pub const TEMPO_EFFECT: &str = "TEMPO";

/// Name of the tempo placeholder's only parameter
pub const TEMPO_PARAMETER: &str = "TEMPO";

/// Per-track automation: effect name → parameter name → breakpoints.
///
/// Insertion order is significant; it decides the effect chain order.
pub type EffectAutomation = IndexMap<String, IndexMap<String, Vec<Breakpoint>>>;

// ============================================================================
// Breakpoints
// ============================================================================

/// Shape of the automation segment that follows a breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    /// Hold the value until the next breakpoint
    Square,
    /// Ramp linearly to the next breakpoint's value
    Linear,
}

/// A single automation control point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    /// Position in measures (1-based)
    pub measure: f64,
    /// Value in the parameter's user-facing unit
    pub value: f32,
    /// Shape of the following segment
    pub shape: Shape,
}

impl Breakpoint {
    pub fn new(measure: f64, value: f32, shape: Shape) -> Self {
        Self {
            measure,
            value,
            shape,
        }
    }

    pub fn square(measure: f64, value: f32) -> Self {
        Self::new(measure, value, Shape::Square)
    }

    pub fn linear(measure: f64, value: f32) -> Self {
        Self::new(measure, value, Shape::Linear)
    }
}

// ============================================================================
// Clips
// ============================================================================

/// An audio clip placed on a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    /// Key of the source audio (or of a transformed clip)
    pub source_key: String,
    /// Track this clip belongs to
    pub track_index: usize,
    /// Placement on the timeline, in measures
    pub start_measure: f64,
    /// Start offset inside the source, in measures (1 = beginning)
    pub source_in_start: f64,
    /// End offset inside the source; 0 means "play to the natural end"
    pub source_in_end: f64,
    /// Loop flag carried from the script layer
    #[serde(default, rename = "loop")]
    pub looped: bool,
    /// Silence after the clip that counts toward project length
    #[serde(default)]
    pub silence_measures: f64,
}

impl Clip {
    pub fn new(source_key: &str, track_index: usize, start_measure: f64) -> Self {
        Self {
            source_key: source_key.to_string(),
            track_index,
            start_measure,
            source_in_start: 1.0,
            source_in_end: 0.0,
            looped: false,
            silence_measures: 0.0,
        }
    }

    /// Restrict playback to `[start, end)` measures of the source
    pub fn with_source_range(mut self, start: f64, end: f64) -> Self {
        self.source_in_start = start;
        self.source_in_end = end;
        self
    }

    /// True when the clip plays to the natural end of its source
    pub fn plays_to_end(&self) -> bool {
        self.source_in_end == 0.0
    }

    /// Length in measures, when known without decoding audio
    pub fn measure_length(&self) -> Option<f64> {
        if self.plays_to_end() {
            None
        } else {
            Some(self.source_in_end - self.source_in_start)
        }
    }
}

/// A derived clip created by a script call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClipTransform {
    /// Cut `[start, end)` measures out of the source
    #[serde(rename_all = "camelCase")]
    Slice { source_key: String, start: f64, end: f64 },
    /// Play the source `factor` times as long
    #[serde(rename_all = "camelCase")]
    Stretch { source_key: String, factor: f64 },
}

impl ClipTransform {
    pub fn source_key(&self) -> &str {
        match self {
            ClipTransform::Slice { source_key, .. } | ClipTransform::Stretch { source_key, .. } => {
                source_key
            }
        }
    }
}

// ============================================================================
// Tracks
// ============================================================================

/// One track of the arrangement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub clips: Vec<Clip>,
    #[serde(default)]
    pub effects: EffectAutomation,
}

impl Track {
    pub fn new() -> Self {
        Self::default()
    }

    /// Breakpoints for one effect parameter, if automated
    pub fn envelope(&self, effect: &str, parameter: &str) -> Option<&[Breakpoint]> {
        self.effects
            .get(effect)
            .and_then(|params| params.get(parameter))
            .map(Vec::as_slice)
    }

    /// Append a breakpoint to an effect parameter's envelope
    pub fn push_breakpoint(&mut self, effect: &str, parameter: &str, breakpoint: Breakpoint) {
        self.effects
            .entry(effect.to_string())
            .or_default()
            .entry(parameter.to_string())
            .or_default()
            .push(breakpoint);
    }

    /// Record an effect the way the scripting API does.
    ///
    /// With `end_measure == 0` the value is held from `start_measure` on;
    /// otherwise it ramps to `end_value` and holds there.
    pub fn automate(
        &mut self,
        effect: &str,
        parameter: &str,
        start_measure: f64,
        start_value: f32,
        end_measure: f64,
        end_value: f32,
    ) {
        if end_measure == 0.0 {
            self.push_breakpoint(
                effect,
                parameter,
                Breakpoint::square(start_measure, start_value),
            );
        } else {
            self.push_breakpoint(
                effect,
                parameter,
                Breakpoint::linear(start_measure, start_value),
            );
            self.push_breakpoint(effect, parameter, Breakpoint::square(end_measure, end_value));
        }
    }
}

// ============================================================================
// Project
// ============================================================================

/// A complete arrangement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Length in measures, excluding the trailing render measure
    pub length: f64,
    /// Tracks; index 0 is the mix/metronome track
    pub tracks: Vec<Track>,
    /// Slices and stretches keyed by their derived clip key
    #[serde(default)]
    pub transformed_clips: IndexMap<String, ClipTransform>,
}

impl Project {
    /// Create a project holding only the mix track at the given tempo
    pub fn new(length: f64, tempo: f32) -> Self {
        let mut mix = Track::new();
        mix.push_breakpoint(
            TEMPO_EFFECT,
            TEMPO_PARAMETER,
            Breakpoint::square(1.0, tempo),
        );
        Self {
            length,
            tracks: vec![mix],
            transformed_clips: IndexMap::new(),
        }
    }

    /// Load a project from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let project: Project = serde_json::from_reader(BufReader::new(file))?;
        project.validate()?;
        Ok(project)
    }

    /// Parse a project from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let project: Project = serde_json::from_str(json)?;
        project.validate()?;
        Ok(project)
    }

    /// The mix/metronome track
    pub fn mix_track(&self) -> Option<&Track> {
        self.tracks.get(MIX_TRACK)
    }

    /// Tempo automation held by the mix track
    pub fn tempo_track(&self) -> Option<&[Breakpoint]> {
        self.mix_track()
            .and_then(|track| track.envelope(TEMPO_EFFECT, TEMPO_PARAMETER))
    }

    /// Get a track by index, creating empty tracks up to it
    pub fn track_mut(&mut self, index: usize) -> &mut Track {
        while self.tracks.len() <= index {
            self.tracks.push(Track::new());
        }
        &mut self.tracks[index]
    }

    /// Add a clip to the track named by its `track_index`
    pub fn add_clip(&mut self, clip: Clip) {
        let index = clip.track_index;
        self.track_mut(index).clips.push(clip);
    }

    /// Check structural invariants
    ///
    /// Value ranges are checked later against the effect catalog, when a
    /// graph is built.
    pub fn validate(&self) -> Result<()> {
        if self.tracks.is_empty() {
            return Err(EngineError::InvalidProject {
                reason: "project has no mix track".to_string(),
            });
        }
        if !self.length.is_finite() || self.length < 0.0 {
            return Err(EngineError::InvalidProject {
                reason: format!("invalid project length {}", self.length),
            });
        }

        for (index, track) in self.tracks.iter().enumerate() {
            for clip in &track.clips {
                validate_clip(index, clip)?;
            }
            for (effect, params) in &track.effects {
                for (parameter, envelope) in params {
                    validate_envelope(index, effect, parameter, envelope)?;
                }
            }
        }
        Ok(())
    }
}

fn validate_clip(track: usize, clip: &Clip) -> Result<()> {
    let invalid = |reason: String| EngineError::InvalidProject {
        reason: format!("track {} clip '{}': {}", track, clip.source_key, reason),
    };

    if clip.track_index != track {
        return Err(invalid(format!(
            "stored on track {} but names track {}",
            track, clip.track_index
        )));
    }
    if clip.start_measure < 1.0 {
        return Err(invalid("starts before the first measure".to_string()));
    }
    if clip.source_in_start < 0.0 || clip.source_in_end < 0.0 {
        return Err(invalid("negative source offsets".to_string()));
    }
    if !clip.plays_to_end() && clip.source_in_end < clip.source_in_start {
        return Err(invalid("ends before it starts".to_string()));
    }
    if !clip.plays_to_end() && clip.source_in_end == clip.source_in_start {
        return Err(invalid("has zero length".to_string()));
    }
    Ok(())
}

fn validate_envelope(
    track: usize,
    effect: &str,
    parameter: &str,
    envelope: &[Breakpoint],
) -> Result<()> {
    let invalid = |reason: String| EngineError::InvalidAutomation {
        track,
        effect: effect.to_string(),
        parameter: parameter.to_string(),
        reason,
    };

    if envelope.is_empty() {
        return Err(invalid("no breakpoints".to_string()));
    }
    for point in envelope {
        if !point.measure.is_finite() || !point.value.is_finite() {
            return Err(invalid(format!(
                "non-finite breakpoint at measure {}",
                point.measure
            )));
        }
    }
    for pair in envelope.windows(2) {
        if pair[1].measure == pair[0].measure {
            return Err(invalid(format!(
                "two breakpoints share measure {}",
                pair[0].measure
            )));
        }
        if pair[1].measure < pair[0].measure {
            return Err(invalid(format!(
                "breakpoint at measure {} follows measure {}",
                pair[1].measure, pair[0].measure
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_project_has_tempo_on_mix_track() {
        let project = Project::new(8.0, 96.0);
        assert_eq!(project.tracks.len(), 1);
        let tempo = project.tempo_track().unwrap();
        assert_eq!(tempo, &[Breakpoint::square(1.0, 96.0)]);
    }

    #[test]
    fn test_automate_mirrors_script_api() {
        let mut track = Track::new();
        track.automate("VOLUME", "GAIN", 1.0, -60.0, 3.0, 0.0);
        track.automate("DELAY", "DELAY_TIME", 1.0, 250.0, 0.0, 0.0);

        assert_eq!(
            track.envelope("VOLUME", "GAIN").unwrap(),
            &[Breakpoint::linear(1.0, -60.0), Breakpoint::square(3.0, 0.0)]
        );
        assert_eq!(
            track.envelope("DELAY", "DELAY_TIME").unwrap(),
            &[Breakpoint::square(1.0, 250.0)]
        );
        let order: Vec<&str> = track.effects.keys().map(String::as_str).collect();
        assert_eq!(order, vec!["VOLUME", "DELAY"]);
    }

    #[test]
    fn test_validate_rejects_duplicate_measures() {
        let mut project = Project::new(4.0, 120.0);
        let track = project.track_mut(1);
        track.push_breakpoint("VOLUME", "GAIN", Breakpoint::square(2.0, -3.0));
        track.push_breakpoint("VOLUME", "GAIN", Breakpoint::square(2.0, -6.0));

        let err = project.validate().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_AUTOMATION");
        assert!(err.to_string().contains("Track 1"));
    }

    #[test]
    fn test_validate_rejects_unsorted_breakpoints() {
        let mut project = Project::new(4.0, 120.0);
        let track = project.track_mut(1);
        track.push_breakpoint("PAN", "LEFT_RIGHT", Breakpoint::square(3.0, 10.0));
        track.push_breakpoint("PAN", "LEFT_RIGHT", Breakpoint::square(2.0, -10.0));
        assert!(project.validate().is_err());
    }

    #[test]
    fn test_validate_clip_invariants() {
        let mut project = Project::new(4.0, 120.0);
        project.add_clip(Clip::new("KICK", 1, 1.0).with_source_range(2.0, 1.5));
        assert!(project.validate().is_err());

        let mut project = Project::new(4.0, 120.0);
        project.add_clip(Clip::new("KICK", 1, 1.0).with_source_range(2.0, 0.0));
        assert!(project.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_mix_track() {
        let project = Project {
            length: 1.0,
            tracks: vec![],
            transformed_clips: IndexMap::new(),
        };
        assert_eq!(project.validate().unwrap_err().error_code(), "INVALID_PROJECT");
    }

    #[test]
    fn test_json_round_trip_preserves_effect_order() {
        let json = r#"{
            "length": 4,
            "tracks": [
                {"effects": {"TEMPO": {"TEMPO": [{"measure": 1, "value": 100, "shape": "square"}]}}},
                {
                    "clips": [{"sourceKey": "DRUMS", "trackIndex": 1, "startMeasure": 1,
                               "sourceInStart": 1, "sourceInEnd": 3, "loop": false}],
                    "effects": {
                        "REVERB": {"MIX": [{"measure": 1, "value": 0.3, "shape": "square"}]},
                        "DELAY": {"DELAY_TIME": [{"measure": 1, "value": 200, "shape": "linear"},
                                                 {"measure": 2, "value": 400, "shape": "square"}]}
                    }
                }
            ],
            "transformedClips": {
                "DRUMS_SLICE": {"kind": "slice", "sourceKey": "DRUMS", "start": 1, "end": 2}
            }
        }"#;

        let project = Project::from_json(json).unwrap();
        let order: Vec<&str> = project.tracks[1].effects.keys().map(String::as_str).collect();
        assert_eq!(order, vec!["REVERB", "DELAY"]);
        assert_eq!(project.tracks[1].clips[0].source_in_end, 3.0);
        assert_eq!(
            project.transformed_clips["DRUMS_SLICE"].source_key(),
            "DRUMS"
        );
    }
}
