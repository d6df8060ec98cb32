//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::Path;

use tracing::info;

use crate::config::EngineConfig;
use crate::engine::buffer::{calculate_peak, calculate_rms};
use crate::engine::clips::DirectoryClipSource;
use crate::engine::context::AudioContext;
use crate::engine::renderer::{pcm_checksum, render_buffer, render_to_file, OutputFormat};
use crate::error::Result;
use crate::graph::{value_at_measure, BypassSet, GraphBuilder, PassTiming};
use crate::project::{Project, TempoMap, MIX_TRACK, TEMPO_EFFECT};

/// Load the engine configuration, or use defaults when none is given.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path),
        None => Ok(EngineConfig::default()),
    }
}

/// Render a project to a file.
pub fn render(
    config: &EngineConfig,
    project_path: &Path,
    clips: &Path,
    out: &Path,
    format: Option<&str>,
) -> Result<()> {
    let format = match format {
        Some(name) => OutputFormat::from_name(&name.to_ascii_lowercase())?,
        None => OutputFormat::from_path(out)?,
    };
    info!("Rendering {} as {}", project_path.display(), format.extension());

    let project = Project::load(project_path)?;
    let source = DirectoryClipSource::open(clips)?;
    render_to_file(&project, &source, config, format, out)?;

    println!("Rendered: {}", out.display());
    Ok(())
}

/// Print every track's effect chain and the automation values at a measure.
pub fn inspect(config: &EngineConfig, project_path: &Path, measure: f64) -> Result<()> {
    let project = Project::load(project_path)?;
    project.validate()?;
    let tempo_map = TempoMap::from_project(&project);
    let context = AudioContext::realtime(config)?;
    let timing = PassTiming::new(tempo_map.measure_to_time(measure), 0.0);
    let bypass = BypassSet::new();
    let builder = GraphBuilder::new(&context, config, &tempo_map, timing, &bypass);

    println!("Project: {} measures, {} tracks", project.length, project.tracks.len());
    println!("Initial tempo: {:.2} BPM", tempo_map.initial_tempo());

    for (index, track) in project.tracks.iter().enumerate() {
        // fails on unknown names and out-of-range values
        let chain = builder.build_track(index, track)?;
        let label = if index == MIX_TRACK { " (mix)" } else { "" };
        println!();
        println!("Track {}{}: {} clips", index, label, track.clips.len());
        if chain.is_empty() {
            println!("  no effects");
        } else {
            println!("  chain: {}", chain.effect_names().join(" -> "));
        }

        for (effect, params) in &track.effects {
            if effect == TEMPO_EFFECT {
                continue;
            }
            for (parameter, envelope) in params {
                if let Some(value) = value_at_measure(envelope, &tempo_map, measure) {
                    println!("  {}-{} @ {}: {}", effect, parameter, measure, value);
                }
            }
        }
    }

    Ok(())
}

/// Render a project in memory and print the PCM digest and levels.
pub fn checksum(config: &EngineConfig, project_path: &Path, clips: &Path) -> Result<()> {
    let project = Project::load(project_path)?;
    let source = DirectoryClipSource::open(clips)?;
    let buffer = render_buffer(&project, &source, config)?;
    println!("{}  {}", pcm_checksum(&buffer), project_path.display());
    println!(
        "peak {:.2} dBFS, rms {:.2} dBFS",
        calculate_peak(&buffer),
        calculate_rms(&buffer)
    );
    Ok(())
}
