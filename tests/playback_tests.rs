//! Playback Tests
//!
//! Interactive passes driven the way a host audio callback drives them.

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use pretty_assertions::assert_eq;

use automix::engine::{ChannelLayout, TransportState};
use automix::{AudioBuffer, Clip, EngineConfig, MemoryClipSource, PlayRequest, Player, Project};

const CALLBACK_FRAMES: usize = 441;

fn constant(seconds: f64, value: f32) -> AudioBuffer {
    let frames = (seconds * 44100.0) as usize;
    let mut buffer = AudioBuffer::new(frames, ChannelLayout::Stereo);
    for channel in buffer.samples.iter_mut() {
        channel.fill(value);
    }
    buffer
}

/// Two clips, one on each of the first two measures, plus a metronome
fn setup() -> (Player, Arc<Project>) {
    let source = MemoryClipSource::new()
        .with_clip("LOW", constant(2.0, 0.25), None)
        .with_clip("HIGH", constant(2.0, 0.5), None)
        .with_clip("CLICK", constant(0.01, 0.1), None);

    let mut project = Project::new(2.0, 120.0);
    project.add_clip(Clip::new("LOW", 1, 1.0));
    project.add_clip(Clip::new("HIGH", 1, 2.0));
    project.add_clip(Clip::new("CLICK", 0, 1.0));
    project.add_clip(Clip::new("CLICK", 0, 2.0));

    let player = Player::new(EngineConfig::default(), Arc::new(source)).unwrap();
    (player, Arc::new(project))
}

/// Pull `seconds` of audio in host-sized callbacks and return the left channel
fn pull(player: &mut Player, seconds: f64) -> Vec<f32> {
    let frames = (seconds * 44100.0).round() as usize;
    let mut left = Vec::with_capacity(frames);
    let mut callback = vec![0.0_f32; CALLBACK_FRAMES * 2];
    while left.len() < frames {
        player.fill_interleaved(&mut callback);
        left.extend(callback.iter().step_by(2));
    }
    left.truncate(frames);
    left
}

#[test]
fn test_playback_hears_metronome() {
    let (mut player, project) = setup();
    player.play(project, PlayRequest::from_measure(1.0)).unwrap();

    let left = pull(&mut player, 0.1);
    // LOW clip plus the click for its first 10 ms
    assert_abs_diff_eq!(left[0], 0.35, epsilon = 1e-6);
    assert_abs_diff_eq!(left[1000], 0.25, epsilon = 1e-6);
}

#[test]
fn test_play_from_second_measure_starts_mid_project() {
    let (mut player, project) = setup();
    // let the clock run before starting
    pull(&mut player, 0.5);
    player.play(project, PlayRequest::from_measure(2.0)).unwrap();

    let left = pull(&mut player, 0.5);
    assert_abs_diff_eq!(left[1000], 0.5, epsilon = 1e-6);
}

#[test]
fn test_pass_ends_at_window_end() {
    let (mut player, project) = setup();
    let request = PlayRequest {
        end_measure: Some(1.5),
        ..PlayRequest::from_measure(1.0)
    };
    player.play(project, request).unwrap();

    let left = pull(&mut player, 1.5);
    assert_abs_diff_eq!(left[44100 - 10], 0.25, epsilon = 1e-6);
    assert_eq!(left[44100 + 10], 0.0);
    assert_eq!(player.state(), TransportState::Stopped);
}

#[test]
fn test_loop_replays_region() {
    let (mut player, project) = setup();
    player.play(project, PlayRequest::looped(2.0, 2.5)).unwrap();

    let left = pull(&mut player, 2.5);
    // one-second region of HIGH, heard three times
    for second in [0.5, 1.5, 2.2] {
        let index = (second * 44100.0) as usize;
        assert_abs_diff_eq!(left[index], 0.5, epsilon = 1e-6);
    }
    assert!(player.is_playing());
}

#[test]
fn test_stop_fades_then_releases() {
    let (mut player, project) = setup();
    player.play(project, PlayRequest::from_measure(1.0)).unwrap();
    pull(&mut player, 0.2);

    player.stop();
    assert_eq!(player.state(), TransportState::Stopping);
    let left = pull(&mut player, 0.1);

    // the fade is 50 ms: gain falls monotonically to zero
    assert!(left[100] < 0.25 && left[100] > 0.2);
    assert!(left[1000] < left[100]);
    assert!(left[2205 + 5..].iter().all(|s| *s == 0.0));
    assert_eq!(player.state(), TransportState::Stopped);
    assert!(player.graph().is_none());
}

#[test]
fn test_bypass_request_applies_to_pass() {
    let (mut player, project) = setup();
    let mut project = (*project).clone();
    project
        .track_mut(1)
        .automate("VOLUME", "GAIN", 1.0, -60.0, 0.0, 0.0);
    let project = Arc::new(project);

    player
        .play(Arc::clone(&project), PlayRequest::from_measure(1.0))
        .unwrap();
    let muted = pull(&mut player, 0.05);
    assert!(muted[1000] < 0.01);

    player
        .play(
            project,
            PlayRequest::from_measure(1.0).with_bypass(1, ["VOLUME-GAIN"]),
        )
        .unwrap();
    let open = pull(&mut player, 0.05);
    assert_abs_diff_eq!(open[1000], 0.25, epsilon = 1e-6);
}

#[test]
fn test_sub_frame_loop_region_is_refused() {
    let (mut player, project) = setup();
    // 1e-6 measures at 120 BPM is 2 microseconds
    let err = player
        .play(project, PlayRequest::looped(1.0, 1.000_001))
        .unwrap_err();
    assert_eq!(err.error_code(), "INVALID_PROJECT");
    assert_eq!(player.state(), TransportState::Stopped);

    let before = player.current_time();
    let mut callback = vec![1.0_f32; 256];
    player.fill_interleaved(&mut callback);
    assert!(callback.iter().all(|s| *s == 0.0));
    assert_abs_diff_eq!(player.current_time() - before, 128.0 / 44100.0, epsilon = 1e-9);
}

#[test]
fn test_two_frame_loop_keeps_the_callback_moving() {
    let (mut player, project) = setup();
    // one measure is 88200 frames at 120 BPM
    let end = 1.0 + 2.0 / 88200.0;
    player.play(project, PlayRequest::looped(1.0, end)).unwrap();

    let before = player.current_time();
    let mut callback = vec![0.0_f32; 64];
    player.fill_interleaved(&mut callback);
    assert_eq!(player.state(), TransportState::Playing);
    assert_abs_diff_eq!(player.current_time() - before, 32.0 / 44100.0, epsilon = 1e-9);
    // LOW plus the click, every frame
    assert!(callback.iter().step_by(2).all(|s| (*s - 0.35).abs() < 1e-6));
}
