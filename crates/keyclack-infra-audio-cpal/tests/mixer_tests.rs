use keyclack_infra_audio_cpal::mixer;
use keyclack_ports::audio::{AudioRenderCallback, PlaybackChannel};
use keyclack_ports::types::{Clip, PcmClip, PcmFormat, Volume01};
use std::sync::Arc;

const SR: u32 = 1_000;

fn constant_clip(frames: usize, value: i16) -> Clip {
    PcmClip::shared(
        PcmFormat::stereo(SR),
        vec![value; frames * 2],
        Volume01::new(1.0),
    )
}

fn render(mixer: &mut impl AudioRenderCallback, frames: usize) -> (Vec<f32>, Vec<f32>) {
    let mut l = vec![0.0; frames];
    let mut r = vec![0.0; frames];
    mixer.render(&mut l, &mut r);
    (l, r)
}

#[test]
fn idle_mixer_renders_silence() {
    let (channels, mut mixer) = mixer(SR, 4);
    assert_eq!(channels.len(), 4);
    let (l, r) = render(&mut mixer, 16);
    assert!(l.iter().chain(r.iter()).all(|s| *s == 0.0));
    assert!(channels.iter().all(|c| !c.is_busy()));
}

#[test]
fn clip_plays_to_the_end_and_reports_once() {
    let (channels, mut mixer) = mixer(SR, 2);
    channels[0].play(constant_clip(10, 16384), 1.0, 0);
    assert!(channels[0].is_busy());

    let (l, r) = render(&mut mixer, 16);
    assert!(l[..10].iter().all(|s| (*s - 0.5).abs() < 1e-6));
    assert!(r[..10].iter().all(|s| (*s - 0.5).abs() < 1e-6));
    assert!(l[10..].iter().all(|s| *s == 0.0));
    assert!(!channels[0].is_busy());
    assert_eq!(channels[0].take_end_events(), 1);
    assert_eq!(channels[0].take_end_events(), 0);
}

#[test]
fn gain_and_fade_in_shape_the_attack() {
    let (channels, mut mixer) = mixer(SR, 1);
    // 4 ms at 1 kHz is a four frame ramp.
    channels[0].play(constant_clip(8, 16384), 0.5, 4);
    let (l, _) = render(&mut mixer, 8);
    let expected = [0.0625, 0.125, 0.1875, 0.25, 0.25, 0.25, 0.25, 0.25];
    for (got, want) in l.iter().zip(expected) {
        assert!((got - want).abs() < 1e-6, "{got} != {want}");
    }
}

#[test]
fn hard_stop_silences_the_next_block() {
    let (channels, mut mixer) = mixer(SR, 1);
    channels[0].play(constant_clip(100, 8000), 1.0, 0);
    render(&mut mixer, 10);
    channels[0].stop();
    assert!(!channels[0].is_busy());
    let (l, _) = render(&mut mixer, 10);
    assert!(l.iter().all(|s| *s == 0.0));
    assert_eq!(channels[0].take_end_events(), 0);
}

#[test]
fn fade_out_ramps_down_and_ends() {
    let (channels, mut mixer) = mixer(SR, 1);
    channels[0].play(constant_clip(100, 16384), 1.0, 0);
    render(&mut mixer, 4);
    channels[0].fade_out(4);
    let (l, _) = render(&mut mixer, 8);
    let expected = [0.5, 0.375, 0.25, 0.125, 0.0, 0.0, 0.0, 0.0];
    for (got, want) in l.iter().zip(expected) {
        assert!((got - want).abs() < 1e-6, "{got} != {want}");
    }
    assert!(!channels[0].is_busy());
    assert_eq!(channels[0].take_end_events(), 1);
}

#[test]
fn replaying_a_channel_restarts_it() {
    let (channels, mut mixer) = mixer(SR, 1);
    channels[0].play(constant_clip(4, 16384), 1.0, 0);
    channels[0].play(constant_clip(6, 8192), 1.0, 0);
    let (l, _) = render(&mut mixer, 8);
    assert!(l[..6].iter().all(|s| (*s - 0.25).abs() < 1e-6));
    assert_eq!(l[6], 0.0);
    assert_eq!(channels[0].take_end_events(), 1);
}

#[test]
fn voices_sum_and_the_limiter_engages() {
    let (channels, mut mixer) = mixer(SR, 4);
    for channel in &channels {
        channel.play(constant_clip(64, 16384), 1.0, 0);
    }
    let (l, _) = render(&mut mixer, 32);
    assert!(mixer.limiter_gain() < 1.0);
    assert!(l[0] < 2.0);
    assert!(channels.iter().all(|c| c.is_busy()));
}

#[test]
fn mono_clips_play_on_both_sides() {
    let (channels, mut mixer) = mixer(SR, 1);
    let clip = PcmClip::shared(
        PcmFormat {
            sample_rate_hz: SR,
            channels: 1,
        },
        vec![16384; 4],
        Volume01::new(1.0),
    );
    channels[0].play(clip, 1.0, 0);
    let (l, r) = render(&mut mixer, 4);
    assert_eq!(l, r);
    assert!((l[0] - 0.5).abs() < 1e-6);
}

#[test]
fn finished_clips_are_freed_on_the_control_side() {
    let (channels, mut mixer) = mixer(SR, 1);
    let clip = constant_clip(4, 1000);
    channels[0].play(clip.clone(), 1.0, 0);
    render(&mut mixer, 8);
    assert!(!channels[0].is_busy());
    // The callback handed its reference back instead of dropping it.
    assert_eq!(Arc::strong_count(&clip), 2);
    assert_eq!(channels[0].take_end_events(), 1);
    assert_eq!(Arc::strong_count(&clip), 1);
}

#[test]
fn replaced_and_stopped_clips_are_not_freed_by_the_callback() {
    let (channels, mut mixer) = mixer(SR, 1);
    let first = constant_clip(100, 1000);
    let second = constant_clip(100, 1000);
    channels[0].play(first.clone(), 1.0, 0);
    render(&mut mixer, 4);
    channels[0].play(second.clone(), 1.0, 0);
    render(&mut mixer, 4);
    assert_eq!(Arc::strong_count(&first), 2);

    channels[0].stop();
    render(&mut mixer, 4);
    assert_eq!(Arc::strong_count(&second), 2);
    assert_eq!(channels[0].collect_retired(), 2);
    assert_eq!(Arc::strong_count(&first), 1);
    assert_eq!(Arc::strong_count(&second), 1);
}
