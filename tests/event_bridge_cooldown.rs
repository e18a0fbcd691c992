use glam::Vec3;

use sonobox::core::math::Bounds;
use sonobox::sim::params::ForceParams;
use sonobox::sim::spatial::{EventBridge, SpatialMapper};
use sonobox::sim::step::SimEvent;
use sonobox::synth::bank::SampleBank;
use sonobox::synth::engine::VoiceEngine;
use sonobox::synth::scale::MusicContext;

fn wall(id: u64) -> SimEvent {
    SimEvent::Wall {
        id,
        pos: Vec3::new(1.0, 0.0, 0.0),
        vel: Vec3::new(0.0, 0.0, 0.3),
        radius: 0.3,
        impulse: 1.0,
    }
}

/// One entity hammering the wall every frame must not flood the voice
/// engine: the per-entity cooldown admits only the first event of a burst.
#[test]
fn same_entity_burst_triggers_once() {
    let mut engine = VoiceEngine::new(48_000.0, 16, SampleBank::with_slots(2));
    let mapper = SpatialMapper::new(Bounds::default());
    let mut bridge = EventBridge::new();
    let p = ForceParams::default();
    let music = MusicContext::default();

    // Five frames of sustained contact, 16 ms apart.
    for frame in 0..5 {
        let now = frame as f32 * 0.016;
        bridge.dispatch(&[wall(7)], &[], now, &mapper, &p, &music, &mut engine);
    }
    assert_eq!(engine.active_voices(), 1);
}

/// Distinct entities are cooled down independently.
#[test]
fn distinct_entities_trigger_independently() {
    let mut engine = VoiceEngine::new(48_000.0, 16, SampleBank::with_slots(2));
    let mapper = SpatialMapper::new(Bounds::default());
    let mut bridge = EventBridge::new();
    let p = ForceParams::default();
    let music = MusicContext::default();

    bridge.dispatch(
        &[wall(1), wall(2), wall(3)],
        &[],
        0.0,
        &mapper,
        &p,
        &music,
        &mut engine,
    );
    assert_eq!(engine.active_voices(), 3);
}

/// After the cooldown lapses the same entity may sound again.
#[test]
fn cooldown_expires_and_retriggers() {
    let mut engine = VoiceEngine::new(48_000.0, 16, SampleBank::with_slots(2));
    let mapper = SpatialMapper::new(Bounds::default());
    let mut bridge = EventBridge::new();
    let p = ForceParams::default();
    let music = MusicContext::default();

    bridge.dispatch(&[wall(7)], &[], 0.0, &mapper, &p, &music, &mut engine);
    bridge.dispatch(&[wall(7)], &[], 0.5, &mapper, &p, &music, &mut engine);
    assert_eq!(engine.active_voices(), 2);
}
