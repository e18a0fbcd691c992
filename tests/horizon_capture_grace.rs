use glam::Vec3;

use sonobox::core::math::Bounds;
use sonobox::sim::forces::horizon_radius;
use sonobox::sim::governor::GovernorConfig;
use sonobox::sim::params::ForceParams;
use sonobox::sim::step::{NoSources, Simulation};

fn void_params() -> ForceParams {
    ForceParams {
        void: 1.0,
        gravity: 0.0,
        wind: 0.0,
        wave: 0.0,
        merge: 0.0,
        ..ForceParams::default()
    }
}

/// An entity crossing the event horizon is not removed before its grace
/// window (at least 1 second) has elapsed, and is gone once the longest
/// possible window (2 seconds) has passed.
#[test]
fn capture_waits_for_grace_window() {
    let p = void_params();
    let mut sim = Simulation::new(Bounds::default(), GovernorConfig::default());
    let id = sim.spawn_at(Vec3::new(horizon_radius(p.void) * 0.4, 0.0, 0.0), &NoSources);

    let dt = 1.0 / 60.0;
    // Just under the minimum grace window: must still be alive.
    let ticks_under = (0.95 / dt) as usize;
    for _ in 0..ticks_under {
        sim.update(dt, &p, &NoSources);
        assert!(
            sim.pool().get_by_id(id).is_some(),
            "removed before minimum grace at t = {:.2}",
            sim.time_sec()
        );
    }
    let captured = sim.pool().get_by_id(id).unwrap().capture;
    assert!(captured.is_some(), "inside horizon but never marked");

    // Well past the maximum window: must be gone.
    let ticks_over = (2.0 / dt) as usize;
    for _ in 0..ticks_over {
        sim.update(dt, &p, &NoSources);
    }
    assert!(sim.pool().get_by_id(id).is_none(), "capture never expired");
}

/// Escaping the horizon before the window elapses cancels the capture; the
/// entity survives indefinitely outside.
#[test]
fn escape_before_expiry_cancels_capture() {
    let p = void_params();
    let horizon = horizon_radius(p.void);
    let mut sim = Simulation::new(Bounds::default(), GovernorConfig::default());
    let id = sim.spawn_at(Vec3::new(horizon * 0.4, 0.0, 0.0), &NoSources);

    let dt = 1.0 / 60.0;
    sim.update(dt, &p, &NoSources);
    assert!(sim.pool().get_by_id(id).unwrap().capture.is_some());

    // Hold the entity outside the horizon against the pull for longer than
    // any grace window could last.
    let outside = Vec3::new(horizon * 2.5, 0.0, 0.0);
    let ticks = (2.5 / dt) as usize;
    for _ in 0..ticks {
        if let Some(e) = sim.pool_mut().get_by_id_mut(id) {
            e.pos = outside;
            e.vel = Vec3::ZERO;
        }
        sim.update(dt, &p, &NoSources);
    }
    let e = sim.pool().get_by_id(id).expect("entity removed after escape");
    assert!(e.capture.is_none(), "capture mark survived the escape");
}
