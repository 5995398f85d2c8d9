//! The map engine: owns waypoints, trails, camera and animation state, and
//! turns them into a [`FrameScene`] once per frame.
//!
//! Lifecycle is `new` -> (`set_waypoints` | `handle_event` | pointer input)* ->
//! `tick` every frame -> `dispose`. Nothing here touches Bevy's ECS, so the
//! whole engine runs under plain unit tests.

use bevy::log::debug;
use bevy::math::{DVec2, Vec2};
use bevy::prelude::Resource;

use crate::config::MapOptions;
use crate::telemetry::types::{JourneyEvent, StreamMessage, Waypoint};

use super::effects::ParticleField;
use super::input::{InputController, InputOutcome};
use super::motion::{self, Easing};
use super::starfield::{Star, Starfield};
use super::trail::{Segment, ShipTrail, TrailStore};
use super::view::{Bounds, View};

/// Alpha per recency rank for completed `recent` hops, brightest first.
pub const RECENT_ALPHA_RAMP: [f32; 5] = [1.0, 0.8, 0.6, 0.4, 0.25];
pub const OLDER_ALPHA: f32 = 0.12;
const PLANNED_ALPHA: f32 = 0.2;
const REMAINING_ALPHA: f32 = 0.3;

/// Drawing surface as reported by the window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Surface {
    /// Logical size.
    pub client_width: f64,
    pub client_height: f64,
    /// Device pixel ratio.
    pub dpr: f64,
}

impl Surface {
    pub fn new(client_width: f64, client_height: f64, dpr: f64) -> Self {
        Self {
            client_width,
            client_height,
            dpr: if dpr.is_finite() && dpr > 0.0 { dpr } else { 1.0 },
        }
    }

    /// Backing buffer width in device pixels.
    pub fn width_px(&self) -> u32 {
        (self.client_width * self.dpr).round().max(0.0) as u32
    }

    pub fn height_px(&self) -> u32 {
        (self.client_height * self.dpr).round().max(0.0) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.width_px() == 0 || self.height_px() == 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted {
        bounds_widened: bool,
        refit_scheduled: bool,
    },
    /// Unparsable payload or missing coordinates.
    Dropped,
    /// Well-formed but not a journey, or the engine is disposed.
    Ignored,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub accepted: u64,
    pub dropped: u64,
    pub ignored: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrailKind {
    Older,
    /// Completed recent hop; 0 is the most recent.
    Recent(usize),
    /// Not departed yet.
    Planned,
    /// Traveled part of the in-flight hop.
    Traveled,
    /// Part of the in-flight hop still ahead of the marker.
    Remaining,
}

/// Screen-space line, in device pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct TrailLine {
    pub from: Vec2,
    pub to: Vec2,
    pub alpha: f32,
    pub hue: f32,
    pub kind: TrailKind,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WaypointMark {
    pub symbol: String,
    pub position: Vec2,
    pub is_market: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShipMark {
    pub ship_symbol: String,
    pub position: Vec2,
    /// Radians, counter-clockwise from +X with +Y up.
    pub heading: Option<f32>,
    pub hue: f32,
    pub progress: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParticleMark {
    pub position: Vec2,
    pub alpha: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Hover {
    pub label: String,
    pub anchor: Vec2,
}

/// One row of the active-journey table.
#[derive(Clone, Debug, PartialEq)]
pub struct HudRow {
    pub ship_symbol: String,
    pub origin: String,
    pub destination: String,
    pub progress: f32,
    pub remaining_secs: f32,
    pub flight_mode: Option<String>,
}

/// Everything the renderer needs for one frame, in device pixels with the
/// origin at the top-left corner.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameScene {
    pub width_px: u32,
    pub height_px: u32,
    pub dpr: f32,
    pub stars: Vec<Star>,
    pub waypoints: Vec<WaypointMark>,
    pub trails: Vec<TrailLine>,
    pub ships: Vec<ShipMark>,
    pub particles: Vec<ParticleMark>,
    pub hover: Option<Hover>,
    pub hud: Vec<HudRow>,
    pub show_labels: bool,
    pub zoom_ratio: f32,
    pub user_adjusted: bool,
}

#[derive(Resource)]
pub struct MapEngine {
    options: MapOptions,
    waypoints: Vec<Waypoint>,
    view: View,
    /// False until the first real point replaces the placeholder bounds.
    bounds_seeded: bool,
    trails: TrailStore,
    input: InputController,
    particles: ParticleField,
    starfield: Starfield,
    last_surface: Option<(u32, u32)>,
    stats: IngestStats,
    disposed: bool,
}

impl MapEngine {
    pub fn new(options: MapOptions) -> Self {
        let view = View::from_points(
            std::iter::empty(),
            options.padding_px,
            options.min_scale,
            options.max_scale,
        );
        Self {
            trails: TrailStore::new(options.trail_limits()),
            input: InputController::new(options.zoom_step),
            particles: ParticleField::new(options.particle_lifetime_ms),
            options,
            waypoints: Vec::new(),
            view,
            bounds_seeded: false,
            starfield: Starfield::default(),
            last_surface: None,
            stats: IngestStats::default(),
            disposed: false,
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn trails(&self) -> &TrailStore {
        &self.trails
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    pub fn user_adjusted(&self) -> bool {
        self.input.user_adjusted()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn options(&self) -> &MapOptions {
        &self.options
    }

    pub fn easing(&self) -> Easing {
        self.options.easing
    }

    pub fn set_easing(&mut self, easing: Easing) {
        self.options.easing = easing;
    }

    pub fn toggle_labels(&mut self) -> bool {
        self.options.show_labels = !self.options.show_labels;
        self.options.show_labels
    }

    pub fn toggle_particles(&mut self) -> bool {
        self.options.particles = !self.options.particles;
        if !self.options.particles {
            self.particles.clear();
        }
        self.options.particles
    }

    /// Replace the waypoint set. Later duplicates of a symbol win.
    pub fn set_waypoints(&mut self, waypoints: Vec<Waypoint>) {
        if self.disposed {
            return;
        }
        let mut unique: Vec<Waypoint> = Vec::with_capacity(waypoints.len());
        for wp in waypoints {
            if !(wp.x.is_finite() && wp.y.is_finite()) {
                continue;
            }
            match unique.iter_mut().find(|w| w.symbol == wp.symbol) {
                Some(existing) => *existing = wp,
                None => unique.push(wp),
            }
        }
        self.waypoints = unique;
        let pending_fit = self.view.needs_fit;
        self.recompute_bounds();
        if self.input.user_adjusted() {
            self.view.needs_fit = pending_fit;
        }
    }

    /// Ingest one journey event: insert its segment and widen the bounds.
    pub fn handle_event(&mut self, evt: &JourneyEvent) -> IngestOutcome {
        if self.disposed {
            return IngestOutcome::Ignored;
        }
        if !evt.has_valid_times() {
            debug!(
                "dropping journey {} for {}: timestamps out of range",
                evt.journey_id, evt.ship_symbol
            );
            self.stats.dropped += 1;
            return IngestOutcome::Dropped;
        }
        let (Some(from), Some(to)) = (evt.origin.position(), evt.destination.position()) else {
            debug!(
                "dropping journey {} for {}: missing coordinates",
                evt.journey_id, evt.ship_symbol
            );
            self.stats.dropped += 1;
            return IngestOutcome::Dropped;
        };

        let segment = Segment {
            journey_id: evt.journey_id.clone(),
            from,
            to,
            departure_ms: evt.departure_ms(),
            arrival_ms: evt.arrival_ms(),
            origin: evt.origin.symbol.clone(),
            destination: evt.destination.symbol.clone(),
            flight_mode: evt.flight_mode.clone(),
        };
        self.trails.insert(&evt.ship_symbol, segment);

        let widened_from = self.include_point(from);
        let widened_to = self.include_point(to);
        let bounds_widened = widened_from || widened_to;
        let refit_scheduled = bounds_widened && !self.input.user_adjusted();
        if refit_scheduled {
            self.view.needs_fit = true;
        }

        self.stats.accepted += 1;
        IngestOutcome::Accepted {
            bounds_widened,
            refit_scheduled,
        }
    }

    /// Decode and ingest a raw stream message.
    pub fn handle_message(&mut self, text: &str) -> IngestOutcome {
        if self.disposed {
            return IngestOutcome::Ignored;
        }
        match StreamMessage::parse(text) {
            Ok(StreamMessage::Journey(evt)) => self.handle_event(&evt),
            Ok(StreamMessage::Other(kind)) => {
                debug!("ignoring stream message of type {}", kind);
                self.stats.ignored += 1;
                IngestOutcome::Ignored
            }
            Err(err) => {
                debug!("dropping stream message: {}", err);
                self.stats.dropped += 1;
                IngestOutcome::Dropped
            }
        }
    }

    pub fn pointer_down(&mut self, pos: DVec2, now_ms: i64) -> InputOutcome {
        if self.disposed {
            return InputOutcome::Ignored;
        }
        let outcome = self.input.pointer_down(pos, now_ms);
        if outcome == InputOutcome::RefitRequested {
            self.refit();
        }
        outcome
    }

    pub fn pointer_move(&mut self, pos: DVec2) -> InputOutcome {
        if self.disposed {
            return InputOutcome::Ignored;
        }
        self.input.pointer_move(pos, &mut self.view)
    }

    pub fn pointer_up(&mut self) -> InputOutcome {
        self.input.pointer_up()
    }

    pub fn pointer_leave(&mut self) {
        self.input.pointer_leave();
    }

    pub fn wheel(&mut self, pos: DVec2, steps: f64) -> InputOutcome {
        if self.disposed {
            return InputOutcome::Ignored;
        }
        self.input.wheel(pos, steps, &mut self.view)
    }

    pub fn key_pan(&mut self, delta: DVec2) -> InputOutcome {
        if self.disposed {
            return InputOutcome::Ignored;
        }
        self.input.key_pan(delta, &mut self.view)
    }

    /// Zoom about the center of the last surface.
    pub fn key_zoom(&mut self, steps: f64) -> InputOutcome {
        let Some((w, h)) = self.last_surface else {
            return InputOutcome::Ignored;
        };
        self.wheel(DVec2::new(w as f64 / 2.0, h as f64 / 2.0), steps)
    }

    /// Recompute bounds from everything known and fit on the next frame.
    /// The manual-control latch stays set.
    pub fn refit(&mut self) {
        if self.disposed {
            return;
        }
        self.recompute_bounds();
        self.view.needs_fit = true;
    }

    /// Compute the frame for `now_ms`. Returns `None` once disposed.
    pub fn tick(&mut self, now_ms: i64, surface: Surface) -> Option<FrameScene> {
        if self.disposed {
            return None;
        }
        if surface.is_empty() {
            return Some(FrameScene::default());
        }

        let (w, h) = (surface.width_px(), surface.height_px());
        if self.last_surface != Some((w, h)) {
            if self.last_surface.is_some() && !self.input.user_adjusted() {
                self.view.needs_fit = true;
            }
            self.last_surface = Some((w, h));
        }
        self.starfield.resize(w, h);
        self.view.ensure_fit(w as f64, h as f64);
        self.trails.refresh_active(now_ms);
        self.particles.decay(now_ms);

        let mut scene = FrameScene {
            width_px: w,
            height_px: h,
            dpr: surface.dpr as f32,
            stars: self.starfield.stars().to_vec(),
            show_labels: self.options.show_labels,
            zoom_ratio: self.view.zoom_ratio() as f32,
            user_adjusted: self.input.user_adjusted(),
            ..FrameScene::default()
        };

        scene.waypoints = self
            .waypoints
            .iter()
            .map(|wp| WaypointMark {
                symbol: wp.symbol.clone(),
                position: self.to_screen(DVec2::new(wp.x, wp.y)),
                is_market: wp.is_market,
            })
            .collect();

        for (ship_symbol, trail) in self.trails.iter() {
            let hue = ship_hue(ship_symbol);
            self.push_trail_lines(&mut scene.trails, trail, hue, now_ms);

            let Some(active) = trail.active.as_ref() else {
                continue;
            };
            let world = motion::position_at(active, now_ms, self.options.easing);
            let position = self.to_screen(world);
            let progress = motion::progress(active.departure_ms, active.arrival_ms, now_ms);

            scene.trails.push(TrailLine {
                from: self.to_screen(active.from),
                to: position,
                alpha: 1.0,
                hue,
                kind: TrailKind::Traveled,
            });
            scene.trails.push(TrailLine {
                from: position,
                to: self.to_screen(active.to),
                alpha: REMAINING_ALPHA,
                hue,
                kind: TrailKind::Remaining,
            });
            scene.ships.push(ShipMark {
                ship_symbol: ship_symbol.clone(),
                position,
                heading: motion::heading(active.from, active.to).map(|h| h as f32),
                hue,
                progress: progress as f32,
            });
            scene.hud.push(HudRow {
                ship_symbol: ship_symbol.clone(),
                origin: active.origin.clone(),
                destination: active.destination.clone(),
                progress: progress as f32,
                remaining_secs: motion::remaining_ms(active, now_ms) as f32 / 1000.0,
                flight_mode: active.flight_mode.clone(),
            });

            if self.options.particles {
                self.particles.emit(world, now_ms);
            }
        }

        let lifetime = self.particles.lifetime_ms();
        scene.particles = self
            .particles
            .iter()
            .map(|p| ParticleMark {
                position: self.to_screen(p.position),
                alpha: p.alpha(now_ms, lifetime),
            })
            .filter(|p| p.alpha > 0.0)
            .collect();

        scene.hover = self.hover(&scene);
        Some(scene)
    }

    /// Release everything and stop producing frames. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.trails.clear();
        self.particles.clear();
        self.waypoints.clear();
        self.input.pointer_leave();
    }

    fn to_screen(&self, p: DVec2) -> Vec2 {
        self.view.world_to_screen(p).as_vec2()
    }

    fn include_point(&mut self, p: DVec2) -> bool {
        if !self.bounds_seeded {
            self.view.bounds = Bounds::at(p);
            self.bounds_seeded = true;
            return true;
        }
        self.view.include(p)
    }

    fn recompute_bounds(&mut self) {
        let points: Vec<DVec2> = self
            .waypoints
            .iter()
            .map(|wp| DVec2::new(wp.x, wp.y))
            .chain(self.trails.endpoints())
            .collect();
        if !points.is_empty() {
            self.bounds_seeded = true;
        }
        self.view.reset_bounds(points);
    }

    fn push_trail_lines(&self, out: &mut Vec<TrailLine>, trail: &ShipTrail, hue: f32, now_ms: i64) {
        for segment in trail.older.iter() {
            out.push(TrailLine {
                from: self.to_screen(segment.from),
                to: self.to_screen(segment.to),
                alpha: OLDER_ALPHA,
                hue,
                kind: TrailKind::Older,
            });
        }

        let active_id = trail.active.as_ref().map(|s| s.journey_id.as_str());
        let mut rank = 0usize;
        for segment in trail.recent.iter() {
            if Some(segment.journey_id.as_str()) == active_id {
                continue;
            }
            let (alpha, kind) = if segment.departure_ms > now_ms {
                (PLANNED_ALPHA, TrailKind::Planned)
            } else {
                let alpha = recent_alpha(rank);
                let kind = TrailKind::Recent(rank);
                rank += 1;
                (alpha, kind)
            };
            out.push(TrailLine {
                from: self.to_screen(segment.from),
                to: self.to_screen(segment.to),
                alpha,
                hue,
                kind,
            });
        }
    }

    /// Nearest ship marker within the hover radius, else nearest waypoint.
    fn hover(&self, scene: &FrameScene) -> Option<Hover> {
        let pointer = self.input.pointer()?.as_vec2();
        let radius = self.options.hover_radius_px as f32 * scene.dpr.max(1.0);

        let nearest_ship = scene
            .ships
            .iter()
            .zip(scene.hud.iter())
            .map(|(ship, row)| (ship.position.distance(pointer), ship, row))
            .filter(|(d, _, _)| *d <= radius)
            .min_by(|a, b| a.0.total_cmp(&b.0));
        if let Some((_, ship, row)) = nearest_ship {
            return Some(Hover {
                label: format!(
                    "{}  {} -> {}  {:.0}%  eta {:.0}s",
                    ship.ship_symbol,
                    row.origin,
                    row.destination,
                    row.progress * 100.0,
                    row.remaining_secs
                ),
                anchor: ship.position,
            });
        }

        scene
            .waypoints
            .iter()
            .map(|wp| (wp.position.distance(pointer), wp))
            .filter(|(d, _)| *d <= radius)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, wp)| Hover {
                label: if wp.is_market {
                    format!("{} (market)", wp.symbol)
                } else {
                    wp.symbol.clone()
                },
                anchor: wp.position,
            })
    }
}

/// Alpha for the `rank`-th most recent completed hop. Ranks past the ramp
/// reuse its last value.
pub fn recent_alpha(rank: usize) -> f32 {
    RECENT_ALPHA_RAMP
        .get(rank)
        .copied()
        .unwrap_or(RECENT_ALPHA_RAMP[RECENT_ALPHA_RAMP.len() - 1])
}

/// Stable per-ship hue in degrees, spread by the golden angle.
pub fn ship_hue(ship_symbol: &str) -> f32 {
    // FNV-1a
    let mut hash: u32 = 0x811c9dc5;
    for byte in ship_symbol.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x01000193);
    }
    ((hash % 1024) as f32 * 137.5) % 360.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::types::Endpoint;

    const T0: i64 = 1_700_000_000_000;

    fn surface() -> Surface {
        Surface::new(400.0, 300.0, 1.0)
    }

    fn options() -> MapOptions {
        MapOptions {
            padding_px: 40.0,
            easing: Easing::Linear,
            ..MapOptions::default()
        }
    }

    fn waypoint(symbol: &str, x: f64, y: f64, is_market: bool) -> Waypoint {
        Waypoint {
            symbol: symbol.to_string(),
            x,
            y,
            is_market,
        }
    }

    fn journey(id: &str, ship: &str, from: (f64, f64), to: (f64, f64), dep_s: f64, arr_s: f64) -> JourneyEvent {
        JourneyEvent {
            journey_id: id.to_string(),
            ship_symbol: ship.to_string(),
            departure_ts: dep_s,
            arrival_ts: arr_s,
            origin: Endpoint {
                symbol: "A".to_string(),
                x: Some(from.0),
                y: Some(from.1),
            },
            destination: Endpoint {
                symbol: "B".to_string(),
                x: Some(to.0),
                y: Some(to.1),
            },
            flight_mode: Some("CRUISE".to_string()),
        }
    }

    fn engine_with_waypoints() -> MapEngine {
        let mut engine = MapEngine::new(options());
        engine.set_waypoints(vec![
            waypoint("X1-A", 0.0, 0.0, false),
            waypoint("X1-B", 100.0, 50.0, true),
        ]);
        engine
    }

    #[test]
    fn single_waypoint_fits_to_finite_scale() {
        let mut engine = MapEngine::new(options());
        engine.set_waypoints(vec![waypoint("X1-A", 50.0, 50.0, false)]);
        let scene = engine.tick(T0, surface()).unwrap();
        assert!(engine.view().scale.is_finite());
        assert!(engine.view().scale > 0.0);
        assert!(!engine.view().needs_fit);
        assert!(scene.waypoints[0].position.is_finite());
    }

    #[test]
    fn missing_coordinates_are_dropped() {
        let mut engine = engine_with_waypoints();
        let mut evt = journey("j1", "S", (0.0, 0.0), (1.0, 1.0), 0.0, 1.0);
        evt.destination.x = None;
        assert_eq!(engine.handle_event(&evt), IngestOutcome::Dropped);
        assert_eq!(engine.trails().ship_count(), 0);
        assert_eq!(engine.stats().dropped, 1);
    }

    #[test]
    fn widening_event_schedules_refit_until_user_adjusts() {
        let mut engine = engine_with_waypoints();
        engine.tick(T0, surface());
        assert!(!engine.view().needs_fit);

        let outcome = engine.handle_event(&journey("j1", "S", (0.0, 0.0), (500.0, 0.0), 0.0, 1.0));
        assert_eq!(
            outcome,
            IngestOutcome::Accepted {
                bounds_widened: true,
                refit_scheduled: true
            }
        );
        assert!(engine.view().needs_fit);
        engine.tick(T0, surface());

        // simulated drag latches manual control
        engine.pointer_down(DVec2::new(100.0, 100.0), T0);
        engine.pointer_move(DVec2::new(130.0, 90.0));
        engine.pointer_up();
        assert!(engine.user_adjusted());

        let outcome = engine.handle_event(&journey("j2", "S", (0.0, 0.0), (-900.0, 700.0), 0.0, 1.0));
        assert_eq!(
            outcome,
            IngestOutcome::Accepted {
                bounds_widened: true,
                refit_scheduled: false
            }
        );
        assert!(!engine.view().needs_fit);
        assert_eq!(engine.view().bounds.min_x, -900.0);
    }

    #[test]
    fn out_of_range_timestamps_are_dropped_and_frame_survives() {
        let mut engine = engine_with_waypoints();
        let body = serde_json::json!({
            "type": "journey",
            "journey_id": "j1",
            "ship_symbol": "S",
            "departure_ts": -1e17,
            "arrival_ts": 1e17,
            "origin": {"symbol": "A", "x": 0, "y": 0},
            "destination": {"symbol": "B", "x": 10, "y": 10}
        })
        .to_string();
        assert_eq!(engine.handle_message(&body), IngestOutcome::Dropped);
        assert_eq!(engine.trails().ship_count(), 0);
        assert_eq!(engine.stats().dropped, 1);
        assert!(engine.tick(T0, surface()).is_some());
    }

    #[test]
    fn waypoint_load_keeps_pending_refit_under_latch() {
        let mut engine = engine_with_waypoints();
        engine.tick(T0, surface());
        engine.wheel(DVec2::new(200.0, 150.0), 2.0);
        assert!(engine.user_adjusted());

        engine.set_waypoints(vec![waypoint("X1-C", -40.0, 10.0, false)]);
        assert!(!engine.view().needs_fit);

        engine.refit();
        engine.set_waypoints(vec![waypoint("X1-D", 60.0, 90.0, false)]);
        assert!(engine.view().needs_fit);
        engine.tick(T0, surface());
        assert!((engine.view().zoom_ratio() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn event_inside_bounds_does_not_refit() {
        let mut engine = engine_with_waypoints();
        engine.tick(T0, surface());
        let outcome = engine.handle_event(&journey("j1", "S", (10.0, 10.0), (20.0, 20.0), 0.0, 1.0));
        assert_eq!(
            outcome,
            IngestOutcome::Accepted {
                bounds_widened: false,
                refit_scheduled: false
            }
        );
        assert!(!engine.view().needs_fit);
    }

    #[test]
    fn first_event_seeds_bounds_without_origin() {
        let mut engine = MapEngine::new(options());
        engine.handle_event(&journey("j1", "S", (1000.0, 1000.0), (1010.0, 1020.0), 0.0, 1.0));
        let bounds = engine.view().bounds;
        assert_eq!(bounds.min_x, 1000.0);
        assert_eq!(bounds.max_y, 1020.0);
    }

    #[test]
    fn active_ship_is_interpolated_and_listed() {
        let mut engine = engine_with_waypoints();
        let dep = T0 as f64 / 1000.0;
        engine.handle_event(&journey("j1", "SHIP-1", (0.0, 0.0), (100.0, 50.0), dep, dep + 1.0));

        let scene = engine.tick(T0 + 500, surface()).unwrap();
        assert_eq!(scene.ships.len(), 1);
        let ship = &scene.ships[0];
        assert!((ship.progress - 0.5).abs() < 1e-6);

        let expected = engine
            .view()
            .world_to_screen(DVec2::new(50.0, 25.0))
            .as_vec2();
        assert!(ship.position.distance(expected) < 1e-3);

        assert_eq!(scene.hud.len(), 1);
        assert_eq!(scene.hud[0].ship_symbol, "SHIP-1");
        assert!((scene.hud[0].remaining_secs - 0.5).abs() < 1e-6);
        assert!(scene.trails.iter().any(|l| l.kind == TrailKind::Traveled));
        assert!(scene.trails.iter().any(|l| l.kind == TrailKind::Remaining));
    }

    #[test]
    fn arrived_ship_has_no_marker() {
        let mut engine = engine_with_waypoints();
        let dep = T0 as f64 / 1000.0;
        engine.handle_event(&journey("j1", "SHIP-1", (0.0, 0.0), (100.0, 50.0), dep, dep + 1.0));
        let scene = engine.tick(T0 + 5_000, surface()).unwrap();
        assert!(scene.ships.is_empty());
        assert!(scene.hud.is_empty());
        assert_eq!(scene.trails.len(), 1);
        assert_eq!(scene.trails[0].kind, TrailKind::Recent(0));
        assert_eq!(scene.trails[0].alpha, 1.0);
    }

    #[test]
    fn recent_ramp_and_older_alpha() {
        let mut engine = MapEngine::new(MapOptions {
            recent_capacity: 3,
            ..options()
        });
        for i in 0..5 {
            let dep = i as f64;
            engine.handle_event(&journey(&format!("j{}", i), "S", (dep, 0.0), (dep + 1.0, 0.0), dep, dep + 0.5));
        }
        let scene = engine.tick(T0, surface()).unwrap();
        let alphas: Vec<(TrailKind, f32)> = scene.trails.iter().map(|l| (l.kind, l.alpha)).collect();
        assert_eq!(
            alphas,
            vec![
                (TrailKind::Older, OLDER_ALPHA),
                (TrailKind::Older, OLDER_ALPHA),
                (TrailKind::Recent(0), 1.0),
                (TrailKind::Recent(1), 0.8),
                (TrailKind::Recent(2), 0.6),
            ]
        );
    }

    #[test]
    fn recent_alpha_extends_last_value() {
        assert_eq!(recent_alpha(0), 1.0);
        assert_eq!(recent_alpha(4), 0.25);
        assert_eq!(recent_alpha(9), 0.25);
    }

    #[test]
    fn zero_duration_journey_counts_as_arrived() {
        let mut engine = engine_with_waypoints();
        let t = T0 as f64 / 1000.0;
        engine.handle_event(&journey("j1", "S", (0.0, 0.0), (100.0, 50.0), t, t));
        let scene = engine.tick(T0, surface()).unwrap();
        assert_eq!(scene.ships.len(), 1);
        assert_eq!(scene.ships[0].progress, 1.0);
        assert!(scene.ships[0].position.is_finite());
    }

    #[test]
    fn messages_are_discriminated() {
        let mut engine = engine_with_waypoints();
        assert_eq!(engine.handle_message("{oops"), IngestOutcome::Dropped);
        assert_eq!(
            engine.handle_message(r#"{"type":"transaction","amount":5}"#),
            IngestOutcome::Ignored
        );
        let body = serde_json::json!({
            "type": "journey",
            "journey_id": "j9",
            "ship_symbol": "S",
            "departure_ts": 0,
            "arrival_ts": 10,
            "origin": {"symbol": "A", "x": 0, "y": 0},
            "destination": {"symbol": "B", "x": 5, "y": 5}
        })
        .to_string();
        assert!(matches!(
            engine.handle_message(&body),
            IngestOutcome::Accepted { .. }
        ));
        assert_eq!(
            engine.stats(),
            IngestStats {
                accepted: 1,
                dropped: 1,
                ignored: 1
            }
        );
    }

    #[test]
    fn redelivery_keeps_one_segment() {
        let mut engine = engine_with_waypoints();
        let evt = journey("j1", "S", (0.0, 0.0), (10.0, 10.0), 0.0, 1.0);
        engine.handle_event(&evt);
        engine.handle_event(&evt);
        assert_eq!(engine.trails().get("S").map(|t| t.len()), Some(1));
    }

    #[test]
    fn hidpi_surface_scales_backing_buffer() {
        let mut engine = engine_with_waypoints();
        let scene = engine.tick(T0, Surface::new(400.0, 300.0, 2.0)).unwrap();
        assert_eq!((scene.width_px, scene.height_px), (800, 600));
        // fitted against device pixels: top-left world corner lands on the padding
        let corner = engine.view().world_to_screen(DVec2::new(0.0, 50.0));
        assert!((corner - DVec2::new(40.0, 40.0)).length() < 1e-9);
    }

    #[test]
    fn resize_refits_until_user_adjusts() {
        let mut engine = engine_with_waypoints();
        engine.tick(T0, surface());
        let scale = engine.view().scale;
        engine.tick(T0, Surface::new(800.0, 600.0, 1.0));
        assert!(engine.view().scale > scale);

        engine.wheel(DVec2::new(10.0, 10.0), 1.0);
        let scale = engine.view().scale;
        engine.tick(T0, Surface::new(400.0, 300.0, 1.0));
        assert_eq!(engine.view().scale, scale);
    }

    #[test]
    fn double_click_refits_but_keeps_latch() {
        let mut engine = engine_with_waypoints();
        engine.tick(T0, surface());
        engine.wheel(DVec2::new(200.0, 150.0), 3.0);
        assert!(engine.user_adjusted());

        engine.pointer_down(DVec2::new(5.0, 5.0), T0);
        engine.pointer_up();
        let outcome = engine.pointer_down(DVec2::new(5.0, 5.0), T0 + 100);
        assert_eq!(outcome, InputOutcome::RefitRequested);
        assert!(engine.view().needs_fit);

        engine.tick(T0, surface());
        assert!((engine.view().zoom_ratio() - 1.0).abs() < 1e-9);
        assert!(engine.user_adjusted());
    }

    #[test]
    fn hover_prefers_ship_then_waypoint() {
        let mut engine = engine_with_waypoints();
        let dep = T0 as f64 / 1000.0;
        engine.handle_event(&journey("j1", "SHIP-1", (0.0, 0.0), (100.0, 50.0), dep, dep + 10.0));
        engine.tick(T0 + 5_000, surface());

        let ship_pos = engine.view().world_to_screen(DVec2::new(50.0, 25.0));
        engine.pointer_move(ship_pos + DVec2::new(3.0, 0.0));
        let scene = engine.tick(T0 + 5_000, surface()).unwrap();
        let hover = scene.hover.expect("ship hover");
        assert!(hover.label.starts_with("SHIP-1"));

        let market = engine.view().world_to_screen(DVec2::new(100.0, 50.0));
        engine.pointer_move(market);
        let scene = engine.tick(T0 + 5_000, surface()).unwrap();
        assert_eq!(scene.hover.map(|h| h.label), Some("X1-B (market)".to_string()));

        engine.pointer_leave();
        let scene = engine.tick(T0 + 5_000, surface()).unwrap();
        assert!(scene.hover.is_none());
    }

    #[test]
    fn particles_follow_active_ships() {
        let mut engine = engine_with_waypoints();
        let dep = T0 as f64 / 1000.0;
        engine.handle_event(&journey("j1", "S", (0.0, 0.0), (100.0, 50.0), dep, dep + 10.0));
        engine.tick(T0 + 100, surface());
        let scene = engine.tick(T0 + 200, surface()).unwrap();
        assert!(!scene.particles.is_empty());

        // long after arrival every particle has faded
        let scene = engine.tick(T0 + 60_000, surface()).unwrap();
        assert!(scene.particles.is_empty());

        assert!(!engine.toggle_particles());
    }

    #[test]
    fn duplicate_waypoint_symbols_collapse() {
        let mut engine = MapEngine::new(options());
        engine.set_waypoints(vec![
            waypoint("X1-A", 0.0, 0.0, false),
            waypoint("X1-A", 5.0, 5.0, true),
            waypoint("X1-NAN", f64::NAN, 0.0, false),
        ]);
        assert_eq!(engine.waypoints().len(), 1);
        assert!(engine.waypoints()[0].is_market);
    }

    #[test]
    fn dispose_is_idempotent_and_stops_ticks() {
        let mut engine = engine_with_waypoints();
        engine.handle_event(&journey("j1", "S", (0.0, 0.0), (1.0, 1.0), 0.0, 1.0));
        engine.dispose();
        engine.dispose();
        assert!(engine.is_disposed());
        assert!(engine.tick(T0, surface()).is_none());
        assert_eq!(
            engine.handle_event(&journey("j2", "S", (0.0, 0.0), (1.0, 1.0), 0.0, 1.0)),
            IngestOutcome::Ignored
        );
        assert_eq!(engine.trails().ship_count(), 0);
    }

    #[test]
    fn empty_surface_yields_blank_frame_without_fitting() {
        let mut engine = engine_with_waypoints();
        let scene = engine.tick(T0, Surface::new(0.0, 0.0, 1.0)).unwrap();
        assert!(scene.waypoints.is_empty());
        assert!(engine.view().needs_fit);
    }

    #[test]
    fn ship_hue_is_stable() {
        assert_eq!(ship_hue("TROOTS-1"), ship_hue("TROOTS-1"));
        let h = ship_hue("TROOTS-2");
        assert!((0.0..360.0).contains(&h));
    }
}
