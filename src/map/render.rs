//! Bevy side of the map: window input, per-frame engine tick and gizmo drawing.
//!
//! The engine works in device pixels with a top-left origin. The 2D camera
//! sees logical pixels centered on the window with +Y up, so every point is
//! converted on the way out with [`to_camera`].

use bevy::input::mouse::{MouseScrollUnit, MouseWheel};
use bevy::math::DVec2;
use bevy::prelude::*;
use bevy::window::PrimaryWindow;

use super::engine::{FrameScene, MapEngine, Surface, TrailKind};
use super::now_ms;

const BACKGROUND: Color = Color::srgb(0.015, 0.02, 0.045);
const WAYPOINT_COLOR: Color = Color::srgb(0.55, 0.62, 0.72);
const MARKET_COLOR: Color = Color::srgb(1.0, 0.78, 0.3);
const HOVER_COLOR: Color = Color::srgba(1.0, 1.0, 1.0, 0.8);
/// Wheel travel in pixels treated as one notch.
const PIXELS_PER_NOTCH: f32 = 100.0;
/// Keyboard pan step per frame, in logical pixels.
const KEY_PAN_PX: f64 = 10.0;
const LABEL_FONT_SIZE: f32 = 11.0;
const SHIP_SIZE_PX: f32 = 9.0;

/// Scene produced by the last tick, read by the label and HUD systems.
#[derive(Resource, Default)]
pub struct CurrentFrame(pub Option<FrameScene>);

#[derive(Component)]
pub struct MapCamera;

#[derive(Component)]
pub struct WaypointLabel {
    pub symbol: String,
}

pub fn setup_map_camera(mut commands: Commands) {
    commands.insert_resource(ClearColor(BACKGROUND));
    commands.spawn((Camera2d, MapCamera, Name::new("Map Camera")));
    info!("[INIT] Map camera ready");
}

fn surface_of(window: &Window) -> Surface {
    Surface::new(
        window.width() as f64,
        window.height() as f64,
        window.scale_factor() as f64,
    )
}

/// Device-pixel screen point to 2D camera space.
pub fn to_camera(p: Vec2, scene: &FrameScene) -> Vec2 {
    let dpr = scene.dpr.max(f32::EPSILON);
    let half = Vec2::new(scene.width_px as f32, scene.height_px as f32) / (2.0 * dpr);
    Vec2::new(p.x / dpr - half.x, half.y - p.y / dpr)
}

pub fn handle_pointer_input(
    windows: Query<&Window, With<PrimaryWindow>>,
    mouse: Res<ButtonInput<MouseButton>>,
    mut wheel: MessageReader<MouseWheel>,
    mut engine: ResMut<MapEngine>,
    mut inside: Local<bool>,
) {
    let Ok(window) = windows.single() else {
        wheel.clear();
        return;
    };
    let Some(cursor) = window.cursor_position() else {
        wheel.clear();
        if *inside {
            engine.pointer_leave();
            *inside = false;
        }
        return;
    };
    *inside = true;

    let dpr = window.scale_factor() as f64;
    let pos = DVec2::new(cursor.x as f64, cursor.y as f64) * dpr;

    if mouse.just_pressed(MouseButton::Left) {
        engine.pointer_down(pos, now_ms());
    } else {
        engine.pointer_move(pos);
    }
    if mouse.just_released(MouseButton::Left) {
        engine.pointer_up();
    }

    let steps: f32 = wheel
        .read()
        .map(|event| match event.unit {
            MouseScrollUnit::Line => event.y,
            MouseScrollUnit::Pixel => event.y / PIXELS_PER_NOTCH,
        })
        .sum();
    if steps != 0.0 {
        engine.wheel(pos, steps as f64);
    }
}

/// Arrow keys pan, `+`/`-` zoom about the center, `R` or `Home` refits.
pub fn handle_camera_keys(
    keys: Res<ButtonInput<KeyCode>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mut engine: ResMut<MapEngine>,
) {
    let dpr = windows
        .single()
        .map(|w| w.scale_factor() as f64)
        .unwrap_or(1.0);

    let mut delta = DVec2::ZERO;
    if keys.pressed(KeyCode::ArrowLeft) {
        delta.x += KEY_PAN_PX;
    }
    if keys.pressed(KeyCode::ArrowRight) {
        delta.x -= KEY_PAN_PX;
    }
    if keys.pressed(KeyCode::ArrowUp) {
        delta.y += KEY_PAN_PX;
    }
    if keys.pressed(KeyCode::ArrowDown) {
        delta.y -= KEY_PAN_PX;
    }
    if delta != DVec2::ZERO {
        engine.key_pan(delta * dpr);
    }

    if keys.just_pressed(KeyCode::Equal) || keys.just_pressed(KeyCode::NumpadAdd) {
        engine.key_zoom(1.0);
    }
    if keys.just_pressed(KeyCode::Minus) || keys.just_pressed(KeyCode::NumpadSubtract) {
        engine.key_zoom(-1.0);
    }
    if keys.just_pressed(KeyCode::KeyR) || keys.just_pressed(KeyCode::Home) {
        engine.refit();
        info!("Map refit requested");
    }
}

/// Advance the engine and draw the resulting scene with gizmos.
pub fn draw_map(
    windows: Query<&Window, With<PrimaryWindow>>,
    mut engine: ResMut<MapEngine>,
    mut frame: ResMut<CurrentFrame>,
    mut gizmos: Gizmos,
) {
    let Ok(window) = windows.single() else {
        return;
    };
    let Some(scene) = engine.tick(now_ms(), surface_of(window)) else {
        frame.0 = None;
        return;
    };

    for star in &scene.stars {
        gizmos
            .circle_2d(
                to_camera(star.position, &scene),
                star.radius,
                Color::srgba(0.85, 0.9, 1.0, star.brightness),
            )
            .resolution(6);
    }

    for line in &scene.trails {
        let (saturation, lightness) = match line.kind {
            TrailKind::Planned => (0.25, 0.7),
            TrailKind::Remaining => (0.4, 0.65),
            _ => (0.75, 0.6),
        };
        gizmos.line_2d(
            to_camera(line.from, &scene),
            to_camera(line.to, &scene),
            Color::hsla(line.hue, saturation, lightness, line.alpha),
        );
    }

    for wp in &scene.waypoints {
        let (radius, color) = if wp.is_market {
            (4.0, MARKET_COLOR)
        } else {
            (2.5, WAYPOINT_COLOR)
        };
        gizmos
            .circle_2d(to_camera(wp.position, &scene), radius, color)
            .resolution(12);
    }

    for particle in &scene.particles {
        gizmos
            .circle_2d(
                to_camera(particle.position, &scene),
                1.5,
                Color::srgba(1.0, 0.85, 0.55, particle.alpha * 0.8),
            )
            .resolution(6);
    }

    for ship in &scene.ships {
        let center = to_camera(ship.position, &scene);
        let color = Color::hsl(ship.hue, 0.85, 0.65);
        match ship.heading {
            Some(heading) => {
                let forward = Vec2::from_angle(heading);
                let side = forward.perp();
                let tip = center + forward * SHIP_SIZE_PX;
                let left = center - forward * SHIP_SIZE_PX * 0.6 + side * SHIP_SIZE_PX * 0.5;
                let right = center - forward * SHIP_SIZE_PX * 0.6 - side * SHIP_SIZE_PX * 0.5;
                gizmos.linestrip_2d([tip, left, right, tip], color);
            }
            None => {
                gizmos.circle_2d(center, SHIP_SIZE_PX * 0.5, color);
            }
        }
    }

    if let Some(hover) = &scene.hover {
        let radius = engine.options().hover_radius_px as f32;
        gizmos
            .circle_2d(to_camera(hover.anchor, &scene), radius, HOVER_COLOR)
            .resolution(24);
    }

    frame.0 = Some(scene);
}

/// Keep one `Text2d` per waypoint, positioned beside its marker.
pub fn sync_waypoint_labels(
    mut commands: Commands,
    frame: Res<CurrentFrame>,
    mut labels: Query<(Entity, &WaypointLabel, &mut Transform, &mut Visibility)>,
) {
    let Some(scene) = frame.0.as_ref() else {
        for (entity, ..) in labels.iter() {
            commands.entity(entity).despawn();
        }
        return;
    };

    let mut seen = Vec::with_capacity(scene.waypoints.len());
    for (entity, label, mut transform, mut visibility) in labels.iter_mut() {
        let Some(wp) = scene.waypoints.iter().find(|wp| wp.symbol == label.symbol) else {
            commands.entity(entity).despawn();
            continue;
        };
        let pos = to_camera(wp.position, scene) + Vec2::new(6.0, 8.0);
        transform.translation = pos.extend(1.0);
        *visibility = if scene.show_labels {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        };
        seen.push(label.symbol.clone());
    }

    for wp in &scene.waypoints {
        if seen.contains(&wp.symbol) {
            continue;
        }
        let pos = to_camera(wp.position, scene) + Vec2::new(6.0, 8.0);
        commands.spawn((
            Text2d::new(wp.symbol.clone()),
            TextFont {
                font_size: LABEL_FONT_SIZE,
                ..default()
            },
            TextColor(Color::srgba(0.75, 0.8, 0.9, 0.8)),
            Transform::from_translation(pos.extend(1.0)),
            if scene.show_labels {
                Visibility::Inherited
            } else {
                Visibility::Hidden
            },
            WaypointLabel {
                symbol: wp.symbol.clone(),
            },
        ));
    }
}
