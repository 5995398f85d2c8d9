//! UI systems for the map overlays

use bevy::prelude::*;

use crate::map::engine::HudRow;
use crate::map::{CurrentFrame, MapEngine};
use crate::telemetry::TelemetryStatus;
use crate::ui::state::UiState;

const PANEL_BG: Color = Color::srgba(0.02, 0.04, 0.07, 0.75);
const TEXT_MAIN: Color = Color::srgb(0.82, 0.86, 0.92);
const TEXT_DIM: Color = Color::srgb(0.55, 0.6, 0.68);
const HELP: &str = "drag pan | wheel zoom | double-click / R refit | arrows pan | +/- zoom | \
L labels | E easing | P particles | H table | S status | F1 help";

#[derive(Component)]
pub struct StatusText;

#[derive(Component)]
pub struct JourneyTable;

#[derive(Component)]
pub struct Tooltip;

#[derive(Component)]
pub struct HelpText;

fn text_bundle(font_size: f32, color: Color) -> (TextFont, TextColor) {
    (
        TextFont {
            font_size,
            ..default()
        },
        TextColor(color),
    )
}

pub fn setup_overlay(mut commands: Commands) {
    commands.spawn((
        Text::new(""),
        text_bundle(13.0, TEXT_MAIN),
        Node {
            position_type: PositionType::Absolute,
            left: Val::Px(10.0),
            top: Val::Px(8.0),
            padding: UiRect::axes(Val::Px(6.0), Val::Px(3.0)),
            ..default()
        },
        BackgroundColor(PANEL_BG),
        StatusText,
    ));

    commands.spawn((
        Text::new(""),
        text_bundle(12.0, TEXT_MAIN),
        Node {
            position_type: PositionType::Absolute,
            right: Val::Px(10.0),
            top: Val::Px(8.0),
            padding: UiRect::all(Val::Px(6.0)),
            ..default()
        },
        BackgroundColor(PANEL_BG),
        JourneyTable,
    ));

    commands.spawn((
        Text::new(""),
        text_bundle(12.0, TEXT_MAIN),
        Node {
            position_type: PositionType::Absolute,
            display: Display::None,
            padding: UiRect::axes(Val::Px(6.0), Val::Px(3.0)),
            ..default()
        },
        BackgroundColor(PANEL_BG),
        GlobalZIndex(10),
        Tooltip,
    ));

    commands.spawn((
        Text::new(HELP),
        text_bundle(11.0, TEXT_DIM),
        Node {
            position_type: PositionType::Absolute,
            left: Val::Px(10.0),
            bottom: Val::Px(8.0),
            display: Display::None,
            ..default()
        },
        HelpText,
    ));
    info!("[INIT] Overlay ready");
}

pub fn handle_toggle_keys(
    keys: Res<ButtonInput<KeyCode>>,
    mut state: ResMut<UiState>,
    mut engine: ResMut<MapEngine>,
) {
    if keys.just_pressed(KeyCode::KeyH) {
        state.show_hud = !state.show_hud;
    }
    if keys.just_pressed(KeyCode::KeyS) {
        state.show_status = !state.show_status;
    }
    if keys.just_pressed(KeyCode::F1) {
        state.show_help = !state.show_help;
    }
    if keys.just_pressed(KeyCode::KeyL) {
        let on = engine.toggle_labels();
        info!("Waypoint labels {}", if on { "on" } else { "off" });
    }
    if keys.just_pressed(KeyCode::KeyP) {
        let on = engine.toggle_particles();
        info!("Particles {}", if on { "on" } else { "off" });
    }
    if keys.just_pressed(KeyCode::KeyE) {
        let easing = engine.easing().next();
        engine.set_easing(easing);
        info!("Easing: {}", easing.label());
    }
}

pub fn update_status_text(
    state: Res<UiState>,
    status: Res<TelemetryStatus>,
    engine: Res<MapEngine>,
    frame: Res<CurrentFrame>,
    mut q: Query<(&mut Text, &mut Node), With<StatusText>>,
) {
    let Ok((mut text, mut node)) = q.single_mut() else {
        return;
    };
    node.display = if state.show_status {
        Display::Flex
    } else {
        Display::None
    };
    if !state.show_status {
        return;
    }

    let (zoom, manual) = frame
        .0
        .as_ref()
        .map(|scene| (scene.zoom_ratio, scene.user_adjusted))
        .unwrap_or((1.0, false));
    let mut line = format!(
        "{} | {} wp | {} ships | zoom {}{} | {}",
        status.summary(),
        engine.waypoints().len(),
        engine.trails().ship_count(),
        format_zoom(zoom),
        if manual { " (manual)" } else { "" },
        engine.easing().label(),
    );
    line.push_str(&format_counters(engine.stats().dropped, engine.trails().evicted()));
    if text.0 != line {
        text.0 = line;
    }
}

pub fn update_journey_table(
    state: Res<UiState>,
    frame: Res<CurrentFrame>,
    mut q: Query<(&mut Text, &mut Node), With<JourneyTable>>,
) {
    let Ok((mut text, mut node)) = q.single_mut() else {
        return;
    };
    let rows = frame
        .0
        .as_ref()
        .map(|scene| scene.hud.as_slice())
        .unwrap_or(&[]);
    let visible = state.show_hud && !rows.is_empty();
    node.display = if visible { Display::Flex } else { Display::None };
    if visible {
        text.0 = format_journey_table(rows);
    }
}

pub fn update_tooltip(
    frame: Res<CurrentFrame>,
    mut q: Query<(&mut Text, &mut Node), With<Tooltip>>,
) {
    let Ok((mut text, mut node)) = q.single_mut() else {
        return;
    };
    let hover = frame
        .0
        .as_ref()
        .and_then(|scene| scene.hover.as_ref().map(|h| (h, scene.dpr.max(f32::EPSILON))));
    match hover {
        Some((hover, dpr)) => {
            node.display = Display::Flex;
            node.left = Val::Px(hover.anchor.x / dpr + 14.0);
            node.top = Val::Px(hover.anchor.y / dpr + 10.0);
            if text.0 != hover.label {
                text.0 = hover.label.clone();
            }
        }
        None => node.display = Display::None,
    }
}

pub fn update_help(state: Res<UiState>, mut q: Query<&mut Node, With<HelpText>>) {
    if !state.is_changed() {
        return;
    }
    for mut node in q.iter_mut() {
        node.display = if state.show_help {
            Display::Flex
        } else {
            Display::None
        };
    }
}

pub fn format_zoom(ratio: f32) -> String {
    if ratio >= 10.0 {
        format!("{:.0}x", ratio)
    } else {
        format!("{:.2}x", ratio)
    }
}

/// Status suffix for dropped events and evicted trail hops; empty when both are zero.
pub fn format_counters(dropped: u64, evicted: usize) -> String {
    let mut out = String::new();
    if dropped > 0 {
        out.push_str(&format!(" | {} dropped", dropped));
    }
    if evicted > 0 {
        out.push_str(&format!(" | {} hops evicted", evicted));
    }
    out
}

pub fn format_journey_row(row: &HudRow) -> String {
    let mut line = format!(
        "{:<12} {} -> {}  {:>3.0}%  {}",
        row.ship_symbol,
        row.origin,
        row.destination,
        row.progress * 100.0,
        format_eta(row.remaining_secs)
    );
    if let Some(mode) = &row.flight_mode {
        line.push_str("  ");
        line.push_str(mode);
    }
    line
}

pub fn format_journey_table(rows: &[HudRow]) -> String {
    let mut out = format!("In flight: {}", rows.len());
    for row in rows {
        out.push('\n');
        out.push_str(&format_journey_row(row));
    }
    out
}

fn format_eta(secs: f32) -> String {
    let secs = secs.max(0.0).round() as u64;
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
