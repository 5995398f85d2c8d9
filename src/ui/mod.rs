//! User interface module
//!
//! Text overlays drawn with `bevy_ui`: connection status line, active journey
//! table, hover tooltip and a key help line.

use bevy::prelude::*;

pub mod state;
pub mod systems;

pub use state::UiState;

/// Plugin for the map overlays
pub struct UiPlugin;

impl Plugin for UiPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<UiState>()
            .add_systems(Startup, systems::setup_overlay)
            .add_systems(
                Update,
                (
                    systems::handle_toggle_keys,
                    systems::update_status_text,
                    systems::update_journey_table,
                    systems::update_tooltip,
                    systems::update_help,
                )
                    .chain()
                    .after(crate::map::render::draw_map),
            );
    }
}
