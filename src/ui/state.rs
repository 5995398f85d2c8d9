//! UI state management

use bevy::prelude::*;

/// Overlay visibility toggles
#[derive(Resource)]
pub struct UiState {
    pub show_hud: bool,
    pub show_status: bool,
    pub show_help: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            show_hud: true,
            show_status: true,
            show_help: false,
        }
    }
}
