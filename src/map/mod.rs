//! Fleet map: camera transform, trail retention, animation and drawing.

use bevy::prelude::*;

use crate::config::MapOptions;

pub mod effects;
pub mod engine;
pub mod input;
pub mod motion;
pub mod render;
pub mod starfield;
pub mod trail;
pub mod view;

pub use engine::{FrameScene, MapEngine};
pub use render::CurrentFrame;

/// Wall clock in unix milliseconds; the frame clock for animation.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Plugin owning the [`MapEngine`] resource and its per-frame systems.
pub struct MapPlugin {
    pub options: MapOptions,
}

impl Plugin for MapPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(MapEngine::new(self.options.clone()))
            .init_resource::<CurrentFrame>()
            .add_systems(Startup, render::setup_map_camera)
            .add_systems(
                Update,
                (
                    render::handle_pointer_input,
                    render::handle_camera_keys,
                    render::draw_map,
                    render::sync_waypoint_labels,
                )
                    .chain(),
            );
    }
}
