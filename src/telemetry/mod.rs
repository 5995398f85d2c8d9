//! Fleet telemetry module (REST waypoints + websocket journey stream).

use bevy::prelude::*;

pub mod fetcher;
pub mod systems;
pub mod types;

pub use types::{ConnectionState, TelemetryChannels, TelemetryStatus};

pub struct TelemetryPlugin;

impl Plugin for TelemetryPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<TelemetryStatus>()
            .add_systems(Startup, systems::setup_telemetry_worker)
            .add_systems(
                Update,
                (
                    systems::retry_waypoints,
                    systems::apply_telemetry_results,
                )
                    .chain(),
            )
            .add_systems(Last, systems::shutdown_on_exit);
    }
}
