use bevy::prelude::*;
use bevy::window::{PresentMode, Window, WindowPlugin};

#[cfg(feature = "dev")]
use bevy::dev_tools::fps_overlay::FpsOverlayPlugin;

mod config;
mod map;
mod telemetry;
mod ui;

use config::MapSettings;
use map::MapPlugin;
use telemetry::TelemetryPlugin;
use ui::UiPlugin;

fn main() {
    // Logging is not up until the plugins are built, so a bad settings file
    // is reported from a startup system instead.
    let (settings, load_error) = match MapSettings::load() {
        Ok(settings) => (settings, None),
        Err(err) => (MapSettings::default(), Some(format!("{:#}", err))),
    };

    let mut app = App::new();

    app.add_plugins(DefaultPlugins.set(WindowPlugin {
        primary_window: Some(Window {
            title: "Fleet Map".to_string(),
            present_mode: PresentMode::AutoVsync,
            ..default()
        }),
        ..default()
    }));

    #[cfg(feature = "dev")]
    app.add_plugins(FpsOverlayPlugin::default());

    app.add_plugins(MapPlugin {
        options: settings.map.clone(),
    });
    app.insert_resource(settings);
    app.add_plugins(TelemetryPlugin);
    app.add_plugins(UiPlugin);

    app.add_systems(Startup, move || match &load_error {
        Some(err) => warn!("[INIT] Settings not loaded, using defaults: {}", err),
        None => info!(
            "[INIT] Settings loaded ({})",
            config::settings_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "no config dir".to_string())
        ),
    });

    app.run();
}
