//! Telemetry systems: worker startup, result draining and teardown.

use bevy::prelude::*;
use std::time::Instant;

use crate::config::MapSettings;
use crate::map::engine::{IngestOutcome, MapEngine};
use crate::telemetry::fetcher::start_telemetry_worker;
use crate::telemetry::types::{
    ConnectionState, TelemetryChannels, TelemetryCommand, TelemetryFeed, TelemetryResult,
    TelemetryStatus,
};

pub fn setup_telemetry_worker(
    mut commands: Commands,
    settings: Res<MapSettings>,
    mut status: ResMut<TelemetryStatus>,
) {
    let channels = start_telemetry_worker(&settings);
    channels.send(TelemetryCommand::FetchWaypoints);
    status.last_waypoints_request = Instant::now();
    info!(
        "[INIT] Telemetry worker started (api {}, stream {})",
        settings.api.base_url, settings.api.stream_url
    );
    commands.insert_resource(channels);
}

/// Re-request waypoints until one fetch succeeds.
pub fn retry_waypoints(
    mut status: ResMut<TelemetryStatus>,
    channels: Option<Res<TelemetryChannels>>,
) {
    let Some(channels) = channels else { return };
    if channels.is_shut_down() || status.waypoints_loaded || status.waypoints_error.is_none() {
        return;
    }
    let now = Instant::now();
    if now.duration_since(status.last_waypoints_request) >= status.waypoints_retry {
        status.last_waypoints_request = now;
        channels.send(TelemetryCommand::FetchWaypoints);
    }
}

pub fn apply_telemetry_results(
    channels: Option<Res<TelemetryChannels>>,
    mut engine: ResMut<MapEngine>,
    mut status: ResMut<TelemetryStatus>,
) {
    let Some(channels) = channels else { return };
    let Ok(guard) = channels.res_rx.lock() else {
        return;
    };

    while let Ok(msg) = guard.try_recv() {
        apply_result(msg, &mut engine, &mut status);
    }
}

fn apply_result(msg: TelemetryResult, engine: &mut MapEngine, status: &mut TelemetryStatus) {
    match msg {
        TelemetryResult::Message(text) => {
            status.messages += 1;
            if let IngestOutcome::Accepted {
                refit_scheduled: true,
                ..
            } = engine.handle_message(&text)
            {
                debug!("[STREAM] bounds widened, refit scheduled");
            }
        }
        TelemetryResult::Waypoints(waypoints) => {
            info!("[WAYPOINTS] loaded {}", waypoints.len());
            engine.set_waypoints(waypoints);
            status.waypoints_loaded = true;
            status.waypoints_error = None;
        }
        TelemetryResult::Health { ok } => {
            status.health = Some(ok);
        }
        TelemetryResult::Connection(state) => {
            if state == ConnectionState::Connected {
                status.stream_error = None;
            }
            status.connection = state;
        }
        TelemetryResult::Error { feed, error } => {
            warn!("[{:?}] {}", feed, error);
            match feed {
                TelemetryFeed::Waypoints => status.waypoints_error = Some(error),
                TelemetryFeed::Stream => status.stream_error = Some(error),
            }
        }
    }
}

/// Tear down the worker and the engine when the app exits.
pub fn shutdown_on_exit(
    mut exits: MessageReader<AppExit>,
    channels: Option<ResMut<TelemetryChannels>>,
    mut engine: ResMut<MapEngine>,
) {
    if exits.read().next().is_none() {
        return;
    }
    if let Some(mut channels) = channels {
        channels.shutdown();
    }
    if !engine.is_disposed() {
        engine.dispose();
        info!("[INIT] Map engine disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapOptions;
    use crate::telemetry::types::Waypoint;

    fn engine() -> MapEngine {
        MapEngine::new(MapOptions::default())
    }

    #[test]
    fn waypoints_result_feeds_engine() {
        let mut engine = engine();
        let mut status = TelemetryStatus::default();
        apply_result(
            TelemetryResult::Waypoints(vec![Waypoint {
                symbol: "X1-A1".to_string(),
                x: 3.0,
                y: 4.0,
                is_market: false,
            }]),
            &mut engine,
            &mut status,
        );
        assert_eq!(engine.waypoints().len(), 1);
        assert!(status.waypoints_loaded);
    }

    #[test]
    fn stream_messages_are_counted_and_ingested() {
        let mut engine = engine();
        let mut status = TelemetryStatus::default();
        let body = serde_json::json!({
            "type": "journey",
            "journey_id": "j1",
            "ship_symbol": "S-1",
            "departure_ts": 10,
            "arrival_ts": 20,
            "origin": {"symbol": "A", "x": 0, "y": 0},
            "destination": {"symbol": "B", "x": 3, "y": 4}
        })
        .to_string();
        apply_result(TelemetryResult::Message(body), &mut engine, &mut status);
        apply_result(
            TelemetryResult::Message("garbage".to_string()),
            &mut engine,
            &mut status,
        );
        assert_eq!(status.messages, 2);
        assert_eq!(engine.trails().ship_count(), 1);
        assert_eq!(engine.stats().dropped, 1);
    }

    #[test]
    fn connected_clears_stream_error() {
        let mut engine = engine();
        let mut status = TelemetryStatus::default();
        apply_result(
            TelemetryResult::Error {
                feed: TelemetryFeed::Stream,
                error: "refused".to_string(),
            },
            &mut engine,
            &mut status,
        );
        assert_eq!(status.stream_error.as_deref(), Some("refused"));
        apply_result(
            TelemetryResult::Connection(ConnectionState::Connected),
            &mut engine,
            &mut status,
        );
        assert!(status.stream_error.is_none());
        assert_eq!(status.connection, ConnectionState::Connected);
    }
}
