//! Telemetry wire types and worker communication structures

use bevy::math::DVec2;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{
    Arc, Mutex,
    mpsc::{Receiver, Sender},
};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Static map location from `GET /waypoints`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub symbol: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub is_market: bool,
}

/// One end of a journey. Coordinates may be unknown to the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub symbol: String,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
}

impl Endpoint {
    /// Both coordinates, when present and finite.
    pub fn position(&self) -> Option<DVec2> {
        match (self.x, self.y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some(DVec2::new(x, y)),
            _ => None,
        }
    }
}

/// A `"journey"` message from the fleet stream. Timestamps are unix seconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JourneyEvent {
    pub journey_id: String,
    pub ship_symbol: String,
    pub departure_ts: f64,
    pub arrival_ts: f64,
    pub origin: Endpoint,
    pub destination: Endpoint,
    #[serde(default)]
    pub flight_mode: Option<String>,
}

impl JourneyEvent {
    pub fn departure_ms(&self) -> i64 {
        seconds_to_ms(self.departure_ts)
    }

    pub fn arrival_ms(&self) -> i64 {
        seconds_to_ms(self.arrival_ts)
    }

    /// True when both timestamps are finite and within a plausible range.
    pub fn has_valid_times(&self) -> bool {
        [self.departure_ts, self.arrival_ts]
            .iter()
            .all(|ts| ts.is_finite() && ts.abs() <= MAX_TIMESTAMP_SECS)
    }
}

/// Roughly year 5000; keeps millisecond arithmetic far from `i64` limits.
pub const MAX_TIMESTAMP_SECS: f64 = 1e11;

fn seconds_to_ms(ts: f64) -> i64 {
    (ts * 1000.0).round() as i64
}

/// Stream payloads the map understands.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamMessage {
    Journey(JourneyEvent),
    /// Any other `type`; ignored by the map.
    Other(String),
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("message has no \"type\" field")]
    MissingType,
    #[error("malformed {kind} message: {source}")]
    Malformed {
        kind: &'static str,
        source: serde_json::Error,
    },
}

impl StreamMessage {
    pub fn parse(text: &str) -> Result<Self, MessageError> {
        let value: Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(MessageError::MissingType)?
            .to_string();
        match kind.as_str() {
            "journey" => serde_json::from_value(value)
                .map(StreamMessage::Journey)
                .map_err(|source| MessageError::Malformed {
                    kind: "journey",
                    source,
                }),
            _ => Ok(StreamMessage::Other(kind)),
        }
    }
}

/// Subscription request sent once the stream socket opens.
#[derive(Debug, Serialize)]
pub struct Subscribe<'a> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub channel: &'a str,
}

impl Default for Subscribe<'_> {
    fn default() -> Self {
        Self {
            kind: "subscribe",
            channel: "journeys",
        }
    }
}

/// Stream connection lifecycle, as reported by the worker.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Reconnecting {
        attempt: u32,
        retry_in: Duration,
    },
    Disconnected,
    Closed,
}

impl ConnectionState {
    pub fn label(&self) -> String {
        match self {
            ConnectionState::Connecting => "connecting".to_string(),
            ConnectionState::Connected => "live".to_string(),
            ConnectionState::Reconnecting { attempt, retry_in } => format!(
                "reconnecting (attempt {}, {:.1}s)",
                attempt,
                retry_in.as_secs_f32()
            ),
            ConnectionState::Disconnected => "disconnected".to_string(),
            ConnectionState::Closed => "closed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryFeed {
    Waypoints,
    Stream,
}

/// Commands for the telemetry worker thread
#[derive(Debug)]
pub enum TelemetryCommand {
    FetchWaypoints,
    Shutdown,
}

/// Results from the telemetry worker thread
#[derive(Debug)]
pub enum TelemetryResult {
    Health { ok: bool },
    Waypoints(Vec<Waypoint>),
    /// Raw text frame from the stream; decoded by the map on ingest.
    Message(String),
    Connection(ConnectionState),
    Error { feed: TelemetryFeed, error: String },
}

/// Connection and fetch status shown in the HUD.
#[derive(Resource)]
pub struct TelemetryStatus {
    pub connection: ConnectionState,
    pub health: Option<bool>,
    pub waypoints_loaded: bool,
    pub last_waypoints_request: Instant,
    pub waypoints_retry: Duration,
    pub messages: u64,
    pub waypoints_error: Option<String>,
    pub stream_error: Option<String>,
}

impl Default for TelemetryStatus {
    fn default() -> Self {
        Self {
            connection: ConnectionState::default(),
            health: None,
            waypoints_loaded: false,
            last_waypoints_request: Instant::now(),
            waypoints_retry: Duration::from_secs(5),
            messages: 0,
            waypoints_error: None,
            stream_error: None,
        }
    }
}

impl TelemetryStatus {
    /// One-line summary, e.g. `stream: live | api: ok | 42 msgs`.
    pub fn summary(&self) -> String {
        let api = match self.health {
            Some(true) => "ok",
            Some(false) => "down",
            None => "?",
        };
        let mut line = format!(
            "stream: {} | api: {} | {} msgs",
            self.connection.label(),
            api,
            self.messages
        );
        if let Some(err) = self.waypoints_error.as_ref().or(self.stream_error.as_ref()) {
            line.push_str(" | ");
            line.push_str(err);
        }
        line
    }
}

/// Resource containing channels for communicating with the telemetry worker thread
#[derive(Resource)]
pub struct TelemetryChannels {
    pub cmd_tx: Option<Sender<TelemetryCommand>>,
    pub res_rx: Arc<Mutex<Receiver<TelemetryResult>>>,
    pub shutdown_tx: tokio::sync::watch::Sender<bool>,
}

impl TelemetryChannels {
    /// Queue a command. Returns false once the worker has been shut down.
    pub fn send(&self, cmd: TelemetryCommand) -> bool {
        match &self.cmd_tx {
            Some(tx) => tx.send(cmd).is_ok(),
            None => false,
        }
    }

    /// Stop the stream and the worker thread. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        let Some(tx) = self.cmd_tx.take() else {
            return;
        };
        let _ = self.shutdown_tx.send(true);
        let _ = tx.send(TelemetryCommand::Shutdown);
        info!("[STREAM] telemetry worker shutdown requested");
    }

    pub fn is_shut_down(&self) -> bool {
        self.cmd_tx.is_none()
    }
}

impl Drop for TelemetryChannels {
    fn drop(&mut self) {
        self.shutdown();
    }
}
