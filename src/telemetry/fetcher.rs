//! Telemetry worker: REST fetches plus the reconnecting journey stream.

use crate::config::MapSettings;
use crate::telemetry::types::{
    ConnectionState, Subscribe, TelemetryChannels, TelemetryCommand, TelemetryFeed,
    TelemetryResult, Waypoint,
};
use anyhow::{Context, Result};
use bevy::log::{info, warn};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::{
    Arc, Mutex,
    mpsc::{self, Sender},
};
use std::thread;
use std::time::Duration;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Everything the worker needs, copied out of [`MapSettings`].
#[derive(Clone, Debug)]
struct WorkerConfig {
    waypoints_url: String,
    health_url: String,
    stream_url: String,
    request_timeout: Duration,
    reconnect_initial_ms: u64,
    reconnect_max_ms: u64,
    health_check: bool,
}

impl From<&MapSettings> for WorkerConfig {
    fn from(settings: &MapSettings) -> Self {
        Self {
            waypoints_url: settings.api.waypoints_url(),
            health_url: settings.api.health_url(),
            stream_url: settings.api.stream_url.clone(),
            request_timeout: settings.api.request_timeout(),
            reconnect_initial_ms: settings.stream.reconnect_initial_ms,
            reconnect_max_ms: settings.stream.reconnect_max_ms,
            health_check: settings.stream.health_check,
        }
    }
}

/// How a connected stream session ended.
#[derive(Debug)]
enum StreamEnd {
    Shutdown,
    Lost(String),
}

pub fn start_telemetry_worker(settings: &MapSettings) -> TelemetryChannels {
    let (cmd_tx, cmd_rx) = mpsc::channel::<TelemetryCommand>();
    let (res_tx, res_rx) = mpsc::channel::<TelemetryResult>();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let config = WorkerConfig::from(settings);

    thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(err) => {
                warn!("[STREAM] failed to start tokio runtime: {}", err);
                let _ = res_tx.send(TelemetryResult::Error {
                    feed: TelemetryFeed::Stream,
                    error: format!("tokio runtime: {}", err),
                });
                return;
            }
        };

        rt.block_on(async move {
            let client = reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new());

            let stream = tokio::spawn(run_stream(
                config.clone(),
                client.clone(),
                res_tx.clone(),
                shutdown_rx,
            ));

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    TelemetryCommand::FetchWaypoints => {
                        let msg = match fetch_waypoints(&client, &config.waypoints_url).await {
                            Ok(waypoints) => TelemetryResult::Waypoints(waypoints),
                            Err(err) => TelemetryResult::Error {
                                feed: TelemetryFeed::Waypoints,
                                error: format!("{:#}", err),
                            },
                        };
                        let _ = res_tx.send(msg);
                    }
                    TelemetryCommand::Shutdown => break,
                }
            }

            let _ = stream.await;
            info!("[STREAM] telemetry worker stopped");
        });
    });

    TelemetryChannels {
        cmd_tx: Some(cmd_tx),
        res_rx: Arc::new(Mutex::new(res_rx)),
        shutdown_tx,
    }
}

/// Delay before reconnect `attempt` (1-based): the initial delay doubled per
/// attempt, capped at `max_ms`.
pub fn backoff_delay(attempt: u32, initial_ms: u64, max_ms: u64) -> Duration {
    let doublings = attempt.saturating_sub(1).min(32);
    let ms = initial_ms
        .max(1)
        .saturating_mul(1u64 << doublings)
        .min(max_ms.max(initial_ms.max(1)));
    Duration::from_millis(ms)
}

async fn run_stream(
    config: WorkerConfig,
    client: reqwest::Client,
    res_tx: Sender<TelemetryResult>,
    mut shutdown: watch::Receiver<bool>,
) {
    let send = |msg| {
        let _ = res_tx.send(msg);
    };
    let mut attempt: u32 = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }
        if attempt == 0 {
            send(TelemetryResult::Connection(ConnectionState::Connecting));
        }

        if config.health_check {
            let ok = match fetch_body(&client, &config.health_url).await {
                Ok(_) => true,
                Err(err) => {
                    warn!("[STREAM] health probe failed: {:#}", err);
                    false
                }
            };
            send(TelemetryResult::Health { ok });
        }

        match stream_once(&config.stream_url, &res_tx, &mut shutdown).await {
            Ok(StreamEnd::Shutdown) => break,
            Ok(StreamEnd::Lost(reason)) => {
                warn!("[STREAM] connection lost: {}", reason);
                send(TelemetryResult::Connection(ConnectionState::Disconnected));
                attempt = 0;
            }
            Err(err) => {
                send(TelemetryResult::Error {
                    feed: TelemetryFeed::Stream,
                    error: format!("{:#}", err),
                });
            }
        }

        attempt = attempt.saturating_add(1);
        let retry_in = backoff_delay(
            attempt,
            config.reconnect_initial_ms,
            config.reconnect_max_ms,
        );
        send(TelemetryResult::Connection(ConnectionState::Reconnecting {
            attempt,
            retry_in,
        }));

        tokio::select! {
            _ = tokio::time::sleep(retry_in) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    send(TelemetryResult::Connection(ConnectionState::Closed));
}

/// One websocket session. Errors mean the connection was never established.
async fn stream_once(
    url: &str,
    res_tx: &Sender<TelemetryResult>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<StreamEnd> {
    let (socket, _) = connect_async(url)
        .await
        .with_context(|| format!("connect {}", url))?;
    info!("[STREAM] connected to {}", url);
    let _ = res_tx.send(TelemetryResult::Connection(ConnectionState::Connected));

    let (mut write, mut read) = socket.split();
    let subscribe = serde_json::to_string(&Subscribe::default()).context("encode subscribe")?;
    if let Err(err) = write.send(Message::Text(subscribe)).await {
        return Ok(StreamEnd::Lost(format!("subscribe failed: {}", err)));
    }

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(StreamEnd::Shutdown);
                }
            }
            frame = read.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => continue,
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        return Ok(StreamEnd::Lost("closed by server".to_string()));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => return Ok(StreamEnd::Lost(err.to_string())),
                };
                if res_tx.send(TelemetryResult::Message(text)).is_err() {
                    return Ok(StreamEnd::Shutdown);
                }
            }
        }
    }
}

/// `/waypoints` answers with a bare array; a `{"waypoints": [...]}` envelope
/// is accepted as well.
#[derive(Deserialize)]
#[serde(untagged)]
enum WaypointsBody {
    List(Vec<Waypoint>),
    Envelope { waypoints: Vec<Waypoint> },
}

pub fn parse_waypoints(body: &str) -> Result<Vec<Waypoint>> {
    let parsed: WaypointsBody = serde_json::from_str(body).context("invalid waypoints json")?;
    Ok(match parsed {
        WaypointsBody::List(list) => list,
        WaypointsBody::Envelope { waypoints } => waypoints,
    })
}

async fn fetch_waypoints(client: &reqwest::Client, url: &str) -> Result<Vec<Waypoint>> {
    let body = fetch_body(client, url).await?;
    let waypoints = parse_waypoints(&body)?;
    info!("[WAYPOINTS] fetched {} waypoints", waypoints.len());
    Ok(waypoints)
}

async fn fetch_body(client: &reqwest::Client, url: &str) -> Result<String> {
    let resp = client
        .get(url)
        .header("accept", "application/json")
        .send()
        .await
        .context("request failed")?;
    let status = resp.status();
    let body = resp.text().await.context("read response")?;
    if !status.is_success() {
        anyhow::bail!("http {} for {}", status, url);
    }
    Ok(body)
}
