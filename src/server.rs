use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use log::info;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use crate::hal::{format_timestamp, Clock, Display, MemoryGauge, PinIo};
use crate::probe::{Snapshot, Thermometer};
use crate::store::{Reading, StoreError};

/// Read-only view of the probe, what the request handlers are allowed to
/// touch. All mutation stays on the sensor loop.
pub trait ProbeView: Send {
    fn snapshot(&self) -> Snapshot;
    fn readings_since(&self, from_ts: i64) -> Result<Vec<Reading>, StoreError>;
}

impl<SCK, CS, SO, C, D, G> ProbeView for Thermometer<SCK, CS, SO, C, D, G>
where
    SCK: PinIo + Send,
    CS: PinIo + Send,
    SO: PinIo + Send,
    C: Clock + Send,
    D: Display + Send,
    G: MemoryGauge + Send,
{
    fn snapshot(&self) -> Snapshot {
        self.current_snapshot()
    }

    fn readings_since(&self, from_ts: i64) -> Result<Vec<Reading>, StoreError> {
        self.stream(from_ts)
    }
}

#[derive(Deserialize)]
pub struct StreamQuery {
    /// Epoch seconds; only readings strictly newer are returned.
    #[serde(default)]
    from: i64,
}

pub fn router<P: ProbeView + 'static>(probe: Arc<Mutex<P>>) -> Router {
    Router::new()
        .route("/data", get(data_handler::<P>))
        .route("/stream", get(stream_handler::<P>))
        .with_state(probe)
}

/// Bind and serve until the process exits.
pub async fn serve<P: ProbeView + 'static>(
    probe: Arc<Mutex<P>>,
    port: u16,
) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("probe endpoint listening on http://{}", addr);
    axum::serve(listener, router(probe)).await
}

async fn data_handler<P: ProbeView>(State(probe): State<Arc<Mutex<P>>>) -> Json<Snapshot> {
    let snapshot = probe.lock().unwrap().snapshot();
    Json(snapshot)
}

/// Newline-delimited `[timestamp, temperature]` rows, oldest first. A `from`
/// past the newest retained reading answers 400, never an empty 200.
async fn stream_handler<P: ProbeView>(
    State(probe): State<Arc<Mutex<P>>>,
    Query(query): Query<StreamQuery>,
) -> Result<String, (StatusCode, String)> {
    let readings = probe
        .lock()
        .unwrap()
        .readings_since(query.from)
        .map_err(|err| match err {
            StoreError::FromTimestampInFuture { .. } => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            StoreError::MemoryExhausted { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        })?;

    let mut body = String::new();
    for reading in readings {
        body.push_str(&format!(
            "[{}, {}]\n",
            format_timestamp(reading.timestamp),
            reading.temperature
        ));
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProbe {
        snapshot: Snapshot,
        readings: Vec<Reading>,
    }

    impl FakeProbe {
        fn new() -> Self {
            FakeProbe {
                snapshot: Snapshot {
                    temperature: 71.3,
                    rate: 0.4,
                    timestamp: 1_700_000_300,
                    timestamp_str: format_timestamp(1_700_000_300),
                    heartbeat_secs: 5,
                    fault: false,
                },
                readings: (0..3)
                    .map(|i| Reading {
                        timestamp: 1_700_000_100 + i * 100,
                        temperature: 70.0 + i as f64,
                    })
                    .collect(),
            }
        }
    }

    impl ProbeView for FakeProbe {
        fn snapshot(&self) -> Snapshot {
            self.snapshot.clone()
        }

        fn readings_since(&self, from_ts: i64) -> Result<Vec<Reading>, StoreError> {
            let newest = self.readings.last().map(|r| r.timestamp);
            match newest {
                Some(ts) if ts >= from_ts => Ok(self
                    .readings
                    .iter()
                    .copied()
                    .filter(|r| r.timestamp > from_ts)
                    .collect()),
                _ => Err(StoreError::FromTimestampInFuture {
                    requested: from_ts,
                    newest,
                }),
            }
        }
    }

    #[tokio::test]
    async fn test_data_handler_serves_snapshot() {
        let probe = Arc::new(Mutex::new(FakeProbe::new()));
        let Json(snapshot) = data_handler(State(probe)).await;
        assert_eq!(snapshot.temperature, 71.3);
        assert_eq!(snapshot.heartbeat_secs, 5);
    }

    #[tokio::test]
    async fn test_stream_handler_returns_rows() {
        let probe = Arc::new(Mutex::new(FakeProbe::new()));
        let body = stream_handler(State(probe), Query(StreamQuery { from: 1_700_000_100 }))
            .await
            .unwrap();
        let rows: Vec<&str> = body.lines().collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with('['));
        assert!(rows[0].ends_with(", 71]"));
    }

    #[tokio::test]
    async fn test_stream_handler_future_timestamp_is_400() {
        let probe = Arc::new(Mutex::new(FakeProbe::new()));
        let (status, message) =
            stream_handler(State(probe), Query(StreamQuery { from: 2_000_000_000 }))
                .await
                .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(message.contains("in the future"));
    }
}
