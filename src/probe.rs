use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::filters::ema::Ema;
use crate::filters::kalman::KalmanFilter;
use crate::filters::FilterError;
use crate::hal::{format_timestamp, Clock, Display, MemoryGauge, PinIo};
use crate::max6675::Max6675;
use crate::store::{Reading, StoreError, TimeSeriesStore};

/// Network identity injected for display and reporting. Opaque to the probe
/// itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetInfo {
    pub ip: String,
    pub mac: String,
}

/// The published view of the probe: what the display, console and HTTP
/// surface all read.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub temperature: f64,
    /// Smoothed rate of change in degrees per minute.
    pub rate: f64,
    pub timestamp: i64,
    pub timestamp_str: String,
    pub heartbeat_secs: u64,
    /// Open-thermocouple fault bit from the last sensor read.
    pub fault: bool,
}

#[derive(Debug)]
pub enum ProbeError {
    Filter(FilterError),
    Store(StoreError),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Filter(err) => write!(f, "estimator failed: {}", err),
            ProbeError::Store(err) => write!(f, "store failed: {}", err),
        }
    }
}

impl std::error::Error for ProbeError {}

impl From<FilterError> for ProbeError {
    fn from(err: FilterError) -> Self {
        ProbeError::Filter(err)
    }
}

impl From<StoreError> for ProbeError {
    fn from(err: StoreError) -> Self {
        ProbeError::Store(err)
    }
}

/// Tuning for a probe instance.
#[derive(Clone, Debug)]
pub struct ProbeConfig {
    /// Seconds between sampling cycles.
    pub heartbeat_secs: u64,
    /// Nominal store capacity in readings.
    pub capacity: usize,
    /// Smoothing factor for the displayed rate.
    pub alpha: f64,
    /// Initial temperature estimate, Fahrenheit.
    pub x0: f64,
    /// Single-scalar estimator tuning (coupled preset).
    pub accuracy: f64,
    /// Free-memory floor that triggers eviction.
    pub low_water_bytes: usize,
    /// Free-memory level eviction must recover to.
    pub high_water_bytes: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig {
            heartbeat_secs: 5,
            // Two minutes of readings at the default heartbeat.
            capacity: 24,
            alpha: 0.3,
            x0: 68.0,
            accuracy: 0.5,
            low_water_bytes: 16 * 1024,
            high_water_bytes: 32 * 1024,
        }
    }
}

/// The probe core: one sensor, one estimator, one smoother, one store.
///
/// All mutation happens in `sample_once`, driven from the single sensor
/// loop; every other party only reads, so a cycle is atomic with respect to
/// anything observing the snapshot or the store.
pub struct Thermometer<SCK, CS, SO, C, D, G> {
    sensor: Max6675<SCK, CS, SO, C>,
    clock: C,
    display: D,
    gauge: G,
    kalman: KalmanFilter,
    rate_ema: Ema,
    store: TimeSeriesStore,
    netinfo: NetInfo,
    heartbeat_secs: u64,
    temperature: f64,
    rate: f64,
    timestamp: i64,
    fault: bool,
}

impl<SCK, CS, SO, C, D, G> Thermometer<SCK, CS, SO, C, D, G>
where
    SCK: PinIo,
    CS: PinIo,
    SO: PinIo,
    C: Clock,
    D: Display,
    G: MemoryGauge,
{
    pub fn new(
        sensor: Max6675<SCK, CS, SO, C>,
        clock: C,
        display: D,
        gauge: G,
        netinfo: NetInfo,
        config: ProbeConfig,
    ) -> Result<Self, FilterError> {
        let rate_ema = Ema::new(config.alpha)?;
        Ok(Thermometer {
            sensor,
            clock,
            display,
            gauge,
            kalman: KalmanFilter::with_accuracy(
                config.heartbeat_secs as f64,
                config.x0,
                config.accuracy,
            ),
            rate_ema,
            store: TimeSeriesStore::new(
                config.capacity,
                config.low_water_bytes,
                config.high_water_bytes,
            ),
            netinfo,
            heartbeat_secs: config.heartbeat_secs,
            temperature: config.x0,
            rate: 0.0,
            timestamp: 0,
            fault: false,
        })
    }

    /// Run one sampling cycle: read the sensor, fuse, smooth, retain, evict.
    pub fn sample_once(&mut self) -> Result<Snapshot, ProbeError> {
        let raw = self.sensor.read_fahrenheit();
        let fault = self.sensor.error();
        let timestamp = self.clock.epoch_secs();
        self.ingest(raw, timestamp, fault)
    }

    fn ingest(&mut self, raw: f64, timestamp: i64, fault: bool) -> Result<Snapshot, ProbeError> {
        // Fuse the raw sample; position is the published temperature,
        // velocity is per-interval and gets scaled to per-minute.
        let (temperature, rate_per_interval) = self.kalman.update(raw)?;
        let rate_per_min = rate_per_interval * 60.0 / self.heartbeat_secs as f64;
        let rate = self.rate_ema.update(rate_per_min);

        self.temperature = temperature;
        self.rate = rate;
        self.timestamp = timestamp;
        self.fault = fault;

        self.store.push(Reading {
            timestamp,
            temperature,
        });
        let evicted = self.store.enforce_memory_pressure(&self.gauge)?;
        if evicted > 0 {
            warn!(
                "memory pressure: evicted {} readings, {} retained, {} bytes free",
                evicted,
                self.store.len(),
                self.gauge.free_bytes()
            );
        }

        if fault {
            warn!("thermocouple fault bit set (open or loose probe)");
        }

        let snapshot = self.current_snapshot();
        info!(
            "heartbeat ({}s) {} temp: {:.2}F rate: {:+.1}F/min mem free {} kb",
            self.heartbeat_secs,
            snapshot.timestamp_str,
            snapshot.temperature,
            snapshot.rate,
            self.gauge.free_bytes() / 1024
        );

        self.display.clear();
        let line = format!(
            "{:.1}F {}/min\n{}",
            snapshot.temperature,
            format_rate(snapshot.rate),
            self.netinfo.ip
        );
        self.display.put_str(&line);

        Ok(snapshot)
    }

    pub fn current_snapshot(&self) -> Snapshot {
        Snapshot {
            temperature: self.temperature,
            rate: self.rate,
            timestamp: self.timestamp,
            timestamp_str: format_timestamp(self.timestamp),
            heartbeat_secs: self.heartbeat_secs,
            fault: self.fault,
        }
    }

    /// Retained readings strictly newer than `from_ts`, oldest first.
    pub fn stream(&self, from_ts: i64) -> Result<Vec<Reading>, StoreError> {
        Ok(self.store.stream(from_ts)?.collect())
    }

    pub fn netinfo(&self) -> &NetInfo {
        &self.netinfo
    }

    pub fn heartbeat_secs(&self) -> u64 {
        self.heartbeat_secs
    }
}

/// Display formatting for the rate: one decimal normally, whole degrees once
/// past +/-9, clamped at +/-99 so it always fits the 16-column line.
fn format_rate(rate: f64) -> String {
    let clamped = rate.clamp(-99.0, 99.0);
    if clamped.abs() > 9.0 {
        format!("{:+.0}", clamped)
    } else {
        format!("{:+.1}", clamped)
    }
}

/// Drive the probe at its heartbeat until `cycles` runs out (None = forever).
///
/// The lock is held for exactly one cycle at a time; request handlers take
/// it between ticks, so they always observe a fully consistent snapshot.
/// A store failure (memory exhaustion) aborts the loop and propagates.
pub async fn run_sensor_loop<SCK, CS, SO, C, D, G>(
    probe: Arc<Mutex<Thermometer<SCK, CS, SO, C, D, G>>>,
    cycles: Option<u64>,
) -> Result<(), ProbeError>
where
    SCK: PinIo,
    CS: PinIo,
    SO: PinIo,
    C: Clock,
    D: Display,
    G: MemoryGauge,
{
    let heartbeat_secs = probe.lock().unwrap().heartbeat_secs();
    let mut ticker = interval(Duration::from_secs(heartbeat_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut completed = 0u64;
    loop {
        ticker.tick().await;
        probe.lock().unwrap().sample_once()?;

        completed += 1;
        if let Some(limit) = cycles {
            if completed >= limit {
                return Ok(());
            }
        }
    }
}
