use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::hal::MemoryGauge;

/// One retained sample: wall-clock second and the fused temperature.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: i64,
    pub temperature: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The client asked for readings newer than anything retained. Distinct
    /// from an empty-but-valid stream so callers can answer with a 400.
    FromTimestampInFuture { requested: i64, newest: Option<i64> },
    /// Eviction emptied the store without free memory recovering above the
    /// high-water mark. Fatal: the supervisor should restart the process.
    MemoryExhausted { free_bytes: usize, high_water: usize },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::FromTimestampInFuture { requested, newest } => match newest {
                Some(newest) => write!(
                    f,
                    "invalid request, from_timestamp {} is in the future (newest is {})",
                    requested, newest
                ),
                None => write!(
                    f,
                    "invalid request, from_timestamp {} is in the future (no readings retained)",
                    requested
                ),
            },
            StoreError::MemoryExhausted {
                free_bytes,
                high_water,
            } => write!(
                f,
                "memory pressure not recoverable: {} bytes free, need {} above high-water mark",
                free_bytes, high_water
            ),
        }
    }
}

impl std::error::Error for StoreError {}

/// Bounded, insertion-ordered log of readings.
///
/// A ring buffer with a fixed nominal capacity; the oldest entries go first.
/// A second, independent eviction rule reacts to heap pressure: when free
/// memory falls below the low-water mark, old entries are dropped until it
/// recovers above the high-water mark, which can shrink the log well below
/// its nominal capacity.
pub struct TimeSeriesStore {
    readings: VecDeque<Reading>,
    capacity: usize,
    low_water_bytes: usize,
    high_water_bytes: usize,
}

impl TimeSeriesStore {
    pub fn new(capacity: usize, low_water_bytes: usize, high_water_bytes: usize) -> Self {
        TimeSeriesStore {
            readings: VecDeque::with_capacity(capacity),
            capacity,
            low_water_bytes,
            high_water_bytes: high_water_bytes.max(low_water_bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<Reading> {
        self.readings.back().copied()
    }

    /// Append a reading, evicting from the front to hold the capacity bound.
    pub fn push(&mut self, reading: Reading) {
        self.readings.push_back(reading);
        while self.readings.len() > self.capacity {
            self.readings.pop_front();
        }
    }

    /// Apply the memory-pressure eviction rule against the given gauge.
    ///
    /// Returns the number of readings evicted. If the store empties before
    /// free memory recovers, the configuration is unservable and the error
    /// must reach the supervisor; retrying cannot help.
    pub fn enforce_memory_pressure(
        &mut self,
        gauge: &dyn MemoryGauge,
    ) -> Result<usize, StoreError> {
        if gauge.free_bytes() >= self.low_water_bytes {
            return Ok(0);
        }

        let mut evicted = 0;
        while gauge.free_bytes() <= self.high_water_bytes {
            if self.readings.pop_front().is_none() {
                return Err(StoreError::MemoryExhausted {
                    free_bytes: gauge.free_bytes(),
                    high_water: self.high_water_bytes,
                });
            }
            evicted += 1;
        }
        Ok(evicted)
    }

    /// Lazy iterator over retained readings strictly newer than `from_ts`,
    /// oldest to newest. Asking for a point past the newest retained reading
    /// (or querying an empty store) is a client error, not an empty stream.
    pub fn stream(
        &self,
        from_ts: i64,
    ) -> Result<impl Iterator<Item = Reading> + '_, StoreError> {
        let newest = self.latest().map(|r| r.timestamp);
        match newest {
            Some(ts) if ts >= from_ts => {}
            _ => {
                return Err(StoreError::FromTimestampInFuture {
                    requested: from_ts,
                    newest,
                });
            }
        }

        Ok(self
            .readings
            .iter()
            .copied()
            .filter(move |r| r.timestamp > from_ts))
    }
}
