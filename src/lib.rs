//! Firmware core for a standalone thermocouple temperature probe.
//!
//! A bit-banged MAX6675 driver feeds raw temperature codes into a
//! constant-acceleration Kalman filter; the derived rate of change runs
//! through an exponential smoother; fused readings land in a bounded,
//! memory-aware time-series store. One cooperative sensor loop owns every
//! mutation, and a thin HTTP surface reads the published snapshot between
//! its ticks. Hardware (pins, clock, display, memory gauge) is injected
//! behind the traits in [`hal`], so the whole pipeline runs against
//! simulated parts in tests and on the workbench.

pub mod filters;
pub mod hal;
pub mod matrix;
pub mod max6675;
pub mod probe;
pub mod server;
pub mod store;

pub use filters::ema::Ema;
pub use filters::kalman::KalmanFilter;
pub use max6675::Max6675;
pub use probe::{NetInfo, ProbeConfig, Snapshot, Thermometer};
pub use store::{Reading, TimeSeriesStore};
